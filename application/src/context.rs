//! [`Context`]-related definitions.

use std::sync::atomic::{self, AtomicU16};

use axum::{async_trait, extract::FromRequestParts, RequestPartsExt as _};
use axum_extra::{
    headers::{self, Header},
    TypedHeader,
};
use http::{HeaderName, HeaderValue};
use juniper::{
    http::{GraphQLBatchResponse, GraphQLResponse},
    IntoFieldError as _,
};
use service::domain::{booking, item};

use crate::{define_error, AsError, Error, JuniperResponse, Service};

/// Application context.
///
/// Identities of the caller are resolved by an upstream authenticating proxy
/// and forwarded in the [`HostIdHeader`] and [`UserIdHeader`].
#[derive(Debug)]
pub struct Context {
    /// [`Service`] instance.
    service: Service,

    /// Error status code.
    error_status_code: AtomicU16,

    /// Parts of the HTTP request.
    parts: http::request::Parts,
}

impl Context {
    /// Returns [`Service`] instance of this [`Context`].
    #[must_use]
    pub fn service(&self) -> &Service {
        &self.service
    }

    /// Returns the error status code of this [`Context`].
    #[expect(clippy::missing_panics_doc, reason = "infallible")]
    #[must_use]
    pub fn error_status_code(&self) -> http::StatusCode {
        http::StatusCode::from_u16(
            self.error_status_code.load(atomic::Ordering::Relaxed),
        )
        .expect("invalid status code")
    }

    /// Sets the error status code for this [`Context`].
    ///
    /// Provided [`http::StatusCode`] will be applied to the response.
    pub fn set_error_status_code(&self, status_code: http::StatusCode) {
        self.error_status_code
            .store(status_code.as_u16(), atomic::Ordering::Relaxed);
    }

    /// Helper method calling [`Context::set_error_status_code()`] inside
    /// [`Result::map_err()`] closure.
    pub fn error(&self) -> impl FnOnce(Error) -> Error + '_ {
        move |err| {
            self.set_error_status_code(err.status_code);
            err
        }
    }

    /// Returns the ID of the host performing the current request.
    ///
    /// # Errors
    ///
    /// Errors if the [`HostIdHeader`] is missing or malformed.
    pub async fn host_id(&self) -> Result<item::HostId, Error> {
        match self
            .parts
            .clone()
            .extract::<TypedHeader<HostIdHeader>>()
            .await
        {
            Ok(TypedHeader(HostIdHeader(id))) => Ok(id),
            Err(e) if e.is_missing() => {
                Err(IdentityError::HostRequired.into())
            }
            Err(e) => Err(e.into_error()),
        }
        .map_err(self.error())
    }

    /// Returns the ID of the registered user performing the current request,
    /// if any.
    ///
    /// # Errors
    ///
    /// Errors if the [`UserIdHeader`] is malformed.
    pub async fn user_id(&self) -> Result<Option<booking::UserId>, Error> {
        match self
            .parts
            .clone()
            .extract::<TypedHeader<UserIdHeader>>()
            .await
        {
            Ok(TypedHeader(UserIdHeader(id))) => Ok(Some(id)),
            Err(e) if e.is_missing() => Ok(None),
            Err(e) => Err(e.into_error()),
        }
        .map_err(self.error())
    }
}

impl juniper::Context for Context {}

#[async_trait]
impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = JuniperResponse;

    async fn from_request_parts(
        parts: &mut http::request::Parts,
        _: &S,
    ) -> Result<Self, Self::Rejection> {
        let service =
            parts.extensions.get::<Service>().cloned().ok_or_else(|| {
                JuniperResponse {
                    status_code: http::StatusCode::INTERNAL_SERVER_ERROR,
                    response: GraphQLBatchResponse::Single(
                        GraphQLResponse::error(
                            Error::internal(&"missing `Service` extension")
                                .into_field_error(),
                        ),
                    ),
                }
            })?;

        Ok(Self {
            service,
            error_status_code: AtomicU16::new(
                http::StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            ),
            parts: parts.clone(),
        })
    }
}

/// Name of the [`HostIdHeader`].
static HOST_ID: HeaderName = HeaderName::from_static("x-host-id");

/// Name of the [`UserIdHeader`].
static USER_ID: HeaderName = HeaderName::from_static("x-user-id");

/// `X-Host-Id` header carrying the ID of an authenticated host.
#[derive(Clone, Copy, Debug)]
pub struct HostIdHeader(pub item::HostId);

impl Header for HostIdHeader {
    fn name() -> &'static HeaderName {
        &HOST_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        decode_single(values).map(Self)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0.to_string()).ok());
    }
}

/// `X-User-Id` header carrying the ID of an authenticated user.
#[derive(Clone, Copy, Debug)]
pub struct UserIdHeader(pub booking::UserId);

impl Header for UserIdHeader {
    fn name() -> &'static HeaderName {
        &USER_ID
    }

    fn decode<'i, I>(values: &mut I) -> Result<Self, headers::Error>
    where
        I: Iterator<Item = &'i HeaderValue>,
    {
        decode_single(values).map(Self)
    }

    fn encode<E: Extend<HeaderValue>>(&self, values: &mut E) {
        values.extend(HeaderValue::from_str(&self.0.to_string()).ok());
    }
}

/// Parses the only value of a header.
fn decode_single<'i, T: std::str::FromStr>(
    values: &mut impl Iterator<Item = &'i HeaderValue>,
) -> Result<T, headers::Error> {
    let value = values.next().ok_or_else(headers::Error::invalid)?;
    if values.next().is_some() {
        return Err(headers::Error::invalid());
    }
    value
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .ok_or_else(headers::Error::invalid)
}

define_error! {
    enum IdentityError {
        #[code = "HOST_REQUIRED"]
        #[status = UNAUTHORIZED]
        #[message = "Request must be performed by an authenticated host"]
        HostRequired,
    }
}

#[cfg(test)]
mod spec {
    use axum_extra::headers::{Header as _, HeaderMapExt as _};
    use http::{HeaderMap, HeaderValue};
    use service::domain::item;

    use super::HostIdHeader;

    #[test]
    fn decodes_host_id() {
        let id = item::HostId::new();
        let mut headers = HeaderMap::new();
        headers.typed_insert(HostIdHeader(id));

        let decoded = headers.typed_get::<HostIdHeader>().unwrap();
        assert_eq!(decoded.0, id);

        let garbage = HeaderValue::from_static("not-a-uuid");
        assert!(HostIdHeader::decode(&mut [&garbage].into_iter()).is_err());
    }
}
