//! Application provides API for interacting with the [`Service`].

#![deny(
    nonstandard_style,
    rust_2018_idioms,
    rustdoc::all,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code
)]
#![forbid(non_ascii_idents)]
#![warn(
    clippy::allow_attributes,
    clippy::allow_attributes_without_reason,
    clippy::pedantic,
    clippy::wildcard_enum_match_arm,
    deprecated_in_future,
    missing_copy_implementations,
    missing_debug_implementations,
    missing_docs,
    unreachable_pub,
    unused_crate_dependencies,
    unused_import_braces,
    unused_labels,
    unused_lifetimes,
    unused_qualifications,
    unused_results
)]

pub mod api;
pub mod args;
pub mod config;
mod context;
pub mod error;

use std::sync::Arc;

use axum::{
    extract::WebSocketUpgrade,
    response::{IntoResponse, Response},
    Extension, Json,
};
use derive_more::Debug;
use juniper::{http::GraphQLBatchResponse, DefaultScalarValue, ScalarValue};
use juniper_axum::{extract::JuniperRequest, subscriptions};
use juniper_graphql_ws::ConnectionConfig;
use serde::Serialize;
use service::{command, infra::gateway::mpesa, Command as _};
use tracing as log;
// Used in binary.
use axum_client_ip as _;
use refinery as _;
use tokio as _;
use tower_http as _;
use tracing_subscriber as _;

pub use self::{
    args::Args,
    config::Config,
    context::{Context, HostIdHeader, UserIdHeader},
    error::{AsError, Error},
};

/// [`Service`] with filled infrastructure dependencies.
///
/// [`Service`]: service::Service
pub type Service =
    service::Service<service::infra::Postgres, service::infra::gateway::Mpesa>;

/// [`juniper`] GraphQL response.
#[derive(Debug)]
pub struct JuniperResponse<S = DefaultScalarValue>
where
    S: ScalarValue,
{
    /// Status code of the response.
    pub status_code: http::StatusCode,

    /// Underlying GraphQL response.
    #[debug(skip)]
    pub response: GraphQLBatchResponse<S>,
}

impl<S> IntoResponse for JuniperResponse<S>
where
    S: ScalarValue,
{
    fn into_response(self) -> Response {
        let Self {
            status_code,
            response,
        } = self;

        if response.is_ok() {
            Json(response).into_response()
        } else {
            (status_code, Json(response)).into_response()
        }
    }
}

/// GraphQL API handler.
pub async fn graphql(
    Extension(schema): Extension<Arc<api::Schema>>,
    context: Context,
    JuniperRequest(gql_request): JuniperRequest,
) -> JuniperResponse {
    JuniperResponse {
        status_code: context.error_status_code(),
        response: gql_request.execute(&*schema, &context).await,
    }
}

/// GraphQL subscriptions handler.
#[expect(
    clippy::unused_async,
    reason = "`async` is required to match signature"
)]
pub async fn subscriptions(
    Extension(schema): Extension<Arc<api::Schema>>,
    context: Context,
    ws: WebSocketUpgrade,
) -> Response {
    ws.protocols(["graphql-transport-ws", "graphql-ws"])
        .max_frame_size(1024)
        .max_message_size(1024)
        .write_buffer_size(512)
        .max_write_buffer_size(1024)
        .on_upgrade(move |socket| {
            subscriptions::serve_ws(
                socket,
                schema,
                move |_: juniper::Variables| async move {
                    Ok::<_, Error>(
                        ConnectionConfig::new(context)
                            .with_max_in_flight_operations(10),
                    )
                },
            )
        })
}

/// Acknowledgement of an M-Pesa [`mpesa::Callback`].
#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    /// Code of the acknowledgement, `0` for an accepted callback.
    pub result_code: u8,

    /// Description of the acknowledgement.
    pub result_desc: &'static str,
}

impl CallbackAck {
    /// [`CallbackAck`] of a consumed callback.
    const ACCEPTED: Self = Self {
        result_code: 0,
        result_desc: "Accepted",
    };

    /// [`CallbackAck`] asking M-Pesa to deliver the callback again.
    const RETRY: Self = Self {
        result_code: 1,
        result_desc: "Temporarily unavailable, retry later",
    };

    /// Acknowledges a callback resolving with the provided `failure`, if any.
    ///
    /// Only storage failures are rejected, as a redelivered callback may
    /// succeed. Anything else won't change on a redelivery.
    fn of(
        failure: Option<&command::resolve_payment::ExecutionError>,
    ) -> (http::StatusCode, Self) {
        use command::{
            finalize_payment::ExecutionError as F,
            resolve_payment::ExecutionError as E,
        };

        match failure {
            Some(E::Db(_) | E::Finalization(F::Db(_))) => {
                (http::StatusCode::SERVICE_UNAVAILABLE, Self::RETRY)
            }
            None | Some(E::PaymentNotExists(_) | E::Finalization(_)) => {
                (http::StatusCode::OK, Self::ACCEPTED)
            }
        }
    }
}

/// M-Pesa [`mpesa::Callback`] handler, resolving the reported charge.
///
/// The callback is acknowledged unless resolving it fails on storage, so
/// M-Pesa redelivers it later.
pub async fn mpesa_callback(
    Extension(service): Extension<Service>,
    Json(callback): Json<mpesa::Callback>,
) -> (http::StatusCode, Json<CallbackAck>) {
    let receipt = callback.receipt();
    let Some(resolution) = callback.into_resolution() else {
        log::warn!("M-Pesa callback has no checkout reference");
        let (status, ack) = CallbackAck::of(None);
        return (status, Json(ack));
    };

    let checkout_id = resolution.checkout_id.clone();
    let (status, ack) =
        match service.execute(command::ResolvePayment { resolution }).await {
            Ok(payment) => {
                log::info!(
                    "`Payment(id: {})` is resolved as `{}` by \
                     `CheckoutId({checkout_id})`, receipt: {receipt:?}",
                    payment.id,
                    payment.status,
                );
                CallbackAck::of(None)
            }
            Err(e) => {
                log::error!(
                    "failed to resolve `CheckoutId({checkout_id})`: {e}",
                );
                CallbackAck::of(Some(e.as_ref()))
            }
        };
    (status, Json(ack))
}

#[cfg(test)]
mod spec {
    use service::{
        command::{finalize_payment, resolve_payment::ExecutionError},
        domain::payment,
        infra::database,
    };

    use super::CallbackAck;

    /// Returns an error of the storage being unreachable.
    fn unavailable() -> database::Error {
        database::Error::Memory(database::memory::Error::Unavailable)
    }

    #[test]
    fn asks_to_redeliver_on_storage_failure() {
        let (status, ack) =
            CallbackAck::of(Some(&ExecutionError::Db(unavailable())));
        assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE);
        assert_ne!(ack.result_code, 0);

        let (status, _) = CallbackAck::of(Some(&ExecutionError::Finalization(
            finalize_payment::ExecutionError::Db(unavailable()),
        )));
        assert_eq!(status, http::StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn accepts_resolved_or_unknown_charges() {
        let (status, ack) = CallbackAck::of(None);
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(ack.result_code, 0);

        let unknown = ExecutionError::PaymentNotExists(
            payment::CheckoutId::new("ws_CO_191220191020363925").unwrap(),
        );
        let (status, ack) = CallbackAck::of(Some(&unknown));
        assert_eq!(status, http::StatusCode::OK);
        assert_eq!(ack.result_code, 0);
    }
}
