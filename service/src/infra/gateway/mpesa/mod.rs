//! [M-Pesa] STK push [`Gateway`] implementation.
//!
//! [M-Pesa]: https://developer.safaricom.co.ke

pub mod callback;

use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{operations::Initiate, Money};
use derive_more::{Display, Error as StdError, From};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::prelude::ToPrimitive as _;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use time::{
    macros::{format_description, offset},
    OffsetDateTime,
};
use tokio::{sync::Mutex, time::Instant};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::payment,
    infra::{
        gateway::{self, Charge},
        Gateway,
    },
};

pub use self::callback::Callback;

/// [`Mpesa`] gateway configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// Base URL of the Daraja API.
    pub base_url: String,

    /// Consumer key of the Daraja application.
    pub consumer_key: SecretString,

    /// Consumer secret of the Daraja application.
    pub consumer_secret: SecretString,

    /// Business short code charges are paid to.
    pub short_code: String,

    /// Pass key of the business short code.
    pub pass_key: SecretString,

    /// URL charge results are reported to.
    pub callback_url: String,
}

/// [M-Pesa] STK push [`Gateway`].
///
/// [M-Pesa]: https://developer.safaricom.co.ke
#[derive(Clone, Debug)]
pub struct Mpesa {
    /// [`Config`] of this [`Mpesa`] gateway.
    config: Arc<Config>,

    /// HTTP client to call the Daraja API with.
    client: Client,

    /// Cached access token, if any.
    token: Arc<Mutex<Option<Token>>>,
}

/// OAuth access token of the Daraja API.
#[derive(Debug)]
struct Token {
    /// Value of this [`Token`].
    value: SecretString,

    /// [`Instant`] this [`Token`] should be renewed at.
    renew_at: Instant,
}

impl Mpesa {
    /// Maximum length of a [`Charge::reference`] accepted by M-Pesa.
    pub const MAX_REFERENCE_LEN: usize = 12;

    /// Maximum length of a [`Charge::description`] accepted by M-Pesa.
    pub const MAX_DESCRIPTION_LEN: usize = 13;

    /// Period before its expiration a [`Token`] is renewed within.
    const TOKEN_RENEWAL_MARGIN: Duration = Duration::from_secs(60);

    /// Creates a new [`Mpesa`] gateway with the provided [`Config`].
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            client: Client::new(),
            token: Arc::new(Mutex::new(None)),
        }
    }

    /// Returns a valid access token, renewing it if required.
    async fn access_token(&self) -> Result<String, Traced<Error>> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.renew_at > Instant::now() {
                return Ok(token.value.expose_secret().to_owned());
            }
        }

        let Config {
            base_url,
            consumer_key,
            consumer_secret,
            ..
        } = &*self.config;
        let resp = self
            .client
            .get(format!(
                "{base_url}/oauth/v1/generate?grant_type=client_credentials",
            ))
            .basic_auth(
                consumer_key.expose_secret(),
                Some(consumer_secret.expose_secret()),
            )
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;
        if resp.status() != StatusCode::OK {
            return Err(tracerr::new!(Error::Unauthorized {
                status: resp.status().as_u16(),
            }));
        }
        let TokenResponse {
            access_token,
            expires_in,
        } = resp
            .json::<TokenResponse>()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;

        let lifetime = Duration::from_secs(expires_in.seconds());
        *cached = Some(Token {
            value: SecretString::from(access_token.clone()),
            renew_at: Instant::now()
                + lifetime.saturating_sub(Self::TOKEN_RENEWAL_MARGIN),
        });
        log::debug!("M-Pesa access token renewed for {lifetime:?}");

        Ok(access_token)
    }

    /// Forgets the cached access token, so the next call renews it.
    async fn forget_token(&self) {
        drop(self.token.lock().await.take());
    }

    /// Formats the provided [`OffsetDateTime`] as a Daraja timestamp in the
    /// East Africa Time zone.
    fn timestamp(at: OffsetDateTime) -> Result<String, Traced<Error>> {
        at.to_offset(offset!(+3))
            .format(format_description!(
                "[year][month][day][hour][minute][second]"
            ))
            .map_err(tracerr::from_and_wrap!(=> Error))
    }

    /// Pushes the provided [`Charge`] to the payer's phone.
    async fn push(
        &self,
        charge: Charge,
    ) -> Result<payment::CheckoutId, Traced<Error>> {
        let Charge {
            payment_id,
            phone,
            amount,
            reference,
            description,
        } = charge;
        let Config {
            base_url,
            short_code,
            pass_key,
            callback_url,
            ..
        } = &*self.config;

        let whole = amount
            .ceil()
            .amount
            .to_u64()
            .filter(|a| *a > 0)
            .ok_or_else(|| tracerr::new!(Error::InvalidAmount(amount)))?;
        let timestamp = Self::timestamp(OffsetDateTime::now_utc())
            .map_err(tracerr::wrap!())?;
        let password = STANDARD.encode(format!(
            "{short_code}{}{timestamp}",
            pass_key.expose_secret(),
        ));
        let request = StkPushRequest {
            business_short_code: short_code,
            password,
            timestamp,
            transaction_type: "CustomerPayBillOnline",
            amount: whole,
            party_a: phone.as_ref(),
            party_b: short_code,
            phone_number: phone.as_ref(),
            call_back_url: callback_url,
            account_reference: truncate(&reference, Self::MAX_REFERENCE_LEN),
            transaction_desc: truncate(
                &description,
                Self::MAX_DESCRIPTION_LEN,
            ),
        };

        let token = self.access_token().await.map_err(tracerr::wrap!())?;
        let resp = self
            .client
            .post(format!("{base_url}/mpesa/stkpush/v1/processrequest"))
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(tracerr::from_and_wrap!(=> Error))?;

        let checkout_id = match resp.status() {
            StatusCode::OK => {
                let StkPushResponse {
                    checkout_request_id,
                    response_code,
                    response_description,
                } = resp
                    .json::<StkPushResponse>()
                    .await
                    .map_err(tracerr::from_and_wrap!(=> Error))?;
                if response_code != "0" {
                    return Err(tracerr::new!(Error::Rejected {
                        code: response_code,
                        message: response_description,
                    }));
                }
                payment::CheckoutId::new(checkout_request_id)
                    .ok_or_else(|| tracerr::new!(Error::MissingCheckoutId))?
            }
            StatusCode::UNAUTHORIZED => {
                self.forget_token().await;
                return Err(tracerr::new!(Error::Unauthorized {
                    status: StatusCode::UNAUTHORIZED.as_u16(),
                }));
            }
            status => return Err(tracerr::new!(rejection(status, resp).await)),
        };

        log::info!(
            "M-Pesa charge of `{amount}` for `Payment({payment_id})` \
             accepted as `{checkout_id}`",
        );
        Ok(checkout_id)
    }
}

impl Gateway<Initiate<Charge>> for Mpesa {
    type Ok = payment::CheckoutId;
    type Err = Traced<gateway::Error>;

    async fn execute(
        &self,
        Initiate(charge): Initiate<Charge>,
    ) -> Result<Self::Ok, Self::Err> {
        self.push(charge)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> gateway::Error))
    }
}

/// Truncates the provided `text` to at most `max` characters.
fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// Builds an [`Error::Rejected`] out of a failed Daraja API [`Response`].
async fn rejection(status: StatusCode, resp: Response) -> Error {
    match resp.json::<ErrorResponse>().await {
        Ok(ErrorResponse {
            error_code,
            error_message,
        }) => Error::Rejected {
            code: error_code,
            message: error_message,
        },
        Err(_) => Error::Rejected {
            code: status.as_u16().to_string(),
            message: status
                .canonical_reason()
                .unwrap_or("unknown error")
                .to_owned(),
        },
    }
}

/// Response of the Daraja OAuth endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    /// Issued access token.
    access_token: String,

    /// Lifetime of the issued access token.
    expires_in: Seconds,
}

/// Number of seconds, encoded either as a number or as a string.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    /// Numeric encoding.
    Number(u64),

    /// String encoding.
    Text(String),
}

impl Seconds {
    /// Returns the number of seconds, treating malformed values as zero.
    fn seconds(&self) -> u64 {
        match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().unwrap_or_default(),
        }
    }
}

/// Request of the Daraja STK push endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushRequest<'a> {
    business_short_code: &'a str,
    password: String,
    timestamp: String,
    transaction_type: &'static str,
    amount: u64,
    party_a: &'a str,
    party_b: &'a str,
    phone_number: &'a str,
    #[serde(rename = "CallBackURL")]
    call_back_url: &'a str,
    account_reference: String,
    transaction_desc: String,
}

/// Response of the Daraja STK push endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StkPushResponse {
    /// Reference of the accepted checkout session.
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,

    /// Code of the response, `0` meaning acceptance.
    response_code: String,

    /// Human-readable description of the response.
    response_description: String,
}

/// Error response of the Daraja API.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse {
    /// Code of the error.
    error_code: String,

    /// Human-readable message of the error.
    error_message: String,
}

/// [`Mpesa`] gateway error.
#[derive(Debug, Display, From, StdError)]
pub enum Error {
    /// HTTP request to the Daraja API failed.
    #[display("HTTP request failed: {_0}")]
    #[from]
    Http(reqwest::Error),

    /// Daraja API rejected the credentials.
    #[display("authorization rejected with HTTP `{status}`")]
    Unauthorized {
        /// HTTP status of the rejection.
        status: u16,
    },

    /// Daraja API rejected the charge.
    #[display("charge rejected with `{code}`: {message}")]
    Rejected {
        /// Code of the rejection.
        code: String,

        /// Human-readable message of the rejection.
        message: String,
    },

    /// Daraja API accepted the charge without a checkout reference.
    #[display("charge accepted without a checkout reference")]
    MissingCheckoutId,

    /// Amount cannot be charged in whole units.
    #[display("`{_0}` cannot be charged")]
    InvalidAmount(#[error(not(source))] Money),

    /// Failed to format a request timestamp.
    #[display("failed to format timestamp: {_0}")]
    #[from]
    Timestamp(time::error::Format),
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{operations::Initiate, Money};
    use secrecy::SecretString;
    use serde_json::json;
    use time::macros::datetime;
    use wiremock::{
        matchers::{
            basic_auth, bearer_token, body_partial_json, method, path,
            query_param,
        },
        Mock, MockServer, ResponseTemplate,
    };

    use crate::{
        domain::payment,
        infra::{
            gateway::{self, Charge},
            Gateway as _,
        },
    };

    use super::{Config, Error, Mpesa};

    fn mpesa(server: &MockServer) -> Mpesa {
        Mpesa::new(Config {
            base_url: server.uri(),
            consumer_key: SecretString::from("key"),
            consumer_secret: SecretString::from("secret"),
            short_code: "174379".to_owned(),
            pass_key: SecretString::from("passkey"),
            callback_url: "https://example.com/payments/mpesa/callback"
                .to_owned(),
        })
    }

    fn charge(amount: &str) -> Charge {
        Charge {
            payment_id: payment::Id::new(),
            phone: payment::Phone::new("0712345678").unwrap(),
            amount: Money::from_str(amount).unwrap(),
            reference: "Lake Naivasha Camp".to_owned(),
            description: "Booking for Lake Naivasha Camp".to_owned(),
        }
    }

    async fn mount_token(server: &MockServer, times: u64) {
        Mock::given(method("GET"))
            .and(path("/oauth/v1/generate"))
            .and(query_param("grant_type", "client_credentials"))
            .and(basic_auth("key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "token",
                "expires_in": "3599",
            })))
            .expect(times)
            .mount(server)
            .await;
    }

    #[test]
    fn formats_timestamp_in_east_africa_time() {
        assert_eq!(
            Mpesa::timestamp(datetime!(2024-06-01 21:30:05 UTC)).unwrap(),
            "20240602003005",
        );
    }

    #[tokio::test]
    async fn pushes_charge() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .and(bearer_token("token"))
            .and(body_partial_json(json!({
                "BusinessShortCode": "174379",
                "TransactionType": "CustomerPayBillOnline",
                "Amount": 1501,
                "PartyA": "254712345678",
                "PartyB": "174379",
                "PhoneNumber": "254712345678",
                "CallBackURL": "https://example.com/payments/mpesa/callback",
                "AccountReference": "Lake Naivash",
                "TransactionDesc": "Booking for L",
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_191220191020363925",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted",
                "CustomerMessage": "Success. Request accepted",
            })))
            .expect(2)
            .mount(&server)
            .await;

        let mpesa = mpesa(&server);
        for _ in 0..2 {
            let checkout_id = mpesa
                .execute(Initiate(charge("1500.40KES")))
                .await
                .unwrap();
            assert_eq!(
                AsRef::<str>::as_ref(&checkout_id),
                "ws_CO_191220191020363925",
            );
        }
    }

    #[tokio::test]
    async fn reports_rejected_charge() {
        let server = MockServer::start().await;
        mount_token(&server, 1).await;
        Mock::given(method("POST"))
            .and(path("/mpesa/stkpush/v1/processrequest"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "requestId": "16813-1590513-1",
                "errorCode": "400.002.02",
                "errorMessage": "Bad Request - Invalid PhoneNumber",
            })))
            .mount(&server)
            .await;

        let err = mpesa(&server)
            .execute(Initiate(charge("100KES")))
            .await
            .unwrap_err();
        assert!(
            matches!(
                err.as_ref(),
                gateway::Error::Mpesa(Error::Rejected { code, .. })
                    if code == "400.002.02",
            ),
            "unexpected error: {err}",
        );
    }

    #[tokio::test]
    async fn refuses_zero_amount() {
        let server = MockServer::start().await;
        mount_token(&server, 0).await;

        let err = mpesa(&server)
            .execute(Initiate(charge("0KES")))
            .await
            .unwrap_err();
        assert!(matches!(
            err.as_ref(),
            gateway::Error::Mpesa(Error::InvalidAmount(_)),
        ));
    }
}
