//! [`Config`]-related definitions.

use std::time;

use common::{Money, Percent};
use config::{builder::DefaultState, ConfigBuilder, ConfigError};
use secrecy::SecretString;
use serde::Deserialize;
use service::{domain::commission, task::expire_stale_payments};
use smart_default::SmartDefault;

/// Application configuration.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    pub server: Server,

    /// Service configuration.
    pub service: Service,

    /// M-Pesa gateway configuration.
    pub mpesa: Mpesa,

    /// Postgres configuration.
    pub postgres: Postgres,

    /// Log configuration.
    pub log: Log,
}

impl Config {
    /// Creates a new [`Config`] by:
    /// - loading it from the provided `path` (if any);
    /// - merging it with the environment variables (if any);
    /// - using default values for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        ConfigBuilder::<DefaultState>::default()
            .add_source(config::File::with_name(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix("CONF").separator("."))
            .build()?
            .try_deserialize()
    }
}

/// Server configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Server {
    /// Host to bind the server to.
    #[default("0.0.0.0".to_owned())]
    pub host: String,

    /// Port to bind the server to.
    #[default(8080)]
    pub port: u16,

    /// [CORS] configuration.
    ///
    /// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
    pub cors: Cors,
}

/// [CORS] configuration.
///
/// [CORS]: https://developer.mozilla.org/en-US/docs/Web/HTTP/CORS
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Cors {
    /// List of allowed origins.
    #[default(vec!["*".to_owned()])]
    pub origins: Vec<String>,
}

/// Service configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Service {
    /// Time an advisory availability snapshot is served from cache for.
    #[default(time::Duration::from_secs(30))]
    #[serde(with = "humantime_serde")]
    pub availability_cache_ttl: time::Duration,

    /// Commission policy of referred bookings.
    pub commission: Commission,

    /// Service tasks configuration.
    pub tasks: Tasks,
}

impl TryFrom<Service> for service::Config {
    type Error = ConfigError;

    fn try_from(value: Service) -> Result<Self, Self::Error> {
        let Service {
            availability_cache_ttl,
            commission,
            tasks: Tasks {
                expire_stale_payments,
            },
        } = value;

        Ok(Self {
            availability_cache_ttl,
            commission: commission.try_into()?,
            expire_stale_payments: expire_stale_payments::Config {
                interval: expire_stale_payments.interval,
                timeout: expire_stale_payments.timeout,
            },
        })
    }
}

/// Commission policy configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Commission {
    /// Kind of the policy.
    pub kind: CommissionKind,

    /// Fixed amount (like `200KES`) or share percentage (like `10`),
    /// depending on the [`CommissionKind`].
    #[default("10".to_owned())]
    pub value: String,
}

/// Kind of a commission policy.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommissionKind {
    /// Fixed amount per referred booking.
    Fixed,

    /// Share of the referred booking total.
    #[default]
    Percentage,
}

impl TryFrom<Commission> for commission::Policy {
    type Error = ConfigError;

    fn try_from(value: Commission) -> Result<Self, Self::Error> {
        let Commission { kind, value } = value;
        let invalid = |e: &str| {
            ConfigError::Message(format!(
                "invalid `service.commission.value` `{value}`: {e}",
            ))
        };

        Ok(match kind {
            CommissionKind::Fixed => {
                Self::Fixed(value.parse::<Money>().map_err(invalid)?)
            }
            CommissionKind::Percentage => {
                Self::Percentage(value.parse::<Percent>().map_err(invalid)?)
            }
        })
    }
}

/// Service tasks configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Tasks {
    /// `ExpireStalePayments` task configuration.
    pub expire_stale_payments: Task,
}

/// Service task configuration.
#[derive(Clone, Copy, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Task {
    /// Task execution interval.
    #[default(time::Duration::from_secs(60 * 60))]
    #[serde(with = "humantime_serde")]
    pub interval: time::Duration,

    /// Timeout after which the entities will be considered stale.
    #[default(time::Duration::from_secs(60 * 60 * 24))]
    #[serde(with = "humantime_serde")]
    pub timeout: time::Duration,
}

/// M-Pesa gateway configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Mpesa {
    /// Base URL of the Daraja API.
    #[default("https://sandbox.safaricom.co.ke".to_owned())]
    pub base_url: String,

    /// Consumer key of the Daraja application.
    #[default(SecretString::from(""))]
    pub consumer_key: SecretString,

    /// Consumer secret of the Daraja application.
    #[default(SecretString::from(""))]
    pub consumer_secret: SecretString,

    /// Business short code receiving the payments.
    #[default("174379".to_owned())]
    pub short_code: String,

    /// Pass key of the business short code.
    #[default(SecretString::from(""))]
    pub pass_key: SecretString,

    /// Public URL of the `POST /payments/mpesa/callback` endpoint.
    #[default("http://127.0.0.1:8080/payments/mpesa/callback".to_owned())]
    pub callback_url: String,
}

impl From<Mpesa> for service::infra::gateway::mpesa::Config {
    fn from(value: Mpesa) -> Self {
        let Mpesa {
            base_url,
            consumer_key,
            consumer_secret,
            short_code,
            pass_key,
            callback_url,
        } = value;

        Self {
            base_url,
            consumer_key,
            consumer_secret,
            short_code,
            pass_key,
            callback_url,
        }
    }
}

/// Postgres configuration.
#[derive(Clone, Debug, Deserialize, SmartDefault)]
#[serde(default)]
pub struct Postgres {
    /// Host to connect to.
    #[default("127.0.0.1".to_owned())]
    pub host: String,

    /// Port to connect to.
    #[default(5432)]
    pub port: u16,

    /// User to connect as.
    #[default("postgres".to_owned())]
    pub user: String,

    /// Password to connect with.
    #[default("postgres".to_owned())]
    pub password: String,

    /// Database name to connect to.
    #[default("postgres".to_owned())]
    pub dbname: String,
}

impl From<Postgres> for service::infra::postgres::Config {
    fn from(value: Postgres) -> Self {
        let Postgres {
            host,
            port,
            user,
            password,
            dbname,
        } = value;

        Self {
            host: Some(host),
            port: Some(port),
            user: Some(user),
            password: Some(password),
            dbname: Some(dbname),
            ..Self::default()
        }
    }
}

/// Log configuration.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Log {
    /// Log level.
    pub level: LogLevel,
}

/// Log level.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogLevel {
    /// Designates very low priority, often extremely verbose, information.
    Trace,

    /// Designates lower priority information.
    Debug,

    /// Designates useful information.
    #[default]
    Info,

    /// Designates hazardous situations.
    Warn,

    /// Designates very serious errors.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(value: LogLevel) -> Self {
        match value {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warn => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

#[cfg(test)]
mod spec {
    use service::domain::commission;

    use super::{Commission, CommissionKind, Config};

    #[test]
    fn defaults_to_ten_percent_commission() {
        let config = Config::default();
        let policy =
            commission::Policy::try_from(config.service.commission).unwrap();

        assert!(matches!(policy, commission::Policy::Percentage(_)));
        let stale = config.service.tasks.expire_stale_payments;
        assert_eq!(stale.timeout.as_secs(), 24 * 60 * 60);
    }

    #[test]
    fn parses_fixed_commission() {
        let policy = commission::Policy::try_from(Commission {
            kind: CommissionKind::Fixed,
            value: "200KES".to_owned(),
        })
        .unwrap();
        assert!(matches!(policy, commission::Policy::Fixed(_)));

        assert!(commission::Policy::try_from(Commission {
            kind: CommissionKind::Percentage,
            value: "150".to_owned(),
        })
        .is_err());
    }
}
