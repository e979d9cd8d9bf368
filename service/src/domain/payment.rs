//! [`Payment`] definitions.

use std::sync::LazyLock;

#[cfg(doc)]
use common::DateTime;
use common::{define_kind, unit, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[cfg(doc)]
use crate::domain::Booking;
use crate::domain::{booking, item};

/// Record of an external mobile-money charge backing a paid reservation.
///
/// Carries the would-be [`Booking`] as a [`booking::Draft`], so the
/// [`Booking`] is materialized only once the charge is confirmed.
#[derive(Clone, Debug)]
pub struct Payment {
    /// ID of this [`Payment`].
    pub id: Id,

    /// ID of the [`item::Item`] being reserved.
    pub item_id: item::Id,

    /// [`CheckoutId`] of the latest external charge, if it was accepted.
    pub checkout_id: Option<CheckoutId>,

    /// [`Phone`] the charge is pushed to.
    pub phone: Phone,

    /// Charged amount.
    pub amount: Money,

    /// [`Status`] of this [`Payment`].
    pub status: Status,

    /// [`ResultCode`] reported by the payment gateway, if any.
    pub result_code: Option<ResultCode>,

    /// Human-readable result reported by the payment gateway, if any.
    pub result_description: Option<String>,

    /// Reservation to be materialized once this [`Payment`] completes.
    pub reservation: booking::Draft,

    /// ID of the [`Booking`] materialized from this [`Payment`], if any.
    pub booking_id: Option<booking::Id>,

    /// Number of times the external charge was initiated.
    pub attempts: u16,

    /// [`DateTime`] when this [`Payment`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Payment`] was last updated.
    pub updated_at: UpdateDateTime,
}

impl Payment {
    /// Description recorded on [`Payment`]s expired while pending.
    pub const EXPIRED: &'static str = "expired";

    /// Returns the [`DeclineReason`] of this [`Payment`], if it has failed.
    #[must_use]
    pub fn decline_reason(&self) -> Option<DeclineReason> {
        if self.status != Status::Failed {
            return None;
        }
        if self.is_expired() {
            return Some(DeclineReason::Expired);
        }
        Some(
            self.result_code
                .map_or(DeclineReason::InvalidRequest, ResultCode::decline),
        )
    }

    /// Indicates whether this [`Payment`] was expired while pending.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.status == Status::Failed
            && self.result_code.is_none()
            && self.result_description.as_deref() == Some(Self::EXPIRED)
    }
}

/// ID of a [`Payment`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    From,
    FromStr,
    Hash,
    Into,
    PartialEq,
    Serialize,
)]
#[cfg_attr(feature = "postgres", derive(ToSql, FromSql), postgres(transparent))]
pub struct Id(Uuid);

impl Id {
    /// Creates a new random [`Id`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

/// Reference of an external charge session, issued by the payment gateway.
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(transparent)]
pub struct CheckoutId(String);

impl CheckoutId {
    /// Creates a new [`CheckoutId`] if the given `id` is not blank.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        (!id.trim().is_empty()).then_some(Self(id))
    }
}

/// Mobile-money phone number in `2547XXXXXXXX` or `2541XXXXXXXX` format.
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    /// Normalizes the given `number` into a [`Phone`].
    ///
    /// Accepts local (`0712345678`), short (`712345678`) and international
    /// (`+254712345678`) notations, with optional spaces and dashes.
    #[must_use]
    pub fn new(number: impl AsRef<str>) -> Option<Self> {
        /// Regular expression checking normalized [`Phone`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^254[17]\d{8}$").expect("valid regex")
        });

        let digits = number
            .as_ref()
            .trim()
            .trim_start_matches('+')
            .chars()
            .filter(|c| !matches!(c, ' ' | '-'))
            .collect::<String>();
        let normalized = if let Some(local) = digits.strip_prefix('0') {
            format!("254{local}")
        } else if digits.len() == 9 {
            format!("254{digits}")
        } else {
            digits
        };

        REGEX.is_match(&normalized).then_some(Self(normalized))
    }
}

impl FromStr for Phone {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Phone`")
    }
}

define_kind! {
    #[doc = "Status of a [`Payment`]."]
    enum Status {
        #[doc = "Charge is initiated, but not confirmed yet."]
        Pending = 1,

        #[doc = "Charge is confirmed by the payer."]
        Completed = 2,

        #[doc = "Charge is declined, failed or expired."]
        Failed = 3,
    }
}

/// Result code reported by the payment gateway for a charge.
#[derive(Clone, Copy, Debug, Display, Eq, From, Hash, Into, PartialEq)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
pub struct ResultCode(i32);

impl ResultCode {
    /// Charge succeeded.
    pub const SUCCESS: Self = Self(0);

    /// Payer has insufficient funds.
    pub const INSUFFICIENT_FUNDS: Self = Self(1);

    /// Payer's device was unreachable or busy with another request.
    pub const SUBSCRIBER_BUSY: Self = Self(1001);

    /// Payer cancelled the charge.
    pub const CANCELLED_BY_USER: Self = Self(1032);

    /// Payer didn't respond on the device in time.
    pub const DEVICE_TIMEOUT: Self = Self(1037);

    /// Payer entered a wrong PIN.
    pub const WRONG_PIN: Self = Self(2001);

    /// Indicates whether this [`ResultCode`] reports a successful charge.
    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    /// Maps this [`ResultCode`] to the [`DeclineReason`] shown to a payer.
    ///
    /// Unrecognized codes (including [`ResultCode::SUCCESS`]) map to
    /// [`DeclineReason::InvalidRequest`].
    #[must_use]
    pub fn decline(self) -> DeclineReason {
        match self {
            Self::INSUFFICIENT_FUNDS => DeclineReason::InsufficientFunds,
            Self::WRONG_PIN => DeclineReason::WrongPin,
            Self::CANCELLED_BY_USER => DeclineReason::CancelledByUser,
            Self::DEVICE_TIMEOUT => DeclineReason::DeviceTimeout,
            Self::SUBSCRIBER_BUSY => DeclineReason::SubscriberBusy,
            _ => DeclineReason::InvalidRequest,
        }
    }
}

/// Reason of a declined [`Payment`].
#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
pub enum DeclineReason {
    /// Payer has insufficient funds.
    #[display("insufficient funds")]
    InsufficientFunds,

    /// Payer entered a wrong PIN.
    #[display("wrong PIN")]
    WrongPin,

    /// Payer cancelled the charge.
    #[display("cancelled by user")]
    CancelledByUser,

    /// Payer didn't respond on the device in time.
    #[display("timeout at the payer's device")]
    DeviceTimeout,

    /// Payer's device was busy with another request.
    #[display("subscriber busy")]
    SubscriberBusy,

    /// Charge request was rejected by the payment gateway.
    #[display("invalid request")]
    InvalidRequest,

    /// [`Payment`] stayed pending for too long and was expired.
    #[display("payment expired")]
    Expired,
}

/// Terminal resolution of a charge reported by the payment gateway.
#[derive(Clone, Debug)]
pub struct Resolution {
    /// [`CheckoutId`] of the resolved charge.
    pub checkout_id: CheckoutId,

    /// [`ResultCode`] of the charge.
    pub result_code: ResultCode,

    /// Human-readable result of the charge.
    pub result_description: String,

    /// [`DateTime`] of the resolution.
    pub resolved_at: UpdateDateTime,
}

impl Resolution {
    /// Returns the [`Status`] the resolved [`Payment`] transitions to.
    #[must_use]
    pub fn status(&self) -> Status {
        if self.result_code.is_success() {
            Status::Completed
        } else {
            Status::Failed
        }
    }
}

/// Expiration of [`Payment`]s left pending for too long.
#[derive(Clone, Copy, Debug)]
pub struct Expiration {
    /// [`Payment`]s created before this [`DateTime`] are expired.
    pub created_before: CreationDateTime,

    /// [`DateTime`] of the expiration.
    pub expired_at: UpdateDateTime,
}

/// [`DateTime`] when a [`Payment`] was created.
pub type CreationDateTime = DateTimeOf<(Payment, unit::Creation)>;

/// [`DateTime`] when a [`Payment`] was last updated.
pub type UpdateDateTime = DateTimeOf<(Payment, unit::Update)>;

#[cfg(test)]
mod spec {
    use super::{DeclineReason, Phone, ResultCode};

    #[test]
    fn normalizes_phone() {
        for input in [
            "0712345678",
            "712345678",
            "254712345678",
            "+254712345678",
            "+254 712 345 678",
            "0712-345-678",
        ] {
            assert_eq!(
                Phone::new(input).map(|p| p.to_string()).as_deref(),
                Some("254712345678"),
                "input: {input}",
            );
        }
        assert_eq!(
            Phone::new("0110123456").map(|p| p.to_string()).as_deref(),
            Some("254110123456"),
        );

        assert!(Phone::new("0812345678").is_none());
        assert!(Phone::new("25471234567").is_none());
        assert!(Phone::new("phone").is_none());
        assert!(Phone::new("").is_none());
    }

    #[test]
    fn maps_result_codes() {
        assert!(ResultCode::from(0).is_success());
        assert!(!ResultCode::from(1032).is_success());

        assert_eq!(
            ResultCode::from(1).decline(),
            DeclineReason::InsufficientFunds,
        );
        assert_eq!(ResultCode::from(2001).decline(), DeclineReason::WrongPin);
        assert_eq!(
            ResultCode::from(1032).decline(),
            DeclineReason::CancelledByUser,
        );
        assert_eq!(
            ResultCode::from(1037).decline(),
            DeclineReason::DeviceTimeout,
        );
        assert_eq!(
            ResultCode::from(1001).decline(),
            DeclineReason::SubscriberBusy,
        );
        assert_eq!(
            ResultCode::from(9999).decline(),
            DeclineReason::InvalidRequest,
        );

        assert_eq!(
            DeclineReason::CancelledByUser.to_string(),
            "cancelled by user",
        );
    }
}
