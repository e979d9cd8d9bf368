//! [`Booking`] definitions.

pub mod request;

use std::sync::LazyLock;

use common::{define_kind, unit, Date, DateRange, DateTime, DateTimeOf, Money};
use derive_more::{AsRef, Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{item, payment, referral};

pub use self::request::{Request, Reservation, ValidationError};

/// Confirmed reservation of an [`item::Item`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Booking {
    /// ID of this [`Booking`].
    pub id: Id,

    /// ID of the reserved [`item::Item`].
    pub item_id: item::Id,

    /// [`Status`] of this [`Booking`].
    pub status: Status,

    /// [`PaymentStatus`] of this [`Booking`].
    pub payment_status: PaymentStatus,

    /// Number of capacity units held by this [`Booking`].
    pub slots: u32,

    /// Visit [`Date`] (the earliest [`Facility`] start for facility-based
    /// bookings).
    ///
    /// [`Facility`]: item::Facility
    pub visit_date: Date,

    /// Structured [`Detail`] of this [`Booking`].
    pub detail: Detail,

    /// [`Payer`] of this [`Booking`].
    pub payer: Payer,

    /// Total amount of this [`Booking`].
    pub total: Money,

    /// Referral [`referral::Code`] this [`Booking`] was made through, if any.
    pub referral: Option<referral::Code>,

    /// ID of the [`Payment`] this [`Booking`] was paid with, if any.
    ///
    /// [`Payment`]: crate::domain::Payment
    pub payment_id: Option<payment::Id>,

    /// [`DateTime`] when this [`Booking`] was created.
    pub created_at: CreationDateTime,

    /// [`DateTime`] when this [`Booking`] was last updated.
    pub updated_at: UpdateDateTime,
}

impl Booking {
    /// Materializes a confirmed and completed [`Booking`] out of the provided
    /// [`Draft`].
    #[must_use]
    pub fn confirm(draft: Draft, payment_id: Option<payment::Id>) -> Self {
        let Draft {
            item_id,
            visit_date,
            slots,
            detail,
            payer,
            total,
            referral,
        } = draft;
        let now = DateTime::now();

        Self {
            id: Id::new(),
            item_id,
            status: Status::Confirmed,
            payment_status: PaymentStatus::Completed,
            slots,
            visit_date,
            detail,
            payer,
            total,
            referral,
            payment_id,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        }
    }

    /// Indicates whether this [`Booking`] holds capacity.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == Status::Confirmed
    }
}

/// ID of a [`Booking`].
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

define_kind! {
    #[doc = "Lifecycle status of a [`Booking`]."]
    enum Status {
        #[doc = "Holds capacity."]
        Confirmed = 1,

        #[doc = "Released its capacity."]
        Cancelled = 2,
    }
}

define_kind! {
    #[doc = "Payment status of a [`Booking`]."]
    enum PaymentStatus {
        #[doc = "Payment is awaited."]
        Pending = 1,

        #[doc = "Paid (or free)."]
        Completed = 2,

        #[doc = "Payment failed."]
        Failed = 3,

        #[doc = "Payment was cancelled."]
        Cancelled = 4,
    }
}

/// Structured detail of a reservation.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Detail {
    /// Reservation of participant slots on a single date.
    Slot {
        /// Number of adults.
        adults: u32,

        /// Number of children.
        children: u32,

        /// Selected [`item::Activity`]s.
        #[serde(default)]
        activities: Vec<ActivitySelection>,
    },

    /// Reservation of [`item::Facility`]s for date ranges.
    Facility {
        /// Selected [`item::Facility`]s.
        facilities: Vec<FacilitySelection>,

        /// Selected [`item::Activity`]s.
        #[serde(default)]
        activities: Vec<ActivitySelection>,
    },
}

impl Detail {
    /// Returns the number of capacity units this [`Detail`] holds: the
    /// participants for a slot reservation or the rented facilities count.
    #[must_use]
    pub fn units(&self) -> u32 {
        match self {
            Self::Slot {
                adults, children, ..
            } => adults.saturating_add(*children),
            Self::Facility { facilities, .. } => {
                u32::try_from(facilities.len()).unwrap_or(u32::MAX)
            }
        }
    }

    /// Returns [`FacilitySelection`]s of this [`Detail`].
    #[must_use]
    pub fn facilities(&self) -> &[FacilitySelection] {
        match self {
            Self::Slot { .. } => &[],
            Self::Facility { facilities, .. } => facilities,
        }
    }

    /// Returns [`ActivitySelection`]s of this [`Detail`].
    #[must_use]
    pub fn activities(&self) -> &[ActivitySelection] {
        match self {
            Self::Slot { activities, .. }
            | Self::Facility { activities, .. } => activities,
        }
    }
}

/// [`item::Facility`] rented for a [`DateRange`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FacilitySelection {
    /// Name of the rented [`item::Facility`].
    pub name: item::FacilityName,

    /// [`DateRange`] of the rent.
    pub range: DateRange,
}

/// [`item::Activity`] selected for a number of participants.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ActivitySelection {
    /// Name of the selected [`item::Activity`].
    pub name: item::ActivityName,

    /// Number of participants.
    pub participants: u32,
}

/// Payer of a reservation: a registered user or a guest.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Payer {
    /// ID of the registered user, if any.
    #[serde(default)]
    pub user_id: Option<UserId>,

    /// [`GuestName`] of the payer.
    #[serde(default)]
    pub name: Option<GuestName>,

    /// [`Email`] of the payer.
    #[serde(default)]
    pub email: Option<Email>,

    /// [`payment::Phone`] of the payer.
    #[serde(default)]
    pub phone: Option<payment::Phone>,
}

/// ID of a registered user.
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
pub struct UserId(Uuid);

define_text! {
    #[doc = "Name of a guest payer."]
    GuestName(max = 256)
}

/// Email address of a payer.
#[derive(
    AsRef, Clone, Debug, Deserialize, Display, Eq, Hash, PartialEq, Serialize,
)]
#[as_ref(str, String)]
#[cfg_attr(feature = "postgres", derive(FromSql, ToSql), postgres(transparent))]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Creates a new [`Email`] if the given `address` is valid.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Option<Self> {
        let address = address.into();
        Self::check(&address).then_some(Self(address))
    }

    /// Checks whether the given `address` is a valid [`Email`].
    fn check(address: impl AsRef<str>) -> bool {
        /// Regular expression checking [`Email`] format.
        static REGEX: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex")
        });

        let address = address.as_ref();
        address.len() <= 320 && REGEX.is_match(address)
    }
}

impl FromStr for Email {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s).ok_or("invalid `Email`")
    }
}

/// Would-be [`Booking`] stored along with a pending [`Payment`] until the
/// charge is confirmed.
///
/// [`Payment`]: crate::domain::Payment
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Draft {
    /// ID of the reserved [`item::Item`].
    pub item_id: item::Id,

    /// Visit [`Date`].
    pub visit_date: Date,

    /// Number of capacity units to hold.
    pub slots: u32,

    /// Structured [`Detail`].
    pub detail: Detail,

    /// [`Payer`].
    pub payer: Payer,

    /// Total amount.
    pub total: Money,

    /// Referral [`referral::Code`], if any.
    pub referral: Option<referral::Code>,
}

/// [`DateTime`] when a [`Booking`] was created.
pub type CreationDateTime = DateTimeOf<(Booking, unit::Creation)>;

/// [`DateTime`] when a [`Booking`] was last updated.
pub type UpdateDateTime = DateTimeOf<(Booking, unit::Update)>;

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{Date, DateRange};

    use crate::domain::item::FacilityName;

    use super::{Detail, Email, FacilitySelection};

    #[test]
    fn detail_is_tagged() {
        let detail = Detail::Facility {
            facilities: vec![FacilitySelection {
                name: FacilityName::new("Cabin A").unwrap(),
                range: DateRange::new(
                    Date::from_str("2024-06-01").unwrap(),
                    Date::from_str("2024-06-05").unwrap(),
                )
                .unwrap(),
            }],
            activities: vec![],
        };

        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["kind"], "facility");
        assert_eq!(json["facilities"][0]["name"], "Cabin A");
        assert_eq!(json["facilities"][0]["range"]["start"], "2024-06-01");

        let slot: Detail = serde_json::from_str(
            r#"{"kind":"slot","adults":2,"children":1}"#,
        )
        .unwrap();
        assert_eq!(slot.units(), 3);
        assert!(slot.activities().is_empty());
        assert!(slot.facilities().is_empty());
        assert_eq!(detail.units(), 1);
    }

    #[test]
    fn validates_email() {
        assert!(Email::new("guest@example.com").is_some());
        assert!(Email::new("guest@example").is_none());
        assert!(Email::new("guest example@mail.com").is_none());
        assert!(Email::new("").is_none());
    }
}
