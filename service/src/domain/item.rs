//! [`Item`] definitions.

use std::num::NonZeroU32;

use common::{define_kind, money::Currency, Date, Money};
use derive_more::{Display, Error, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bookable listing of a host: a trip, an event, a hotel or an adventure
/// site.
///
/// Read-only to the reservation engine.
#[derive(Clone, Debug)]
pub struct Item {
    /// ID of this [`Item`].
    pub id: Id,

    /// ID of the host owning this [`Item`].
    pub host_id: HostId,

    /// [`Kind`] of this [`Item`].
    pub kind: Kind,

    /// [`Name`] of this [`Item`].
    pub name: Name,

    /// [`Currency`] all the prices of this [`Item`] are quoted in.
    pub currency: Currency,

    /// [`Entrance`] fee of this [`Item`].
    pub entrance: Entrance,

    /// [`Capacity`] of this [`Item`].
    pub capacity: Capacity,

    /// [`Activity`]s offered along with this [`Item`].
    pub activities: Vec<Activity>,

    /// [`Visit`] policy of this [`Item`].
    pub visit: Visit,
}

impl Item {
    /// Looks up the [`Facility`] with the provided [`FacilityName`].
    #[must_use]
    pub fn facility(&self, name: &FacilityName) -> Option<&Facility> {
        self.facilities().iter().find(|f| &f.name == name)
    }

    /// Returns [`Facility`]s of this [`Item`] (empty for slot-based ones).
    #[must_use]
    pub fn facilities(&self) -> &[Facility] {
        match &self.capacity {
            Capacity::Slots { .. } => &[],
            Capacity::Facilities { facilities } => facilities,
        }
    }

    /// Looks up the [`Activity`] with the provided [`ActivityName`].
    #[must_use]
    pub fn activity(&self, name: &ActivityName) -> Option<&Activity> {
        self.activities.iter().find(|a| &a.name == name)
    }
}

/// ID of an [`Item`].
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

/// ID of a host owning [`Item`]s.
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
pub struct HostId(Uuid);

impl HostId {
    /// Creates a new random [`HostId`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

define_kind! {
    #[doc = "Kind of an [`Item`]."]
    enum Kind {
        #[doc = "A guided trip."]
        Trip = 1,

        #[doc = "A one-off event."]
        Event = 2,

        #[doc = "A hotel."]
        Hotel = 3,

        #[doc = "An adventure site."]
        AdventureSite = 4,
    }
}

define_text! {
    #[doc = "Name of an [`Item`]."]
    Name(max = 256)
}

define_text! {
    #[doc = "Name of a [`Facility`], unique within its [`Item`]."]
    FacilityName(max = 128)
}

define_text! {
    #[doc = "Name of an [`Activity`], unique within its [`Item`]."]
    ActivityName(max = 128)
}

/// Entrance fee of an [`Item`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Entrance {
    /// Entrance is free regardless of the participants count.
    Free,

    /// Entrance is charged per participant.
    Paid {
        /// Price for an adult.
        adult: Money,

        /// Price for a child.
        child: Money,
    },
}

/// Capacity mode of an [`Item`].
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Capacity {
    /// Fixed number of participant slots per calendar date.
    Slots {
        /// Total number of slots per date.
        total: u32,
    },

    /// Individually rented [`Facility`]s, each booked for a date range.
    Facilities {
        /// [`Facility`]s available for rent.
        facilities: Vec<Facility>,
    },
}

/// Rentable facility of an [`Item`] (a cabin, a tent site, a conference
/// hall).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Facility {
    /// [`FacilityName`] of this [`Facility`].
    pub name: FacilityName,

    /// Price of renting this [`Facility`] for a single day.
    pub price_per_day: Money,

    /// Number of concurrent holders this [`Facility`] admits per day.
    ///
    /// [`None`] means a single holder.
    #[serde(default)]
    pub capacity: Option<NonZeroU32>,
}

impl Facility {
    /// Returns the number of reservations this [`Facility`] may hold on the
    /// same day.
    #[must_use]
    pub fn holders(&self) -> u32 {
        self.capacity.map_or(1, NonZeroU32::get)
    }
}

/// Optional add-on of an [`Item`], priced per participant.
///
/// Never affects capacity.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Activity {
    /// [`ActivityName`] of this [`Activity`].
    pub name: ActivityName,

    /// Price per participant.
    pub price: Money,
}

/// Visit date policy of an [`Item`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Visit {
    /// [`Item`] takes place on a single fixed [`Date`].
    Fixed {
        /// The only [`Date`] the [`Item`] can be visited.
        date: Date,
    },

    /// [`Item`] can be visited on any [`Date`] within the booking horizon.
    Flexible {
        /// Number of days ahead of today reservations are accepted for.
        horizon_days: u16,
    },
}

impl Visit {
    /// Default booking horizon of flexible [`Item`]s.
    pub const DEFAULT_HORIZON_DAYS: u16 = 30;

    /// Checks whether a visit starting on the `first` and ending on the
    /// `last` [`Date`] complies with this [`Visit`] policy.
    ///
    /// # Errors
    ///
    /// With a [`DateOutOfPolicy`] describing the violated rule.
    pub fn check(
        &self,
        first: Date,
        last: Date,
        today: Date,
    ) -> Result<(), DateOutOfPolicy> {
        if first < today {
            return Err(DateOutOfPolicy::Past { date: first });
        }
        match *self {
            Self::Fixed { date } => {
                if first != date {
                    return Err(DateOutOfPolicy::NotVisitDate {
                        date: first,
                        visit: date,
                    });
                }
            }
            Self::Flexible { horizon_days } => {
                let horizon = today
                    .add_days(i64::from(horizon_days))
                    .unwrap_or(today);
                if last > horizon {
                    return Err(DateOutOfPolicy::BeyondHorizon {
                        date: last,
                        horizon,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Requested [`Date`] violates the [`Visit`] policy of an [`Item`].
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
pub enum DateOutOfPolicy {
    /// [`Date`] is in the past.
    #[display("`{date}` is in the past")]
    Past {
        /// Requested [`Date`].
        date: Date,
    },

    /// [`Date`] is beyond the booking horizon.
    #[display("`{date}` is beyond the booking horizon ending on `{horizon}`")]
    BeyondHorizon {
        /// Requested [`Date`].
        date: Date,

        /// Last bookable [`Date`].
        horizon: Date,
    },

    /// [`Date`] differs from the fixed visit [`Date`].
    #[display("`{date}` is not the visit date `{visit}`")]
    NotVisitDate {
        /// Requested [`Date`].
        date: Date,

        /// The only bookable [`Date`].
        visit: Date,
    },
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::Date;

    use super::{DateOutOfPolicy, Visit};

    fn date(s: &str) -> Date {
        Date::from_str(s).unwrap()
    }

    #[test]
    fn flexible_visit_respects_horizon() {
        let today = date("2024-06-01");
        let visit = Visit::Flexible {
            horizon_days: Visit::DEFAULT_HORIZON_DAYS,
        };

        assert!(visit.check(today, today, today).is_ok());
        assert!(visit
            .check(date("2024-07-01"), date("2024-07-01"), today)
            .is_ok());
        assert_eq!(
            visit.check(date("2024-06-20"), date("2024-07-02"), today),
            Err(DateOutOfPolicy::BeyondHorizon {
                date: date("2024-07-02"),
                horizon: date("2024-07-01"),
            }),
        );
        assert_eq!(
            visit.check(date("2024-05-31"), today, today),
            Err(DateOutOfPolicy::Past {
                date: date("2024-05-31"),
            }),
        );
    }

    #[test]
    fn fixed_visit_admits_only_its_date() {
        let today = date("2024-06-01");
        let visit = Visit::Fixed {
            date: date("2024-06-15"),
        };

        assert!(visit
            .check(date("2024-06-15"), date("2024-06-15"), today)
            .is_ok());
        assert_eq!(
            visit.check(date("2024-06-14"), date("2024-06-14"), today),
            Err(DateOutOfPolicy::NotVisitDate {
                date: date("2024-06-14"),
                visit: date("2024-06-15"),
            }),
        );
    }
}
