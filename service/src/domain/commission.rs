//! [`Commission`] definitions.

#[cfg(doc)]
use common::DateTime;
use common::{unit, DateTimeOf, Money, Percent};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{booking, referral};
#[cfg(doc)]
use crate::domain::Booking;

/// Commission earned by a [`referral::Referrer`] on a referred [`Booking`].
///
/// At most one [`Commission`] exists per [`Booking`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Commission {
    /// ID of this [`Commission`].
    pub id: Id,

    /// ID of the [`referral::Referrer`] earning this [`Commission`].
    pub referrer_id: referral::ReferrerId,

    /// [`referral::Code`] the [`Booking`] was made through.
    pub code: referral::Code,

    /// ID of the [`Booking`] this [`Commission`] is earned on.
    pub booking_id: booking::Id,

    /// Earned amount.
    pub amount: Money,

    /// [`DateTime`] when this [`Commission`] was awarded.
    pub created_at: CreationDateTime,
}

/// ID of a [`Commission`].
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

/// Policy computing a [`Commission`] amount out of a [`Booking`] total.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Policy {
    /// Fixed amount per referred [`Booking`].
    Fixed(Money),

    /// Share of the referred [`Booking`] total.
    Percentage(Percent),
}

impl Policy {
    /// Computes the [`Commission`] amount for the provided [`Booking`]
    /// `total`.
    ///
    /// A free [`Booking`] earns nothing.
    #[must_use]
    pub fn apply(&self, total: Money) -> Money {
        if total.is_zero() {
            return Money::zero(total.currency);
        }
        match *self {
            Self::Fixed(amount) => amount,
            Self::Percentage(share) => share.of(total),
        }
    }
}

/// [`DateTime`] when a [`Commission`] was awarded.
pub type CreationDateTime = DateTimeOf<(Commission, unit::Creation)>;

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{Money, Percent};

    use super::Policy;

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    #[test]
    fn applies_policy() {
        let fixed = Policy::Fixed(money("200KES"));
        assert_eq!(fixed.apply(money("5000KES")), money("200KES"));
        assert!(fixed.apply(money("0KES")).is_zero());

        let share = Policy::Percentage(Percent::from_str("5").unwrap());
        assert_eq!(share.apply(money("5000KES")), money("250KES"));
        assert_eq!(share.apply(money("999KES")), money("49.95KES"));
        assert!(share.apply(money("0KES")).is_zero());
    }
}
