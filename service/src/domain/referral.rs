//! Referral definitions.

use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

define_text! {
    #[doc = "Opaque referral tracking code a reservation was made through."]
    Code(max = 64)
}

/// Owner of a referral [`Code`], earning commissions on referred bookings.
#[derive(Clone, Debug)]
pub struct Referrer {
    /// ID of this [`Referrer`].
    pub id: ReferrerId,

    /// Referral [`Code`] of this [`Referrer`].
    pub code: Code,
}

/// ID of a [`Referrer`].
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
pub struct ReferrerId(Uuid);

impl ReferrerId {
    /// Creates a new random [`ReferrerId`].
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}
