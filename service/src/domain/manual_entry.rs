//! [`ManualEntry`] definitions.

use common::{unit, Date, DateTimeOf};
use derive_more::{Display, From, FromStr, Into};
#[cfg(feature = "postgres")]
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{booking, item};
#[cfg(doc)]
use crate::domain::Booking;

/// Reservation entered by a host directly, bypassing payment.
///
/// Holds capacity exactly like a confirmed [`Booking`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManualEntry {
    /// ID of this [`ManualEntry`].
    pub id: Id,

    /// ID of the reserved [`item::Item`].
    pub item_id: item::Id,

    /// ID of the host who entered this [`ManualEntry`].
    pub host_id: item::HostId,

    /// [`booking::Status`] of this [`ManualEntry`].
    pub status: booking::Status,

    /// Number of capacity units held by this [`ManualEntry`].
    pub slots: u32,

    /// Visit [`Date`].
    pub visit_date: Date,

    /// Structured [`booking::Detail`] of this [`ManualEntry`].
    pub detail: booking::Detail,

    /// Contact of the guest, as noted by the host.
    pub guest: booking::Payer,

    /// [`DateTime`] when this [`ManualEntry`] was created.
    ///
    /// [`DateTime`]: common::DateTime
    pub created_at: CreationDateTime,
}

impl ManualEntry {
    /// Indicates whether this [`ManualEntry`] holds capacity.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.status == booking::Status::Confirmed
    }
}

/// ID of a [`ManualEntry`].
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

/// [`DateTime`] when a [`ManualEntry`] was created.
///
/// [`DateTime`]: common::DateTime
pub type CreationDateTime = DateTimeOf<(ManualEntry, unit::Creation)>;
