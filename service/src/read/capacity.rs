//! Capacity ledger of slot-based [`Item`]s.

use common::Date;
use derive_more::{Display, Error, From, Into};

use crate::domain::{item, Booking, ManualEntry};
#[cfg(doc)]
use crate::domain::Item;

/// Number of capacity units held on a single [`Date`] of an [`Item`] by
/// confirmed [`Booking`]s and confirmed [`ManualEntry`]s together.
#[derive(Clone, Copy, Debug, Default, Eq, From, Into, PartialEq)]
pub struct BookedSlots(pub u32);

impl BookedSlots {
    /// Tallies the units held on the provided [`Date`] of the [`Item`] by the
    /// given records.
    ///
    /// Each record counts once, cancelled ones don't count at all.
    #[must_use]
    pub fn tally<'a>(
        item_id: item::Id,
        date: Date,
        bookings: impl IntoIterator<Item = &'a Booking>,
        entries: impl IntoIterator<Item = &'a ManualEntry>,
    ) -> Self {
        let booked = bookings
            .into_iter()
            .filter(|b| {
                b.item_id == item_id && b.visit_date == date && b.is_confirmed()
            })
            .map(|b| u64::from(b.slots));
        let entered = entries
            .into_iter()
            .filter(|e| {
                e.item_id == item_id && e.visit_date == date && e.is_confirmed()
            })
            .map(|e| u64::from(e.slots));

        let total = booked.chain(entered).sum::<u64>();
        Self(u32::try_from(total).unwrap_or(u32::MAX))
    }
}

/// Slot availability of an [`Item`] on a single [`Date`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotAvailability {
    /// Total slots of the [`Item`] per [`Date`].
    pub total: u32,

    /// [`BookedSlots`] on the [`Date`].
    pub booked: BookedSlots,
}

impl SlotAvailability {
    /// Returns the number of slots still free.
    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.booked.0)
    }

    /// Checks whether the `requested` number of slots fits.
    ///
    /// # Errors
    ///
    /// If fewer slots than `requested` remain.
    pub fn admit(&self, requested: u32) -> Result<(), InsufficientCapacity> {
        let remaining = self.remaining();
        if requested > remaining {
            return Err(InsufficientCapacity {
                requested,
                remaining,
            });
        }
        Ok(())
    }
}

/// Not enough slots remain for a reservation.
#[derive(Clone, Copy, Debug, Display, Error, Eq, PartialEq)]
#[display("requested {requested} slot(s), but only {remaining} remain")]
pub struct InsufficientCapacity {
    /// Requested slots.
    pub requested: u32,

    /// Remaining slots.
    pub remaining: u32,
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{Date, DateTime, Money};

    use crate::domain::{
        booking::{self, Detail, Payer},
        item, manual_entry, Booking, ManualEntry,
    };

    use super::{BookedSlots, InsufficientCapacity, SlotAvailability};

    fn date(s: &str) -> Date {
        Date::from_str(s).unwrap()
    }

    fn detail(adults: u32) -> Detail {
        Detail::Slot {
            adults,
            children: 0,
            activities: vec![],
        }
    }

    fn booking(item_id: item::Id, on: &str, slots: u32) -> Booking {
        Booking::confirm(
            booking::Draft {
                item_id,
                visit_date: date(on),
                slots,
                detail: detail(slots),
                payer: Payer::default(),
                total: Money::from_str("0KES").unwrap(),
                referral: None,
            },
            None,
        )
    }

    fn entry(item_id: item::Id, on: &str, slots: u32) -> ManualEntry {
        ManualEntry {
            id: manual_entry::Id::new(),
            item_id,
            host_id: item::HostId::new(),
            status: booking::Status::Confirmed,
            slots,
            visit_date: date(on),
            detail: detail(slots),
            guest: Payer::default(),
            created_at: DateTime::now().coerce(),
        }
    }

    #[test]
    fn tallies_bookings_and_manual_entries_once() {
        let id = item::Id::new();
        let other = item::Id::new();

        let mut cancelled = booking(id, "2024-06-01", 7);
        cancelled.status = booking::Status::Cancelled;
        let bookings = [
            booking(id, "2024-06-01", 2),
            booking(id, "2024-06-02", 5),
            booking(other, "2024-06-01", 5),
            cancelled,
        ];
        let entries = [entry(id, "2024-06-01", 3)];

        assert_eq!(
            BookedSlots::tally(id, date("2024-06-01"), &bookings, &entries),
            BookedSlots(5),
        );
        assert_eq!(
            BookedSlots::tally(id, date("2024-06-03"), &bookings, &entries),
            BookedSlots(0),
        );
    }

    #[test]
    fn admits_up_to_remaining() {
        let availability = SlotAvailability {
            total: 10,
            booked: BookedSlots(7),
        };
        assert_eq!(availability.remaining(), 3);
        assert!(availability.admit(3).is_ok());
        assert_eq!(
            availability.admit(4),
            Err(InsufficientCapacity {
                requested: 4,
                remaining: 3,
            }),
        );

        let overbooked = SlotAvailability {
            total: 2,
            booked: BookedSlots(5),
        };
        assert_eq!(overbooked.remaining(), 0);
        assert!(overbooked.admit(1).is_err());
    }
}
