//! Overlap detector of facility-based [`Item`]s.

use std::fmt;

use common::DateRange;
use derive_more::{Display, Error, From};

use crate::domain::{booking, item, manual_entry, Booking, ManualEntry};
#[cfg(doc)]
use crate::domain::Item;

/// Record holding a [`item::Facility`].
#[derive(Clone, Copy, Debug, Display, Eq, From, Hash, PartialEq)]
pub enum Source {
    /// Self-service [`Booking`].
    #[display("booking `{_0}`")]
    Booking(booking::Id),

    /// Host-entered [`ManualEntry`].
    #[display("manual entry `{_0}`")]
    ManualEntry(manual_entry::Id),
}

/// Single [`item::Facility`] selection of a confirmed record.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Hold {
    /// Name of the held [`item::Facility`].
    pub facility: item::FacilityName,

    /// Held [`DateRange`].
    pub range: DateRange,

    /// [`Source`] record of this [`Hold`].
    pub source: Source,
}

/// All the [`Hold`]s of a single [`Item`].
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Holds(Vec<Hold>);

impl Holds {
    /// Collects [`Hold`]s of the provided confirmed records.
    ///
    /// A record selecting several facilities yields a [`Hold`] per selection.
    #[must_use]
    pub fn collect<'a>(
        bookings: impl IntoIterator<Item = &'a Booking>,
        entries: impl IntoIterator<Item = &'a ManualEntry>,
    ) -> Self {
        let booked = bookings
            .into_iter()
            .filter(|b| b.is_confirmed())
            .map(|b| (Source::Booking(b.id), &b.detail));
        let entered = entries
            .into_iter()
            .filter(|e| e.is_confirmed())
            .map(|e| (Source::ManualEntry(e.id), &e.detail));

        let mut holds = Self::default();
        for (source, detail) in booked.chain(entered) {
            holds.add(source, detail);
        }
        holds
    }

    /// Adds [`Hold`]s of a confirmed record with the provided
    /// [`booking::Detail`].
    pub fn add(&mut self, source: Source, detail: &booking::Detail) {
        self.0.extend(detail.facilities().iter().map(|sel| Hold {
            facility: sel.name.clone(),
            range: sel.range,
            source,
        }));
    }

    /// Returns the collected [`Hold`]s.
    #[must_use]
    pub fn as_slice(&self) -> &[Hold] {
        &self.0
    }

    /// Detects whether the `requested` [`DateRange`] of the provided
    /// [`item::Facility`] conflicts with the existing [`Hold`]s.
    ///
    /// A day is taken once the number of [`Hold`]s covering it reaches
    /// [`item::Facility::holders()`].
    #[must_use]
    pub fn conflict(
        &self,
        facility: &item::Facility,
        requested: DateRange,
    ) -> Option<Conflict> {
        let holders = facility.holders();
        let overlapping = self
            .0
            .iter()
            .filter(|h| h.facility == facility.name)
            .filter(|h| h.range.overlaps(&requested))
            .collect::<Vec<_>>();
        if overlapping.is_empty() {
            return None;
        }

        requested.days().find_map(|day| {
            let mut covering =
                overlapping.iter().filter(|h| h.range.contains(day));
            let first = covering.next()?;
            let count = 1 + covering.count();
            (u32::try_from(count).unwrap_or(u32::MAX) >= holders).then(|| {
                Conflict {
                    facility: facility.name.clone(),
                    requested,
                    existing: first.range,
                    source: first.source,
                }
            })
        })
    }
}

impl FromIterator<Hold> for Holds {
    fn from_iter<T: IntoIterator<Item = Hold>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Requested [`DateRange`] of an [`item::Facility`] is already taken.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub struct Conflict {
    /// Name of the requested [`item::Facility`].
    pub facility: item::FacilityName,

    /// Requested [`DateRange`].
    pub requested: DateRange,

    /// [`DateRange`] of the conflicting [`Hold`].
    pub existing: DateRange,

    /// [`Source`] of the conflicting [`Hold`].
    #[error(not(source))]
    pub source: Source,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Self {
            facility,
            requested,
            existing,
            source,
        } = self;
        write!(
            f,
            "`{facility}` is not available for {requested}: already held \
             for {existing} by {source}",
        )
    }
}

#[cfg(test)]
mod spec {
    use std::{num::NonZeroU32, str::FromStr as _};

    use common::{Date, DateRange, DateTime, Money};

    use crate::domain::{
        booking::{self, Detail, FacilitySelection, Payer},
        item::{self, Facility, FacilityName},
        manual_entry, Booking, ManualEntry,
    };

    use super::{Holds, Source};

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(
            Date::from_str(start).unwrap(),
            Date::from_str(end).unwrap(),
        )
        .unwrap()
    }

    fn facility(name: &str, capacity: Option<u32>) -> Facility {
        Facility {
            name: FacilityName::new(name).unwrap(),
            price_per_day: Money::from_str("3000KES").unwrap(),
            capacity: capacity.and_then(NonZeroU32::new),
        }
    }

    fn detail(selections: &[(&str, DateRange)]) -> Detail {
        Detail::Facility {
            facilities: selections
                .iter()
                .map(|(name, range)| FacilitySelection {
                    name: FacilityName::new(*name).unwrap(),
                    range: *range,
                })
                .collect(),
            activities: vec![],
        }
    }

    fn booking(item_id: item::Id, detail: Detail) -> Booking {
        let visit_date = detail.facilities()[0].range.start();
        Booking::confirm(
            booking::Draft {
                item_id,
                visit_date,
                slots: detail.units(),
                detail,
                payer: Payer::default(),
                total: Money::from_str("12000KES").unwrap(),
                referral: None,
            },
            None,
        )
    }

    fn entry(item_id: item::Id, detail: Detail) -> ManualEntry {
        ManualEntry {
            id: manual_entry::Id::new(),
            item_id,
            host_id: item::HostId::new(),
            status: booking::Status::Confirmed,
            slots: detail.units(),
            visit_date: detail.facilities()[0].range.start(),
            detail,
            guest: Payer::default(),
            created_at: DateTime::now().coerce(),
        }
    }

    #[test]
    fn detects_cabin_conflict() {
        let id = item::Id::new();
        let cabin = facility("Cabin A", None);
        let existing = booking(
            id,
            detail(&[("Cabin A", range("2024-06-01", "2024-06-05"))]),
        );
        let holds = Holds::collect([&existing], []);

        let conflict = holds
            .conflict(&cabin, range("2024-06-04", "2024-06-07"))
            .expect("overlapping range must conflict");
        assert_eq!(conflict.existing, range("2024-06-01", "2024-06-05"));
        assert_eq!(conflict.source, Source::Booking(existing.id));
        assert!(conflict.to_string().contains("2024-06-01"));
        assert!(conflict.to_string().contains("booking"));

        assert_eq!(
            holds.conflict(&cabin, range("2024-06-06", "2024-06-08")),
            None,
        );
        assert_eq!(
            holds.conflict(
                &facility("Cabin B", None),
                range("2024-06-02", "2024-06-03"),
            ),
            None,
        );
    }

    #[test]
    fn shares_touching_boundaries_as_overlap() {
        let id = item::Id::new();
        let cabin = facility("Cabin A", None);
        let existing = entry(
            id,
            detail(&[("Cabin A", range("2024-06-01", "2024-06-05"))]),
        );
        let holds = Holds::collect([], [&existing]);

        let conflict = holds
            .conflict(&cabin, range("2024-06-05", "2024-06-05"))
            .expect("inclusive end must conflict");
        assert!(matches!(conflict.source, Source::ManualEntry(_)));
        assert!(conflict.to_string().contains("manual entry"));
    }

    #[test]
    fn iterates_every_facility_selection() {
        let id = item::Id::new();
        let existing = booking(
            id,
            detail(&[
                ("Cabin A", range("2024-06-01", "2024-06-02")),
                ("Cabin B", range("2024-06-10", "2024-06-12")),
            ]),
        );
        let holds = Holds::collect([&existing], []);
        assert_eq!(holds.as_slice().len(), 2);

        assert!(holds
            .conflict(
                &facility("Cabin B", None),
                range("2024-06-12", "2024-06-14"),
            )
            .is_some());
    }

    #[test]
    fn ignores_cancelled_records() {
        let id = item::Id::new();
        let mut cancelled = booking(
            id,
            detail(&[("Cabin A", range("2024-06-01", "2024-06-05"))]),
        );
        cancelled.status = booking::Status::Cancelled;

        let holds = Holds::collect([&cancelled], []);
        assert_eq!(
            holds.conflict(
                &facility("Cabin A", None),
                range("2024-06-02", "2024-06-03"),
            ),
            None,
        );
    }

    #[test]
    fn admits_concurrent_holders_up_to_capacity() {
        let id = item::Id::new();
        let site = facility("Tent site", Some(2));
        let first = booking(
            id,
            detail(&[("Tent site", range("2024-06-01", "2024-06-03"))]),
        );
        let second = entry(
            id,
            detail(&[("Tent site", range("2024-06-03", "2024-06-04"))]),
        );

        let holds = Holds::collect([&first], []);
        let requested = range("2024-06-02", "2024-06-03");
        assert_eq!(holds.conflict(&site, requested), None);

        let holds = Holds::collect([&first], [&second]);
        let requested = range("2024-06-01", "2024-06-02");
        assert_eq!(holds.conflict(&site, requested), None);
        let conflict = holds
            .conflict(&site, range("2024-06-02", "2024-06-05"))
            .expect("fully held day must conflict");
        assert_eq!(conflict.existing, range("2024-06-01", "2024-06-03"));
    }
}
