//! Reservation [`Request`] validation and pricing.

use common::{Date, Money};
use derive_more::{Display, Error, From};

use crate::domain::{
    item::{self, Capacity, DateOutOfPolicy, Entrance},
    Item,
};

use super::{ActivitySelection, Detail, FacilitySelection};

/// Selection a reservation is requested for, not yet checked against an
/// [`Item`].
#[derive(Clone, Debug, Default)]
pub struct Request {
    /// Requested visit [`Date`] of a slot-based [`Item`].
    ///
    /// May be omitted for [`Item`]s with a fixed visit date.
    pub date: Option<Date>,

    /// Number of adults.
    pub adults: u32,

    /// Number of children.
    pub children: u32,

    /// [`item::Facility`]s to rent.
    pub facilities: Vec<FacilitySelection>,

    /// [`item::Activity`]s to add.
    pub activities: Vec<ActivitySelection>,
}

/// [`Request`] validated against an [`Item`] and priced.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Reservation {
    /// Structured [`Detail`] of the reservation.
    pub detail: Detail,

    /// Visit [`Date`] (the earliest facility start for facility-based
    /// [`Item`]s).
    pub visit_date: Date,

    /// Number of capacity units to hold.
    pub slots: u32,

    /// Total amount to pay.
    pub total: Money,
}

impl Request {
    /// Validates this [`Request`] against the provided [`Item`] and computes
    /// its total.
    ///
    /// # Errors
    ///
    /// - [`Invalid::Validation`] if this [`Request`] is malformed or refers
    ///   to something the [`Item`] doesn't offer;
    /// - [`Invalid::DateOutOfPolicy`] if a requested [`Date`] violates the
    ///   [`item::Visit`] policy of the [`Item`].
    pub fn validate(
        self,
        item: &Item,
        today: Date,
    ) -> Result<Reservation, Invalid> {
        use ValidationError as E;

        let Self {
            date,
            adults,
            children,
            facilities,
            activities,
        } = self;

        for a in &activities {
            if item.activity(&a.name).is_none() {
                return Err(E::UnknownActivity(a.name.clone()).into());
            }
            if a.participants == 0 {
                return Err(E::NoParticipants(a.name.clone()).into());
            }
        }

        let (detail, visit_date) = match &item.capacity {
            Capacity::Slots { .. } => {
                if !facilities.is_empty() {
                    return Err(E::FacilitiesNotOffered.into());
                }
                if adults.saturating_add(children) == 0 {
                    return Err(E::EmptySelection.into());
                }
                let date = match (date, item.visit) {
                    (Some(d), _) => d,
                    (None, item::Visit::Fixed { date }) => date,
                    (None, item::Visit::Flexible { .. }) => {
                        return Err(E::MissingDate.into());
                    }
                };
                item.visit.check(date, date, today)?;

                let detail = Detail::Slot {
                    adults,
                    children,
                    activities,
                };
                (detail, date)
            }
            Capacity::Facilities { .. } => {
                if adults > 0 || children > 0 {
                    return Err(E::SlotsNotOffered.into());
                }
                let Some(first) =
                    facilities.iter().map(|f| f.range.start()).min()
                else {
                    return Err(E::EmptySelection.into());
                };
                for (i, f) in facilities.iter().enumerate() {
                    if item.facility(&f.name).is_none() {
                        return Err(E::UnknownFacility(f.name.clone()).into());
                    }
                    if facilities[..i]
                        .iter()
                        .any(|p| p.name == f.name && p.range.overlaps(&f.range))
                    {
                        return Err(
                            E::OverlappingSelection(f.name.clone()).into()
                        );
                    }
                    item.visit.check(f.range.start(), f.range.end(), today)?;
                }

                let detail = Detail::Facility {
                    facilities,
                    activities,
                };
                (detail, first)
            }
        };

        let total = price(item, &detail).ok_or(E::Unpriceable)?;

        Ok(Reservation {
            slots: detail.units(),
            detail,
            visit_date,
            total,
        })
    }
}

/// Computes the total amount of the provided [`Detail`] for the [`Item`].
///
/// - Slot-based: `adults * adult + children * child + activities`, where a
///   free [`Entrance`] contributes nothing.
/// - Facility-based: `Σ price_per_day * billable days + activities`.
///
/// [`None`] is returned on overflow, on a currency mismatch or if the
/// [`Detail`] refers to something the [`Item`] doesn't offer.
#[must_use]
pub fn price(item: &Item, detail: &Detail) -> Option<Money> {
    let mut total = Money::zero(item.currency);

    match detail {
        Detail::Slot {
            adults, children, ..
        } => {
            if let Entrance::Paid { adult, child } = item.entrance {
                total = total
                    .checked_add(adult.checked_mul(*adults)?)?
                    .checked_add(child.checked_mul(*children)?)?;
            }
        }
        Detail::Facility { facilities, .. } => {
            for f in facilities {
                let facility = item.facility(&f.name)?;
                total = total.checked_add(
                    facility
                        .price_per_day
                        .checked_mul(f.range.billable_days())?,
                )?;
            }
        }
    }

    for a in detail.activities() {
        let activity = item.activity(&a.name)?;
        total =
            total.checked_add(activity.price.checked_mul(a.participants)?)?;
    }

    Some(total)
}

/// Error of validating a reservation [`Request`].
#[derive(Clone, Debug, Display, Error, From)]
pub enum Invalid {
    /// [`Request`] is malformed.
    Validation(ValidationError),

    /// Requested [`Date`] violates the [`item::Visit`] policy.
    DateOutOfPolicy(DateOutOfPolicy),
}

/// Malformed reservation request.
#[derive(Clone, Debug, Display, Error, Eq, PartialEq)]
pub enum ValidationError {
    /// Nothing is selected.
    #[display("at least one participant or facility must be selected")]
    EmptySelection,

    /// Visit [`Date`] is required, but missing.
    #[display("visit date is required")]
    MissingDate,

    /// Guest payer has no name.
    #[display("guest name is required")]
    MissingGuestName,

    /// Guest payer has no email.
    #[display("guest email is required")]
    MissingGuestEmail,

    /// Phone to push a mobile-money charge to is missing.
    #[display("phone number is required for mobile-money payments")]
    MissingPhone,

    /// [`item::Facility`]s are selected for a slot-based [`Item`].
    #[display("item doesn't offer facilities")]
    FacilitiesNotOffered,

    /// Participants are counted for a facility-based [`Item`].
    #[display("item is booked by facilities, not by participants")]
    SlotsNotOffered,

    /// Selected [`item::Facility`] doesn't exist.
    #[display("unknown facility `{_0}`")]
    UnknownFacility(#[error(not(source))] item::FacilityName),

    /// Selected [`item::Activity`] doesn't exist.
    #[display("unknown activity `{_0}`")]
    UnknownActivity(#[error(not(source))] item::ActivityName),

    /// Selected [`item::Activity`] has no participants.
    #[display("activity `{_0}` has no participants")]
    NoParticipants(#[error(not(source))] item::ActivityName),

    /// The same [`item::Facility`] is selected twice for overlapping ranges.
    #[display("facility `{_0}` is selected twice for overlapping dates")]
    OverlappingSelection(#[error(not(source))] item::FacilityName),

    /// Total amount cannot be computed.
    #[display("total amount cannot be computed")]
    Unpriceable,
}

#[cfg(test)]
mod spec {
    use std::str::FromStr as _;

    use common::{money::Currency, Date, DateRange, Money};

    use crate::domain::{
        booking::{ActivitySelection, Detail, FacilitySelection},
        item::{
            self, Activity, ActivityName, Capacity, DateOutOfPolicy,
            Entrance, Facility, FacilityName, Visit,
        },
        Item,
    };

    use super::{Invalid, Request, ValidationError};

    fn date(s: &str) -> Date {
        Date::from_str(s).unwrap()
    }

    fn money(s: &str) -> Money {
        Money::from_str(s).unwrap()
    }

    fn range(start: &str, end: &str) -> DateRange {
        DateRange::new(date(start), date(end)).unwrap()
    }

    fn item(capacity: Capacity, entrance: Entrance) -> Item {
        Item {
            id: item::Id::new(),
            host_id: item::HostId::new(),
            kind: item::Kind::AdventureSite,
            name: item::Name::new("Hell's Gate").unwrap(),
            currency: Currency::Kes,
            entrance,
            capacity,
            activities: vec![Activity {
                name: ActivityName::new("Rock climbing").unwrap(),
                price: money("500KES"),
            }],
            visit: Visit::Flexible {
                horizon_days: Visit::DEFAULT_HORIZON_DAYS,
            },
        }
    }

    fn slots() -> Item {
        item(
            Capacity::Slots { total: 10 },
            Entrance::Paid {
                adult: money("1000KES"),
                child: money("400KES"),
            },
        )
    }

    fn cabins() -> Item {
        item(
            Capacity::Facilities {
                facilities: vec![Facility {
                    name: FacilityName::new("Cabin A").unwrap(),
                    price_per_day: money("3000KES"),
                    capacity: None,
                }],
            },
            Entrance::Free,
        )
    }

    fn climbing(participants: u32) -> ActivitySelection {
        ActivitySelection {
            name: ActivityName::new("Rock climbing").unwrap(),
            participants,
        }
    }

    fn cabin(start: &str, end: &str) -> FacilitySelection {
        FacilitySelection {
            name: FacilityName::new("Cabin A").unwrap(),
            range: range(start, end),
        }
    }

    #[test]
    fn prices_slots() {
        let reservation = Request {
            date: Some(date("2024-06-10")),
            adults: 2,
            children: 3,
            activities: vec![climbing(2)],
            ..Request::default()
        }
        .validate(&slots(), date("2024-06-01"))
        .unwrap();

        assert_eq!(reservation.slots, 5);
        assert_eq!(reservation.visit_date, date("2024-06-10"));
        assert_eq!(reservation.total, money("4200KES"));
    }

    #[test]
    fn free_entrance_prices_only_activities() {
        let free = item(Capacity::Slots { total: 10 }, Entrance::Free);

        let no_extras = Request {
            date: Some(date("2024-06-10")),
            adults: 4,
            ..Request::default()
        }
        .validate(&free, date("2024-06-01"))
        .unwrap();
        assert!(no_extras.total.is_zero());

        let with_extras = Request {
            date: Some(date("2024-06-10")),
            adults: 4,
            activities: vec![climbing(1)],
            ..Request::default()
        }
        .validate(&free, date("2024-06-01"))
        .unwrap();
        assert_eq!(with_extras.total, money("500KES"));
    }

    #[test]
    fn prices_facilities_by_billable_days() {
        let reservation = Request {
            facilities: vec![cabin("2024-06-04", "2024-06-07")],
            ..Request::default()
        }
        .validate(&cabins(), date("2024-06-01"))
        .unwrap();

        assert_eq!(reservation.total, money("9000KES"));
        assert_eq!(reservation.visit_date, date("2024-06-04"));
        assert!(matches!(reservation.detail, Detail::Facility { .. }));

        let same_day = Request {
            facilities: vec![cabin("2024-06-04", "2024-06-04")],
            ..Request::default()
        }
        .validate(&cabins(), date("2024-06-01"))
        .unwrap();
        assert_eq!(same_day.total, money("3000KES"));
    }

    #[test]
    fn rejects_empty_selection() {
        let err = Request {
            date: Some(date("2024-06-10")),
            ..Request::default()
        }
        .validate(&slots(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::EmptySelection),
        ));

        let err = Request::default()
            .validate(&cabins(), date("2024-06-01"))
            .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::EmptySelection),
        ));
    }

    #[test]
    fn rejects_out_of_policy_dates() {
        let err = Request {
            date: Some(date("2024-05-31")),
            adults: 1,
            ..Request::default()
        }
        .validate(&slots(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::DateOutOfPolicy(DateOutOfPolicy::Past { .. }),
        ));

        let err = Request {
            facilities: vec![cabin("2024-06-28", "2024-07-03")],
            ..Request::default()
        }
        .validate(&cabins(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::DateOutOfPolicy(DateOutOfPolicy::BeyondHorizon { .. }),
        ));
    }

    #[test]
    fn rejects_unknown_and_overlapping_selections() {
        let err = Request {
            facilities: vec![FacilitySelection {
                name: FacilityName::new("Cabin Z").unwrap(),
                range: range("2024-06-04", "2024-06-05"),
            }],
            ..Request::default()
        }
        .validate(&cabins(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::UnknownFacility(_)),
        ));

        let err = Request {
            facilities: vec![
                cabin("2024-06-04", "2024-06-06"),
                cabin("2024-06-06", "2024-06-08"),
            ],
            ..Request::default()
        }
        .validate(&cabins(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::OverlappingSelection(_)),
        ));

        let err = Request {
            date: Some(date("2024-06-10")),
            adults: 1,
            activities: vec![climbing(0)],
            ..Request::default()
        }
        .validate(&slots(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::NoParticipants(_)),
        ));
    }

    #[test]
    fn fixed_items_default_to_their_date() {
        let mut event = slots();
        event.visit = Visit::Fixed {
            date: date("2024-06-15"),
        };

        let reservation = Request {
            adults: 1,
            ..Request::default()
        }
        .validate(&event, date("2024-06-01"))
        .unwrap();
        assert_eq!(reservation.visit_date, date("2024-06-15"));

        let err = Request {
            adults: 1,
            ..Request::default()
        }
        .validate(&slots(), date("2024-06-01"))
        .unwrap_err();
        assert!(matches!(
            err,
            Invalid::Validation(ValidationError::MissingDate),
        ));
    }
}
