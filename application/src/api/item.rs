//! `Item`-related definitions.

use common::Date;
use derive_more::{AsRef, Display, From, Into};
use juniper::{graphql_object, GraphQLEnum, GraphQLInputObject, GraphQLScalar};
use service::{domain, query::availability, read};
use uuid::Uuid;

use crate::{api::scalar, define_error, AsError, Context, Error};

/// Unique identifier of an `Item`.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, GraphQLScalar, Into, PartialEq,
)]
#[from(domain::item::Id)]
#[into(domain::item::Id)]
#[graphql(name = "ItemId", transparent)]
pub struct Id(Uuid);

/// Name of a facility of an `Item`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "FacilityName",
    with = scalar::Via::<domain::item::FacilityName>,
)]
pub struct FacilityName(domain::item::FacilityName);

/// Name of an activity of an `Item`.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ActivityName",
    with = scalar::Via::<domain::item::ActivityName>,
)]
pub struct ActivityName(domain::item::ActivityName);

/// Inclusive range of dates.
#[derive(Clone, Copy, Debug, GraphQLInputObject)]
pub struct DateRangeInput {
    /// First date of the range.
    pub start: Date,

    /// Last date of the range.
    pub end: Date,
}

impl TryFrom<DateRangeInput> for common::DateRange {
    type Error = Error;

    fn try_from(input: DateRangeInput) -> Result<Self, Self::Error> {
        Self::new(input.start, input.end)
            .map_err(|_| AvailabilityError::InvertedRange.into())
    }
}

/// Inclusive range of dates.
#[derive(Clone, Copy, Debug, From)]
pub struct DateRange(common::DateRange);

/// Inclusive range of dates.
#[graphql_object(context = Context)]
impl DateRange {
    /// First date of this `DateRange`.
    #[must_use]
    pub fn start(&self) -> Date {
        self.0.start()
    }

    /// Last date of this `DateRange`.
    #[must_use]
    pub fn end(&self) -> Date {
        self.0.end()
    }
}

/// Advisory slot availability of an `Item` on a single date.
#[derive(Clone, Copy, Debug, From)]
pub struct SlotAvailability(read::capacity::SlotAvailability);

/// Advisory slot availability of an `Item` on a single date.
///
/// May lag behind concurrent reservations for a short while.
#[graphql_object(context = Context)]
impl SlotAvailability {
    /// Total slots of the `Item` per date.
    #[must_use]
    pub fn total(&self) -> i32 {
        saturate(self.0.total)
    }

    /// Slots held by confirmed bookings and manual entries.
    #[must_use]
    pub fn booked(&self) -> i32 {
        saturate(self.0.booked.0)
    }

    /// Slots still free.
    #[must_use]
    pub fn remaining(&self) -> i32 {
        saturate(self.0.remaining())
    }
}

/// Advisory availability of a facility of an `Item` for a date range.
#[derive(Clone, Debug, From)]
pub struct FacilityAvailability(Option<read::overlap::Conflict>);

/// Advisory availability of a facility of an `Item` for a date range.
///
/// May lag behind concurrent reservations for a short while.
#[graphql_object(context = Context)]
impl FacilityAvailability {
    /// Indicator whether the facility is free for the whole range.
    #[must_use]
    pub fn available(&self) -> bool {
        self.0.is_none()
    }

    /// Conflicting reservation, if any.
    #[must_use]
    pub fn conflict(&self) -> Option<Conflict> {
        self.0.clone().map(Conflict)
    }
}

/// Requested range of a facility is already taken.
#[derive(Clone, Debug, From)]
pub struct Conflict(read::overlap::Conflict);

/// Requested range of a facility is already taken.
#[graphql_object(name = "FacilityConflict", context = Context)]
impl Conflict {
    /// Name of the requested facility.
    #[must_use]
    pub fn facility(&self) -> FacilityName {
        self.0.facility.clone().into()
    }

    /// Requested `DateRange`.
    #[must_use]
    pub fn requested(&self) -> DateRange {
        self.0.requested.into()
    }

    /// `DateRange` held already.
    #[must_use]
    pub fn existing(&self) -> DateRange {
        self.0.existing.into()
    }

    /// Kind of the reservation holding the facility.
    #[must_use]
    pub fn held_by(&self) -> HoldKind {
        match self.0.source {
            read::overlap::Source::Booking(_) => HoldKind::Booking,
            read::overlap::Source::ManualEntry(_) => HoldKind::ManualEntry,
        }
    }
}

/// Kind of a reservation holding capacity.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
pub enum HoldKind {
    /// Self-service booking.
    Booking,

    /// Booking entered manually by a host.
    ManualEntry,
}

/// Converts the provided count into a GraphQL `Int`, saturating on overflow.
pub(crate) fn saturate(count: u32) -> i32 {
    i32::try_from(count).unwrap_or(i32::MAX)
}

impl AsError for availability::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::ItemNotExists(_) => Some(ItemError::NotExists.into()),
            Self::NotSlotBased(_) | Self::NotFacilityBased(_) => {
                Some(AvailabilityError::WrongCapacityMode.into())
            }
            Self::FacilityNotExists(_) => {
                Some(AvailabilityError::FacilityNotExists.into())
            }
        }
    }
}

define_error! {
    enum ItemError {
        #[code = "ITEM_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Item` with the specified ID does not exist"]
        NotExists,
    }
}

define_error! {
    enum AvailabilityError {
        #[code = "WRONG_CAPACITY_MODE"]
        #[status = BAD_REQUEST]
        #[message = "`Item` is booked in a different capacity mode"]
        WrongCapacityMode,

        #[code = "FACILITY_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Item` has no facility with the specified name"]
        FacilityNotExists,

        #[code = "INVERTED_DATE_RANGE"]
        #[status = BAD_REQUEST]
        #[message = "`DateRange` must not end before it starts"]
        InvertedRange,
    }
}
