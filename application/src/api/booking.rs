//! `Booking`-related definitions.

use common::{Date, DateTime, Money};
use derive_more::{AsRef, Display, From, Into};
use juniper::{
    graphql_object, GraphQLEnum, GraphQLInputObject, GraphQLScalar,
    GraphQLUnion,
};
use service::{
    command::{create_manual_entry, submit_reservation},
    domain,
};
use uuid::Uuid;

use crate::{
    api::{self, item::saturate, scalar},
    define_error, AsError, Context, Error,
};

/// Unique identifier of a `Booking`.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, GraphQLScalar, Into, PartialEq,
)]
#[from(domain::booking::Id)]
#[into(domain::booking::Id)]
#[graphql(name = "BookingId", transparent)]
pub struct Id(Uuid);

/// Unique identifier of a `ManualEntry`.
#[derive(
    Clone, Copy, Debug, Display, Eq, From, GraphQLScalar, Into, PartialEq,
)]
#[from(domain::manual_entry::Id)]
#[into(domain::manual_entry::Id)]
#[graphql(name = "ManualEntryId", transparent)]
pub struct ManualEntryId(Uuid);

/// Name of a guest.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "GuestName",
    with = scalar::Via::<domain::booking::GuestName>,
)]
pub struct GuestName(domain::booking::GuestName);

/// Email address of a guest.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(name = "Email", with = scalar::Via::<domain::booking::Email>)]
pub struct Email(domain::booking::Email);

/// Referral tracking code a reservation is made through.
#[derive(AsRef, Clone, Debug, Display, From, GraphQLScalar, Into)]
#[graphql(
    name = "ReferralCode",
    with = scalar::Via::<domain::referral::Code>,
)]
pub struct ReferralCode(domain::referral::Code);

/// Requested reservation of an `Item`.
///
/// Slot-based `Item`s are reserved by participants on a `date`, while
/// facility-based ones are reserved by `facilities`.
#[derive(Clone, Debug, GraphQLInputObject)]
pub struct ReservationInput {
    /// Visit date of a slot-based `Item`.
    pub date: Option<Date>,

    /// Number of adults.
    pub adults: Option<i32>,

    /// Number of children.
    pub children: Option<i32>,

    /// Facilities to rent.
    pub facilities: Option<Vec<FacilitySelectionInput>>,

    /// Activities to join.
    pub activities: Option<Vec<ActivitySelectionInput>>,
}

/// Facility to rent for a range of dates.
#[derive(Clone, Debug, GraphQLInputObject)]
pub struct FacilitySelectionInput {
    /// Name of the facility.
    pub name: api::item::FacilityName,

    /// Dates to rent the facility for.
    pub range: api::item::DateRangeInput,
}

/// Activity to join by a number of participants.
#[derive(Clone, Debug, GraphQLInputObject)]
pub struct ActivitySelectionInput {
    /// Name of the activity.
    pub name: api::item::ActivityName,

    /// Number of participants.
    pub participants: i32,
}

impl TryFrom<ReservationInput> for domain::booking::Request {
    type Error = Error;

    fn try_from(input: ReservationInput) -> Result<Self, Self::Error> {
        let ReservationInput {
            date,
            adults,
            children,
            facilities,
            activities,
        } = input;

        Ok(Self {
            date,
            adults: count(adults.unwrap_or_default())?,
            children: count(children.unwrap_or_default())?,
            facilities: facilities
                .unwrap_or_default()
                .into_iter()
                .map(|f| {
                    Ok(domain::booking::FacilitySelection {
                        name: f.name.into(),
                        range: f.range.try_into()?,
                    })
                })
                .collect::<Result<_, Error>>()?,
            activities: activities
                .unwrap_or_default()
                .into_iter()
                .map(|a| {
                    Ok(domain::booking::ActivitySelection {
                        name: a.name.into(),
                        participants: count(a.participants)?,
                    })
                })
                .collect::<Result<_, Error>>()?,
        })
    }
}

/// Converts the provided GraphQL `Int` into a count.
fn count(value: i32) -> Result<u32, Error> {
    u32::try_from(value).map_err(|_| ReservationError::NegativeCount.into())
}

/// Contacts of a guest making or receiving a reservation.
#[derive(Clone, Debug, GraphQLInputObject)]
pub struct GuestInput {
    /// Name of the guest.
    pub name: Option<GuestName>,

    /// Email address of the guest.
    pub email: Option<Email>,

    /// Phone number of the guest, charged for a paid reservation.
    pub phone: Option<api::payment::Phone>,
}

impl GuestInput {
    /// Converts this [`GuestInput`] into a [`domain::booking::Payer`] of the
    /// provided registered user, if any.
    #[must_use]
    pub fn into_payer(
        self,
        user_id: Option<domain::booking::UserId>,
    ) -> domain::booking::Payer {
        let Self { name, email, phone } = self;
        domain::booking::Payer {
            user_id,
            name: name.map(Into::into),
            email: email.map(Into::into),
            phone: phone.map(Into::into),
        }
    }
}

/// Confirmed reservation of an `Item`.
#[derive(Clone, Debug, From)]
pub struct Booking(domain::Booking);

/// Confirmed reservation of an `Item`.
#[graphql_object(context = Context)]
impl Booking {
    /// Unique identifier of this `Booking`.
    #[must_use]
    pub fn id(&self) -> Id {
        self.0.id.into()
    }

    /// ID of the reserved `Item`.
    #[must_use]
    pub fn item_id(&self) -> api::item::Id {
        self.0.item_id.into()
    }

    /// Status of this `Booking`.
    #[must_use]
    pub fn status(&self) -> Status {
        self.0.status.into()
    }

    /// Capacity units held by this `Booking`.
    #[must_use]
    pub fn slots(&self) -> i32 {
        saturate(self.0.slots)
    }

    /// Visit date, the earliest facility start for facility rents.
    #[must_use]
    pub fn visit_date(&self) -> Date {
        self.0.visit_date
    }

    /// Rented facilities, if any.
    #[must_use]
    pub fn facilities(&self) -> Vec<FacilitySelection> {
        self.0
            .detail
            .facilities()
            .iter()
            .cloned()
            .map(FacilitySelection)
            .collect()
    }

    /// Total amount of this `Booking`.
    #[must_use]
    pub fn total(&self) -> Money {
        self.0.total
    }

    /// ID of the `Payment` this `Booking` is paid with, if it isn't free.
    #[must_use]
    pub fn payment_id(&self) -> Option<api::payment::Id> {
        self.0.payment_id.map(Into::into)
    }

    /// `DateTime` when this `Booking` was confirmed.
    #[must_use]
    pub fn created_at(&self) -> DateTime {
        self.0.created_at.coerce()
    }
}

/// Facility rented for a range of dates.
#[derive(Clone, Debug)]
pub struct FacilitySelection(domain::booking::FacilitySelection);

/// Facility rented for a range of dates.
#[graphql_object(context = Context)]
impl FacilitySelection {
    /// Name of the rented facility.
    #[must_use]
    pub fn name(&self) -> api::item::FacilityName {
        self.0.name.clone().into()
    }

    /// Dates of the rent.
    #[must_use]
    pub fn range(&self) -> api::item::DateRange {
        self.0.range.into()
    }
}

/// Status of a `Booking`.
#[derive(Clone, Copy, Debug, GraphQLEnum)]
#[graphql(name = "BookingStatus")]
pub enum Status {
    /// Holds capacity.
    Confirmed,

    /// Released its capacity.
    Cancelled,
}

impl From<domain::booking::Status> for Status {
    fn from(status: domain::booking::Status) -> Self {
        use domain::booking::Status as S;
        match status {
            S::Confirmed => Self::Confirmed,
            S::Cancelled => Self::Cancelled,
        }
    }
}

/// Reservation entered by a host directly, bypassing payment.
#[derive(Clone, Debug, From)]
pub struct ManualEntry(domain::ManualEntry);

/// Reservation entered by a host directly, bypassing payment.
#[graphql_object(context = Context)]
impl ManualEntry {
    /// Unique identifier of this `ManualEntry`.
    #[must_use]
    pub fn id(&self) -> ManualEntryId {
        self.0.id.into()
    }

    /// ID of the reserved `Item`.
    #[must_use]
    pub fn item_id(&self) -> api::item::Id {
        self.0.item_id.into()
    }

    /// Capacity units held by this `ManualEntry`.
    #[must_use]
    pub fn slots(&self) -> i32 {
        saturate(self.0.slots)
    }

    /// Visit date, the earliest facility start for facility rents.
    #[must_use]
    pub fn visit_date(&self) -> Date {
        self.0.visit_date
    }

    /// `DateTime` when this `ManualEntry` was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime {
        self.0.created_at.coerce()
    }
}

/// Result of a submitted reservation.
#[derive(Clone, Debug, GraphQLUnion)]
#[graphql(context = Context)]
pub enum Submission {
    /// Free reservation, confirmed right away.
    Confirmed(Booking),

    /// Paid reservation, awaiting its `Payment` to complete.
    AwaitingPayment(api::payment::Payment),
}

impl From<submit_reservation::Submission> for Submission {
    fn from(submission: submit_reservation::Submission) -> Self {
        use submit_reservation::Submission as S;
        match submission {
            S::Confirmed(b) => Self::Confirmed(b.into()),
            S::AwaitingPayment(p) => Self::AwaitingPayment(p.into()),
        }
    }
}

impl AsError for submit_reservation::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::ItemNotExists(_) => {
                Some(api::item::ItemError::NotExists.into())
            }
            Self::Validation(e) => Some(
                Error::from(ReservationError::Invalid).with_message(e),
            ),
            Self::DateOutOfPolicy(e) => Some(
                Error::from(ReservationError::DateOutOfPolicy).with_message(e),
            ),
            Self::InsufficientCapacity(e) => Some(
                Error::from(ReservationError::InsufficientCapacity)
                    .with_message(e),
            ),
            Self::FacilityConflict(e) => Some(
                Error::from(ReservationError::FacilityConflict)
                    .with_message(e),
            ),
            Self::PaymentMethodUnsupported(_) => {
                Some(api::payment::PaymentError::MethodUnsupported.into())
            }
            Self::PaymentInitiationFailed(_) => {
                Some(api::payment::PaymentError::InitiationFailed.into())
            }
        }
    }
}

impl AsError for create_manual_entry::ExecutionError {
    fn try_as_error(&self) -> Option<Error> {
        match self {
            Self::Db(e) => e.try_as_error(),
            Self::ItemNotExists(_) => {
                Some(api::item::ItemError::NotExists.into())
            }
            Self::NotItemHost { .. } => Some(ReservationError::NotHost.into()),
            Self::Validation(e) => Some(
                Error::from(ReservationError::Invalid).with_message(e),
            ),
            Self::DateOutOfPolicy(e) => Some(
                Error::from(ReservationError::DateOutOfPolicy).with_message(e),
            ),
            Self::InsufficientCapacity(e) => Some(
                Error::from(ReservationError::InsufficientCapacity)
                    .with_message(e),
            ),
            Self::FacilityConflict(e) => Some(
                Error::from(ReservationError::FacilityConflict)
                    .with_message(e),
            ),
        }
    }
}

define_error! {
    enum ReservationError {
        #[code = "INVALID_RESERVATION"]
        #[status = BAD_REQUEST]
        #[message = "Reservation request is invalid"]
        Invalid,

        #[code = "NEGATIVE_COUNT"]
        #[status = BAD_REQUEST]
        #[message = "Counts of participants must not be negative"]
        NegativeCount,

        #[code = "DATE_OUT_OF_POLICY"]
        #[status = BAD_REQUEST]
        #[message = "Requested date is not bookable"]
        DateOutOfPolicy,

        #[code = "INSUFFICIENT_CAPACITY"]
        #[status = CONFLICT]
        #[message = "Not enough capacity left"]
        InsufficientCapacity,

        #[code = "FACILITY_CONFLICT"]
        #[status = CONFLICT]
        #[message = "Requested facility is already taken for these dates"]
        FacilityConflict,

        #[code = "NOT_ITEM_HOST"]
        #[status = FORBIDDEN]
        #[message = "Authenticated host doesn't host the `Item`"]
        NotHost,

        #[code = "BOOKING_NOT_EXISTS"]
        #[status = NOT_FOUND]
        #[message = "`Booking` with the specified ID does not exist"]
        NotExists,
    }
}
