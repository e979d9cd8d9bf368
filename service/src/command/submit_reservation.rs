//! [`Command`] for submitting a reservation of an [`Item`].

use common::{
    operations::{
        By, Commit, Initiate, Insert, Lock, Select, Transact, Transacted,
        Update,
    },
    Date, DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        booking::{self, request::Invalid},
        item::{self, DateOutOfPolicy},
        payment, referral, Booking, Item, Payment, PaymentMethod,
    },
    infra::{
        database,
        gateway::{self, Charge},
        Database, Gateway,
    },
    read::{
        capacity::{BookedSlots, InsufficientCapacity},
        overlap::{Conflict, Holds},
        Shortage,
    },
    Event, Service,
};

use super::Command;

/// [`Command`] for submitting a reservation of an [`Item`].
///
/// A free reservation is confirmed right away, while a paid one initiates a
/// mobile-money charge and awaits its reconciliation.
#[derive(Clone, Debug)]
pub struct SubmitReservation {
    /// ID of the [`Item`] to reserve.
    pub item_id: item::Id,

    /// Requested [`booking::Request`].
    pub request: booking::Request,

    /// [`booking::Payer`] of the reservation.
    pub payer: booking::Payer,

    /// [`PaymentMethod`] to pay with.
    pub method: PaymentMethod,

    /// Referral [`referral::Code`] the reservation is made through, if any.
    pub referral: Option<referral::Code>,
}

/// Outcome of a [`SubmitReservation`] [`Command`].
#[derive(Clone, Debug)]
pub enum Submission {
    /// Reservation is free and its [`Booking`] is confirmed.
    Confirmed(Booking),

    /// Charge is initiated, and the [`Payment`] awaits its reconciliation.
    AwaitingPayment(Payment),
}

impl<Db, Gw> Command<SubmitReservation> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Item>, item::Id>>,
            Ok = Option<Item>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<BookedSlots, (item::Id, Date)>>,
            Ok = BookedSlots,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Holds, item::Id>>,
            Ok = Holds,
            Err = Traced<database::Error>,
        > + Database<Insert<Payment>, Err = Traced<database::Error>>
        + Database<Update<Payment>, Err = Traced<database::Error>>,
    Transacted<Db>: Database<
            Lock<By<Item, item::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<BookedSlots, (item::Id, Date)>>,
            Ok = BookedSlots,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Holds, item::Id>>,
            Ok = Holds,
            Err = Traced<database::Error>,
        > + Database<Insert<Booking>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        Initiate<Charge>,
        Ok = payment::CheckoutId,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Submission;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: SubmitReservation,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let SubmitReservation {
            item_id,
            request,
            payer,
            method,
            referral,
        } = cmd;

        let item = self
            .database()
            .execute(Select(By::<Option<Item>, _>::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(item_id))
            .map_err(tracerr::wrap!())?;

        if payer.user_id.is_none() {
            if payer.name.is_none() {
                return Err(tracerr::new!(E::Validation(
                    booking::ValidationError::MissingGuestName
                )));
            }
            if payer.email.is_none() {
                return Err(tracerr::new!(E::Validation(
                    booking::ValidationError::MissingGuestEmail
                )));
            }
        }

        let booking::Reservation {
            detail,
            visit_date,
            slots,
            total,
        } = request
            .validate(&item, Date::today())
            .map_err(E::from)
            .map_err(tracerr::wrap!())?;

        // Advisory check only, for a quick feedback.
        self.cached_availability(&item, visit_date)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .admit(&item, &detail)
            .map_err(E::from)
            .map_err(tracerr::wrap!())?;

        let draft = booking::Draft {
            item_id,
            visit_date,
            slots,
            detail,
            payer,
            total,
            referral,
        };

        if total.is_zero() {
            let tx = self
                .database()
                .execute(Transact)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?;

            // Serialize concurrent reservations of the same `Item`.
            tx.execute(Lock(By::new(item.id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;

            if let Err(shortage) = super::recheck(&tx, &item, visit_date)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .admit(&item, &draft.detail)
            {
                log::warn!(
                    "Reservation of `Item(id: {item_id})` lost the race: \
                     {shortage}",
                );
                return Err(tracerr::new!(E::from(shortage)));
            }

            let booking = Booking::confirm(draft, None);
            tx.execute(Insert(booking.clone()))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            tx.execute(Commit)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))
                .map(drop)?;
            self.availability.invalidate(item.id);

            log::info!(
                "Free `Booking(id: {})` of `Item(id: {item_id})` confirmed",
                booking.id,
            );
            self.emit(Event::BookingConfirmed {
                booking: booking.clone(),
                item_name: item.name.clone(),
            });
            return Ok(Submission::Confirmed(booking));
        }

        if !method.is_supported() {
            return Err(tracerr::new!(E::PaymentMethodUnsupported(method)));
        }
        let phone = draft
            .payer
            .phone
            .clone()
            .ok_or(E::Validation(booking::ValidationError::MissingPhone))
            .map_err(tracerr::wrap!())?;

        let now = DateTime::now();
        let mut payment = Payment {
            id: payment::Id::new(),
            item_id,
            checkout_id: None,
            phone,
            amount: total,
            status: payment::Status::Pending,
            result_code: None,
            result_description: None,
            reservation: draft,
            booking_id: None,
            attempts: 0,
            created_at: now.coerce(),
            updated_at: now.coerce(),
        };
        self.database()
            .execute(Insert(payment.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let initiated = self
            .gateway()
            .execute(Initiate(super::charge(&payment, &item)))
            .await;
        payment.attempts = 1;
        payment.updated_at = DateTime::now().coerce();
        match initiated {
            Ok(checkout_id) => {
                payment.checkout_id = Some(checkout_id);
                self.database()
                    .execute(Update(payment.clone()))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))
                    .map(drop)?;

                log::info!(
                    "`Payment(id: {})` for `Item(id: {item_id})` initiated",
                    payment.id,
                );
                Ok(Submission::AwaitingPayment(payment))
            }
            Err(e) => {
                log::error!(
                    "Failed to initiate `Payment(id: {})`: {e}",
                    payment.id,
                );
                payment.status = payment::Status::Failed;
                payment.result_description = Some(e.as_ref().to_string());
                self.database()
                    .execute(Update(payment))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))
                    .map(drop)?;
                Err(e).map_err(tracerr::map_from_and_wrap!(=> E))
            }
        }
    }
}

/// Error of [`SubmitReservation`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Item`] with the provided ID doesn't exist.
    #[display("`Item(id: {_0})` doesn't exist")]
    ItemNotExists(#[error(not(source))] item::Id),

    /// Reservation is malformed.
    #[display("Invalid reservation: {_0}")]
    Validation(booking::ValidationError),

    /// Requested date violates the visit policy of the [`Item`].
    #[display("Date is out of policy: {_0}")]
    DateOutOfPolicy(DateOutOfPolicy),

    /// Not enough slots remain.
    #[display("Insufficient capacity: {_0}")]
    #[from]
    InsufficientCapacity(InsufficientCapacity),

    /// Requested facility range is already taken.
    #[display("Facility conflict: {_0}")]
    #[from]
    FacilityConflict(Conflict),

    /// [`PaymentMethod`] cannot be charged at the moment.
    #[display("`{_0}` payments are not available")]
    PaymentMethodUnsupported(#[error(not(source))] PaymentMethod),

    /// External charge couldn't be initiated.
    #[display("Failed to initiate payment: {_0}")]
    #[from]
    PaymentInitiationFailed(gateway::Error),
}

impl From<Invalid> for ExecutionError {
    fn from(e: Invalid) -> Self {
        match e {
            Invalid::Validation(e) => Self::Validation(e),
            Invalid::DateOutOfPolicy(e) => Self::DateOutOfPolicy(e),
        }
    }
}

impl From<Shortage> for ExecutionError {
    fn from(e: Shortage) -> Self {
        match e {
            Shortage::InsufficientCapacity(e) => Self::InsufficientCapacity(e),
            Shortage::FacilityConflict(e) => Self::FacilityConflict(e),
        }
    }
}
