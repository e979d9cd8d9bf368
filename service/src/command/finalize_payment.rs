//! [`Command`] for materializing a [`Booking`] out of a completed [`Payment`].

use common::{
    operations::{
        By, Commit, Insert, Lock, Select, Transact, Transacted, Update,
    },
    Date, DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{booking, item, payment, Booking, Item, Payment},
    infra::{database, Database},
    read::{
        capacity::{BookedSlots, InsufficientCapacity},
        overlap::{Conflict, Holds},
        Shortage,
    },
    Event, Service,
};

use super::{award_commission, AwardCommission, Command};

/// [`Command`] for materializing a [`Booking`] out of a completed
/// [`Payment`].
///
/// Idempotent: a [`Payment`] is materialized into at most one [`Booking`],
/// and repeated executions return it.
#[derive(Clone, Copy, Debug)]
pub struct FinalizePayment {
    /// ID of the completed [`Payment`].
    pub payment_id: payment::Id,
}

impl<Db, Gw> Command<FinalizePayment> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Payment>, payment::Id>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Booking>, booking::Id>>,
            Ok = Option<Booking>,
            Err = Traced<database::Error>,
        >,
    Transacted<Db>: Database<
            Lock<By<Payment, payment::Id>>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Payment>, payment::Id>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Item>, item::Id>>,
            Ok = Option<Item>,
            Err = Traced<database::Error>,
        > + Database<
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
        + Database<Update<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Self: Command<
        AwardCommission,
        Err = Traced<award_commission::ExecutionError>,
    >,
{
    type Ok = Booking;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        FinalizePayment { payment_id }: FinalizePayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Lock(By::new(payment_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        let mut payment = tx
            .execute(Select(By::<Option<Payment>, _>::new(payment_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::PaymentNotExists(payment_id))
            .map_err(tracerr::wrap!())?;

        if let Some(booking_id) = payment.booking_id {
            drop(tx);
            let booking = self.existing(booking_id).await?;
            self.award(&booking).await;
            return Ok(booking);
        }
        if payment.status != payment::Status::Completed {
            return Err(tracerr::new!(E::PaymentNotCompleted {
                id: payment_id,
                status: payment.status,
            }));
        }

        let item_id = payment.item_id;
        let item = tx
            .execute(Select(By::<Option<Item>, _>::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(item_id))
            .map_err(tracerr::wrap!())?;
        tx.execute(Lock(By::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let reservation = payment.reservation.clone();
        if let Err(shortage) =
            super::recheck(&tx, &item, reservation.visit_date)
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .admit(&item, &reservation.detail)
        {
            // Money is taken, but the capacity is gone: refund is required.
            log::warn!(
                "`Payment(id: {payment_id})` is completed, but its reservation \
                 of `Item(id: {item_id})` cannot be confirmed ({shortage}), \
                 refund is required",
            );
            return Err(tracerr::new!(E::from(shortage)));
        }

        let booking = Booking::confirm(reservation, Some(payment_id));
        tx.execute(Insert(booking.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        payment.booking_id = Some(booking.id);
        payment.updated_at = DateTime::now().coerce();
        tx.execute(Update(payment))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        match tx.execute(Commit).await {
            Ok(_) => {}
            Err(e)
                if e.as_ref()
                    .is_unique_violation(Some("bookings_payment_id_key")) =>
            {
                log::debug!(
                    "`Payment(id: {payment_id})` is finalized concurrently",
                );
                let booking_id = self
                    .database()
                    .execute(Select(By::<Option<Payment>, _>::new(payment_id)))
                    .await
                    .map_err(tracerr::map_from_and_wrap!(=> E))?
                    .and_then(|p| p.booking_id)
                    .ok_or(E::PaymentNotExists(payment_id))
                    .map_err(tracerr::wrap!())?;
                return self.existing(booking_id).await;
            }
            Err(e) => {
                return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
            }
        }
        self.availability.invalidate(item_id);

        log::info!(
            "`Booking(id: {})` of `Item(id: {item_id})` confirmed by \
             `Payment(id: {payment_id})`",
            booking.id,
        );
        self.emit(Event::BookingConfirmed {
            booking: booking.clone(),
            item_name: item.name,
        });
        self.award(&booking).await;

        Ok(booking)
    }
}

impl<Db, Gw> Service<Db, Gw>
where
    Db: Database<
        Select<By<Option<Booking>, booking::Id>>,
        Ok = Option<Booking>,
        Err = Traced<database::Error>,
    >,
{
    /// Reads the [`Booking`] a [`Payment`] is already materialized into.
    async fn existing(
        &self,
        booking_id: booking::Id,
    ) -> Result<Booking, Traced<ExecutionError>> {
        use ExecutionError as E;

        self.database()
            .execute(Select(By::<Option<Booking>, _>::new(booking_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::BookingNotExists(booking_id))
            .map_err(tracerr::wrap!())
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Awards a [`Commission`] on the provided [`Booking`], if it's referred
    /// and paid.
    ///
    /// Failures are only logged, as they must not affect the [`Booking`].
    ///
    /// [`Commission`]: crate::domain::Commission
    async fn award(&self, booking: &Booking)
    where
        Self: Command<
            AwardCommission,
            Err = Traced<award_commission::ExecutionError>,
        >,
    {
        let Some(code) = booking.referral.clone() else {
            return;
        };
        if booking.total.is_zero() {
            return;
        }
        if let Err(e) = self
            .execute(AwardCommission {
                booking_id: booking.id,
                amount: booking.total,
                code,
            })
            .await
        {
            log::error!(
                "Failed to award `Commission` for `Booking(id: {})`: {e}",
                booking.id,
            );
        }
    }
}

/// Error of [`FinalizePayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Payment`] with the provided ID doesn't exist.
    #[display("`Payment(id: {_0})` doesn't exist")]
    PaymentNotExists(#[error(not(source))] payment::Id),

    /// [`Payment`] is not completed yet.
    #[display("`Payment(id: {id})` is `{status}`, not completed")]
    PaymentNotCompleted {
        /// ID of the [`Payment`].
        id: payment::Id,

        /// Current [`payment::Status`] of the [`Payment`].
        status: payment::Status,
    },

    /// [`Item`] of the [`Payment`] doesn't exist.
    #[display("`Item(id: {_0})` doesn't exist")]
    ItemNotExists(#[error(not(source))] item::Id),

    /// [`Booking`] the [`Payment`] refers to doesn't exist.
    #[display("`Booking(id: {_0})` doesn't exist")]
    BookingNotExists(#[error(not(source))] booking::Id),

    /// Slots were taken while the [`Payment`] was pending.
    #[display("Insufficient capacity: {_0}")]
    #[from]
    InsufficientCapacity(InsufficientCapacity),

    /// Facility range was taken while the [`Payment`] was pending.
    #[display("Facility conflict: {_0}")]
    #[from]
    FacilityConflict(Conflict),
}

impl From<Shortage> for ExecutionError {
    fn from(e: Shortage) -> Self {
        match e {
            Shortage::InsufficientCapacity(e) => Self::InsufficientCapacity(e),
            Shortage::FacilityConflict(e) => Self::FacilityConflict(e),
        }
    }
}
