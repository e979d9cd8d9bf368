//! [`Command`] for re-issuing the external charge of a [`Payment`].

use common::{
    operations::{
        By, Commit, Initiate, Lock, Select, Transact, Transacted, Update,
    },
    DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{item, payment, Item, Payment},
    infra::{
        database,
        gateway::{self, Charge},
        Database, Gateway,
    },
    Service,
};

use super::Command;

/// [`Command`] for re-issuing the external charge of a pending or failed
/// [`Payment`].
///
/// Reuses the same [`Payment`], so its reservation still materializes into
/// at most one [`Booking`].
///
/// [`Booking`]: crate::domain::Booking
#[derive(Clone, Copy, Debug)]
pub struct RetryPayment {
    /// ID of the [`Payment`] to retry.
    pub payment_id: payment::Id,
}

impl<Db, Gw> Command<RetryPayment> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>,
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
        > + Database<Update<Payment>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
    Gw: Gateway<
        Initiate<Charge>,
        Ok = payment::CheckoutId,
        Err = Traced<gateway::Error>,
    >,
{
    type Ok = Payment;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        RetryPayment { payment_id }: RetryPayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        if self.reconciling.contains(payment_id) {
            return Err(tracerr::new!(E::AlreadyReconciling(payment_id)));
        }

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

        if payment.status == payment::Status::Completed
            || payment.booking_id.is_some()
        {
            return Err(tracerr::new!(E::AlreadyCompleted(payment_id)));
        }
        if payment.is_expired() {
            return Err(tracerr::new!(E::PaymentExpired(payment_id)));
        }

        let item = tx
            .execute(Select(By::<Option<Item>, _>::new(payment.item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(payment.item_id))
            .map_err(tracerr::wrap!())?;

        let initiated = self
            .gateway()
            .execute(Initiate(super::charge(&payment, &item)))
            .await;
        payment.attempts = payment.attempts.saturating_add(1);
        payment.updated_at = DateTime::now().coerce();
        let failure = match initiated {
            Ok(checkout_id) => {
                payment.status = payment::Status::Pending;
                payment.checkout_id = Some(checkout_id);
                payment.result_code = None;
                payment.result_description = None;
                None
            }
            Err(e) => {
                log::error!(
                    "Failed to re-initiate `Payment(id: {payment_id})`: {e}",
                );
                payment.status = payment::Status::Failed;
                payment.result_code = None;
                payment.result_description = Some(e.as_ref().to_string());
                Some(e)
            }
        };

        tx.execute(Update(payment.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        if let Some(e) = failure {
            return Err(e).map_err(tracerr::map_from_and_wrap!(=> E));
        }
        log::info!(
            "`Payment(id: {payment_id})` re-initiated, attempt #{}",
            payment.attempts,
        );
        Ok(payment)
    }
}

/// Error of [`RetryPayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Payment`] with the provided ID doesn't exist.
    #[display("`Payment(id: {_0})` doesn't exist")]
    PaymentNotExists(#[error(not(source))] payment::Id),

    /// [`Payment`] is being reconciled at the moment.
    #[display("`Payment(id: {_0})` is being reconciled already")]
    AlreadyReconciling(#[error(not(source))] payment::Id),

    /// [`Payment`] is completed already.
    #[display("`Payment(id: {_0})` is completed already")]
    AlreadyCompleted(#[error(not(source))] payment::Id),

    /// [`Payment`] stayed pending for too long and was expired.
    #[display("`Payment(id: {_0})` is expired")]
    PaymentExpired(#[error(not(source))] payment::Id),

    /// [`Item`] of the [`Payment`] doesn't exist.
    #[display("`Item(id: {_0})` doesn't exist")]
    ItemNotExists(#[error(not(source))] item::Id),

    /// External charge couldn't be initiated.
    #[display("Failed to initiate payment: {_0}")]
    #[from]
    PaymentInitiationFailed(gateway::Error),
}
