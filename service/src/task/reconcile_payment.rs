//! [`ReconcilePayment`] [`Task`].

use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use common::operations::{By, Perform, Select};
use derive_more::{Display, Error, From};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracerr::Traced;
use tracing as log;

use crate::{
    command::{finalize_payment, FinalizePayment},
    domain::{payment, Booking, Payment},
    infra::{database, Database},
    Command, Service,
};

use super::Task;

/// Interval between two checks of a [`Payment`] status.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Time a [`Payment`] is awaited to reach a terminal status for.
pub const BUDGET: Duration = Duration::from_secs(40);

/// [`Task`] awaiting a terminal status of a [`Payment`] and materializing its
/// reservation once the [`Payment`] completes.
///
/// The [`Payment`] is left as-is on cancellation or timeout, so it may be
/// retried later.
#[derive(Clone, Debug)]
pub struct ReconcilePayment {
    /// ID of the [`Payment`] to reconcile.
    pub payment_id: payment::Id,

    /// [`CancellationToken`] stopping the reconciliation.
    pub cancel: CancellationToken,
}

/// Outcome of a [`ReconcilePayment`] [`Task`].
#[derive(Clone, Debug)]
pub enum Outcome {
    /// [`Payment`] is completed and its [`Booking`] is confirmed.
    Completed(Booking),

    /// Reconciliation is cancelled before a terminal status was observed.
    Cancelled,
}

impl<Db, Gw> Task<Perform<ReconcilePayment>> for Service<Db, Gw>
where
    Db: Database<
        Select<By<Option<Payment>, payment::Id>>,
        Ok = Option<Payment>,
        Err = Traced<database::Error>,
    >,
    Self: Command<
        FinalizePayment,
        Ok = Booking,
        Err = Traced<finalize_payment::ExecutionError>,
    >,
{
    type Ok = Outcome;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        Perform(task): Perform<ReconcilePayment>,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let ReconcilePayment { payment_id, cancel } = task;

        let _flight = self
            .reconciling
            .enter(payment_id)
            .ok_or(E::AlreadyReconciling(payment_id))
            .map_err(tracerr::wrap!())?;

        let deadline = Instant::now() + BUDGET;
        let mut ticks = time::interval(POLL_INTERVAL);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    log::debug!(
                        "Reconciliation of `Payment(id: {payment_id})` is \
                         cancelled",
                    );
                    return Ok(Outcome::Cancelled);
                }
                () = time::sleep_until(deadline) => {
                    log::info!(
                        "`Payment(id: {payment_id})` hasn't resolved in \
                         {BUDGET:?}",
                    );
                    return Err(tracerr::new!(E::PaymentTimeout(payment_id)));
                }
                _ = ticks.tick() => {}
            }

            let payment = self
                .database()
                .execute(Select(By::<Option<Payment>, _>::new(payment_id)))
                .await
                .map_err(tracerr::map_from_and_wrap!(=> E))?
                .ok_or(E::PaymentNotExists(payment_id))
                .map_err(tracerr::wrap!())?;

            match payment.status {
                payment::Status::Pending => {}
                payment::Status::Completed => {
                    return self
                        .execute(FinalizePayment { payment_id })
                        .await
                        .map(Outcome::Completed)
                        .map_err(tracerr::map_from_and_wrap!(=> E));
                }
                payment::Status::Failed => {
                    let reason = payment
                        .decline_reason()
                        .unwrap_or(payment::DeclineReason::InvalidRequest);
                    log::warn!(
                        "`Payment(id: {payment_id})` is declined: {reason}",
                    );
                    return Err(tracerr::new!(E::PaymentDeclined(reason)));
                }
            }
        }
    }
}

/// Set of [`Payment`]s being reconciled at the moment.
#[derive(Clone, Debug, Default)]
pub struct InFlight(Arc<Mutex<HashSet<payment::Id>>>);

impl InFlight {
    /// Marks the [`Payment`] with the provided ID as being reconciled, until
    /// the returned [`Flight`] is dropped.
    ///
    /// [`None`] if it's being reconciled already.
    fn enter(&self, id: payment::Id) -> Option<Flight> {
        self.ids().insert(id).then(|| Flight {
            set: self.clone(),
            id,
        })
    }

    /// Indicates whether the [`Payment`] with the provided ID is being
    /// reconciled at the moment.
    pub(crate) fn contains(&self, id: payment::Id) -> bool {
        self.ids().contains(&id)
    }

    /// Returns the IDs of the [`Payment`]s being reconciled.
    fn ids(&self) -> MutexGuard<'_, HashSet<payment::Id>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reconciliation of a [`Payment`] in flight.
#[derive(Debug)]
struct Flight {
    /// [`InFlight`] set this [`Flight`] belongs to.
    set: InFlight,

    /// ID of the reconciled [`Payment`].
    id: payment::Id,
}

impl Drop for Flight {
    fn drop(&mut self) {
        _ = self.set.ids().remove(&self.id);
    }
}

/// Error of [`ReconcilePayment`] [`Task`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Payment`] with the provided ID doesn't exist.
    #[display("`Payment(id: {_0})` doesn't exist")]
    PaymentNotExists(#[error(not(source))] payment::Id),

    /// [`Payment`] is being reconciled already.
    #[display("`Payment(id: {_0})` is being reconciled already")]
    AlreadyReconciling(#[error(not(source))] payment::Id),

    /// [`Payment`] is declined.
    #[display("Payment declined: {_0}")]
    PaymentDeclined(#[error(not(source))] payment::DeclineReason),

    /// [`Payment`] hasn't reached a terminal status in time.
    #[display("`Payment(id: {_0})` timed out")]
    PaymentTimeout(#[error(not(source))] payment::Id),

    /// Completed [`Payment`] couldn't be finalized.
    #[display("Failed to finalize `Payment`: {_0}")]
    #[from]
    Finalization(finalize_payment::ExecutionError),
}

impl ExecutionError {
    /// Indicates whether the reconciled [`Payment`] may be retried.
    ///
    /// Expired [`Payment`]s are never retried, so their decline isn't
    /// retryable either.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::PaymentDeclined(reason) => {
                !matches!(reason, payment::DeclineReason::Expired)
            }
            Self::PaymentTimeout(_) => true,
            Self::Db(_)
            | Self::PaymentNotExists(_)
            | Self::AlreadyReconciling(_)
            | Self::Finalization(_) => false,
        }
    }
}
