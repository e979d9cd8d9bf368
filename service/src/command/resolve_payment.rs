//! [`Command`] for applying a charge resolution reported by the payment
//! gateway.

use common::operations::{By, Select, Update};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{payment, Booking, Payment},
    infra::{database, Database},
    Event, Service,
};

use super::{finalize_payment, Command, FinalizePayment};

/// [`Command`] for applying a [`payment::Resolution`] reported by the payment
/// gateway.
///
/// Only a pending [`Payment`] is resolved, so duplicated deliveries are
/// no-ops. A completed [`Payment`] is finalized into a [`Booking`].
#[derive(Clone, Debug)]
pub struct ResolvePayment {
    /// [`payment::Resolution`] to apply.
    pub resolution: payment::Resolution,
}

impl<Db, Gw> Command<ResolvePayment> for Service<Db, Gw>
where
    Db: Database<
            Update<payment::Resolution>,
            Ok = bool,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Option<Payment>, payment::CheckoutId>>,
            Ok = Option<Payment>,
            Err = Traced<database::Error>,
        >,
    Self: Command<
        FinalizePayment,
        Ok = Booking,
        Err = Traced<finalize_payment::ExecutionError>,
    >,
{
    type Ok = Payment;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        ResolvePayment { resolution }: ResolvePayment,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let checkout_id = resolution.checkout_id.clone();
        let updated = self
            .database()
            .execute(Update(resolution))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        let mut payment = self
            .database()
            .execute(Select(By::<Option<Payment>, _>::new(
                checkout_id.clone(),
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::PaymentNotExists(checkout_id))
            .map_err(tracerr::wrap!())?;
        if !updated {
            log::debug!(
                "`Payment(id: {})` is already resolved as `{}`",
                payment.id,
                payment.status,
            );
        }

        match payment.status {
            payment::Status::Completed => {
                if payment.booking_id.is_none() {
                    let booking = self
                        .execute(FinalizePayment {
                            payment_id: payment.id,
                        })
                        .await
                        .map_err(tracerr::map_from_and_wrap!(=> E))?;
                    payment.booking_id = Some(booking.id);
                }
            }
            payment::Status::Failed => {
                if updated {
                    let reason = payment
                        .decline_reason()
                        .unwrap_or(payment::DeclineReason::InvalidRequest);
                    log::info!(
                        "`Payment(id: {})` is declined: {reason}",
                        payment.id,
                    );
                    self.emit(Event::PaymentFailed {
                        payment: payment.clone(),
                        reason,
                    });
                }
            }
            payment::Status::Pending => {}
        }

        Ok(payment)
    }
}

/// Error of [`ResolvePayment`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// No [`Payment`] is initiated with the provided [`payment::CheckoutId`].
    #[display("`Payment(checkout_id: {_0})` doesn't exist")]
    PaymentNotExists(#[error(not(source))] payment::CheckoutId),

    /// Completed [`Payment`] couldn't be finalized.
    #[display("Failed to finalize `Payment`: {_0}")]
    #[from]
    Finalization(finalize_payment::ExecutionError),
}
