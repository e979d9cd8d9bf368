//! GraphQL [`Subscription`]s definitions.

use common::operations::Perform;
use futures::{
    future,
    stream::{self, BoxStream},
    StreamExt as _,
};
use juniper::graphql_subscription;
use service::{task, Task as _};
use tokio_util::sync::CancellationToken;

use crate::{api, AsError as _, Context, Error};

/// Root of all GraphQL subscription.
#[derive(Clone, Copy, Debug)]
pub struct Subscription;

#[graphql_subscription(context = Context)]
impl Subscription {
    /// Subscription awaiting the outcome of the pending `Payment`.
    ///
    /// Yields the confirmed `Booking` once the `Payment` completes, and ends.
    /// Unsubscribing stops awaiting, leaving the `Payment` as-is.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `PAYMENT_NOT_EXISTS` - the `Payment` with the specified ID does not
    ///                          exist;
    /// - `PAYMENT_ALREADY_RECONCILING` - the `Payment` is awaited by another
    ///                                   subscription;
    /// - `PAYMENT_DECLINED` - the `Payment` is declined, may be retried;
    /// - `PAYMENT_TIMEOUT` - the `Payment` wasn't confirmed in time, may be
    ///                       retried;
    /// - `PAYMENT_EXPIRED` - the `Payment` stayed pending for too long, a new
    ///                       reservation is required;
    /// - `INSUFFICIENT_CAPACITY`, `FACILITY_CONFLICT` - the reservation was
    ///   taken by someone else while the `Payment` was pending.
    pub async fn payment_outcome(
        &self,
        payment_id: api::payment::Id,
        ctx: &Context,
    ) -> Result<BoxStream<'static, Result<api::Booking, Error>>, Error> {
        let service = ctx.service().clone();
        let cancel = CancellationToken::new();
        let guard = cancel.clone().drop_guard();

        Ok(stream::once(async move {
            let _guard = guard;
            service
                .execute(Perform(task::ReconcilePayment {
                    payment_id: payment_id.into(),
                    cancel,
                }))
                .await
        })
        .filter_map(|outcome| {
            future::ready(match outcome {
                Ok(task::Outcome::Completed(booking)) => {
                    Some(Ok(api::Booking::from(booking)))
                }
                Ok(task::Outcome::Cancelled) => None,
                Err(e) => {
                    tracing::debug!("`paymentOutcome` failed: {e}");
                    Some(Err(e.into_error()))
                }
            })
        })
        .boxed())
    }
}
