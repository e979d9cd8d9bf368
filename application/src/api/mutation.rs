//! GraphQL [`Mutation`]s definitions.

use juniper::graphql_object;
use service::{command, domain::booking, Command as _};

use crate::{api, AsError, Context, Error};

/// Root of all GraphQL mutations.
#[derive(Clone, Copy, Debug)]
pub struct Mutation;

impl Mutation {
    /// Name of the [`tracing::Span`] for the mutations.
    const SPAN_NAME: &'static str = "GraphQL mutation";
}

#[graphql_object(context = Context)]
impl Mutation {
    /// Submits a reservation of the `Item`.
    ///
    /// A free reservation is confirmed right away, while a paid one awaits
    /// its `Payment`, initiated with the provided `PaymentMethod`. Use the
    /// `paymentOutcome` subscription to await the `Booking` then.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `ITEM_NOT_EXISTS` - the `Item` with the specified ID does not exist;
    /// - `INVALID_RESERVATION` - the reservation doesn't fit the `Item`;
    /// - `NEGATIVE_COUNT` - a participants count is negative;
    /// - `DATE_OUT_OF_POLICY` - the requested date is not bookable;
    /// - `INSUFFICIENT_CAPACITY` - not enough slots are left;
    /// - `FACILITY_CONFLICT` - a requested facility is taken already;
    /// - `PAYMENT_METHOD_UNSUPPORTED` - the `PaymentMethod` is not available;
    /// - `PAYMENT_INITIATION_FAILED` - the payment provider rejected the
    ///                                 charge.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "submitReservation",
            item_id = %item_id,
            method = ?method,
            otel.name = Self::SPAN_NAME,
            referral = ?referral,
        ),
    )]
    pub async fn submit_reservation(
        item_id: api::item::Id,
        reservation: api::booking::ReservationInput,
        guest: api::booking::GuestInput,
        method: api::payment::PaymentMethod,
        referral: Option<api::booking::ReferralCode>,
        ctx: &Context,
    ) -> Result<api::booking::Submission, Error> {
        let request: booking::Request =
            reservation.try_into().map_err(ctx.error())?;
        let payer = guest.into_payer(ctx.user_id().await?);

        ctx.service()
            .execute(command::SubmitReservation {
                item_id: item_id.into(),
                request,
                payer,
                method: method.into(),
                referral: referral.map(Into::into),
            })
            .await
            .map(Into::into)
            .map_err(AsError::into_error)
            .map_err(ctx.error())
    }

    /// Records a reservation of the `Item` made by its host directly,
    /// bypassing payment.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `HOST_REQUIRED` - the request is not performed by a host;
    /// - `NOT_ITEM_HOST` - the host doesn't host the `Item`;
    /// - `ITEM_NOT_EXISTS` - the `Item` with the specified ID does not exist;
    /// - `INVALID_RESERVATION` - the reservation doesn't fit the `Item`;
    /// - `NEGATIVE_COUNT` - a participants count is negative;
    /// - `DATE_OUT_OF_POLICY` - the requested date is not bookable;
    /// - `INSUFFICIENT_CAPACITY` - not enough slots are left;
    /// - `FACILITY_CONFLICT` - a requested facility is taken already.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "createManualEntry",
            item_id = %item_id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn create_manual_entry(
        item_id: api::item::Id,
        reservation: api::booking::ReservationInput,
        guest: api::booking::GuestInput,
        ctx: &Context,
    ) -> Result<api::booking::ManualEntry, Error> {
        let host_id = ctx.host_id().await?;
        let request: booking::Request =
            reservation.try_into().map_err(ctx.error())?;

        ctx.service()
            .execute(command::CreateManualEntry {
                item_id: item_id.into(),
                host_id,
                request,
                guest: guest.into_payer(None),
            })
            .await
            .map(Into::into)
            .map_err(AsError::into_error)
            .map_err(ctx.error())
    }

    /// Charges the failed or stuck `Payment` once again.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `PAYMENT_NOT_EXISTS` - the `Payment` with the specified ID does not
    ///                          exist;
    /// - `PAYMENT_ALREADY_RECONCILING` - the `Payment` is being awaited at the
    ///                                   moment;
    /// - `PAYMENT_ALREADY_COMPLETED` - the `Payment` is completed already;
    /// - `PAYMENT_EXPIRED` - the `Payment` is too old to be retried;
    /// - `PAYMENT_INITIATION_FAILED` - the payment provider rejected the
    ///                                 charge.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "retryPayment",
            otel.name = Self::SPAN_NAME,
            payment_id = %payment_id,
        ),
    )]
    pub async fn retry_payment(
        payment_id: api::payment::Id,
        ctx: &Context,
    ) -> Result<api::Payment, Error> {
        ctx.service()
            .execute(command::RetryPayment {
                payment_id: payment_id.into(),
            })
            .await
            .map(Into::into)
            .map_err(AsError::into_error)
            .map_err(ctx.error())
    }
}
