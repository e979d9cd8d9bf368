//! GraphQL [`Query`]s definitions.

use common::{Date, DateRange};
use juniper::graphql_object;
use service::{query, Query as _};

use crate::{api, AsError, Context, Error};

/// Root of all GraphQL queries.
#[derive(Clone, Copy, Debug)]
pub struct Query;

impl Query {
    /// Name of the [`tracing::Span`] for the queries.
    pub(crate) const SPAN_NAME: &'static str = "GraphQL query";
}

#[graphql_object(context = Context)]
impl Query {
    /// Returns the advisory slot availability of the `Item` on the specified
    /// date.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `ITEM_NOT_EXISTS` - the `Item` with the specified ID does not exist;
    /// - `WRONG_CAPACITY_MODE` - the `Item` is booked by facilities, not by
    ///                           slots.
    #[tracing::instrument(
        skip_all,
        fields(
            date = %date,
            gql.name = "slotAvailability",
            item_id = %item_id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn slot_availability(
        item_id: api::item::Id,
        date: Date,
        ctx: &Context,
    ) -> Result<api::item::SlotAvailability, Error> {
        ctx.service()
            .execute(query::availability::Slots {
                item_id: item_id.into(),
                date,
            })
            .await
            .map(Into::into)
            .map_err(AsError::into_error)
            .map_err(ctx.error())
    }

    /// Returns the advisory availability of the named facility of the `Item`
    /// for the specified range of dates.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `ITEM_NOT_EXISTS` - the `Item` with the specified ID does not exist;
    /// - `FACILITY_NOT_EXISTS` - the `Item` has no such facility;
    /// - `INVERTED_DATE_RANGE` - the range ends before it starts.
    #[tracing::instrument(
        skip_all,
        fields(
            facility = %facility,
            gql.name = "facilityAvailability",
            item_id = %item_id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn facility_availability(
        item_id: api::item::Id,
        facility: api::item::FacilityName,
        range: api::item::DateRangeInput,
        ctx: &Context,
    ) -> Result<api::item::FacilityAvailability, Error> {
        let range: DateRange = range.try_into().map_err(ctx.error())?;
        ctx.service()
            .execute(query::availability::Facility {
                item_id: item_id.into(),
                facility: facility.into(),
                range,
            })
            .await
            .map(Into::into)
            .map_err(AsError::into_error)
            .map_err(ctx.error())
    }

    /// Returns the `Booking` with the specified ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `BOOKING_NOT_EXISTS` - the `Booking` with the specified ID does not
    ///                          exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "booking",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn booking(
        id: api::booking::Id,
        ctx: &Context,
    ) -> Result<api::Booking, Error> {
        ctx.service()
            .execute(query::booking::ById::by(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| api::booking::ReservationError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }

    /// Returns the `Payment` with the specified ID.
    ///
    /// # Errors
    ///
    /// Possible error codes:
    /// - `PAYMENT_NOT_EXISTS` - the `Payment` with the specified ID does not
    ///                          exist.
    #[tracing::instrument(
        skip_all,
        fields(
            gql.name = "payment",
            id = %id,
            otel.name = Self::SPAN_NAME,
        ),
    )]
    pub async fn payment(
        id: api::payment::Id,
        ctx: &Context,
    ) -> Result<api::Payment, Error> {
        ctx.service()
            .execute(query::payment::ById::by(id.into()))
            .await
            .map_err(AsError::into_error)
            .map_err(ctx.error())?
            .ok_or_else(|| api::payment::PaymentError::NotExists.into())
            .map_err(ctx.error())
            .map(Into::into)
    }
}
