//! [`Command`] definition.

pub mod award_commission;
pub mod create_manual_entry;
pub mod finalize_payment;
pub mod resolve_payment;
pub mod retry_payment;
pub mod submit_reservation;

use common::{
    operations::{By, Select},
    Date,
};
use tracerr::Traced;

use crate::{
    domain::{item, Item, Payment},
    infra::{database, gateway::Charge, Database},
    read::{
        capacity::{BookedSlots, SlotAvailability},
        overlap::Holds,
        Availability,
    },
};

/// [`Command`] of the [`Service`].
///
/// [`Service`]: crate::Service
pub use common::Handler as Command;

pub use self::{
    award_commission::AwardCommission,
    create_manual_entry::CreateManualEntry,
    finalize_payment::FinalizePayment, resolve_payment::ResolvePayment,
    retry_payment::RetryPayment,
    submit_reservation::{SubmitReservation, Submission},
};

/// Reads the authoritative [`Availability`] of the provided [`Item`] on the
/// `date` from the [`Database`].
///
/// Meant to be called within a transaction holding the [`Item`] lock, right
/// before a reservation is written.
async fn recheck<Db>(
    db: &Db,
    item: &Item,
    date: Date,
) -> Result<Availability, Traced<database::Error>>
where
    Db: Database<
            Select<By<BookedSlots, (item::Id, Date)>>,
            Ok = BookedSlots,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Holds, item::Id>>,
            Ok = Holds,
            Err = Traced<database::Error>,
        >,
{
    Ok(match item.capacity {
        item::Capacity::Slots { total } => SlotAvailability {
            total,
            booked: db
                .execute(Select(By::<BookedSlots, _>::new((item.id, date))))
                .await
                .map_err(tracerr::wrap!())?,
        }
        .into(),
        item::Capacity::Facilities { .. } => db
            .execute(Select(By::<Holds, _>::new(item.id)))
            .await
            .map_err(tracerr::wrap!())?
            .into(),
    })
}

/// Builds the gateway [`Charge`] of the provided [`Payment`] for the [`Item`].
fn charge(payment: &Payment, item: &Item) -> Charge {
    Charge {
        payment_id: payment.id,
        phone: payment.phone.clone(),
        amount: payment.amount,
        reference: item.name.to_string(),
        description: format!("Booking {}", item.name),
    }
}
