//! [`Command`] for entering a reservation by a host directly.

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Transacted},
    Date, DateTime,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{
        booking::{self, request::Invalid},
        item::{self, DateOutOfPolicy},
        manual_entry, Item, ManualEntry,
    },
    infra::{database, Database},
    read::{
        capacity::{BookedSlots, InsufficientCapacity},
        overlap::{Conflict, Holds},
        Shortage,
    },
    Service,
};

use super::Command;

/// [`Command`] for entering a reservation by a host of an [`Item`] directly,
/// bypassing payment.
#[derive(Clone, Debug)]
pub struct CreateManualEntry {
    /// ID of the [`Item`] to reserve.
    pub item_id: item::Id,

    /// ID of the host entering the reservation.
    pub host_id: item::HostId,

    /// Requested [`booking::Request`].
    pub request: booking::Request,

    /// Contact of the guest.
    pub guest: booking::Payer,
}

impl<Db, Gw> Command<CreateManualEntry> for Service<Db, Gw>
where
    Db: Database<Transact, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Item>, item::Id>>,
            Ok = Option<Item>,
            Err = Traced<database::Error>,
        >,
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
        > + Database<Insert<ManualEntry>, Err = Traced<database::Error>>
        + Database<Commit, Err = Traced<database::Error>>,
{
    type Ok = ManualEntry;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: CreateManualEntry,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let CreateManualEntry {
            item_id,
            host_id,
            request,
            guest,
        } = cmd;

        let item = self
            .database()
            .execute(Select(By::<Option<Item>, _>::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(item_id))
            .map_err(tracerr::wrap!())?;
        if item.host_id != host_id {
            return Err(tracerr::new!(E::NotItemHost { item_id, host_id }));
        }
        if guest.name.is_none() {
            return Err(tracerr::new!(E::Validation(
                booking::ValidationError::MissingGuestName
            )));
        }

        let booking::Reservation {
            detail,
            visit_date,
            slots,
            ..
        } = request
            .validate(&item, Date::today())
            .map_err(E::from)
            .map_err(tracerr::wrap!())?;

        let tx = self
            .database()
            .execute(Transact)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?;

        tx.execute(Lock(By::new(item.id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        super::recheck(&tx, &item, visit_date)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .admit(&item, &detail)
            .map_err(E::from)
            .map_err(tracerr::wrap!())?;

        let entry = ManualEntry {
            id: manual_entry::Id::new(),
            item_id,
            host_id,
            status: booking::Status::Confirmed,
            slots,
            visit_date,
            detail,
            guest,
            created_at: DateTime::now().coerce(),
        };
        tx.execute(Insert(entry.clone()))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        tx.execute(Commit)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;
        self.availability.invalidate(item.id);

        log::info!(
            "`ManualEntry(id: {})` of `Item(id: {item_id})` entered by host \
             `{host_id}`",
            entry.id,
        );
        Ok(entry)
    }
}

/// Error of [`CreateManualEntry`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Item`] with the provided ID doesn't exist.
    #[display("`Item(id: {_0})` doesn't exist")]
    ItemNotExists(#[error(not(source))] item::Id),

    /// Host doesn't own the [`Item`].
    #[display("`{host_id}` is not a host of `Item(id: {item_id})`")]
    NotItemHost {
        /// ID of the [`Item`].
        item_id: item::Id,

        /// ID of the host.
        host_id: item::HostId,
    },

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
