//! In-memory [`Database`] implementation.
//!
//! Mirrors the transactional semantics of [`Postgres`]: writes of a [`Tx`]
//! are buffered until [`Commit`], [`Lock`]s are held until the [`Tx`] is
//! committed or dropped, and uniqueness constraints are checked on commit.
//!
//! [`Postgres`]: crate::infra::Postgres

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
};

use common::{
    operations::{By, Commit, Insert, Lock, Select, Transact, Update},
    Date,
};
use derive_more::{Display, Error as StdError};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracerr::Traced;

use crate::{
    domain::{
        booking, item, manual_entry, payment, referral, Booking, Commission,
        Item, ManualEntry, Payment,
    },
    infra::{database, Database},
    read::{capacity::BookedSlots, overlap::Holds},
};

/// In-memory [`Database`] client.
#[derive(Clone, Debug, Default)]
pub struct Memory<T = NonTx> {
    /// Shared [`State`] of all the clients.
    state: Arc<State>,

    /// Client kind.
    client: T,
}

/// Non-transactional [`Memory`] client applying writes immediately.
#[derive(Clone, Copy, Debug, Default)]
pub struct NonTx;

/// Transactional [`Memory`] client.
#[derive(Clone, Debug, Default)]
pub struct Tx(Arc<TxState>);

/// Shared state of [`Memory`] clients.
#[derive(Debug, Default)]
struct State {
    /// Committed [`Tables`].
    tables: Mutex<Tables>,

    /// Row locks.
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,

    /// Indicator whether every operation should fail.
    unavailable: AtomicBool,
}

impl State {
    /// Returns the committed [`Tables`].
    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fails if this [`State`] is marked unavailable.
    fn check(&self) -> Result<(), Traced<database::Error>> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(tracerr::new!(database::Error::from(
                Error::Unavailable
            )));
        }
        Ok(())
    }
}

/// State of a single [`Tx`].
#[derive(Debug, Default)]
struct TxState {
    /// Writes buffered until [`Commit`].
    pending: Mutex<Vec<Write>>,

    /// Held row locks.
    guards: Mutex<HashMap<Key, OwnedMutexGuard<()>>>,
}

/// Key of a row lock.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Key {
    /// [`Item`] row.
    Item(item::Id),

    /// [`Payment`] row.
    Payment(payment::Id),
}

/// All the stored records.
#[derive(Clone, Debug, Default)]
struct Tables {
    /// [`Item`]s.
    items: HashMap<item::Id, Item>,

    /// [`referral::Referrer`]s.
    referrers: HashMap<referral::Code, referral::Referrer>,

    /// [`Booking`]s.
    bookings: HashMap<booking::Id, Booking>,

    /// [`ManualEntry`]s.
    entries: HashMap<manual_entry::Id, ManualEntry>,

    /// [`Payment`]s.
    payments: HashMap<payment::Id, Payment>,

    /// [`Commission`]s.
    commissions: Vec<Commission>,
}

/// Buffered write.
#[derive(Clone, Debug)]
enum Write {
    /// Insert of a [`Booking`].
    Booking(Booking),

    /// Insert of a [`ManualEntry`].
    ManualEntry(ManualEntry),

    /// Upsert of a [`Payment`].
    Payment(Payment),

    /// Insert of a [`Commission`], ignored if the [`Booking`] already has one.
    Commission(Commission),
}

impl Write {
    /// Applies this [`Write`] to the provided [`Tables`].
    fn apply(self, tables: &mut Tables) -> Result<(), Error> {
        match self {
            Self::Booking(booking) => {
                if booking.payment_id.is_some()
                    && tables.bookings.values().any(|b| {
                        b.id != booking.id && b.payment_id == booking.payment_id
                    })
                {
                    return Err(Error::UniqueViolation(
                        "bookings_payment_id_key",
                    ));
                }
                drop(tables.bookings.insert(booking.id, booking));
            }
            Self::ManualEntry(entry) => {
                drop(tables.entries.insert(entry.id, entry));
            }
            Self::Payment(payment) => {
                if payment.checkout_id.is_some()
                    && tables.payments.values().any(|p| {
                        p.id != payment.id
                            && p.checkout_id == payment.checkout_id
                    })
                {
                    return Err(Error::UniqueViolation(
                        "payments_checkout_id_key",
                    ));
                }
                drop(tables.payments.insert(payment.id, payment));
            }
            Self::Commission(commission) => {
                if !tables
                    .commissions
                    .iter()
                    .any(|c| c.booking_id == commission.booking_id)
                {
                    tables.commissions.push(commission);
                }
            }
        }
        Ok(())
    }
}

/// Client of a [`Memory`] database.
pub trait Client {
    /// Returns the [`Tx`] of this [`Client`], if it's transactional.
    fn tx(&self) -> Option<&Tx>;
}

impl Client for NonTx {
    fn tx(&self) -> Option<&Tx> {
        None
    }
}

impl Client for Tx {
    fn tx(&self) -> Option<&Tx> {
        Some(self)
    }
}

impl Tx {
    /// Returns the buffered [`Write`]s of this [`Tx`].
    fn pending(&self) -> MutexGuard<'_, Vec<Write>> {
        self.0.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the row locks held by this [`Tx`].
    fn guards(&self) -> MutexGuard<'_, HashMap<Key, OwnedMutexGuard<()>>> {
        self.0.guards.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: Client> Memory<C> {
    /// Reads the [`Tables`] visible to this client.
    fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let Some(tx) = self.client.tx() else {
            return f(&self.state.tables());
        };

        let pending = tx.pending();
        let tables = self.state.tables();
        if pending.is_empty() {
            return f(&tables);
        }

        // Own writes are visible inside the transaction.
        let mut view = tables.clone();
        drop(tables);
        for w in pending.iter().cloned() {
            _ = w.apply(&mut view);
        }
        f(&view)
    }

    /// Performs the provided [`Write`]: immediately, or on [`Commit`] of the
    /// [`Tx`].
    fn write(&self, write: Write) -> Result<(), Traced<database::Error>> {
        self.state.check()?;
        if let Some(tx) = self.client.tx() {
            tx.pending().push(write);
            return Ok(());
        }
        write
            .apply(&mut self.state.tables())
            .map_err(tracerr::from_and_wrap!(=> database::Error))
    }
}

impl Memory {
    /// Creates a new empty [`Memory`] database.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent operation fail (or succeed again), imitating an
    /// unreachable store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.unavailable.store(unavailable, Ordering::Release);
    }

    /// Returns all the committed [`Booking`]s.
    #[must_use]
    pub fn bookings(&self) -> Vec<Booking> {
        self.state.tables().bookings.values().cloned().collect()
    }

    /// Returns all the committed [`ManualEntry`]s.
    #[must_use]
    pub fn manual_entries(&self) -> Vec<ManualEntry> {
        self.state.tables().entries.values().cloned().collect()
    }

    /// Returns all the committed [`Commission`]s.
    #[must_use]
    pub fn commissions(&self) -> Vec<Commission> {
        self.state.tables().commissions.clone()
    }
}

impl Memory<Tx> {
    /// Takes a row lock with the provided [`Key`] until this [`Tx`] ends.
    async fn lock(&self, key: Key) {
        if self.client.guards().contains_key(&key) {
            return;
        }
        let row = Arc::clone(
            self.state
                .locks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .entry(key)
                .or_default(),
        );
        let guard = row.lock_owned().await;
        drop(self.client.guards().insert(key, guard));
    }
}

/// [`Memory`] database error.
#[derive(Clone, Copy, Debug, Display, StdError, Eq, PartialEq)]
pub enum Error {
    /// [`Memory`] database is marked unavailable.
    #[display("`Memory` database is unavailable")]
    Unavailable,

    /// Uniqueness constraint is violated.
    #[display("unique constraint `{_0}` is violated")]
    UniqueViolation(#[error(not(source))] &'static str),
}

impl Error {
    /// Checks if the error is a unique violation of the specified constraint.
    #[must_use]
    pub fn is_unique_violation(&self, constraint: Option<&str>) -> bool {
        match self {
            Self::UniqueViolation(c) => constraint.map_or(true, |n| n == *c),
            Self::Unavailable => false,
        }
    }
}

impl Database<Transact> for Memory<NonTx> {
    type Ok = Memory<Tx>;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        Ok(Memory {
            state: Arc::clone(&self.state),
            client: Tx::default(),
        })
    }
}

impl Database<Transact> for Memory<Tx> {
    type Ok = Self;
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Transact) -> Result<Self::Ok, Self::Err> {
        Ok(self.clone())
    }
}

impl Database<Commit> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(&self, _: Commit) -> Result<Self::Ok, Self::Err> {
        let pending = std::mem::take(&mut *self.client.pending());
        let applied = self.state.check().and_then(|()| {
            let mut tables = self.state.tables();
            let mut staged = tables.clone();
            for w in pending {
                w.apply(&mut staged).map_err(|e| {
                    tracerr::new!(database::Error::from(e))
                })?;
            }
            *tables = staged;
            Ok(())
        });
        self.client.guards().clear();
        applied
    }
}

impl Database<Insert<Item>> for Memory<NonTx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(item): Insert<Item>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        drop(self.state.tables().items.insert(item.id, item));
        Ok(())
    }
}

impl Database<Insert<referral::Referrer>> for Memory<NonTx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(referrer): Insert<referral::Referrer>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        drop(
            self.state
                .tables()
                .referrers
                .insert(referrer.code.clone(), referrer),
        );
        Ok(())
    }
}

impl<C: Client> Database<Select<By<Option<Item>, item::Id>>> for Memory<C> {
    type Ok = Option<Item>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Item>, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let id = by.into_inner();
        Ok(self.read(|t| t.items.get(&id).cloned()))
    }
}

impl Database<Lock<By<Item, item::Id>>> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Item, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        self.lock(Key::Item(by.into_inner())).await;
        Ok(())
    }
}

impl<C: Client> Database<Select<By<BookedSlots, (item::Id, Date)>>>
    for Memory<C>
{
    type Ok = BookedSlots;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<BookedSlots, (item::Id, Date)>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let (item_id, date) = by.into_inner();
        Ok(self.read(|t| {
            BookedSlots::tally(
                item_id,
                date,
                t.bookings.values(),
                t.entries.values(),
            )
        }))
    }
}

impl<C: Client> Database<Select<By<Holds, item::Id>>> for Memory<C> {
    type Ok = Holds;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Holds, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let item_id = by.into_inner();
        Ok(self.read(|t| {
            Holds::collect(
                t.bookings.values().filter(|b| b.item_id == item_id),
                t.entries.values().filter(|e| e.item_id == item_id),
            )
        }))
    }
}

impl<C: Client> Database<Insert<Booking>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(booking): Insert<Booking>,
    ) -> Result<Self::Ok, Self::Err> {
        self.write(Write::Booking(booking))
    }
}

impl<C: Client> Database<Select<By<Option<Booking>, booking::Id>>>
    for Memory<C>
{
    type Ok = Option<Booking>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Booking>, booking::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let id = by.into_inner();
        Ok(self.read(|t| t.bookings.get(&id).cloned()))
    }
}

impl<C: Client> Database<Insert<ManualEntry>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<ManualEntry>,
    ) -> Result<Self::Ok, Self::Err> {
        self.write(Write::ManualEntry(entry))
    }
}

impl<C: Client> Database<Insert<Payment>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.write(Write::Payment(payment))
    }
}

impl<C: Client> Database<Update<Payment>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(payment): Update<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.write(Write::Payment(payment))
    }
}

impl<C: Client> Database<Select<By<Option<Payment>, payment::Id>>>
    for Memory<C>
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let id = by.into_inner();
        Ok(self.read(|t| t.payments.get(&id).cloned()))
    }
}

impl<C: Client> Database<Select<By<Option<Payment>, payment::CheckoutId>>>
    for Memory<C>
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::CheckoutId>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let checkout_id = by.into_inner();
        Ok(self.read(|t| {
            t.payments
                .values()
                .find(|p| p.checkout_id.as_ref() == Some(&checkout_id))
                .cloned()
        }))
    }
}

impl Database<Lock<By<Payment, payment::Id>>> for Memory<Tx> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Payment, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        self.lock(Key::Payment(by.into_inner())).await;
        Ok(())
    }
}

impl Database<Update<payment::Resolution>> for Memory<NonTx> {
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(resolution): Update<payment::Resolution>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let status = resolution.status();
        let payment::Resolution {
            checkout_id,
            result_code,
            result_description,
            resolved_at,
        } = resolution;

        let mut tables = self.state.tables();
        let Some(payment) = tables.payments.values_mut().find(|p| {
            p.checkout_id.as_ref() == Some(&checkout_id)
                && p.status == payment::Status::Pending
        }) else {
            return Ok(false);
        };
        payment.status = status;
        payment.result_code = Some(result_code);
        payment.result_description = Some(result_description);
        payment.updated_at = resolved_at;
        Ok(true)
    }
}

impl Database<Update<payment::Expiration>> for Memory<NonTx> {
    type Ok = u64;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(expiration): Update<payment::Expiration>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let payment::Expiration {
            created_before,
            expired_at,
        } = expiration;

        let mut expired = 0;
        for p in self.state.tables().payments.values_mut() {
            if p.status == payment::Status::Pending
                && p.created_at < created_before
            {
                p.status = payment::Status::Failed;
                p.result_code = None;
                p.result_description = Some(Payment::EXPIRED.to_owned());
                p.updated_at = expired_at;
                expired += 1;
            }
        }
        Ok(expired)
    }
}

impl<C: Client>
    Database<Select<By<Option<referral::Referrer>, referral::Code>>>
    for Memory<C>
{
    type Ok = Option<referral::Referrer>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<referral::Referrer>, referral::Code>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let code = by.into_inner();
        Ok(self.read(|t| t.referrers.get(&code).cloned()))
    }
}

impl<C: Client> Database<Insert<Commission>> for Memory<C> {
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(commission): Insert<Commission>,
    ) -> Result<Self::Ok, Self::Err> {
        self.write(Write::Commission(commission))
    }
}

impl<C: Client> Database<Select<By<Option<Commission>, booking::Id>>>
    for Memory<C>
{
    type Ok = Option<Commission>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Commission>, booking::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        self.state.check()?;
        let booking_id = by.into_inner();
        Ok(self.read(|t| {
            t.commissions
                .iter()
                .find(|c| c.booking_id == booking_id)
                .cloned()
        }))
    }
}
