//! Advisory availability [`Query`]s.
//!
//! Served through a read-through [`Cache`], so may lag behind concurrent
//! reservations. Never used to admit a reservation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use common::{
    operations::{By, Select},
    Date, DateRange,
};
use derive_more::{Display, Error, From};
use tokio::time::Instant;
use tracerr::Traced;

use crate::{
    domain::{item, Item},
    infra::{database, Database},
    read::{
        capacity::{BookedSlots, SlotAvailability},
        overlap::{Conflict, Holds},
        Availability,
    },
    Service,
};

use super::Query;

/// [`Query`] of the [`SlotAvailability`] of a slot-based [`Item`] on a
/// [`Date`].
#[derive(Clone, Copy, Debug)]
pub struct Slots {
    /// ID of the [`Item`].
    pub item_id: item::Id,

    /// [`Date`] to check.
    pub date: Date,
}

/// [`Query`] of a [`Conflict`] of an [`item::Facility`] for a [`DateRange`],
/// if any.
#[derive(Clone, Debug)]
pub struct Facility {
    /// ID of the [`Item`].
    pub item_id: item::Id,

    /// Name of the [`item::Facility`].
    pub facility: item::FacilityName,

    /// [`DateRange`] to check.
    pub range: DateRange,
}

impl<Db, Gw> Query<Slots> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Item>, item::Id>>,
            Ok = Option<Item>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<BookedSlots, (item::Id, Date)>>,
            Ok = BookedSlots,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Holds, item::Id>>,
            Ok = Holds,
            Err = Traced<database::Error>,
        >,
{
    type Ok = SlotAvailability;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        Slots { item_id, date }: Slots,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let item = self
            .database()
            .execute(Select(By::<Option<Item>, _>::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(item_id))
            .map_err(tracerr::wrap!())?;

        match self
            .cached_availability(&item, date)
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
        {
            Availability::Slots(slots) => Ok(slots),
            Availability::Facilities(_) => {
                Err(tracerr::new!(E::NotSlotBased(item_id)))
            }
        }
    }
}

impl<Db, Gw> Query<Facility> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<Item>, item::Id>>,
            Ok = Option<Item>,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<BookedSlots, (item::Id, Date)>>,
            Ok = BookedSlots,
            Err = Traced<database::Error>,
        > + Database<
            Select<By<Holds, item::Id>>,
            Ok = Holds,
            Err = Traced<database::Error>,
        >,
{
    type Ok = Option<Conflict>;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        Facility {
            item_id,
            facility,
            range,
        }: Facility,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let item = self
            .database()
            .execute(Select(By::<Option<Item>, _>::new(item_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::ItemNotExists(item_id))
            .map_err(tracerr::wrap!())?;
        if !matches!(item.capacity, item::Capacity::Facilities { .. }) {
            return Err(tracerr::new!(E::NotFacilityBased(item_id)));
        }
        let facility = item
            .facility(&facility)
            .ok_or_else(|| E::FacilityNotExists(facility.clone()))
            .map_err(tracerr::wrap!())?;

        match self
            .cached_availability(&item, range.start())
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
        {
            Availability::Facilities(holds) => {
                Ok(holds.conflict(facility, range))
            }
            Availability::Slots(_) => {
                Err(tracerr::new!(E::NotFacilityBased(item_id)))
            }
        }
    }
}

impl<Db, Gw> Service<Db, Gw> {
    /// Returns the advisory [`Availability`] of the provided [`Item`] on the
    /// `date`, reading through the [`Cache`].
    pub(crate) async fn cached_availability(
        &self,
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
        if let Some(availability) = self
            .availability
            .get(Key::of(item, date))
            .and_then(|s| s.availability_of(item))
        {
            return Ok(availability);
        }

        Ok(match &item.capacity {
            item::Capacity::Slots { total } => {
                let booked = self
                    .database()
                    .execute(Select(By::<BookedSlots, _>::new((item.id, date))))
                    .await
                    .map_err(tracerr::wrap!())?;
                self.availability
                    .put(Key::Slots(item.id, date), Snapshot::Slots(booked));
                SlotAvailability {
                    total: *total,
                    booked,
                }
                .into()
            }
            item::Capacity::Facilities { .. } => {
                let holds = self
                    .database()
                    .execute(Select(By::<Holds, _>::new(item.id)))
                    .await
                    .map_err(tracerr::wrap!())?;
                self.availability
                    .put(Key::Holds(item.id), Snapshot::Holds(holds.clone()));
                holds.into()
            }
        })
    }
}

/// Read-through cache of availability snapshots.
#[derive(Clone, Debug)]
pub struct Cache {
    /// Time an entry stays fresh for.
    ttl: Duration,

    /// Cached entries.
    entries: Arc<Mutex<HashMap<Key, Entry>>>,
}

impl Cache {
    /// Creates a new empty [`Cache`] keeping entries fresh for the provided
    /// `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Drops all the cached entries of the [`Item`] with the provided ID.
    pub fn invalidate(&self, item_id: item::Id) {
        self.entries().retain(|key, _| key.item_id() != item_id);
    }

    /// Returns the fresh [`Snapshot`] cached under the provided [`Key`], if
    /// any.
    fn get(&self, key: Key) -> Option<Snapshot> {
        let mut entries = self.entries();
        let entry = entries.get(&key)?;
        if entry.expires_at <= Instant::now() {
            drop(entries.remove(&key));
            return None;
        }
        Some(entry.snapshot.clone())
    }

    /// Caches the provided [`Snapshot`] under the [`Key`].
    ///
    /// Expired entries are swept away on each call, so keys which are never
    /// read again don't pile up.
    fn put(&self, key: Key, snapshot: Snapshot) {
        if self.ttl.is_zero() {
            return;
        }
        let now = Instant::now();
        let mut entries = self.entries();
        entries.retain(|_, e| e.expires_at > now);
        drop(entries.insert(
            key,
            Entry {
                snapshot,
                expires_at: now + self.ttl,
            },
        ));
    }

    /// Locks the entries of this [`Cache`].
    fn entries(&self) -> MutexGuard<'_, HashMap<Key, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Key of a [`Cache`] entry.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
enum Key {
    /// [`BookedSlots`] of a slot-based [`Item`] on a [`Date`].
    Slots(item::Id, Date),

    /// [`Holds`] of a facility-based [`Item`].
    Holds(item::Id),
}

impl Key {
    /// Returns the [`Key`] the availability of the provided [`Item`] on the
    /// `date` is cached under.
    fn of(item: &Item, date: Date) -> Self {
        match item.capacity {
            item::Capacity::Slots { .. } => Self::Slots(item.id, date),
            item::Capacity::Facilities { .. } => Self::Holds(item.id),
        }
    }

    /// Returns ID of the [`Item`] this [`Key`] belongs to.
    fn item_id(self) -> item::Id {
        match self {
            Self::Slots(id, _) | Self::Holds(id) => id,
        }
    }
}

/// Cached availability snapshot.
#[derive(Clone, Debug)]
enum Snapshot {
    /// [`BookedSlots`] on a [`Date`].
    Slots(BookedSlots),

    /// [`Holds`] of all the facilities.
    Holds(Holds),
}

impl Snapshot {
    /// Combines this [`Snapshot`] with the provided [`Item`] into its
    /// [`Availability`].
    ///
    /// [`None`] if this [`Snapshot`] was taken in a capacity mode the
    /// [`Item`] doesn't have.
    fn availability_of(self, item: &Item) -> Option<Availability> {
        match (self, &item.capacity) {
            (Self::Slots(booked), item::Capacity::Slots { total }) => Some(
                SlotAvailability {
                    total: *total,
                    booked,
                }
                .into(),
            ),
            (Self::Holds(holds), item::Capacity::Facilities { .. }) => {
                Some(holds.into())
            }
            (Self::Slots(_), item::Capacity::Facilities { .. })
            | (Self::Holds(_), item::Capacity::Slots { .. }) => None,
        }
    }
}

/// Cache entry.
#[derive(Debug)]
struct Entry {
    /// Cached [`Snapshot`].
    snapshot: Snapshot,

    /// [`Instant`] this [`Entry`] stops being fresh at.
    expires_at: Instant,
}

/// Error of an availability [`Query`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// [`Item`] with the provided ID doesn't exist.
    #[display("`Item(id: {_0})` doesn't exist")]
    ItemNotExists(#[error(not(source))] item::Id),

    /// [`Item`] is booked by facilities rather than by slots.
    #[display("`Item(id: {_0})` is not slot-based")]
    NotSlotBased(#[error(not(source))] item::Id),

    /// [`Item`] is booked by slots rather than by facilities.
    #[display("`Item(id: {_0})` is not facility-based")]
    NotFacilityBased(#[error(not(source))] item::Id),

    /// [`item::Facility`] with the provided name doesn't exist.
    #[display("`Facility({_0})` doesn't exist")]
    FacilityNotExists(#[error(not(source))] item::FacilityName),
}

#[cfg(test)]
mod spec {
    use std::{str::FromStr as _, time::Duration};

    use common::{money::Currency, Date};

    use crate::{
        domain::{item, Item},
        read::capacity::BookedSlots,
    };

    use super::{Cache, Key, Snapshot};

    #[tokio::test(start_paused = true)]
    async fn expires_and_invalidates_entries() {
        let cache = Cache::new(Duration::from_secs(5));
        let (one, other) = (item::Id::new(), item::Id::new());
        let date = Date::from_str("2024-06-01").unwrap();

        cache.put(Key::Slots(one, date), Snapshot::Slots(BookedSlots(3)));
        cache.put(Key::Holds(other), Snapshot::Holds(Default::default()));
        assert!(matches!(
            cache.get(Key::Slots(one, date)),
            Some(Snapshot::Slots(BookedSlots(3))),
        ));

        cache.invalidate(one);
        assert!(cache.get(Key::Slots(one, date)).is_none());
        assert!(cache.get(Key::Holds(other)).is_some());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(cache.get(Key::Holds(other)).is_none());
    }

    #[test]
    fn zero_ttl_disables_caching() {
        let cache = Cache::new(Duration::ZERO);
        let id = item::Id::new();

        cache.put(Key::Holds(id), Snapshot::Holds(Default::default()));
        assert!(cache.get(Key::Holds(id)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn sweeps_expired_entries_on_put() {
        let cache = Cache::new(Duration::from_secs(5));
        let id = item::Id::new();
        let start = Date::from_str("2024-06-01").unwrap();

        for days in 0..1000 {
            let date = start.add_days(days).unwrap();
            cache.put(Key::Slots(id, date), Snapshot::Slots(BookedSlots(1)));
        }
        assert_eq!(cache.entries().len(), 1000);

        tokio::time::advance(Duration::from_secs(3600)).await;
        cache.put(Key::Holds(id), Snapshot::Holds(Default::default()));
        assert_eq!(cache.entries().len(), 1);
    }

    #[test]
    fn ignores_snapshot_of_other_capacity_mode() {
        let item = Item {
            id: item::Id::new(),
            host_id: item::HostId::new(),
            kind: item::Kind::Trip,
            name: item::Name::new("Mount Longonot climb").unwrap(),
            currency: Currency::Kes,
            entrance: item::Entrance::Free,
            capacity: item::Capacity::Slots { total: 4 },
            activities: vec![],
            visit: item::Visit::Flexible { horizon_days: 30 },
        };

        let holds = Snapshot::Holds(Default::default());
        assert!(holds.availability_of(&item).is_none());

        let slots = Snapshot::Slots(BookedSlots(1));
        assert!(slots.availability_of(&item).is_some());
    }
}
