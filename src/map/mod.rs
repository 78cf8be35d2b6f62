//! CowMap - A concurrently readable map with copy-on-write snapshots
//!
//! A [CowMap] can be used in place of a `RwLock<HashMap>`. Readers never
//! take a lock and never allocate: they load the currently published
//! snapshot and work against it. Writers never block readers either -
//! instead of serialising behind a mutex they copy the current snapshot,
//! apply their edit, and race to publish the result with a compare and
//! swap, retrying against the freshest snapshot if another writer got
//! there first.
//!
//! This makes the structure a good fit for read-dominated workloads such
//! as caches, routing tables and configuration maps that are refreshed
//! occasionally but consulted on every request. The trade is on the write
//! side: every mutation copies the whole map, so write cost grows with
//! the number of entries, and sustained write contention degrades to a
//! retry storm. If your workload writes as often as it reads, a
//! serialised-writer structure is the better tool.
//!
//! Retired snapshots are reclaimed with the crossbeam-epoch collector,
//! so a reader holding a point-in-time view only delays reclamation, it
//! never blocks a writer.

pub mod iter;

use crossbeam_epoch as epoch;
use crossbeam_epoch::{Guard, Owned};
use crossbeam_utils::Backoff;
use tracing::trace;

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::{BuildHasher, Hash};
use std::ops::ControlFlow;

use self::iter::{Iter, KeyIter, ValueIter};
use crate::internals::slot::SnapshotSlot;

#[cfg(feature = "serde")]
use serde::{
    de::{Deserialize, Deserializer},
    ser::{Serialize, SerializeMap, Serializer},
};

#[cfg(feature = "serde")]
use crate::utils::MapCollector;

#[cfg(feature = "ahash")]
pub use ahash::RandomState;

#[cfg(all(feature = "foldhash", not(feature = "ahash")))]
pub use foldhash::fast::RandomState;

#[cfg(all(not(feature = "ahash"), not(feature = "foldhash")))]
pub use std::collections::hash_map::RandomState;

/// One published generation of the map. Never mutated in place once it
/// has been stored in the slot.
type Snapshot<K, V, S> = HashMap<K, V, S>;

/// A concurrently readable map with copy-on-write snapshots.
///
/// This structure can be used in locations where you would otherwise use
/// `RwLock<HashMap>` or `Mutex<HashMap>` and your workload is heavily
/// read-biased.
///
/// Reads (`get`, `len`, `for_each`, [`CowMap::read`]) are wait-free: they
/// load the current snapshot once and never observe a partially applied
/// write. Writes (`insert`, `remove`) copy the current snapshot, apply
/// the edit, and publish the copy with a compare and swap, looping until
/// the publish wins. Writers race rather than queue, so no operation on
/// the map ever parks a thread, at the price of every write being `O(n)`
/// in the current size.
///
/// Unlike a transactional structure there is no write batching here:
/// every `insert`/`remove` publishes its own generation, and edits from
/// racing writers interleave per-operation. If you need several edits to
/// become visible atomically, build the new content aside and publish it
/// with [`CowMap::replace_all`].
///
/// # Examples
/// ```
/// use cowmap::CowMap;
///
/// let map: CowMap<u64, u64> = CowMap::new();
/// map.insert(1, 1);
///
/// // A read transaction pins one generation of the map.
/// let read_txn = map.read();
/// assert_eq!(read_txn.get(&1), Some(&1));
///
/// map.insert(1, 2);
/// // The open transaction still sees the snapshot it started from ...
/// assert_eq!(read_txn.get(&1), Some(&1));
/// // ... while fresh reads see the new generation.
/// assert_eq!(map.get(&1), Some(2));
/// ```
pub struct CowMap<K, V, S = RandomState>
where
    K: Hash + Eq + Clone + Sync + Send + 'static,
    V: Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Sync + Send + 'static,
{
    active: SnapshotSlot<Snapshot<K, V, S>>,
    build_hasher: S,
}

impl<K, V, S> CowMap<K, V, S>
where
    K: Hash + Eq + Clone + Sync + Send + 'static,
    V: Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Sync + Send + 'static,
{
    /// Construct a new, empty `CowMap`. Nothing is allocated until the
    /// first write publishes a snapshot.
    pub fn new() -> Self
    where
        S: Default,
    {
        Self::with_hasher(S::default())
    }

    /// Construct a new, empty `CowMap` which will hash keys with
    /// `build_hasher`. Every snapshot generation shares this hasher.
    pub fn with_hasher(build_hasher: S) -> Self {
        CowMap {
            active: SnapshotSlot::empty(),
            build_hasher,
        }
    }

    /// Retrieve a value from the map, cloned out of the current
    /// snapshot. Wait-free: this loads the published snapshot exactly
    /// once and does not retry or block, no matter what writers are
    /// doing.
    pub fn get<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let cur = self.active.load(&guard);
        match unsafe { cur.as_ref() } {
            Some(snap) => snap.get(k).cloned(),
            None => None,
        }
    }

    /// Assert if a key exists in the current snapshot.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let guard = epoch::pin();
        let cur = self.active.load(&guard);
        match unsafe { cur.as_ref() } {
            Some(snap) => snap.contains_key(k),
            None => false,
        }
    }

    /// The number of entries in the current snapshot. A map that has
    /// never been written to reports 0, the same as one that was
    /// cleared.
    pub fn len(&self) -> usize {
        let guard = epoch::pin();
        let cur = self.active.load(&guard);
        unsafe { cur.as_ref() }.map_or(0, |snap| snap.len())
    }

    /// Determine if the current snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Visit every entry of the current snapshot, in unspecified order.
    /// Return [`ControlFlow::Break`] from the closure to halt the walk
    /// early.
    ///
    /// The snapshot is loaded once: writes that land while the walk is
    /// in progress never change what is being iterated, so the closure
    /// observes one consistent point-in-time view - exactly the
    /// snapshot's entries, no duplicates, no omissions.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &V) -> ControlFlow<()>,
    {
        let guard = epoch::pin();
        let cur = self.active.load(&guard);
        if let Some(snap) = unsafe { cur.as_ref() } {
            for (k, v) in snap.iter() {
                if let ControlFlow::Break(()) = f(k, v) {
                    break;
                }
            }
        }
    }

    /// Begin a read transaction, pinning the current snapshot for the
    /// lifetime of the returned guard. The guard's accessors return
    /// references rather than clones, and keep answering from the same
    /// generation regardless of writes committed after this call.
    ///
    /// Holding a read transaction delays reclamation of superseded
    /// snapshots (they are epoch collected), so prefer short-lived
    /// guards under heavy write churn.
    pub fn read(&self) -> CowMapReadTxn<K, V, S> {
        let guard = epoch::pin();
        let cur = {
            let c = self.active.load(&guard);
            c.as_raw()
        };
        CowMapReadTxn {
            _guard: guard,
            snapshot: cur,
        }
    }

    /// Insert or update a value by key. If the key was already present
    /// the superseded value is returned.
    ///
    /// The current snapshot is copied in full, the entry applied to the
    /// copy, and the copy raced into publication; on losing the race the
    /// whole attempt is rebuilt against the freshest snapshot, so an
    /// insert is never lost to a concurrent writer and never published
    /// from a stale base. The copy happens even when the key is already
    /// present with an identical value - published snapshots are never
    /// touched in place.
    pub fn insert(&self, k: K, v: V) -> Option<V> {
        let backoff = Backoff::new();
        loop {
            let guard = epoch::pin();
            let cur = self.active.load(&guard);
            let (candidate, prev) = match unsafe { cur.as_ref() } {
                Some(snap) => {
                    let mut next = Snapshot::with_capacity_and_hasher(
                        snap.len() + 1,
                        self.build_hasher.clone(),
                    );
                    next.extend(snap.iter().map(|(k1, v1)| (k1.clone(), v1.clone())));
                    let prev = next.insert(k.clone(), v.clone());
                    (next, prev)
                }
                None => {
                    let mut next =
                        Snapshot::with_capacity_and_hasher(1, self.build_hasher.clone());
                    next.insert(k.clone(), v.clone());
                    (next, None)
                }
            };
            match self.active.compare_exchange(cur, Owned::new(candidate), &guard) {
                Ok(()) => return prev,
                Err(_candidate) => {
                    trace!("insert lost the publish race, retrying");
                    backoff.snooze();
                }
            }
        }
    }

    /// Remove a key from the map, returning the value it held in the
    /// snapshot that was superseded. If the key is not present (or
    /// nothing has ever been published) this returns immediately without
    /// publishing anything.
    pub fn remove<Q>(&self, k: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let backoff = Backoff::new();
        loop {
            let guard = epoch::pin();
            let cur = self.active.load(&guard);
            let snap = match unsafe { cur.as_ref() } {
                Some(snap) => snap,
                None => return None,
            };
            if !snap.contains_key(k) {
                return None;
            }
            let mut next = Snapshot::with_capacity_and_hasher(
                snap.len() - 1,
                self.build_hasher.clone(),
            );
            let mut removed = None;
            for (k1, v1) in snap.iter() {
                if k1.borrow() == k {
                    removed = Some(v1.clone());
                } else {
                    next.insert(k1.clone(), v1.clone());
                }
            }
            match self.active.compare_exchange(cur, Owned::new(next), &guard) {
                Ok(()) => return removed,
                Err(_candidate) => {
                    trace!("remove lost the publish race, retrying");
                    backoff.snooze();
                }
            }
        }
    }

    /// Reset the map to an empty state by publishing a fresh, empty
    /// snapshot. This is an unconditional publication: an insert or
    /// remove racing with `clear` lands either entirely before or
    /// entirely after it.
    pub fn clear(&self) {
        let guard = epoch::pin();
        let empty = Snapshot::with_hasher(self.build_hasher.clone());
        self.active.store(Owned::new(empty), &guard);
    }

    /// Publish `mapping` wholesale as the new current snapshot, taking
    /// ownership of it without copying. Whatever was published before is
    /// discarded - there is no merge with prior content.
    ///
    /// Meant for bulk initialisation and full-refresh flows where the
    /// caller builds the replacement content aside and owns it outright.
    /// Like [`CowMap::clear`] this is a plain swap rather than a CAS, so
    /// ordering against racing `insert`/`remove` calls is last write
    /// wins.
    pub fn replace_all(&self, mapping: HashMap<K, V, S>) {
        let guard = epoch::pin();
        self.active.store(Owned::new(mapping), &guard);
    }
}

impl<K, V, S> Default for CowMap<K, V, S>
where
    K: Hash + Eq + Clone + Sync + Send + 'static,
    V: Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Default + Sync + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> FromIterator<(K, V)> for CowMap<K, V, S>
where
    K: Hash + Eq + Clone + Sync + Send + 'static,
    V: Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Default + Sync + Send + 'static,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let build_hasher = S::default();
        let mut inner = Snapshot::with_hasher(build_hasher.clone());
        inner.extend(iter);
        CowMap {
            active: SnapshotSlot::new(inner),
            build_hasher,
        }
    }
}

impl<K, V, S> Extend<(K, V)> for CowMap<K, V, S>
where
    K: Hash + Eq + Clone + Sync + Send + 'static,
    V: Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Sync + Send + 'static,
{
    /// Fold a batch of entries into the map as a single publication.
    /// Requires `&mut self`, which rules out racing writers, so the
    /// batched snapshot can be swapped in directly.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        let guard = epoch::pin();
        let cur = self.active.load(&guard);
        let mut next = match unsafe { cur.as_ref() } {
            Some(snap) => snap.clone(),
            None => Snapshot::with_hasher(self.build_hasher.clone()),
        };
        next.extend(iter);
        self.active.store(Owned::new(next), &guard);
    }
}

#[cfg(feature = "serde")]
impl<K, V, S> Serialize for CowMap<K, V, S>
where
    K: Serialize + Hash + Eq + Clone + Sync + Send + 'static,
    V: Serialize + Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Sync + Send + 'static,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        self.read().serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, K, V, S> Deserialize<'de> for CowMap<K, V, S>
where
    K: Deserialize<'de> + Hash + Eq + Clone + Sync + Send + 'static,
    V: Deserialize<'de> + Clone + Sync + Send + 'static,
    S: BuildHasher + Clone + Default + Sync + Send + 'static,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(MapCollector::new())
    }
}

/// A read transaction over a [`CowMap`].
///
/// This pins the snapshot that was current when [`CowMap::read`] was
/// called, and answers every query from that generation for as long as
/// the guard is held - writes committed in the meantime are not visible
/// through it. The pinned snapshot stays alive via the epoch collector,
/// so the guard hands out plain references into it.
pub struct CowMapReadTxn<K, V, S> {
    _guard: Guard,
    // Null when the map had nothing published at pin time.
    snapshot: *const Snapshot<K, V, S>,
}

impl<K, V, S> CowMapReadTxn<K, V, S> {
    fn as_map(&self) -> Option<&Snapshot<K, V, S>> {
        unsafe { self.snapshot.as_ref() }
    }

    /// The number of entries in the pinned snapshot.
    pub fn len(&self) -> usize {
        self.as_map().map_or(0, |snap| snap.len())
    }

    /// Determine if the pinned snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterator over `(&K, &V)` of the pinned snapshot.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter::new(self.as_map().map(|snap| snap.iter()))
    }

    /// Iterator over `&K` of the pinned snapshot.
    pub fn keys(&self) -> KeyIter<'_, K, V> {
        KeyIter::new(self.as_map().map(|snap| snap.keys()))
    }

    /// Iterator over `&V` of the pinned snapshot.
    pub fn values(&self) -> ValueIter<'_, K, V> {
        ValueIter::new(self.as_map().map(|snap| snap.values()))
    }
}

impl<K, V, S> CowMapReadTxn<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Retrieve a reference to a value in the pinned snapshot.
    pub fn get<Q>(&self, k: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.as_map().and_then(|snap| snap.get(k))
    }

    /// Assert if a key exists in the pinned snapshot.
    pub fn contains_key<Q>(&self, k: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get(k).is_some()
    }
}

#[cfg(feature = "serde")]
impl<K, V, S> Serialize for CowMapReadTxn<K, V, S>
where
    K: Serialize,
    V: Serialize,
{
    fn serialize<Sr>(&self, serializer: Sr) -> Result<Sr::Ok, Sr::Error>
    where
        Sr: Serializer,
    {
        let mut state = serializer.serialize_map(Some(self.len()))?;

        for (key, val) in self.iter() {
            state.serialize_entry(key, val)?;
        }

        state.end()
    }
}
