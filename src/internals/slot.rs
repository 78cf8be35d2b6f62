//! The atomic snapshot slot.
//!
//! A [`SnapshotSlot`] is the single piece of shared mutable state in the
//! crate: one atomically swappable pointer to the currently published
//! snapshot, or null before anything has been published. Retired snapshots
//! are reclaimed through crossbeam's epoch collector once every reader
//! pinned before the retirement has unpinned.

use crossbeam_epoch as epoch;
use crossbeam_epoch::{Atomic, Guard, Owned, Shared};
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};

/// An atomic slot for the published snapshot of type `T`.
///
/// `load` never blocks and never allocates. `compare_exchange` is atomic
/// with respect to all other callers: exactly one CAS among any racing set
/// succeeds per distinct expected value. The slot owns whatever it points
/// at; replaced values are deferred to the epoch collector at the moment
/// of replacement.
pub(crate) struct SnapshotSlot<T: Send + Sync + 'static> {
    active: Atomic<T>,
}

impl<T> SnapshotSlot<T>
where
    T: Send + Sync + 'static,
{
    /// Create a slot with nothing published. Does not allocate.
    pub(crate) fn empty() -> Self {
        SnapshotSlot {
            active: Atomic::null(),
        }
    }

    /// Create a slot with `data` already published.
    pub(crate) fn new(data: T) -> Self {
        SnapshotSlot {
            active: Atomic::new(data),
        }
    }

    /// Load the currently published snapshot. A null `Shared` means the
    /// slot has never been published to.
    pub(crate) fn load<'g>(&self, guard: &'g Guard) -> Shared<'g, T> {
        self.active.load(Acquire, guard)
    }

    /// Attempt to replace `current` with `candidate`. On success the
    /// replaced snapshot (if any) is retired to the collector. On failure
    /// the untouched candidate is handed back so the caller can rebuild
    /// against a fresh load.
    pub(crate) fn compare_exchange<'g>(
        &self,
        current: Shared<'g, T>,
        candidate: Owned<T>,
        guard: &'g Guard,
    ) -> Result<(), Owned<T>> {
        match self
            .active
            .compare_exchange(current, candidate, Release, Relaxed, guard)
        {
            Ok(_) => {
                if !current.is_null() {
                    // No longer reachable from the slot, and every reader
                    // that can still see it holds a pin from before now.
                    unsafe { guard.defer_destroy(current) };
                }
                Ok(())
            }
            Err(e) => Err(e.new),
        }
    }

    /// Unconditionally publish `candidate`, retiring whatever was
    /// published before. This is a plain swap, not a CAS - last write
    /// wins between racing publishers.
    pub(crate) fn store(&self, candidate: Owned<T>, guard: &Guard) {
        let prev = self.active.swap(candidate, Release, guard);
        if !prev.is_null() {
            unsafe { guard.defer_destroy(prev) };
        }
    }
}

impl<T> Drop for SnapshotSlot<T>
where
    T: Send + Sync + 'static,
{
    fn drop(&mut self) {
        // The final published snapshot still needs to be unlinked, else
        // it would leak. Readers pinned before this point keep it alive
        // until they unpin.
        let guard = epoch::pin();
        let prev = self.active.load(Acquire, &guard);
        if !prev.is_null() {
            unsafe { guard.defer_destroy(prev) };
        }
    }
}
