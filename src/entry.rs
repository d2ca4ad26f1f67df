//! Cache entries and the loader contract.
//!
//! An entry pairs a key with its current value, which may be an invalid
//! placeholder until a loader produces the real thing. Validity is monotone:
//! once an entry's value reads valid it stays valid for the entry's
//! lifetime, which is what makes the double-checked load below safe.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};

use crate::error::CacheResult;
use crate::weak_soft::WeakSoftCache;

/// A value whose payload may not have been loaded yet.
///
/// `is_valid` transitions from false to true at most once and never back.
pub trait VolatileValue {
    fn is_valid(&self) -> bool;
}

/// Produces values for cache keys.
///
/// `load` must be safe against concurrent calls with the same key; the
/// cache serializes loads per entry, but distinct entries may load in
/// parallel on fetcher threads.
pub trait VolatileLoader<K, V>: Send + Sync {
    /// An invalid placeholder to hand out until the real value is loaded.
    fn create_empty_value(&self, key: &K) -> V;

    /// Produce the valid value for `key`.
    fn load(&self, key: &K) -> CacheResult<V>;
}

/// Marker for entries whose value is valid: they are never enqueued again.
const ENQUEUE_FRAME_VALID: i64 = i64::MAX;

/// One slot of the cache: key, current value, loader, enqueue bookkeeping.
pub struct CacheEntry<K, V> {
    key: K,
    value: RwLock<Arc<V>>,
    loader: Arc<dyn VolatileLoader<K, V>>,
    /// Frame counter value when this entry was last enqueued; -1 initially,
    /// [`ENQUEUE_FRAME_VALID`] once the value is valid.
    enqueue_frame: AtomicI64,
    load_lock: Mutex<()>,
    loaded: Condvar,
}

impl<K, V> CacheEntry<K, V>
where
    K: Clone + Eq + std::hash::Hash,
    V: VolatileValue,
{
    pub fn new(key: K, initial: V, loader: Arc<dyn VolatileLoader<K, V>>) -> Self {
        Self {
            key,
            value: RwLock::new(Arc::new(initial)),
            loader,
            enqueue_frame: AtomicI64::new(-1),
            load_lock: Mutex::new(()),
            loaded: Condvar::new(),
        }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    /// The current value; may still be the invalid placeholder.
    pub fn value(&self) -> Arc<V> {
        Arc::clone(&self.value.read())
    }

    pub fn is_valid(&self) -> bool {
        self.value.read().is_valid()
    }

    pub fn enqueue_frame(&self) -> i64 {
        self.enqueue_frame.load(Ordering::Acquire)
    }

    pub fn set_enqueue_frame(&self, frame: i64) {
        self.enqueue_frame.store(frame, Ordering::Release);
    }

    /// Claim the enqueue slot for `frame`.
    ///
    /// Returns true for exactly one caller per frame: the one that raised
    /// the marker from a smaller value. Valid entries (marker at the
    /// sentinel) are never claimed.
    pub(crate) fn claim_enqueue_for_frame(&self, frame: i64) -> bool {
        self.enqueue_frame.fetch_max(frame, Ordering::AcqRel) < frame
    }

    /// Load the value now if it is not valid yet.
    ///
    /// Loads are serialized by the entry lock; concurrent callers for the
    /// same entry block until the first one finishes and then observe the
    /// valid value. On success the entry is promoted to soft retention in
    /// `table` and all waiters are woken. On failure the entry stays
    /// invalid and the error propagates; nothing is cached.
    ///
    /// If the table no longer binds this entry's key (the cache was
    /// cleared while the load was in flight), the promotion is skipped and
    /// the loaded value stays reachable only through handles already held.
    pub fn load_if_not_valid(&self, table: &WeakSoftCache<K, V>) -> CacheResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        let _guard = self.load_lock.lock();
        if self.is_valid() {
            return Ok(());
        }
        let loaded = self.loader.load(&self.key)?;
        debug_assert!(loaded.is_valid());
        *self.value.write() = Arc::new(loaded);
        self.enqueue_frame.store(ENQUEUE_FRAME_VALID, Ordering::Release);
        table.promote(&self.key);
        self.loaded.notify_all();
        Ok(())
    }

    /// The entry lock used for budgeted waits. The same lock serializes
    /// loads, so holding it briefly cannot miss a load completion.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ()> {
        self.load_lock.lock()
    }

    /// Wait on the entry until its value is valid or `timeout` elapses.
    ///
    /// `guard` must have been obtained from [`lock`](Self::lock).
    pub(crate) fn wait_valid_for(&self, guard: &mut MutexGuard<'_, ()>, timeout: Duration) {
        let deadline = Instant::now() + timeout;
        while !self.is_valid() {
            if self.loaded.wait_until(guard, deadline).timed_out() {
                break;
            }
        }
    }
}
