//! Two-tier key→entry table with weak and soft retention.
//!
//! Invalid entries are held weakly: the table's slot does not keep them
//! alive, and the frame-boundary sweep removes slots whose entry has been
//! dropped. Valid entries are held softly: a strong reference bounded by an
//! LRU capacity, demoted back to weak under capacity pressure. Only valid
//! entries ever enter the soft tier, so demotion can never resurrect an
//! invalid value.
//!
//! Without a garbage collector, two auxiliary strong-reference sets stand in
//! for "not collected yet": the nursery holds every freshly installed entry
//! until the next sweep, and pins hold entries with an outstanding fetch
//! request until a fetcher picks them up or the request is discarded.

use std::collections::VecDeque;
use std::hash::Hash;
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::entry::{CacheEntry, VolatileValue};

enum Slot<K, V> {
    Weak(Weak<CacheEntry<K, V>>),
    Soft(Arc<CacheEntry<K, V>>),
}

/// Concurrent entry table with weak/soft retention per slot.
///
/// Reads go through the sharded map without a global lock; the soft-tier
/// LRU has its own mutex. Uniqueness of entries per key is enforced by the
/// caller, which installs entries under a single critical section.
pub struct WeakSoftCache<K, V> {
    slots: DashMap<K, Slot<K, V>>,
    /// Entries installed since the last sweep, held strongly so that an
    /// invalid entry survives at least one frame.
    nursery: Mutex<Vec<Arc<CacheEntry<K, V>>>>,
    /// Entries with an outstanding fetch request, keyed by request key.
    pending: DashMap<K, Arc<CacheEntry<K, V>>>,
    soft_lru: Mutex<VecDeque<K>>,
    soft_capacity: usize,
}

impl<K, V> WeakSoftCache<K, V>
where
    K: Clone + Eq + Hash,
{
    /// Create a table whose soft tier holds at most `soft_capacity` entries.
    pub fn new(soft_capacity: usize) -> Self {
        Self {
            slots: DashMap::new(),
            nursery: Mutex::new(Vec::new()),
            pending: DashMap::new(),
            soft_lru: Mutex::new(VecDeque::new()),
            soft_capacity,
        }
    }

    /// Get the entry for `key` if it is still reachable.
    pub fn get(&self, key: &K) -> Option<Arc<CacheEntry<K, V>>> {
        let (entry, soft) = {
            let slot = self.slots.get(key)?;
            match &*slot {
                Slot::Weak(weak) => (weak.upgrade()?, false),
                Slot::Soft(entry) => (Arc::clone(entry), true),
            }
        };
        if soft {
            self.touch(key);
        }
        Some(entry)
    }

    /// Install a weak slot for a fresh (invalid) entry.
    ///
    /// The entry is also parked in the nursery, keeping it alive until the
    /// next [`finalize_removed_cache_entries`](Self::finalize_removed_cache_entries).
    pub fn put_weak(&self, key: K, entry: &Arc<CacheEntry<K, V>>) {
        self.slots.insert(key, Slot::Weak(Arc::downgrade(entry)));
        self.nursery.lock().push(Arc::clone(entry));
    }

    /// Install or upgrade to a soft (strong) slot.
    ///
    /// Called when an entry's value becomes valid. May demote the least
    /// recently used soft entries back to weak to stay within capacity.
    pub fn put_soft(&self, key: K, entry: Arc<CacheEntry<K, V>>) {
        self.slots.insert(key.clone(), Slot::Soft(entry));

        let victims = {
            let mut lru = self.soft_lru.lock();
            if let Some(pos) = lru.iter().position(|k| k == &key) {
                lru.remove(pos);
            }
            lru.push_back(key);
            let mut victims = Vec::new();
            while lru.len() > self.soft_capacity {
                victims.extend(lru.pop_front());
            }
            victims
        };

        for victim in victims {
            if let Some(mut slot) = self.slots.get_mut(&victim) {
                if let Slot::Soft(entry) = &*slot {
                    let weak = Arc::downgrade(entry);
                    *slot = Slot::Weak(weak);
                }
            }
        }
    }

    /// Upgrade `key`'s slot from weak to soft once its value is valid.
    ///
    /// Used on the load path: the entry promotes itself through its own
    /// slot. A missing slot (cache cleared while the load ran), a slot
    /// already soft, or a still-invalid entry leave the table unchanged.
    pub fn promote(&self, key: &K)
    where
        V: VolatileValue,
    {
        let entry = {
            let slot = self.slots.get(key);
            match slot.as_deref() {
                Some(Slot::Weak(weak)) => weak.upgrade(),
                _ => None,
            }
        };
        if let Some(entry) = entry {
            if entry.is_valid() {
                self.put_soft(key.clone(), entry);
            }
        }
    }

    /// Keep `entry` alive while a fetch request for `key` is queued.
    pub fn pin(&self, key: K, entry: &Arc<CacheEntry<K, V>>) {
        self.pending.insert(key, Arc::clone(entry));
    }

    /// Release the pin taken by [`pin`](Self::pin). Called when a fetcher
    /// picks the request up or when the request is discarded.
    pub fn unpin(&self, key: &K) {
        self.pending.remove(key);
    }

    /// Empty the nursery and remove slots whose weakly held entry has been
    /// dropped.
    ///
    /// This is the reclaimer sweep, run at frame boundaries. A slot is
    /// removed only if its current binding is a dead weak reference;
    /// entries still held elsewhere (soft tier, pins, callers) survive.
    pub fn finalize_removed_cache_entries(&self) {
        self.nursery.lock().clear();
        self.slots.retain(|_, slot| match slot {
            Slot::Soft(_) => true,
            Slot::Weak(weak) => weak.strong_count() > 0,
        });
    }

    /// Drop every slot, pin and nursery reference.
    pub fn clear_cache(&self) {
        self.slots.clear();
        self.nursery.lock().clear();
        self.pending.clear();
        self.soft_lru.lock().clear();
    }

    /// Number of slots, including weak slots not yet swept.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether `key` is currently held in the soft tier.
    pub(crate) fn is_soft(&self, key: &K) -> bool {
        matches!(self.slots.get(key).as_deref(), Some(Slot::Soft(_)))
    }

    /// Mark `key` most recently used in the soft LRU.
    fn touch(&self, key: &K) {
        let mut lru = self.soft_lru.lock();
        if let Some(pos) = lru.iter().position(|k| k == key) {
            lru.remove(pos);
            lru.push_back(key.clone());
        }
    }
}
