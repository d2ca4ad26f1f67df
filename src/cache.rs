//! The volatile loading cache orchestrator.
//!
//! Ties the entry table, fetch queues, fetcher pool and IO budgets together
//! behind the two request entry points `get` and `create_if_absent`. A
//! request may receive a value that is still invalid; the renderer shows it
//! blurry or empty and asks again next frame.

use std::hash::Hash;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::CacheConfig;
use crate::entry::{CacheEntry, VolatileLoader, VolatileValue};
use crate::fetcher::FetcherThreads;
use crate::hints::{CacheHints, LoadingStrategy};
use crate::iotiming::{BudgetScope, CacheIoTiming};
use crate::queue::BlockingFetchQueues;
use crate::weak_soft::WeakSoftCache;

/// Volatile loading cache for tiles of multi-resolution image pyramids.
///
/// Values are created invalid and become valid at most once, either
/// synchronously on the requesting thread (BLOCKING, or BUDGETED with IO
/// budget left) or asynchronously on a fetcher thread (VOLATILE, or
/// BUDGETED with the budget exhausted). The per-request behavior is chosen
/// by [`CacheHints`].
pub struct LoadingVolatileCache<K, V> {
    max_num_levels: usize,
    cache: Arc<WeakSoftCache<K, V>>,
    queue: Arc<BlockingFetchQueues<K>>,
    current_queue_frame: AtomicI64,
    io_timing: CacheIoTiming,
    fetchers: FetcherThreads<K>,
    /// Serializes installation of new entries; lookups stay lock-free.
    cache_lock: Mutex<()>,
}

impl<K, V> LoadingVolatileCache<K, V>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    V: VolatileValue + Send + Sync + 'static,
{
    /// Create a cache with `max_num_levels` priority levels and
    /// `num_fetcher_threads` fetcher threads.
    pub fn new(max_num_levels: usize, num_fetcher_threads: usize) -> Self {
        Self::with_config(CacheConfig {
            max_num_levels,
            num_fetcher_threads,
            ..CacheConfig::default()
        })
    }

    pub fn with_config(config: CacheConfig) -> Self {
        let cache = Arc::new(WeakSoftCache::new(config.soft_capacity));
        let queue = Arc::new(BlockingFetchQueues::new(config.max_num_levels));
        let fetchers =
            FetcherThreads::new(Arc::clone(&cache), Arc::clone(&queue), config.num_fetcher_threads);
        Self {
            max_num_levels: config.max_num_levels.max(1),
            cache,
            queue,
            current_queue_frame: AtomicI64::new(0),
            io_timing: CacheIoTiming::new(),
            fetchers,
            cache_lock: Mutex::new(()),
        }
    }

    /// Get the value for `key` if an entry exists, applying `hints`.
    ///
    /// An entry being present only means a value object exists; the value
    /// may still be invalid after this call for the VOLATILE, BUDGETED and
    /// DONTLOAD strategies.
    pub fn get(&self, key: &K, hints: &CacheHints) -> Option<Arc<V>> {
        let entry = self.cache.get(key)?;
        self.load_entry_with_hints(&entry, hints);
        Some(entry.value())
    }

    /// Get the value for `key`, installing a fresh invalid entry first if
    /// none exists, then applying `hints`.
    ///
    /// Installation runs under the cache lock, so no two entries ever
    /// coexist for the same key. When entries race, the first installer's
    /// loader wins for that entry's lifetime.
    pub fn create_if_absent(
        &self,
        key: K,
        hints: &CacheHints,
        loader: &Arc<dyn VolatileLoader<K, V>>,
    ) -> Arc<V> {
        let entry = {
            let _guard = self.cache_lock.lock();
            match self.cache.get(&key) {
                Some(entry) => entry,
                None => {
                    let value = loader.create_empty_value(&key);
                    let entry = Arc::new(CacheEntry::new(key.clone(), value, Arc::clone(loader)));
                    self.cache.put_weak(key, &entry);
                    entry
                }
            }
        };
        self.load_entry_with_hints(&entry, hints);
        entry.value()
    }

    fn load_entry_with_hints(&self, entry: &Arc<CacheEntry<K, V>>, hints: &CacheHints) {
        match hints.strategy {
            LoadingStrategy::Volatile => {
                self.enqueue_if_not_this_frame(entry, hints.queue_priority, hints.enqueue_to_front);
            }
            LoadingStrategy::Blocking => {
                if let Err(err) = entry.load_if_not_valid(&self.cache) {
                    // Failures are not cached; the value stays invalid and
                    // the next request retries.
                    tracing::debug!(error = %err, "blocking load failed");
                }
            }
            LoadingStrategy::Budgeted => {
                if !entry.is_valid() {
                    self.load_or_enqueue(entry, hints);
                }
            }
            LoadingStrategy::DontLoad => {}
        }
    }

    /// Enqueue the entry unless it was already enqueued this frame.
    ///
    /// Exactly one of any number of concurrent requesters claims the
    /// enqueue slot, so each entry appears in the queue at most once per
    /// frame. The entry is pinned in the table for as long as the request
    /// is queued.
    fn enqueue_if_not_this_frame(
        &self,
        entry: &Arc<CacheEntry<K, V>>,
        priority: usize,
        to_front: bool,
    ) {
        let frame = self.current_queue_frame.load(Ordering::Acquire);
        if entry.claim_enqueue_for_frame(frame) {
            self.cache.pin(entry.key().clone(), entry);
            self.queue.put(entry.key().clone(), priority, to_front);
        }
    }

    /// Wait for the entry within the calling scope's IO budget, or just
    /// enqueue it when the budget is exhausted.
    ///
    /// With budget left, the entry is enqueued first so a fetcher can race
    /// in, then the caller waits on the entry for at most the remaining
    /// budget. The elapsed IO time is charged to the scope either way the
    /// wait ends; the caller returns whatever the value currently is.
    fn load_or_enqueue(&self, entry: &Arc<CacheEntry<K, V>>, hints: &CacheHints) {
        let stats = self.io_timing.io_statistics(hints.scope);
        let time_left = stats.budget_time_left(hints.queue_priority);
        if time_left > 0 {
            let mut guard = entry.lock();
            if entry.is_valid() {
                return;
            }
            self.enqueue_if_not_this_frame(entry, hints.queue_priority, hints.enqueue_to_front);
            let t0 = stats.io_nano_time();
            stats.start();
            entry.wait_valid_for(&mut guard, Duration::from_nanos(time_left as u64));
            stats.stop();
            drop(guard);
            stats.use_budget(stats.io_nano_time() - t0, hints.queue_priority);
        } else {
            self.enqueue_if_not_this_frame(entry, hints.queue_priority, hints.enqueue_to_front);
        }
    }

    /// Prepare the cache for the next frame.
    ///
    /// Swaps the fetch queues into the prefetch buffer, sweeps slots whose
    /// entry has been dropped, and increments the frame counter. The swap
    /// happens before the bump so that fetchers dequeuing concurrently are
    /// still servicing last frame's requests. Requests falling out of the
    /// prefetch buffer are unpinned before the sweep so their entries can
    /// be collected.
    pub fn prepare_next_frame(&self) {
        for key in self.queue.clear_to_prefetch() {
            self.cache.unpin(&key);
        }
        self.cache.finalize_removed_cache_entries();
        self.current_queue_frame.fetch_add(1, Ordering::AcqRel);
    }

    /// (Re-)initialize the IO time budget for one scope, i.e. the time that
    /// scope may spend in blocking IO per frame.
    ///
    /// `partial` gives budgets for priority levels `0..n`; remaining levels
    /// up to the cache's level count are filled with the last element.
    pub fn init_io_time_budget(&self, scope: BudgetScope, partial: &[i64]) {
        let stats = self.io_timing.io_statistics(scope);
        stats.ensure_budget_levels(self.max_num_levels);
        stats.reset_budget(partial);
    }

    /// Drop all entries and all queued requests.
    ///
    /// Loads already running on fetcher threads complete; their results
    /// become unreachable.
    pub fn clear(&self) {
        self.cache.clear_cache();
        self.queue.clear();
        self.prepare_next_frame();
    }

    /// Current frame counter. Non-decreasing; advances by one per
    /// [`prepare_next_frame`](Self::prepare_next_frame).
    pub fn current_queue_frame(&self) -> i64 {
        self.current_queue_frame.load(Ordering::Acquire)
    }

    /// Number of priority levels.
    pub fn max_num_levels(&self) -> usize {
        self.max_num_levels
    }

    /// Number of queued fetch requests (live and prefetch).
    pub fn pending_fetches(&self) -> usize {
        self.queue.len()
    }

    /// Per-scope IO statistics and budgets.
    pub fn io_timing(&self) -> &CacheIoTiming {
        &self.io_timing
    }

    /// The fetcher pool, for pause/wake control.
    pub fn fetchers(&self) -> &FetcherThreads<K> {
        &self.fetchers
    }
}
