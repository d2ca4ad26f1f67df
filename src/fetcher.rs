//! Fetcher thread pool.
//!
//! Fetchers drain the fetch queue and load entries through their stored
//! loader. A renderer can pause the pool around time-critical sections
//! (e.g. while the current frame is being composed) and wake it afterwards.

use std::hash::Hash;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::entry::VolatileValue;
use crate::queue::BlockingFetchQueues;
use crate::weak_soft::WeakSoftCache;

/// Per-worker pause gate: a deadline and a condvar to cut it short.
struct PauseGate {
    deadline: Mutex<Option<Instant>>,
    wake: Condvar,
}

impl PauseGate {
    fn new() -> Self {
        Self {
            deadline: Mutex::new(None),
            wake: Condvar::new(),
        }
    }

    /// Block while a pause deadline is set and lies in the future.
    fn pause_point(&self) {
        let mut deadline = self.deadline.lock();
        while let Some(until) = *deadline {
            if Instant::now() >= until {
                *deadline = None;
                break;
            }
            self.wake.wait_until(&mut deadline, until);
        }
    }

    fn pause_until(&self, until: Instant) {
        *self.deadline.lock() = Some(until);
    }

    fn wake(&self) {
        *self.deadline.lock() = None;
        self.wake.notify_all();
    }
}

/// Pool of worker threads that load enqueued cache entries.
///
/// Workers exit when the queue is shut down; [`shutdown`](Self::shutdown)
/// (also run on drop) closes the queue and joins them.
pub struct FetcherThreads<K> {
    queue: Arc<BlockingFetchQueues<K>>,
    gates: Vec<Arc<PauseGate>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<K> FetcherThreads<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Spawn `num_threads` fetchers draining `queue` into `cache` entries.
    pub fn new<V>(
        cache: Arc<WeakSoftCache<K, V>>,
        queue: Arc<BlockingFetchQueues<K>>,
        num_threads: usize,
    ) -> Self
    where
        V: VolatileValue + Send + Sync + 'static,
    {
        let mut gates = Vec::with_capacity(num_threads);
        let mut handles = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let gate = Arc::new(PauseGate::new());
            gates.push(Arc::clone(&gate));

            let cache = Arc::clone(&cache);
            let queue = Arc::clone(&queue);
            let handle = std::thread::Builder::new()
                .name(format!("fetcher-{i}"))
                .spawn(move || loop {
                    let Some(key) = queue.take() else {
                        break;
                    };
                    gate.pause_point();
                    // The entry may have been collected since it was
                    // enqueued; the request is simply dropped then.
                    let entry = cache.get(&key);
                    cache.unpin(&key);
                    let Some(entry) = entry else {
                        continue;
                    };
                    if let Err(err) = entry.load_if_not_valid(&cache) {
                        tracing::debug!(error = %err, "fetch failed, dropping request");
                    }
                })
                .expect("failed to spawn fetcher thread");
            handles.push(handle);
        }

        Self {
            queue,
            gates,
            handles: Mutex::new(handles),
        }
    }

    /// Number of worker threads in the pool.
    pub fn num_fetchers(&self) -> usize {
        self.gates.len()
    }

    /// Pause all fetchers for the given number of milliseconds.
    pub fn pause_for(&self, ms: u64) {
        self.pause_until(Instant::now() + Duration::from_millis(ms));
    }

    /// Pause all fetchers until the given instant.
    ///
    /// A fetcher blocked on an empty queue is unaffected; the pause takes
    /// hold before the next request is processed.
    pub fn pause_until(&self, until: Instant) {
        for gate in &self.gates {
            gate.pause_until(until);
        }
    }

    /// Wake all fetchers, ending any earlier pause immediately.
    pub fn wake(&self) {
        for gate in &self.gates {
            gate.wake();
        }
    }

    /// Shut the queue down and join all workers.
    pub fn shutdown(&self) {
        self.queue.shutdown();
        self.wake();
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

impl<K> Drop for FetcherThreads<K> {
    fn drop(&mut self) {
        self.queue.shutdown();
        for gate in &self.gates {
            gate.wake();
        }
        let handles = std::mem::take(&mut *self.handles.lock());
        for handle in handles {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CacheEntry, VolatileLoader};
    use crate::test_utils::{TestLoader, TestValue};

    fn install_entry(
        table: &WeakSoftCache<u64, TestValue>,
        key: u64,
        loader: &Arc<TestLoader>,
    ) -> Arc<CacheEntry<u64, TestValue>> {
        let loader: Arc<dyn VolatileLoader<u64, TestValue>> =
            Arc::clone(loader) as Arc<dyn VolatileLoader<u64, TestValue>>;
        let entry = Arc::new(CacheEntry::new(
            key,
            loader.create_empty_value(&key),
            loader,
        ));
        table.put_weak(key, &entry);
        entry
    }

    fn wait_until(mut pred: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if pred() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        pred()
    }

    #[test]
    fn test_fetchers_load_enqueued_entries() {
        let table = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(2));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 2);

        let loader = Arc::new(TestLoader::new());
        let a = install_entry(&table, 1, &loader);
        let b = install_entry(&table, 2, &loader);
        queue.put(1, 0, false);
        queue.put(2, 1, false);

        assert!(wait_until(
            || a.is_valid() && b.is_valid(),
            Duration::from_secs(5)
        ));
        assert_eq!(loader.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
        fetchers.shutdown();
    }

    #[test]
    fn test_vanished_entry_is_skipped() {
        let table: Arc<WeakSoftCache<u64, TestValue>> = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 1);

        // No entry installed for key 9: the request is dropped.
        queue.put(9, 0, false);

        let loader = Arc::new(TestLoader::new());
        let entry = install_entry(&table, 1, &loader);
        queue.put(1, 0, false);

        assert!(wait_until(|| entry.is_valid(), Duration::from_secs(5)));
        fetchers.shutdown();
    }

    #[test]
    fn test_failed_load_does_not_kill_worker() {
        let table = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 1);

        let failing = Arc::new(TestLoader::failing());
        let bad = install_entry(&table, 1, &failing);
        queue.put(1, 0, false);

        let loader = Arc::new(TestLoader::new());
        let good = install_entry(&table, 2, &loader);
        queue.put(2, 0, false);

        assert!(wait_until(|| good.is_valid(), Duration::from_secs(5)));
        assert!(!bad.is_valid());
        fetchers.shutdown();
    }

    #[test]
    fn test_pause_and_wake() {
        let table = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 1);

        fetchers.pause_for(60_000);
        let loader = Arc::new(TestLoader::new());
        let entry = install_entry(&table, 1, &loader);
        queue.put(1, 0, false);

        // The worker takes the key, then parks at the pause gate.
        std::thread::sleep(Duration::from_millis(50));
        assert!(!entry.is_valid());

        fetchers.wake();
        assert!(wait_until(|| entry.is_valid(), Duration::from_secs(5)));
        fetchers.shutdown();
    }

    #[test]
    fn test_pause_deadline_expires() {
        let table = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 1);

        fetchers.pause_until(Instant::now() + Duration::from_millis(30));
        let loader = Arc::new(TestLoader::new());
        let entry = install_entry(&table, 1, &loader);
        queue.put(1, 0, false);

        assert!(wait_until(|| entry.is_valid(), Duration::from_secs(5)));
        fetchers.shutdown();
    }

    #[test]
    fn test_shutdown_joins_idle_workers() {
        let table: Arc<WeakSoftCache<u64, TestValue>> = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 4);

        // Workers are blocked in take(); shutdown must unblock and join.
        fetchers.shutdown();
        assert_eq!(fetchers.num_fetchers(), 4);
    }

    #[test]
    fn test_drop_shuts_down() {
        let table: Arc<WeakSoftCache<u64, TestValue>> = Arc::new(WeakSoftCache::new(16));
        let queue = Arc::new(BlockingFetchQueues::new(1));
        let fetchers = FetcherThreads::new(Arc::clone(&table), Arc::clone(&queue), 2);
        drop(fetchers);
        // Queue is shut down; take() no longer blocks.
        assert_eq!(queue.take(), None);
    }
}
