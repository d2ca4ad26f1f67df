//! Priority fetch queues with a prefetch swap buffer.
//!
//! Requests live in one deque per priority band. At every frame boundary the
//! bands are swapped into a single prefetch deque: fetchers keep draining
//! last frame's requests while the renderer refills the bands for the new
//! frame, and fresh requests always win over prefetch leftovers.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};

struct QueueState<K> {
    bands: Vec<VecDeque<K>>,
    prefetch: VecDeque<K>,
    /// Total number of keys across the live bands.
    live: usize,
    shutdown: bool,
}

/// Blocking multi-priority fetch queue.
///
/// `put` and the clear operations never block; `take` blocks until a key is
/// available or the queue is shut down.
pub struct BlockingFetchQueues<K> {
    state: Mutex<QueueState<K>>,
    not_empty: Condvar,
    num_priorities: usize,
}

impl<K> BlockingFetchQueues<K> {
    /// Create a queue with the given number of priority bands (at least 1).
    pub fn new(num_priorities: usize) -> Self {
        let num_priorities = num_priorities.max(1);
        Self {
            state: Mutex::new(QueueState {
                bands: (0..num_priorities).map(|_| VecDeque::new()).collect(),
                prefetch: VecDeque::new(),
                live: 0,
                shutdown: false,
            }),
            not_empty: Condvar::new(),
            num_priorities,
        }
    }

    /// Number of priority bands.
    pub fn num_priorities(&self) -> usize {
        self.num_priorities
    }

    /// Append a key to the chosen end of a priority band.
    ///
    /// Priorities beyond the last band are clamped into range.
    pub fn put(&self, key: K, priority: usize, to_front: bool) {
        let mut state = self.state.lock();
        if state.shutdown {
            return;
        }
        let band = &mut state.bands[priority.min(self.num_priorities - 1)];
        if to_front {
            band.push_front(key);
        } else {
            band.push_back(key);
        }
        state.live += 1;
        self.not_empty.notify_one();
    }

    /// Take the next key, blocking until one is available.
    ///
    /// Live bands are served highest priority first, FIFO within a band;
    /// the prefetch deque is served only when every band is empty. Returns
    /// `None` once the queue has been shut down.
    pub fn take(&self) -> Option<K> {
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                return None;
            }
            if state.live > 0 {
                let key = state
                    .bands
                    .iter_mut()
                    .find_map(|band| band.pop_front())
                    .expect("live count is positive");
                state.live -= 1;
                return Some(key);
            }
            if let Some(key) = state.prefetch.pop_front() {
                return Some(key);
            }
            self.not_empty.wait(&mut state);
        }
    }

    /// Swap all live bands into the prefetch deque.
    ///
    /// Band order is preserved: highest priority first, FIFO within a band.
    /// The previous prefetch contents are discarded and returned so the
    /// caller can release any bookkeeping tied to those requests.
    pub fn clear_to_prefetch(&self) -> Vec<K> {
        let mut state = self.state.lock();
        let discarded: Vec<K> = state.prefetch.drain(..).collect();
        let mut drained = VecDeque::new();
        for band in state.bands.iter_mut() {
            drained.append(band);
        }
        state.prefetch = drained;
        state.live = 0;
        discarded
    }

    /// Drop every queued request, including the prefetch deque.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for band in state.bands.iter_mut() {
            band.clear();
        }
        state.prefetch.clear();
        state.live = 0;
    }

    /// Shut the queue down: all blocked and future `take` calls return
    /// `None`.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shutdown = true;
        self.not_empty.notify_all();
    }

    /// Total number of queued keys (live bands plus prefetch).
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.live + state.prefetch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
