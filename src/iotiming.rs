//! Per-scope IO timing statistics and budget registry.
//!
//! Each renderer (or other logical requester) identifies itself with a
//! [`BudgetScope`]. The registry hands out one [`IoStatistics`] record per
//! scope; the record accumulates time spent blocked on IO and holds that
//! scope's [`IoTimeBudget`].

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::budget::IoTimeBudget;

/// Identity of a budget scope (typically one per renderer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BudgetScope(pub u64);

struct Timer {
    accumulated: i64,
    running: u32,
    started: Instant,
}

/// IO timing record for one scope.
///
/// `start()`/`stop()` are ref-counted: the first `start` arms the clock and
/// the last `stop` folds the elapsed time into the running total, so several
/// threads of the same scope blocking concurrently are charged wall-clock
/// time once.
pub struct IoStatistics {
    timer: Mutex<Timer>,
    budget: Mutex<IoTimeBudget>,
}

impl IoStatistics {
    fn new() -> Self {
        Self {
            timer: Mutex::new(Timer {
                accumulated: 0,
                running: 0,
                started: Instant::now(),
            }),
            budget: Mutex::new(IoTimeBudget::new(0)),
        }
    }

    /// Begin measuring IO time on the calling thread.
    pub fn start(&self) {
        let mut timer = self.timer.lock();
        if timer.running == 0 {
            timer.started = Instant::now();
        }
        timer.running += 1;
    }

    /// Stop measuring IO time on the calling thread.
    pub fn stop(&self) {
        let mut timer = self.timer.lock();
        debug_assert!(timer.running > 0);
        timer.running = timer.running.saturating_sub(1);
        if timer.running == 0 {
            timer.accumulated += timer.started.elapsed().as_nanos() as i64;
        }
    }

    /// Cumulative IO time in nanoseconds, including any measurement still
    /// in progress.
    pub fn io_nano_time(&self) -> i64 {
        let timer = self.timer.lock();
        if timer.running > 0 {
            timer.accumulated + timer.started.elapsed().as_nanos() as i64
        } else {
            timer.accumulated
        }
    }

    /// Grow the budget to `num_levels` levels if it is smaller.
    ///
    /// Existing remaining amounts are discarded; the new budget starts
    /// exhausted until [`reset_budget`](Self::reset_budget) is called.
    pub fn ensure_budget_levels(&self, num_levels: usize) {
        let mut budget = self.budget.lock();
        if budget.num_levels() < num_levels {
            *budget = IoTimeBudget::new(num_levels);
        }
    }

    /// Reset this scope's budget. See [`IoTimeBudget::reset`].
    pub fn reset_budget(&self, partial: &[i64]) {
        self.budget.lock().reset(partial);
    }

    /// Remaining budget at the given priority.
    ///
    /// A scope whose budget was never initialized reads 0 everywhere.
    pub fn budget_time_left(&self, priority: usize) -> i64 {
        self.budget.lock().time_left(priority)
    }

    /// Charge `t` nanoseconds against this scope's budget.
    pub fn use_budget(&self, t: i64, priority: usize) {
        self.budget.lock().use_time(t, priority);
    }
}

/// Registry of per-scope [`IoStatistics`], owned by one cache instance.
///
/// Lookups for known scopes are lock-free; the first request from a new
/// scope takes the map's shard lock to install the record.
pub struct CacheIoTiming {
    stats: DashMap<BudgetScope, Arc<IoStatistics>>,
}

impl CacheIoTiming {
    pub fn new() -> Self {
        Self {
            stats: DashMap::new(),
        }
    }

    /// Get or create the statistics record for a scope.
    pub fn io_statistics(&self, scope: BudgetScope) -> Arc<IoStatistics> {
        if let Some(stats) = self.stats.get(&scope) {
            return Arc::clone(&stats);
        }
        Arc::clone(
            &self
                .stats
                .entry(scope)
                .or_insert_with(|| Arc::new(IoStatistics::new())),
        )
    }
}

impl Default for CacheIoTiming {
    fn default() -> Self {
        Self::new()
    }
}
