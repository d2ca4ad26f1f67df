//! Per-request loading hints.

use crate::iotiming::BudgetScope;

/// How a request should obtain a value that is not yet loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingStrategy {
    /// Enqueue for asynchronous loading by a fetcher thread, at most once
    /// per frame.
    #[default]
    Volatile,
    /// Load immediately on the calling thread.
    Blocking,
    /// Load immediately if the calling scope has IO budget left, otherwise
    /// enqueue for asynchronous loading.
    Budgeted,
    /// Do nothing; return whatever is currently there.
    DontLoad,
}

/// Hints describing how to handle one cache request.
///
/// Hints are passed per request and never stored. `queue_priority` is a
/// consecutive integer `0..n-1` with 0 the highest priority;
/// `enqueue_to_front` picks the end of the priority band a request is
/// appended to. `scope` identifies the requester's IO budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheHints {
    pub strategy: LoadingStrategy,
    pub queue_priority: usize,
    pub enqueue_to_front: bool,
    pub scope: BudgetScope,
}

impl CacheHints {
    pub fn new(strategy: LoadingStrategy, queue_priority: usize, enqueue_to_front: bool) -> Self {
        Self {
            strategy,
            queue_priority,
            enqueue_to_front,
            scope: BudgetScope::default(),
        }
    }

    /// Attribute this request to the given budget scope.
    pub fn with_scope(mut self, scope: BudgetScope) -> Self {
        self.scope = scope;
        self
    }
}
