//! tilestream-core - Volatile tile cache for large-image viewers.
//!
//! Supplies tiles of multi-resolution image pyramids to a real-time
//! renderer. Tiles are expensive to materialize, so the renderer is handed
//! values that may be temporarily invalid and become valid without ever
//! blocking the interactive loop:
//! - a key→entry table with weak retention for invalid and soft retention
//!   for loaded entries
//! - priority fetch queues with per-frame request deduplication and a
//!   prefetch swap buffer
//! - a pool of fetcher threads draining the queues
//! - per-scope IO time budgets deciding whether a request may block

mod budget;
mod cache;
mod config;
mod entry;
mod error;
mod fetcher;
mod hints;
mod iotiming;
mod queue;
mod tile;
mod weak_soft;
#[cfg(test)]
pub(crate) mod test_utils;

pub use budget::IoTimeBudget;
pub use cache::LoadingVolatileCache;
pub use config::CacheConfig;
pub use entry::{CacheEntry, VolatileLoader, VolatileValue};
pub use error::{CacheError, CacheResult};
pub use fetcher::FetcherThreads;
pub use hints::{CacheHints, LoadingStrategy};
pub use iotiming::{BudgetScope, CacheIoTiming, IoStatistics};
pub use queue::BlockingFetchQueues;
pub use tile::VolatileTile;
pub use weak_soft::WeakSoftCache;
