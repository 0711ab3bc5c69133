//! Cache metrics.
//
//! Metrics organization:
//! - Facade counters: meter (folder_cache_hits, folder_lock_timeouts, etc.),
//!   exported by whatever recorder the embedding process installs
//! - In-process counters: stats (CacheCounters / CacheStats) for tests and the stress binary

pub mod meter;
pub mod stats;


// Re-export commonly used items
pub use meter::*;
pub use stats::{CacheCounters, CacheStats};
