// Metric name constants
pub const HITS: &str = "folder_cache_hits";
pub const MISSES: &str = "folder_cache_misses";
pub const EVICTIONS: &str = "folder_cache_evictions";
pub const LOCK_TIMEOUTS: &str = "folder_lock_timeouts";
pub const WARMUP_REJECTED: &str = "folder_warmup_rejected";

/// Adds cache hits.
pub fn add_hits(value: u64) {
    metrics::counter!(HITS).increment(value);
}

/// Adds cache misses.
pub fn add_misses(value: u64) {
    metrics::counter!(MISSES).increment(value);
}

/// Adds evicted cache entries.
pub fn add_evictions(value: u64) {
    metrics::counter!(EVICTIONS).increment(value);
}

pub fn inc_lock_timeouts() {
    metrics::counter!(LOCK_TIMEOUTS).increment(1);
}

/// Counts warm-up runs skipped because the executor was saturated.
pub fn inc_warmup_rejected() {
    metrics::counter!(WARMUP_REJECTED).increment(1);
}
