//! Cache counters, recorded through the `metrics` facade.
//!
//! Nothing is exported unless the host process installs a recorder.

use metrics::counter;

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_INVALIDATED_TOTAL: &str = "cache_invalidated_total";
}

/// Which cache a counter belongs to.
pub const QUERY: &str = "query";
pub const TOKEN: &str = "token";

pub fn record_cache_hit(cache: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "cache" => cache).increment(1);
}

pub fn record_cache_miss(cache: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "cache" => cache).increment(1);
}

pub fn record_cache_error(cache: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "cache" => cache).increment(1);
}

pub fn record_invalidated(count: u64) {
    counter!(names::CACHE_INVALIDATED_TOTAL).increment(count);
}
