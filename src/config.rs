use std::time::Duration;

/// Tunable limits for a search service instance.
///
/// The defaults are the empirically chosen values carried over from the
/// production system; they are plain fields so callers can override any of
/// them without a builder.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Results per emitted page (the sliding-window size `L`).
    pub page_size: usize,
    /// Context events requested before/after each match.
    pub before_context: usize,
    pub after_context: usize,
    /// Exact-attempt result count that short-circuits the cascade.
    pub cascade_early_exit: usize,
    /// Events requested per timeline pagination call during a sender scan.
    pub scan_page_limit: usize,
    /// Hard ceiling on timeline pages walked per sender scan.
    pub scan_max_pages: usize,
    /// Retries for a single transient page-fetch failure.
    pub page_retry_limit: usize,
    /// Result cache entry lifetime.
    pub cache_ttl: Duration,
    /// Result cache capacity; exceeding it evicts the oldest entries in bulk.
    pub cache_max_entries: usize,
    /// Delay before a debounced query submission fires.
    pub debounce_delay: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            page_size: 10,
            before_context: 1,
            after_context: 1,
            cascade_early_exit: 10,
            scan_page_limit: 100,
            scan_max_pages: 600,
            page_retry_limit: 2,
            cache_ttl: Duration::from_secs(120),
            cache_max_entries: 50,
            debounce_delay: Duration::from_millis(300),
        }
    }
}
