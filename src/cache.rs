use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::provider::ResultPage;

/// Entries evicted in one sweep when the cache exceeds its capacity.
/// Bulk eviction avoids paying an eviction scan on every insert.
const BULK_EVICT_COUNT: usize = 10;

struct CacheEntry {
    page: ResultPage,
    created_at: Instant,
}

/// TTL + size bounded cache of first result pages, keyed by scope plus
/// normalized query. Owned by the search service; there is no process-wide
/// instance.
pub struct ResultCache {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

impl ResultCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        ResultCache {
            entries: HashMap::new(),
            ttl,
            max_entries,
        }
    }

    pub fn get(&mut self, key: &str) -> Option<ResultPage> {
        self.get_at(key, Instant::now())
    }

    /// Lookup with an explicit clock, so TTL boundaries are testable.
    pub fn get_at(&mut self, key: &str, now: Instant) -> Option<ResultPage> {
        match self.entries.get(key) {
            Some(entry) if now.duration_since(entry.created_at) < self.ttl => {
                Some(entry.page.clone())
            }
            Some(_) => {
                self.entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&mut self, key: String, page: ResultPage) {
        self.insert_at(key, page, Instant::now());
    }

    pub fn insert_at(&mut self, key: String, page: ResultPage, now: Instant) {
        // Only successful non-empty pages are worth remembering.
        if page.results.is_empty() {
            return;
        }
        self.entries.insert(key, CacheEntry {
            page,
            created_at: now,
        });
        if self.entries.len() > self.max_entries {
            self.evict_oldest();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn evict_oldest(&mut self) {
        let mut by_age: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.created_at))
            .collect();
        by_age.sort_by_key(|(_, created)| *created);
        let victims = by_age.len().min(BULK_EVICT_COUNT);
        for (key, _) in by_age.into_iter().take(victims) {
            self.entries.remove(&key);
        }
        log::debug!("result cache evicted {} oldest entries", victims);
    }
}
