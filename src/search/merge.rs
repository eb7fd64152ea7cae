//! Sliding-window combination of two independently paginated,
//! time-descending sources into one sorted, deduplicated page stream.
//!
//! Neither source knows the other's ordering, so each merge step sorts one
//! capped batch per source and retains the overflow ("spillover") for the
//! next call. The next fetch always targets the source that produced the
//! oldest retained element: the other source's unfetched tail cannot be
//! newer than what we already hold.
//!
//! The merger is pure. Each step consumes a `PaginationState` and returns
//! the emitted page together with the successor state; the caller does the
//! fetching that `next_fetch` asks for.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::provider::{MatchResult, ResultPage};

/// Which provider a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Source {
    Local,
    Remote,
}

impl Source {
    pub fn other(self) -> Source {
        match self {
            Source::Local => Source::Remote,
            Source::Remote => Source::Local,
        }
    }
}

/// A fetched-but-not-yet-emitted result with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SpillEntry {
    result: MatchResult,
    source: Source,
}

/// Per-session pagination state for the combined path. Immutable from the
/// caller's perspective: every step returns a new value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PaginationState {
    local_cursor: Option<String>,
    remote_cursor: Option<String>,
    spillover: Vec<SpillEntry>,
    oldest_source: Option<Source>,
    /// Fixed at the first merge; partial pages carry no meaningful totals.
    total_count: usize,
    /// Event ids already emitted, for cross-page deduplication
    /// (server pagination tokens may overlap slightly across pages).
    seen_ids: HashSet<String>,
    highlights: BTreeSet<String>,
}

impl PaginationState {
    /// Nothing left to fetch and nothing left to drain.
    pub fn is_exhausted(&self) -> bool {
        self.local_cursor.is_none() && self.remote_cursor.is_none() && self.spillover.is_empty()
    }

    fn cursor(&self, source: Source) -> Option<&String> {
        match source {
            Source::Local => self.local_cursor.as_ref(),
            Source::Remote => self.remote_cursor.as_ref(),
        }
    }

    fn set_cursor(&mut self, source: Source, cursor: Option<String>) {
        match source {
            Source::Local => self.local_cursor = cursor,
            Source::Remote => self.remote_cursor = cursor,
        }
    }

    /// What the caller should fetch next: the source owing the oldest
    /// retained element, falling back to whichever source still has a
    /// cursor. `None` means drain the spillover (or done).
    pub fn next_fetch(&self) -> Option<(Source, String)> {
        let preferred = self.oldest_source.unwrap_or(Source::Local);
        for source in [preferred, preferred.other()] {
            if let Some(cursor) = self.cursor(source) {
                return Some((source, cursor.clone()));
            }
        }
        None
    }
}

/// First merge step: one capped page fetched from each source.
pub fn first_page(local: ResultPage, remote: ResultPage, limit: usize) -> (ResultPage, PaginationState) {
    let mut state = PaginationState {
        local_cursor: local.next_cursor.clone(),
        remote_cursor: remote.next_cursor.clone(),
        total_count: local.total_count + remote.total_count,
        ..Default::default()
    };
    state.highlights.extend(local.highlights.iter().cloned());
    state.highlights.extend(remote.highlights.iter().cloned());

    let mut candidates = tag(local.results, Source::Local);
    candidates.extend(tag(remote.results, Source::Remote));
    emit(state, candidates, limit)
}

/// Subsequent merge step. `fetched` is the batch `next_fetch` asked for,
/// or `None` when both sources are exhausted and only spillover remains.
pub fn next_page(
    mut state: PaginationState,
    fetched: Option<(ResultPage, Source)>,
    limit: usize,
) -> (ResultPage, PaginationState) {
    let mut candidates = std::mem::take(&mut state.spillover);
    if let Some((page, source)) = fetched {
        state.set_cursor(source, page.next_cursor.clone());
        state.highlights.extend(page.highlights.iter().cloned());
        candidates.extend(tag(page.results, source));
    }
    emit(state, candidates, limit)
}

fn tag(results: Vec<MatchResult>, source: Source) -> Vec<SpillEntry> {
    results
        .into_iter()
        .map(|result| SpillEntry { result, source })
        .collect()
}

fn emit(
    mut state: PaginationState,
    mut candidates: Vec<SpillEntry>,
    limit: usize,
) -> (ResultPage, PaginationState) {
    // Stable sort keeps the within-source order for equal timestamps.
    candidates.sort_by(|a, b| b.result.origin_server_ts.cmp(&a.result.origin_server_ts));

    // Drop anything already emitted, and collapse duplicates within the
    // batch itself (a re-fetch can overlap the spillover).
    let mut fresh: Vec<SpillEntry> = Vec::with_capacity(candidates.len());
    let mut batch_ids = state.seen_ids.clone();
    for entry in candidates {
        if batch_ids.insert(entry.result.event_id.clone()) {
            fresh.push(entry);
        }
    }

    let rest = fresh.split_off(fresh.len().min(limit));
    let emitted = fresh;

    for entry in &emitted {
        state.seen_ids.insert(entry.result.event_id.clone());
    }
    state.oldest_source = rest
        .last()
        .map(|e| e.source)
        .or_else(|| emitted.last().map(|e| e.source))
        .or(state.oldest_source);
    state.spillover = rest;

    let page = ResultPage {
        results: emitted.into_iter().map(|e| e.result).collect(),
        total_count: state.total_count,
        highlights: state.highlights.clone(),
        next_cursor: None,
    };
    (page, state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, ts: i64) -> MatchResult {
        MatchResult {
            event_id: id.to_string(),
            room_id: "!room".into(),
            sender: "@user:hs".into(),
            origin_server_ts: ts,
            body: format!("message at {}", ts),
            rank: 0.0,
            context_before: vec![],
            context_after: vec![],
        }
    }

    fn page(prefix: &str, timestamps: &[i64], total: usize, cursor: Option<&str>) -> ResultPage {
        ResultPage {
            results: timestamps
                .iter()
                .map(|ts| result(&format!("${}{}", prefix, ts), *ts))
                .collect(),
            total_count: total,
            highlights: Default::default(),
            next_cursor: cursor.map(String::from),
        }
    }

    fn timestamps(page: &ResultPage) -> Vec<i64> {
        page.results.iter().map(|r| r.origin_server_ts).collect()
    }

    #[test]
    fn test_sliding_window_sequence() {
        // A = [10,8,6,4,2], B = [9,7,5,3,1], window of 3.
        let (page1, state) = first_page(
            page("a", &[10, 8, 6], 5, Some("a2")),
            page("b", &[9, 7, 5], 5, Some("b2")),
            3,
        );
        assert_eq!(timestamps(&page1), vec![10, 9, 8]);
        assert_eq!(page1.total_count, 10);

        // Oldest retained element (5) came from B, so B is fetched next.
        let (source, cursor) = state.next_fetch().unwrap();
        assert_eq!(source, Source::Remote);
        assert_eq!(cursor, "b2");

        let (page2, state) = next_page(state, Some((page("b", &[3, 1], 0, None), source)), 3);
        assert_eq!(timestamps(&page2), vec![7, 6, 5]);
        assert_eq!(page2.total_count, 10);

        // B is exhausted; the remaining source is A.
        let (source, cursor) = state.next_fetch().unwrap();
        assert_eq!(source, Source::Local);
        assert_eq!(cursor, "a2");

        let (page3, state) = next_page(state, Some((page("a", &[4, 2], 0, None), source)), 3);
        assert_eq!(timestamps(&page3), vec![4, 3, 2]);

        // Both sources done: drain the spillover.
        assert!(state.next_fetch().is_none());
        assert!(!state.is_exhausted());
        let (page4, state) = next_page(state, None, 3);
        assert_eq!(timestamps(&page4), vec![1]);
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_emitted_sequence_sorted_and_unique() {
        let (page1, state) = first_page(
            page("a", &[10, 8, 6], 5, Some("a2")),
            page("b", &[9, 7, 5], 5, Some("b2")),
            3,
        );
        let (source, _) = state.next_fetch().unwrap();
        let (page2, state) = next_page(state, Some((page("b", &[3, 1], 0, None), source)), 3);
        let (source, _) = state.next_fetch().unwrap();
        let (page3, state) = next_page(state, Some((page("a", &[4, 2], 0, None), source)), 3);
        let (page4, _) = next_page(state, None, 3);

        let mut all: Vec<&MatchResult> = Vec::new();
        for p in [&page1, &page2, &page3, &page4] {
            all.extend(p.results.iter());
        }
        for pair in all.windows(2) {
            assert!(pair[0].origin_server_ts >= pair[1].origin_server_ts);
        }
        let ids: HashSet<&str> = all.iter().map(|r| r.event_id.as_str()).collect();
        assert_eq!(ids.len(), all.len());
    }

    #[test]
    fn test_overlapping_refetch_deduplicated() {
        let (page1, state) = first_page(
            page("x", &[10, 9], 4, Some("next")),
            ResultPage::empty(),
            2,
        );
        assert_eq!(timestamps(&page1), vec![10, 9]);

        // Server re-returns the boundary event $x9 on the next page.
        let (source, _) = state.next_fetch().unwrap();
        let (page2, _) = next_page(state, Some((page("x", &[9, 8], 0, None), source)), 2);
        assert_eq!(timestamps(&page2), vec![8]);
        assert_eq!(page2.results[0].event_id, "$x8");
    }

    #[test]
    fn test_total_count_fixed_after_first_merge() {
        let (page1, state) = first_page(
            page("a", &[10], 7, Some("a2")),
            page("b", &[9], 3, Some("b2")),
            1,
        );
        assert_eq!(page1.total_count, 10);
        let (source, _) = state.next_fetch().unwrap();
        // A later page claims an absurd total; it is ignored.
        let mut later = page("b", &[8], 999, None);
        later.total_count = 999;
        let (page2, state) = next_page(state, Some((later, source)), 1);
        assert_eq!(page2.total_count, 10);
        // The fixed total also survives into subsequent pages.
        let (page3, _) = next_page(state, None, 1);
        assert_eq!(page3.total_count, 10);
    }

    #[test]
    fn test_one_source_empty_from_start() {
        let (page1, state) = first_page(
            ResultPage::empty(),
            page("b", &[5, 4, 3], 3, None),
            2,
        );
        assert_eq!(timestamps(&page1), vec![5, 4]);
        assert!(state.next_fetch().is_none());
        let (page2, state) = next_page(state, None, 2);
        assert_eq!(timestamps(&page2), vec![3]);
        assert!(state.is_exhausted());
    }

    #[test]
    fn test_highlights_accumulate_across_sources() {
        let mut local = page("a", &[10], 1, None);
        local.highlights.insert("alpha".into());
        let mut remote = page("b", &[9], 1, None);
        remote.highlights.insert("beta".into());
        let (page1, _) = first_page(local, remote, 5);
        assert!(page1.highlights.contains("alpha"));
        assert!(page1.highlights.contains("beta"));
    }

    #[test]
    fn test_state_round_trips_through_serde() {
        let (_, state) = first_page(
            page("a", &[10, 8], 5, Some("a2")),
            page("b", &[9], 5, Some("b2")),
            2,
        );
        let token = serde_json::to_string(&state).unwrap();
        let restored: PaginationState = serde_json::from_str(&token).unwrap();
        assert_eq!(restored.next_fetch(), state.next_fetch());
        assert_eq!(restored.is_exhausted(), state.is_exhausted());
    }
}
