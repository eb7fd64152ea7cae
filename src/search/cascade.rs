//! Multi-strategy query cascade.
//!
//! Runs the derived term variants against one backend in priority order and
//! stops at the first variant whose results survive relevance filtering.
//! Every step is individually fault-isolated: a provider error disqualifies
//! that step's contribution and nothing else. Exhausting every variant is a
//! valid empty outcome, not an error.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::SearchError;
use crate::provider::{ProviderError, ResultPage};
use crate::query::variants::{self, VariantKind};
use crate::scoring;
use crate::search::highlight;

/// One search backend as the cascade sees it: a fresh (cursor-less) query
/// for an arbitrary term text.
#[async_trait]
pub(crate) trait CascadeBackend: Send + Sync {
    fn name(&self) -> &'static str;
    async fn search(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, ProviderError>;
}

/// Outcome of a cascade run. `winning_term` is the variant text that
/// produced the page; pagination must continue with the same text.
#[derive(Debug)]
pub(crate) struct CascadeOutcome {
    pub page: ResultPage,
    pub winning_term: Option<String>,
}

impl CascadeOutcome {
    pub(crate) fn empty() -> Self {
        CascadeOutcome {
            page: ResultPage::empty(),
            winning_term: None,
        }
    }
}

/// Run the cascade for `keyword` against `backend`.
///
/// `early_exit` is the result count on the exact attempt that skips all
/// remaining strategies, bounding latency for easy queries.
pub(crate) async fn run(
    backend: &dyn CascadeBackend,
    keyword: &str,
    early_exit: usize,
    cancel: &CancellationToken,
) -> Result<CascadeOutcome, SearchError> {
    for variant in variants::derive(keyword) {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let mut page = match backend.search(&variant.text, cancel).await {
            Ok(page) => page,
            Err(ProviderError::Cancelled) => return Err(SearchError::Cancelled),
            Err(e) => {
                log::debug!(
                    "{} cascade: variant {:?} failed ({}), trying next",
                    backend.name(),
                    variant.text,
                    e
                );
                continue;
            }
        };

        if variant.kind == VariantKind::Exact && page.results.len() >= early_exit {
            log::debug!(
                "{} cascade: exact term returned {} results, early exit",
                backend.name(),
                page.results.len()
            );
            // Skip the relevance filter, but still score and highlight so
            // the page shape matches every other accepted page.
            for result in &mut page.results {
                result.rank = scoring::score(keyword, &result.body) as f64;
            }
            page.highlights
                .append(&mut highlight::collect_highlights(&page.results, keyword));
            return Ok(CascadeOutcome {
                page,
                winning_term: Some(variant.text),
            });
        }

        // Prefix probes are judged against the probe text at the reduced
        // bar; every other variant must still be relevant to what the user
        // actually typed.
        page.results.retain(|r| match variant.kind {
            VariantKind::PrefixProbe => scoring::is_relevant_probe(&variant.text, &r.body),
            _ => scoring::is_relevant(keyword, &r.body),
        });

        if !page.results.is_empty() {
            for result in &mut page.results {
                result.rank = scoring::score(keyword, &result.body) as f64;
            }
            page.highlights
                .append(&mut highlight::collect_highlights(&page.results, keyword));
            log::debug!(
                "{} cascade: variant {:?} accepted with {} results",
                backend.name(),
                variant.text,
                page.results.len()
            );
            return Ok(CascadeOutcome {
                page,
                winning_term: Some(variant.text),
            });
        }
    }

    log::debug!("{} cascade: all variants exhausted for {:?}", backend.name(), keyword);
    Ok(CascadeOutcome::empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MatchResult;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn result(id: &str, ts: i64, body: &str) -> MatchResult {
        MatchResult {
            event_id: id.to_string(),
            room_id: "!room".into(),
            sender: "@user:hs".into(),
            origin_server_ts: ts,
            body: body.to_string(),
            rank: 0.0,
            context_before: vec![],
            context_after: vec![],
        }
    }

    fn page(results: Vec<MatchResult>) -> ResultPage {
        ResultPage {
            total_count: results.len(),
            results,
            highlights: Default::default(),
            next_cursor: None,
        }
    }

    /// Backend returning canned pages per term, recording every call.
    struct MockBackend {
        pages: HashMap<String, ResultPage>,
        errors: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn new() -> Self {
            MockBackend {
                pages: HashMap::new(),
                errors: Vec::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn with_page(mut self, term: &str, page: ResultPage) -> Self {
            self.pages.insert(term.to_string(), page);
            self
        }

        fn with_error(mut self, term: &str) -> Self {
            self.errors.push(term.to_string());
            self
        }

        fn call_count(&self) -> usize {
            self.calls.lock().map(|c| c.len()).unwrap_or(0)
        }
    }

    #[async_trait]
    impl CascadeBackend for MockBackend {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn search(
            &self,
            term: &str,
            _cancel: &CancellationToken,
        ) -> Result<ResultPage, ProviderError> {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(term.to_string());
            }
            if self.errors.iter().any(|t| t == term) {
                return Err(ProviderError::Network("boom".into()));
            }
            Ok(self.pages.get(term).cloned().unwrap_or_default())
        }
    }

    #[tokio::test]
    async fn test_early_exit_on_rich_exact_match() {
        let results: Vec<MatchResult> = (0..10)
            .map(|i| result(&format!("$e{}", i), 1000 - i, "deploy log line"))
            .collect();
        let backend = MockBackend::new().with_page("deploy", page(results));

        let cancel = CancellationToken::new();
        let outcome = run(&backend, "deploy", 10, &cancel).await.unwrap();

        assert_eq!(outcome.page.results.len(), 10);
        assert_eq!(outcome.winning_term.as_deref(), Some("deploy"));
        // No further strategy was invoked.
        assert_eq!(backend.call_count(), 1);
        // The early-exit page is scored and highlighted like any other.
        assert!(outcome.page.results.iter().all(|r| r.rank > 0.0));
        assert!(outcome.page.highlights.contains("deploy"));
    }

    #[tokio::test]
    async fn test_irrelevant_exact_results_fall_through() {
        // Exact attempt returns junk; the uppercase fold returns a real hit.
        let backend = MockBackend::new()
            .with_page("deploy", page(vec![result("$junk", 5, "completely unrelated chatter about lunch")]))
            .with_page("DEPLOY", page(vec![result("$hit", 9, "deploy finished ok")]));

        let cancel = CancellationToken::new();
        let outcome = run(&backend, "deploy", 10, &cancel).await.unwrap();

        assert_eq!(outcome.page.results.len(), 1);
        assert_eq!(outcome.page.results[0].event_id, "$hit");
        assert_eq!(outcome.winning_term.as_deref(), Some("DEPLOY"));
        assert!(outcome.page.highlights.contains("deploy"));
    }

    #[tokio::test]
    async fn test_provider_error_disqualifies_only_that_step() {
        let backend = MockBackend::new()
            .with_error("deploy")
            .with_page("DEPLOY", page(vec![result("$hit", 9, "deploy finished ok")]));

        let cancel = CancellationToken::new();
        let outcome = run(&backend, "deploy", 10, &cancel).await.unwrap();
        assert_eq!(outcome.page.results[0].event_id, "$hit");
    }

    #[tokio::test]
    async fn test_exhaustion_returns_empty_page_not_error() {
        let backend = MockBackend::new();
        let cancel = CancellationToken::new();
        let outcome = run(&backend, "nothing", 10, &cancel).await.unwrap();
        assert!(outcome.page.results.is_empty());
        assert_eq!(outcome.page.total_count, 0);
        assert!(outcome.winning_term.is_none());
        // Every variant was still attempted.
        assert!(backend.call_count() > 1);
    }

    #[tokio::test]
    async fn test_cancellation_propagates() {
        let backend = MockBackend::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = run(&backend, "deploy", 10, &cancel).await.unwrap_err();
        assert_eq!(err, SearchError::Cancelled);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_results_ranked_by_score() {
        let backend = MockBackend::new().with_page(
            "deploy",
            page(vec![
                result("$weak", 10, "depl status notes and various remarks"),
                result("$strong", 9, "deploy now"),
            ]),
        );
        let cancel = CancellationToken::new();
        let outcome = run(&backend, "deploy", 100, &cancel).await.unwrap();
        let strong = outcome.page.results.iter().find(|r| r.event_id == "$strong").unwrap();
        let weak = outcome.page.results.iter().find(|r| r.event_id == "$weak").unwrap();
        assert!(strong.rank > weak.rank);
    }
}
