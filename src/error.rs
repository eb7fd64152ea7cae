use std::fmt;

use crate::provider::ProviderError;

/// Unified error type surfaced by the search service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchError {
    /// No local index is configured. Not fatal: the planner falls back
    /// to the remote-only path before this ever reaches a caller.
    ProviderUnavailable,
    /// A page fetch failed after its retry budget was spent.
    TransientFetch(String),
    /// The caller's cancellation token fired. An outcome, not a fault.
    Cancelled,
    /// Should not occur given the normalizer's permissive parsing.
    MalformedQuery(String),
}

impl fmt::Display for SearchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchError::ProviderUnavailable => write!(f, "no local index available"),
            SearchError::TransientFetch(msg) => write!(f, "page fetch failed: {}", msg),
            SearchError::Cancelled => write!(f, "search cancelled"),
            SearchError::MalformedQuery(q) => write!(f, "malformed query: {}", q),
        }
    }
}

impl std::error::Error for SearchError {}

impl From<ProviderError> for SearchError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::IndexUnavailable => SearchError::ProviderUnavailable,
            ProviderError::Network(msg) => SearchError::TransientFetch(msg),
            ProviderError::Pagination(msg) => SearchError::TransientFetch(msg),
            ProviderError::Cancelled => SearchError::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_conversion() {
        assert_eq!(
            SearchError::from(ProviderError::IndexUnavailable),
            SearchError::ProviderUnavailable
        );
        assert_eq!(
            SearchError::from(ProviderError::Cancelled),
            SearchError::Cancelled
        );
        match SearchError::from(ProviderError::Network("timeout".into())) {
            SearchError::TransientFetch(msg) => assert_eq!(msg, "timeout"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_display() {
        let e = SearchError::TransientFetch("502".into());
        assert_eq!(e.to_string(), "page fetch failed: 502");
    }
}
