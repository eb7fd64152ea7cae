//! Chat history search core: dual-source (local index + server endpoint)
//! message search with query normalization, a multi-strategy fallback
//! cascade, relevance scoring, and merged cursor pagination.
//!
//! The outward surface is [`SearchService`]: `initial` answers a query with
//! its first page and a [`SearchSession`], `more` pages the session
//! forward. Providers are injected behind the traits in [`provider`].

pub mod cache;
pub mod config;
pub mod error;
pub mod provider;
pub mod query;
pub mod scoring;
pub mod search;

pub use cache::ResultCache;
pub use config::SearchConfig;
pub use error::SearchError;
pub use provider::{
    Direction, EventKind, LocalIndexClient, LocalSearchArgs, MatchResult, ProviderError,
    RemoteSearchBody, RemoteSearchClient, ResultPage, RoomDirectory, RoomTimeline, TimelineEvent,
};
pub use query::{Keyword, SearchTerm};
pub use search::{plan, SearchRequest, SearchScope, SearchService, SearchSession, Strategy};
