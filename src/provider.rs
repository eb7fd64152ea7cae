use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::query::Keyword;

/// Error type at the provider seam. Callers map this into `SearchError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No local index is configured for this account.
    IndexUnavailable,
    /// The remote endpoint failed or was unreachable.
    Network(String),
    /// A timeline pagination call failed.
    Pagination(String),
    Cancelled,
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::IndexUnavailable => write!(f, "local index unavailable"),
            ProviderError::Network(msg) => write!(f, "network error: {}", msg),
            ProviderError::Pagination(msg) => write!(f, "pagination error: {}", msg),
            ProviderError::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Event kinds the search layer cares about. Everything else is noise
/// (state events, receipts, reactions) and is skipped by the sender scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Message,
    Encrypted,
    Sticker,
    Other,
}

impl EventKind {
    /// Whether an event of this kind can carry searchable message content.
    pub fn is_message_like(self) -> bool {
        matches!(
            self,
            EventKind::Message | EventKind::Encrypted | EventKind::Sticker
        )
    }
}

/// A single room timeline event as the providers hand it to us.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    /// Origin server timestamp in milliseconds.
    pub origin_server_ts: i64,
    pub kind: EventKind,
    pub body: Option<String>,
    pub redacted: bool,
}

/// One search hit with its surrounding context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub event_id: String,
    pub room_id: String,
    pub sender: String,
    /// Origin server timestamp in milliseconds.
    pub origin_server_ts: i64,
    pub body: String,
    pub rank: f64,
    pub context_before: Vec<TimelineEvent>,
    pub context_after: Vec<TimelineEvent>,
}

impl MatchResult {
    /// Build a context-free result from a raw timeline event.
    /// Used by the sender scan, which has no provider-supplied context.
    pub fn from_event(event: &TimelineEvent, rank: f64) -> Self {
        MatchResult {
            event_id: event.event_id.clone(),
            room_id: event.room_id.clone(),
            sender: event.sender.clone(),
            origin_server_ts: event.origin_server_ts,
            body: event.body.clone().unwrap_or_default(),
            rank,
            context_before: Vec::new(),
            context_after: Vec::new(),
        }
    }
}

/// One page of search results.
///
/// Invariant: `results` is non-increasing in `origin_server_ts`, and no
/// event id repeats within a pagination sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultPage {
    pub results: Vec<MatchResult>,
    pub total_count: usize,
    pub highlights: BTreeSet<String>,
    pub next_cursor: Option<String>,
}

impl ResultPage {
    /// The well-formed "nothing matched" page. A valid outcome, not an error.
    pub fn empty() -> Self {
        ResultPage::default()
    }
}

/// Arguments for a local index query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalSearchArgs {
    pub term: Keyword,
    pub room_id: Option<String>,
    pub sender: Option<String>,
    pub limit: usize,
    pub before_context: usize,
    pub after_context: usize,
    pub cursor: Option<String>,
}

/// Structured body for a remote search request. Ordering is always recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSearchBody {
    pub term: String,
    pub room_id: Option<String>,
    pub sender: Option<String>,
    pub limit: usize,
    pub before_context: usize,
    pub after_context: usize,
}

/// The on-device full-text index over decrypted history.
#[async_trait]
pub trait LocalIndexClient: Send + Sync {
    async fn search(
        &self,
        args: LocalSearchArgs,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, ProviderError>;
}

/// The server-side search endpoint, paginated via opaque cursors.
#[async_trait]
pub trait RemoteSearchClient: Send + Sync {
    async fn search(
        &self,
        body: RemoteSearchBody,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, ProviderError>;
}

/// Pagination direction on a room timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Backwards,
    Forwards,
}

/// A room's event timeline, consumed only by the sender scan.
///
/// `paginate` extends the window returned by `events`; when the token runs
/// out, `neighbouring_segment` may expose an older linked segment.
#[async_trait]
pub trait RoomTimeline: Send + Sync {
    fn events(&self) -> Vec<TimelineEvent>;
    fn pagination_token(&self, direction: Direction) -> Option<String>;
    fn neighbouring_segment(&self, direction: Direction) -> Option<Arc<dyn RoomTimeline>>;
    async fn paginate(
        &self,
        direction: Direction,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Result<(), ProviderError>;
}

/// Room facts the planner needs: encryption state and timeline access.
pub trait RoomDirectory: Send + Sync {
    fn is_encrypted(&self, room_id: &str) -> bool;
    fn timeline(&self, room_id: &str) -> Option<Arc<dyn RoomTimeline>>;
}
