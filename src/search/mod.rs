//! The search service: the single outward entry point over the query
//! pipeline (normalization, planning, cascade, merge, cache).

pub(crate) mod cascade;
pub(crate) mod highlight;
pub(crate) mod merge;
pub(crate) mod planner;
pub(crate) mod scan;

pub use planner::{plan, SearchScope, Strategy};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::{LocalIndexClient, RemoteSearchClient, ResultPage, RoomDirectory};
use crate::query::SearchTerm;
use planner::{Continuation, PlannerContext};

/// One query as the caller poses it. The raw text still carries any
/// `sender:` token; parsing happens inside the service.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: String,
    pub scope: SearchScope,
}

/// Pagination handle returned with the first page. Holds everything needed
/// to produce subsequent pages without re-running the initial query.
pub struct SearchSession {
    continuation: AsyncMutex<Continuation>,
    cancel: CancellationToken,
    /// Bumped once per produced page; lets a caller that lost the race for
    /// the continuation lock return the page the winner produced.
    page_seq: AtomicU64,
    last_page: Mutex<Option<ResultPage>>,
}

impl SearchSession {
    fn new(continuation: Continuation, cancel: CancellationToken) -> Self {
        SearchSession {
            continuation: AsyncMutex::new(continuation),
            cancel,
            page_seq: AtomicU64::new(0),
            last_page: Mutex::new(None),
        }
    }

    /// Abort any in-flight pagination for this session.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Stateful search front. Owns the first-page cache and the debounce
/// generation counter; providers are injected at construction.
pub struct SearchService {
    local: Option<Arc<dyn LocalIndexClient>>,
    remote: Arc<dyn RemoteSearchClient>,
    rooms: Arc<dyn RoomDirectory>,
    cache: Mutex<ResultCache>,
    debounce_generation: AtomicU64,
    config: SearchConfig,
}

impl SearchService {
    pub fn new(
        local: Option<Arc<dyn LocalIndexClient>>,
        remote: Arc<dyn RemoteSearchClient>,
        rooms: Arc<dyn RoomDirectory>,
        config: SearchConfig,
    ) -> Self {
        let cache = Mutex::new(ResultCache::new(config.cache_ttl, config.cache_max_entries));
        SearchService {
            local,
            remote,
            rooms,
            cache,
            debounce_generation: AtomicU64::new(0),
            config,
        }
    }

    /// Run a fresh query and return the first page with a pagination
    /// session. An empty page with `total_count` 0 is the well-formed
    /// no-results answer, never an error.
    pub async fn initial(
        &self,
        request: &SearchRequest,
        cancel: CancellationToken,
    ) -> Result<(ResultPage, SearchSession), SearchError> {
        let term = SearchTerm::parse(&request.query);
        let key = cache_key(&request.scope, &term);

        if let Some(page) = self.cached(&key) {
            log::debug!("serving {:?} from cache", key);
            let continuation = decode_token(&page)?;
            return Ok((page, SearchSession::new(continuation, cancel)));
        }

        let ctx = self.planner_context();
        let (mut page, continuation) =
            planner::execute_initial(&ctx, &term, &request.scope, &cancel).await?;
        page.next_cursor = encode_token(&continuation);

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(key, page.clone());
        }
        Ok((page, SearchSession::new(continuation, cancel)))
    }

    /// Produce the next page for a session. Past exhaustion this keeps
    /// returning empty pages. Concurrent callers are serialized; a caller
    /// that arrives while another is already fetching gets that fetch's
    /// page rather than advancing the session twice.
    pub async fn more(&self, session: &SearchSession) -> Result<ResultPage, SearchError> {
        let seq_before = session.page_seq.load(Ordering::SeqCst);
        let mut slot = session.continuation.lock().await;
        if session.page_seq.load(Ordering::SeqCst) != seq_before {
            if let Ok(last) = session.last_page.lock() {
                if let Some(page) = last.clone() {
                    return Ok(page);
                }
            }
        }

        let continuation = std::mem::replace(&mut *slot, Continuation::Exhausted);
        let ctx = self.planner_context();
        let (mut page, next) = planner::execute_next(&ctx, continuation, &session.cancel).await?;
        page.next_cursor = encode_token(&next);
        *slot = next;

        session.page_seq.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = session.last_page.lock() {
            *last = Some(page.clone());
        }
        Ok(page)
    }

    /// As-you-type entry point. Without a caller-supplied token the query
    /// waits out the debounce delay first; `Ok(None)` means a newer query
    /// superseded this one while it waited. Input that reads as complete
    /// (trailing whitespace or terminal punctuation) skips the delay.
    pub async fn search_debounced(
        &self,
        request: &SearchRequest,
        cancel: Option<CancellationToken>,
    ) -> Result<Option<(ResultPage, SearchSession)>, SearchError> {
        let token = match cancel {
            Some(token) => token,
            None => {
                if !looks_complete(&request.query) {
                    let generation = self.debounce_generation.fetch_add(1, Ordering::SeqCst) + 1;
                    tokio::time::sleep(self.config.debounce_delay).await;
                    if self.debounce_generation.load(Ordering::SeqCst) != generation {
                        log::debug!("query {:?} superseded while debouncing", request.query);
                        return Ok(None);
                    }
                }
                CancellationToken::new()
            }
        };
        let (page, session) = self.initial(request, token).await?;
        Ok(Some((page, session)))
    }

    fn cached(&self, key: &str) -> Option<ResultPage> {
        self.cache.lock().ok().and_then(|mut cache| cache.get(key))
    }

    fn planner_context(&self) -> PlannerContext<'_> {
        PlannerContext {
            local: self.local.as_deref(),
            remote: self.remote.as_ref(),
            rooms: self.rooms.as_ref(),
            config: &self.config,
        }
    }
}

fn cache_key(scope: &SearchScope, term: &SearchTerm) -> String {
    match scope {
        SearchScope::Room(id) => format!("{}|{}", id, term.normalized()),
        SearchScope::Global => format!("global|{}", term.normalized()),
    }
}

/// Serialize a continuation into the opaque cursor carried on the page.
/// Exhausted sessions carry no cursor.
fn encode_token(continuation: &Continuation) -> Option<String> {
    match continuation {
        Continuation::Exhausted => None,
        other => match serde_json::to_string(other) {
            Ok(token) => Some(token),
            Err(e) => {
                log::warn!("failed to encode continuation token: {}", e);
                None
            }
        },
    }
}

/// Rebuild the continuation from a page's cursor, as when a cached first
/// page starts a new session.
fn decode_token(page: &ResultPage) -> Result<Continuation, SearchError> {
    match &page.next_cursor {
        None => Ok(Continuation::Exhausted),
        Some(token) => serde_json::from_str(token)
            .map_err(|e| SearchError::MalformedQuery(format!("bad continuation token: {}", e))),
    }
}

/// Input that ends in whitespace or terminal punctuation reads as a
/// finished thought and is searched immediately.
fn looks_complete(query: &str) -> bool {
    query
        .chars()
        .last()
        .map(|c| c.is_whitespace() || matches!(c, '.' | '!' | '?'))
        .unwrap_or(false)
}
