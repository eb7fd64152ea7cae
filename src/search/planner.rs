//! Query planning: which provider(s) answer a query, and how pagination
//! re-enters the branch that produced the first page.
//!
//! The branch decision itself is a pure function of explicit inputs
//! (`plan`); provider availability is data, not exception control flow.

use std::collections::{BTreeSet, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::{
    LocalIndexClient, LocalSearchArgs, MatchResult, ProviderError, RemoteSearchBody,
    RemoteSearchClient, ResultPage, RoomDirectory,
};
use crate::query::{Keyword, SearchTerm};
use crate::search::cascade::{self, CascadeBackend, CascadeOutcome};
use crate::search::highlight;
use crate::search::merge::{self, PaginationState, Source};
use crate::search::scan;

/// Result cap for the local-index author query raced against the sender
/// scan. Large enough to cover any realistic single-author room history.
const AUTHOR_INDEX_LIMIT: usize = 500;

/// What a query targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchScope {
    Room(String),
    Global,
}

impl SearchScope {
    pub(crate) fn room_id(&self) -> Option<&str> {
        match self {
            SearchScope::Room(id) => Some(id),
            SearchScope::Global => None,
        }
    }
}

/// The four ways a query can be answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Exhaustive backward timeline walk; search backends are not reliable
    /// author filters over full history.
    SenderScan,
    LocalOnly,
    RemoteOnly,
    /// Both cascades concurrently, folded by the sliding-window merger.
    Combined,
}

/// Pick a strategy. Pure function of the four inputs.
pub fn plan(
    scope: &SearchScope,
    room_encrypted: bool,
    has_author: bool,
    local_available: bool,
) -> Strategy {
    match scope {
        SearchScope::Room(_) => {
            if has_author {
                Strategy::SenderScan
            } else if room_encrypted && local_available {
                Strategy::LocalOnly
            } else {
                // Unencrypted rooms are the server's territory; encrypted
                // rooms without a local index get best-effort remote.
                Strategy::RemoteOnly
            }
        }
        SearchScope::Global => {
            if local_available {
                Strategy::Combined
            } else {
                Strategy::RemoteOnly
            }
        }
    }
}

/// Everything strategy execution needs, borrowed from the service.
pub(crate) struct PlannerContext<'a> {
    pub local: Option<&'a dyn LocalIndexClient>,
    pub remote: &'a dyn RemoteSearchClient,
    pub rooms: &'a dyn RoomDirectory,
    pub config: &'a SearchConfig,
}

/// How a session continues after a page. Serializable so it doubles as the
/// opaque cursor token handed outward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Continuation {
    Exhausted,
    /// One provider, paginated with its own cursor.
    Single {
        source: Source,
        keyword: Keyword,
        scope: SearchScope,
        sender: Option<String>,
        cursor: String,
        seen: HashSet<String>,
    },
    /// Dual-source sliding-window merge.
    Combined {
        local_term: Option<String>,
        remote_term: Option<String>,
        scope: SearchScope,
        sender: Option<String>,
        state: PaginationState,
    },
    /// Fully collected results paged out of memory (sender scan).
    Memory {
        rest: Vec<MatchResult>,
        total: usize,
        highlights: BTreeSet<String>,
    },
}

/// Execute the planned strategy for a fresh query.
pub(crate) async fn execute_initial(
    ctx: &PlannerContext<'_>,
    term: &SearchTerm,
    scope: &SearchScope,
    cancel: &CancellationToken,
) -> Result<(ResultPage, Continuation), SearchError> {
    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    // A wildcard keyword with no author filter matches everything and
    // therefore nothing useful; answer without touching providers.
    if term.keyword == Keyword::Any && !term.has_author() {
        return Ok((ResultPage::empty(), Continuation::Exhausted));
    }

    let room_encrypted = scope
        .room_id()
        .map(|id| ctx.rooms.is_encrypted(id))
        .unwrap_or(false);
    let strategy = plan(scope, room_encrypted, term.has_author(), ctx.local.is_some());
    log::debug!(
        "query plan: {:?} (scope {:?}, encrypted {}, author {}, local index {})",
        strategy,
        scope,
        room_encrypted,
        term.has_author(),
        ctx.local.is_some()
    );

    if strategy == Strategy::SenderScan {
        if let (Some(room_id), Some(author)) = (scope.room_id(), term.author.as_deref()) {
            return sender_scan_initial(ctx, room_id, author, term.keyword.as_text(), cancel)
                .await;
        }
    }

    match strategy {
        Strategy::LocalOnly => single_source_initial(ctx, Source::Local, term, scope, cancel).await,
        Strategy::Combined => combined_initial(ctx, term, scope, cancel).await,
        Strategy::RemoteOnly | Strategy::SenderScan => {
            single_source_initial(ctx, Source::Remote, term, scope, cancel).await
        }
    }
}

/// Produce the next page for a session, re-entering the branch that
/// produced the first one.
pub(crate) async fn execute_next(
    ctx: &PlannerContext<'_>,
    continuation: Continuation,
    cancel: &CancellationToken,
) -> Result<(ResultPage, Continuation), SearchError> {
    if cancel.is_cancelled() {
        return Err(SearchError::Cancelled);
    }

    match continuation {
        Continuation::Exhausted => Ok((ResultPage::empty(), Continuation::Exhausted)),
        Continuation::Memory {
            mut rest,
            total,
            highlights,
        } => {
            let take = ctx.config.page_size.min(rest.len());
            let results: Vec<MatchResult> = rest.drain(..take).collect();
            let page = ResultPage {
                results,
                total_count: total,
                highlights: highlights.clone(),
                next_cursor: None,
            };
            let next = if rest.is_empty() {
                Continuation::Exhausted
            } else {
                Continuation::Memory {
                    rest,
                    total,
                    highlights,
                }
            };
            Ok((page, next))
        }
        Continuation::Single {
            source,
            keyword,
            scope,
            sender,
            cursor,
            mut seen,
        } => {
            let fetched = fetch_source_with_retry(
                ctx,
                source,
                &keyword,
                &scope,
                sender.as_deref(),
                Some(&cursor),
                cancel,
            )
            .await?;
            let mut page = match fetched {
                Some(page) => page,
                // Retry budget spent: this source is done for the session.
                None => return Ok((ResultPage::empty(), Continuation::Exhausted)),
            };
            page.results.retain(|r| !seen.contains(&r.event_id));
            seen.extend(page.results.iter().map(|r| r.event_id.clone()));
            let next = match page.next_cursor.take() {
                Some(cursor) => Continuation::Single {
                    source,
                    keyword,
                    scope,
                    sender,
                    cursor,
                    seen,
                },
                None => Continuation::Exhausted,
            };
            Ok((page, next))
        }
        Continuation::Combined {
            local_term,
            remote_term,
            scope,
            sender,
            state,
        } => {
            let (page, state) = match state.next_fetch() {
                None => merge::next_page(state, None, ctx.config.page_size),
                Some((source, cursor)) => {
                    let keyword = match source {
                        Source::Local => local_term
                            .clone()
                            .map(Keyword::Text)
                            .unwrap_or(Keyword::Any),
                        Source::Remote => remote_term
                            .clone()
                            .map(Keyword::Text)
                            .unwrap_or(Keyword::Any),
                    };
                    let fetched = fetch_source_with_retry(
                        ctx,
                        source,
                        &keyword,
                        &scope,
                        sender.as_deref(),
                        Some(&cursor),
                        cancel,
                    )
                    .await?
                    // A dead source merges as an empty cursor-less page,
                    // dropping it out of the rotation.
                    .unwrap_or_else(ResultPage::empty);
                    merge::next_page(state, Some((fetched, source)), ctx.config.page_size)
                }
            };
            let next = if state.is_exhausted() {
                Continuation::Exhausted
            } else {
                Continuation::Combined {
                    local_term,
                    remote_term,
                    scope,
                    sender,
                    state,
                }
            };
            Ok((page, next))
        }
    }
}

async fn single_source_initial(
    ctx: &PlannerContext<'_>,
    source: Source,
    term: &SearchTerm,
    scope: &SearchScope,
    cancel: &CancellationToken,
) -> Result<(ResultPage, Continuation), SearchError> {
    let outcome = run_source(ctx, source, term, scope, cancel).await?;
    let mut page = outcome.page;
    let provider_cursor = page.next_cursor.take();

    let winning = match (&term.keyword, outcome.winning_term) {
        (Keyword::Any, _) => Some(Keyword::Any),
        (_, Some(text)) => Some(Keyword::Text(text)),
        (_, None) => None,
    };
    let next = match (provider_cursor, winning) {
        (Some(cursor), Some(keyword)) => Continuation::Single {
            source,
            keyword,
            scope: scope.clone(),
            sender: term.author.clone(),
            cursor,
            seen: page.results.iter().map(|r| r.event_id.clone()).collect(),
        },
        _ => Continuation::Exhausted,
    };
    Ok((page, next))
}

async fn combined_initial(
    ctx: &PlannerContext<'_>,
    term: &SearchTerm,
    scope: &SearchScope,
    cancel: &CancellationToken,
) -> Result<(ResultPage, Continuation), SearchError> {
    let local_fut = run_source(ctx, Source::Local, term, scope, cancel);
    let remote_fut = run_source(ctx, Source::Remote, term, scope, cancel);
    let (local, remote) = tokio::join!(local_fut, remote_fut);
    let local = local?;
    let remote = remote?;

    let local_term = local.winning_term;
    let remote_term = remote.winning_term;
    let (page, state) = merge::first_page(local.page, remote.page, ctx.config.page_size);
    let next = if state.is_exhausted() {
        Continuation::Exhausted
    } else {
        Continuation::Combined {
            local_term,
            remote_term,
            scope: scope.clone(),
            sender: term.author.clone(),
            state,
        }
    };
    Ok((page, next))
}

/// Run one source's first fetch: the cascade for a text keyword, a single
/// wildcard query for the sentinel. Provider failures yield an empty
/// outcome; only cancellation propagates.
async fn run_source(
    ctx: &PlannerContext<'_>,
    source: Source,
    term: &SearchTerm,
    scope: &SearchScope,
    cancel: &CancellationToken,
) -> Result<CascadeOutcome, SearchError> {
    match (&term.keyword, source) {
        (Keyword::Text(text), Source::Local) => {
            let Some(client) = ctx.local else {
                return Ok(CascadeOutcome::empty());
            };
            let backend = LocalBackend {
                client,
                room_id: scope.room_id().map(String::from),
                sender: term.author.clone(),
                config: ctx.config,
            };
            cascade::run(&backend, text, ctx.config.cascade_early_exit, cancel).await
        }
        (Keyword::Text(text), Source::Remote) => {
            let backend = RemoteBackend {
                client: ctx.remote,
                room_id: scope.room_id().map(String::from),
                sender: term.author.clone(),
                config: ctx.config,
            };
            cascade::run(&backend, text, ctx.config.cascade_early_exit, cancel).await
        }
        (Keyword::Any, _) => {
            let page = fetch_source_with_retry(
                ctx,
                source,
                &Keyword::Any,
                scope,
                term.author.as_deref(),
                None,
                cancel,
            )
            .await?
            .unwrap_or_else(ResultPage::empty);
            Ok(CascadeOutcome {
                page,
                winning_term: None,
            })
        }
    }
}

/// One paged fetch against a source, with the session retry budget.
/// `Ok(None)` means the budget is spent (or the source cannot serve the
/// query at all) and the source should be treated as exhausted.
async fn fetch_source_with_retry(
    ctx: &PlannerContext<'_>,
    source: Source,
    keyword: &Keyword,
    scope: &SearchScope,
    sender: Option<&str>,
    cursor: Option<&str>,
    cancel: &CancellationToken,
) -> Result<Option<ResultPage>, SearchError> {
    // The remote API has no wildcard term; a match-any remote fetch is
    // only reachable with an author filter, which the scan covers better.
    if source == Source::Remote && keyword.as_text().is_none() {
        return Ok(None);
    }

    for attempt in 0..=ctx.config.page_retry_limit {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        let result = match source {
            Source::Local => match ctx.local {
                Some(client) => {
                    client
                        .search(
                            LocalSearchArgs {
                                term: keyword.clone(),
                                room_id: scope.room_id().map(String::from),
                                sender: sender.map(String::from),
                                limit: ctx.config.page_size,
                                before_context: ctx.config.before_context,
                                after_context: ctx.config.after_context,
                                cursor: cursor.map(String::from),
                            },
                            cancel,
                        )
                        .await
                }
                None => Err(ProviderError::IndexUnavailable),
            },
            Source::Remote => {
                let term = keyword.as_text().unwrap_or_default().to_string();
                ctx.remote
                    .search(
                        RemoteSearchBody {
                            term,
                            room_id: scope.room_id().map(String::from),
                            sender: sender.map(String::from),
                            limit: ctx.config.page_size,
                            before_context: ctx.config.before_context,
                            after_context: ctx.config.after_context,
                        },
                        cursor,
                        cancel,
                    )
                    .await
            }
        };
        match result {
            Ok(page) => return Ok(Some(page)),
            Err(ProviderError::Cancelled) => return Err(SearchError::Cancelled),
            Err(ProviderError::IndexUnavailable) => {
                log::debug!("local index unavailable, source dropped");
                return Ok(None);
            }
            Err(e) if attempt < ctx.config.page_retry_limit => {
                log::debug!("{:?} page fetch failed ({}), retry {}", source, e, attempt + 1);
            }
            Err(e) => {
                log::warn!("{:?} page fetch failed after retries: {}", source, e);
                return Ok(None);
            }
        }
    }
    Ok(None)
}

/// Author-filtered room query: the timeline scan is authoritative; if a
/// local index exists it is raced concurrently and the two result sets are
/// unioned by event id. A count mismatch is diagnostic, never fatal.
async fn sender_scan_initial(
    ctx: &PlannerContext<'_>,
    room_id: &str,
    author: &str,
    keyword: Option<&str>,
    cancel: &CancellationToken,
) -> Result<(ResultPage, Continuation), SearchError> {
    let Some(timeline) = ctx.rooms.timeline(room_id) else {
        log::warn!("no timeline available for {}", room_id);
        return Ok((ResultPage::empty(), Continuation::Exhausted));
    };

    let scan_fut = scan::collect_sender_events(timeline, author, keyword, ctx.config, cancel);
    let index_fut = async {
        match ctx.local {
            Some(client) => Some(
                client
                    .search(
                        LocalSearchArgs {
                            term: keyword
                                .map(|k| Keyword::Text(k.to_string()))
                                .unwrap_or(Keyword::Any),
                            room_id: Some(room_id.to_string()),
                            sender: Some(author.to_string()),
                            limit: AUTHOR_INDEX_LIMIT,
                            before_context: 0,
                            after_context: 0,
                            cursor: None,
                        },
                        cancel,
                    )
                    .await,
            ),
            None => None,
        }
    };
    let (scan_result, index_result) = tokio::join!(scan_fut, index_fut);
    let mut results = scan_result?;

    if let Some(index_result) = index_result {
        match index_result {
            Ok(index_page) => {
                if index_page.results.len() != results.len() {
                    log::info!(
                        "author results for {} disagree: index {}, timeline scan {}",
                        author,
                        index_page.results.len(),
                        results.len()
                    );
                }
                let known: HashSet<&str> = results.iter().map(|r| r.event_id.as_str()).collect();
                let extra: Vec<MatchResult> = index_page
                    .results
                    .into_iter()
                    .filter(|r| !known.contains(r.event_id.as_str()))
                    .collect();
                results.extend(extra);
                results.sort_by(|a, b| b.origin_server_ts.cmp(&a.origin_server_ts));
            }
            Err(e) => log::warn!("local author query failed, using scan only: {}", e),
        }
    }

    let highlights = keyword
        .map(|k| highlight::collect_highlights(&results, k))
        .unwrap_or_default();
    Ok(paged_from_memory(results, highlights, ctx.config.page_size))
}

fn paged_from_memory(
    results: Vec<MatchResult>,
    highlights: BTreeSet<String>,
    limit: usize,
) -> (ResultPage, Continuation) {
    let total = results.len();
    let mut rest = results;
    let take = limit.min(rest.len());
    let first: Vec<MatchResult> = rest.drain(..take).collect();
    let page = ResultPage {
        results: first,
        total_count: total,
        highlights: highlights.clone(),
        next_cursor: None,
    };
    let next = if rest.is_empty() {
        Continuation::Exhausted
    } else {
        Continuation::Memory {
            rest,
            total,
            highlights,
        }
    };
    (page, next)
}

struct LocalBackend<'a> {
    client: &'a dyn LocalIndexClient,
    room_id: Option<String>,
    sender: Option<String>,
    config: &'a SearchConfig,
}

#[async_trait]
impl CascadeBackend for LocalBackend<'_> {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn search(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, ProviderError> {
        self.client
            .search(
                LocalSearchArgs {
                    term: Keyword::Text(term.to_string()),
                    room_id: self.room_id.clone(),
                    sender: self.sender.clone(),
                    limit: self.config.page_size,
                    before_context: self.config.before_context,
                    after_context: self.config.after_context,
                    cursor: None,
                },
                cancel,
            )
            .await
    }
}

struct RemoteBackend<'a> {
    client: &'a dyn RemoteSearchClient,
    room_id: Option<String>,
    sender: Option<String>,
    config: &'a SearchConfig,
}

#[async_trait]
impl CascadeBackend for RemoteBackend<'_> {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn search(
        &self,
        term: &str,
        cancel: &CancellationToken,
    ) -> Result<ResultPage, ProviderError> {
        self.client
            .search(
                RemoteSearchBody {
                    term: term.to_string(),
                    room_id: self.room_id.clone(),
                    sender: self.sender.clone(),
                    limit: self.config.page_size,
                    before_context: self.config.before_context,
                    after_context: self.config.after_context,
                },
                None,
                cancel,
            )
            .await
    }
}
