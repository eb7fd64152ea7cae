//! Sender-scoped exhaustive history scan.
//!
//! Search backends are not reliable author filters over full history, so a
//! "messages from this sender" query walks the room timeline backward from
//! the live edge instead, collecting matching events until the history is
//! exhausted or a hard ceiling is hit. Partial results are preferred over
//! failure: a page that keeps erroring is given up on, not propagated.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::provider::{Direction, MatchResult, ProviderError, RoomTimeline, TimelineEvent};

/// Rank assigned to scan hits; the scan has no scoring signal, recency is
/// the only order.
const SCAN_RANK: f64 = 1.0;

/// Consecutive pages yielding zero newly-seen events before the walk stops.
/// Guards against timelines that keep returning the same boundary window.
const MAX_STALE_PAGES: usize = 2;

/// Collect every event by `sender` in the room, newest first.
///
/// `keyword`, when present, additionally requires case-insensitive body
/// containment. Redacted events and non-message-like kinds are skipped.
pub async fn collect_sender_events(
    timeline: Arc<dyn RoomTimeline>,
    sender: &str,
    keyword: Option<&str>,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<Vec<MatchResult>, SearchError> {
    let keyword_lower = keyword.map(str::to_lowercase);
    let mut seen: HashSet<String> = HashSet::new();
    let mut collected: Vec<MatchResult> = Vec::new();
    let mut current = timeline;
    let mut stale_pages = 0;
    let mut pages_walked = 0;

    // The live window first, then paginate backward.
    harvest(&current.events(), sender, keyword_lower.as_deref(), &mut seen, &mut collected);

    while pages_walked < config.scan_max_pages {
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        if current.pagination_token(Direction::Backwards).is_none() {
            match current.neighbouring_segment(Direction::Backwards) {
                Some(older) => {
                    current = older;
                    let new = harvest(
                        &current.events(),
                        sender,
                        keyword_lower.as_deref(),
                        &mut seen,
                        &mut collected,
                    );
                    if new == 0 {
                        stale_pages += 1;
                        if stale_pages >= MAX_STALE_PAGES {
                            break;
                        }
                    } else {
                        stale_pages = 0;
                    }
                    pages_walked += 1;
                    continue;
                }
                None => break,
            }
        }

        if !paginate_with_retry(current.as_ref(), config, cancel).await? {
            // Retry budget spent; keep what we have.
            break;
        }
        pages_walked += 1;

        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }

        let new = harvest(
            &current.events(),
            sender,
            keyword_lower.as_deref(),
            &mut seen,
            &mut collected,
        );
        if new == 0 {
            stale_pages += 1;
            if stale_pages >= MAX_STALE_PAGES {
                log::debug!("sender scan: {} stale pages in a row, stopping", stale_pages);
                break;
            }
        } else {
            stale_pages = 0;
        }
    }

    if pages_walked >= config.scan_max_pages {
        log::warn!(
            "sender scan hit the {} page ceiling for {}",
            config.scan_max_pages,
            sender
        );
    }

    collected.sort_by(|a, b| b.origin_server_ts.cmp(&a.origin_server_ts));
    Ok(collected)
}

/// Fold the current window into `collected`. Returns how many events were
/// newly seen (matching or not): pagination can re-return boundary events,
/// and progress is measured in new ids, not new hits.
fn harvest(
    events: &[TimelineEvent],
    sender: &str,
    keyword_lower: Option<&str>,
    seen: &mut HashSet<String>,
    collected: &mut Vec<MatchResult>,
) -> usize {
    let mut new_ids = 0;
    for event in events {
        if !seen.insert(event.event_id.clone()) {
            continue;
        }
        new_ids += 1;

        if event.redacted || !event.kind.is_message_like() || event.sender != sender {
            continue;
        }
        if let Some(kw) = keyword_lower {
            let matches = event
                .body
                .as_deref()
                .map(|body| body.to_lowercase().contains(kw))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        collected.push(MatchResult::from_event(event, SCAN_RANK));
    }
    new_ids
}

/// One backward pagination call with a bounded retry budget.
/// Returns `Ok(false)` when the budget is spent, so the caller can return
/// partial results instead of failing the whole scan.
async fn paginate_with_retry(
    timeline: &dyn RoomTimeline,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<bool, SearchError> {
    for attempt in 0..=config.page_retry_limit {
        match timeline
            .paginate(Direction::Backwards, config.scan_page_limit, cancel)
            .await
        {
            Ok(()) => return Ok(true),
            Err(ProviderError::Cancelled) => return Err(SearchError::Cancelled),
            Err(e) if attempt < config.page_retry_limit => {
                log::debug!(
                    "sender scan: page fetch failed ({}), retry {}/{}",
                    e,
                    attempt + 1,
                    config.page_retry_limit
                );
            }
            Err(e) => {
                log::warn!("sender scan: page fetch failed after retries: {}", e);
                return Ok(false);
            }
        }
    }
    Ok(false)
}
