//! Relevance heuristic for cascade result filtering.
//!
//! The constants are empirically tuned carry-overs, kept as named values
//! rather than re-derived. The one hard ordering guarantee: a verbatim
//! containment always outranks any heuristic score, which is why the
//! heuristic path is clamped below `VERBATIM_SCORE`.

/// Score for verbatim containment of the term in the content.
pub const VERBATIM_SCORE: i32 = 100;

/// Per-term-word weight when a term word equals a content word.
const WORD_EXACT_WEIGHT: i32 = 15;
/// Per-term-word weight when a term word is a proper substring of a
/// content word.
const WORD_SUBSTRING_WEIGHT: i32 = 12;
/// Per-term-word weight when a content word (length >= 3) is a proper
/// substring of a term word.
const WORD_REVERSE_WEIGHT: i32 = 8;

/// Extra credit for substring matches on terms of length >= 4.
const LONG_TERM_PARTIAL_BONUS: i32 = 15;
/// Extra credit for substring matches on terms of length 3..=6.
const MID_TERM_PARTIAL_BONUS: i32 = 10;
/// Specific short content is preferred for long queries.
const SHORT_CONTENT_BONUS: i32 = 20;

/// Long unmatched content is probably noise.
const LONG_CONTENT_PENALTY: i32 = 10;
/// A lone matched word of one or two letters is probably a coincidence.
const NOISY_SHORT_WORD_PENALTY: i32 = 30;
/// Unmatched link-bearing content ranks below unmatched prose.
const URL_CONTENT_PENALTY: i32 = 20;

/// Relevance floor for terms of length >= 4.
const RELEVANT_MIN: i32 = 10;
/// Shorter terms need a higher bar to avoid false positives.
const RELEVANT_MIN_SHORT_TERM: i32 = 15;
/// Reduced bar applied to shrinking-prefix probe variants.
const RELEVANT_MIN_PROBE: i32 = 5;

/// Content length above which unmatched content is penalized.
const LONG_CONTENT_LEN: usize = 200;
/// Content length below which long terms earn the specificity bonus.
const SHORT_CONTENT_LEN: usize = 100;

/// Deterministic integer relevance of `content` for `term`.
///
/// "Partial" throughout means the proper-substring tiers; whole-word
/// equality is the exact tier and verbatim containment trumps both.
pub fn score(term: &str, content: &str) -> i32 {
    let term_lower = term.to_lowercase();
    let content_lower = content.to_lowercase();
    let term_len = term_lower.chars().count();
    let content_len = content_lower.chars().count();

    let short_content_bonus = if term_len > 5 && content_len < SHORT_CONTENT_LEN {
        SHORT_CONTENT_BONUS
    } else {
        0
    };

    if !term_lower.is_empty() && content_lower.contains(&term_lower) {
        return VERBATIM_SCORE + short_content_bonus;
    }

    let term_words: Vec<&str> = term_lower.split_whitespace().collect();
    let content_words: Vec<&str> = content_lower.split_whitespace().collect();
    let word_count = term_words.len() as i32;

    let exact_matches: Vec<&str> = term_words
        .iter()
        .filter(|tw| content_words.iter().any(|cw| cw == *tw))
        .copied()
        .collect();
    let substring_match = term_words.iter().any(|tw| {
        content_words
            .iter()
            .any(|cw| cw.len() > tw.len() && cw.contains(tw))
    });
    let reverse_match = term_words.iter().any(|tw| {
        content_words.iter().any(|cw| {
            cw.chars().count() >= 3 && tw.len() > cw.len() && tw.contains(cw)
        })
    });
    let partial = substring_match || reverse_match;
    let any_match = !exact_matches.is_empty() || partial;

    let mut total = 0;
    if !exact_matches.is_empty() {
        total += WORD_EXACT_WEIGHT * word_count;
    } else if substring_match {
        total += WORD_SUBSTRING_WEIGHT * word_count;
    } else if reverse_match {
        total += WORD_REVERSE_WEIGHT * word_count;
    }

    if partial && term_len >= 4 {
        total += LONG_TERM_PARTIAL_BONUS;
    }
    if partial && (3..=6).contains(&term_len) {
        total += MID_TERM_PARTIAL_BONUS;
    }
    if any_match {
        total += short_content_bonus;
    }

    if content_len > LONG_CONTENT_LEN && !any_match {
        total -= LONG_CONTENT_PENALTY;
    }
    if exact_matches.len() == 1 && exact_matches[0].chars().count() <= 2 && !partial {
        total -= NOISY_SHORT_WORD_PENALTY;
    }
    if content_lower.contains("http") && !any_match {
        total -= URL_CONTENT_PENALTY;
    }

    // Heuristic scores never reach the verbatim tier.
    total.min(VERBATIM_SCORE - 1)
}

/// Whether `content` passes the relevance bar for `term`.
pub fn is_relevant(term: &str, content: &str) -> bool {
    let floor = if term.chars().count() >= 4 {
        RELEVANT_MIN
    } else {
        RELEVANT_MIN_SHORT_TERM
    };
    score(term, content) >= floor
}

/// Relevance check at the reduced bar used for prefix probe variants.
pub fn is_relevant_probe(term: &str, content: &str) -> bool {
    score(term, content) >= RELEVANT_MIN_PROBE
}
