use std::collections::BTreeSet;

use unicode_segmentation::UnicodeSegmentation;

use crate::provider::MatchResult;

/// Find the distinct words of `body` matched by `term` (case-insensitive).
/// A body word matches if it contains any word of the term.
pub fn matched_words(body: &str, term: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let term_lower = term.to_lowercase();
    let term_words: Vec<&str> = term_lower.split_whitespace().collect();
    if term_words.is_empty() {
        return out;
    }

    for word in body.unicode_words() {
        let word_lower = word.to_lowercase();
        if term_words.iter().any(|tw| word_lower.contains(tw)) {
            out.insert(word_lower);
        }
    }
    out
}

/// Highlight terms for a whole result set: the union of matched words
/// across every result body. Used where the provider supplied none.
pub fn collect_highlights(results: &[MatchResult], term: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for result in results {
        out.append(&mut matched_words(&result.body, term));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_match() {
        let words = matched_words("Hello World", "hello");
        assert_eq!(words.into_iter().collect::<Vec<_>>(), vec!["hello"]);
    }

    #[test]
    fn test_multiple_term_words() {
        let words = matched_words("Hello World", "hello world");
        assert_eq!(
            words.into_iter().collect::<Vec<_>>(),
            vec!["hello", "world"]
        );
    }

    #[test]
    fn test_case_insensitive() {
        let words = matched_words("HELLO hello Hello", "hello");
        // distinct after lowercasing
        assert_eq!(words.len(), 1);
    }

    #[test]
    fn test_containment_matches_longer_words() {
        let words = matched_words("redeployment starts", "deploy");
        assert!(words.contains("redeployment"));
        assert!(!words.contains("starts"));
    }

    #[test]
    fn test_korean_match() {
        let words = matched_words("삼성전자 주가가 상승했다", "삼성");
        assert!(words.contains("삼성전자"));
    }

    #[test]
    fn test_no_match() {
        assert!(matched_words("Hello World", "xyz").is_empty());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matched_words("", "hello").is_empty());
        assert!(matched_words("Hello", "").is_empty());
    }
}
