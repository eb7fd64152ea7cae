pub mod variants;

use serde::{Deserialize, Serialize};

/// Prefix that marks an author filter token in raw input.
const SENDER_PREFIX: &str = "sender:";

/// The free-text part of a query.
///
/// `Any` is the wildcard sentinel for "match any message": providers treat
/// a wildcard and an empty string differently, so an empty keyword must
/// never be sent to the remote API as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keyword {
    Any,
    Text(String),
}

impl Keyword {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Keyword::Any => None,
            Keyword::Text(t) => Some(t),
        }
    }
}

/// A parsed search query: free-text keyword plus optional author filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchTerm {
    pub keyword: Keyword,
    pub author: Option<String>,
}

impl SearchTerm {
    /// Parse raw user input.
    ///
    /// The first `sender:<id>` token (case-insensitive prefix) becomes the
    /// author filter; later occurrences stay ordinary keyword tokens. The
    /// remaining tokens are rejoined as the keyword; if nothing remains the
    /// keyword is the wildcard sentinel.
    pub fn parse(raw: &str) -> SearchTerm {
        let mut author: Option<String> = None;
        let mut words: Vec<&str> = Vec::new();

        for token in raw.split_whitespace() {
            // get() rather than split_at: a multibyte token may have no
            // char boundary at the prefix length.
            if author.is_none() {
                if let (Some(prefix), Some(value)) = (
                    token.get(..SENDER_PREFIX.len()),
                    token.get(SENDER_PREFIX.len()..),
                ) {
                    if !value.is_empty() && prefix.eq_ignore_ascii_case(SENDER_PREFIX) {
                        author = Some(value.to_string());
                        continue;
                    }
                }
            }
            words.push(token);
        }

        let keyword = if words.is_empty() {
            Keyword::Any
        } else {
            Keyword::Text(words.join(" "))
        };

        SearchTerm { keyword, author }
    }

    pub fn has_author(&self) -> bool {
        self.author.is_some()
    }

    /// Stable cache-key form of this term.
    pub fn normalized(&self) -> String {
        let keyword = match &self.keyword {
            Keyword::Any => "*",
            Keyword::Text(t) => t.as_str(),
        };
        match &self.author {
            Some(a) => format!("sender:{} {}", a.to_lowercase(), keyword.to_lowercase()),
            None => keyword.to_lowercase(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_keyword() {
        let term = SearchTerm::parse("hello world");
        assert_eq!(term.keyword, Keyword::Text("hello world".into()));
        assert_eq!(term.author, None);
    }

    #[test]
    fn test_sender_token_extracted() {
        let term = SearchTerm::parse("sender:@alice:example.org deploy");
        assert_eq!(term.author.as_deref(), Some("@alice:example.org"));
        assert_eq!(term.keyword, Keyword::Text("deploy".into()));
    }

    #[test]
    fn test_sender_prefix_case_insensitive() {
        let term = SearchTerm::parse("SENDER:@bob:hs.io");
        assert_eq!(term.author.as_deref(), Some("@bob:hs.io"));
        assert_eq!(term.keyword, Keyword::Any);
    }

    #[test]
    fn test_second_sender_token_is_keyword() {
        let term = SearchTerm::parse("sender:@a:hs sender:@b:hs");
        assert_eq!(term.author.as_deref(), Some("@a:hs"));
        assert_eq!(term.keyword, Keyword::Text("sender:@b:hs".into()));
    }

    #[test]
    fn test_bare_sender_prefix_stays_keyword() {
        // "sender:" with no value is not an author filter
        let term = SearchTerm::parse("sender:");
        assert_eq!(term.author, None);
        assert_eq!(term.keyword, Keyword::Text("sender:".into()));
    }

    #[test]
    fn test_multibyte_tokens_stay_keyword() {
        // No char boundary at the prefix length; must not panic.
        let term = SearchTerm::parse("안녕하세요");
        assert_eq!(term.keyword, Keyword::Text("안녕하세요".into()));
        assert_eq!(term.author, None);

        let term = SearchTerm::parse("sender:안녕 검색어");
        assert_eq!(term.author.as_deref(), Some("안녕"));
        assert_eq!(term.keyword, Keyword::Text("검색어".into()));
    }

    #[test]
    fn test_empty_input_is_wildcard() {
        let term = SearchTerm::parse("   ");
        assert_eq!(term.keyword, Keyword::Any);
        assert_eq!(term.author, None);
    }

    #[test]
    fn test_normalized_key_is_case_folded() {
        let a = SearchTerm::parse("Sender:@Alice:hs Deploy");
        let b = SearchTerm::parse("sender:@alice:hs deploy");
        assert_eq!(a.normalized(), b.normalized());
    }
}
