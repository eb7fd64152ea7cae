//! Term variant derivation for the query cascade.
//!
//! Each variant is a pure transform of the original term. The cascade walks
//! the returned list in order and stops at the first variant that yields
//! relevant results, so ordering here is the cascade's priority order.

/// Domain suffixes tried when a bare single-word term looks like it might
/// be a domain typed without its TLD.
const DOMAIN_SUFFIXES: &[&str] = &[".com", ".net", ".org", ".io", ".co"];

/// Minimum prefix length probed for long terms.
const MIN_PREFIX_PROBE_LEN: usize = 3;

/// Terms longer than this get shrinking-prefix probes.
const PREFIX_PROBE_THRESHOLD: usize = 5;

/// How a variant was derived. Prefix probes are accepted at a reduced
/// relevance bar by the cascade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Exact,
    CaseFold,
    UrlDerived,
    Wildcard,
    PrefixProbe,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermVariant {
    pub text: String,
    pub kind: VariantKind,
}

impl TermVariant {
    fn new(text: impl Into<String>, kind: VariantKind) -> Self {
        TermVariant {
            text: text.into(),
            kind,
        }
    }
}

/// Derive the full ordered, deduplicated variant list for a term.
pub fn derive(term: &str) -> Vec<TermVariant> {
    let term = term.trim();
    let mut out: Vec<TermVariant> = Vec::new();

    push(&mut out, TermVariant::new(term, VariantKind::Exact));

    for folded in case_folds(term) {
        push(&mut out, TermVariant::new(folded, VariantKind::CaseFold));
    }

    if is_url_shaped(term) {
        for derived in url_derivations(term) {
            push(&mut out, TermVariant::new(derived, VariantKind::UrlDerived));
        }
    }

    for wild in [
        format!("*{}*", term),
        format!("{}*", term),
        format!("*{}", term),
        format!("%{}%", term),
    ] {
        push(&mut out, TermVariant::new(wild, VariantKind::Wildcard));
    }

    if term.chars().count() > PREFIX_PROBE_THRESHOLD {
        let chars: Vec<char> = term.chars().collect();
        for len in (MIN_PREFIX_PROBE_LEN..chars.len()).rev() {
            let prefix: String = chars[..len].iter().collect();
            push(&mut out, TermVariant::new(prefix, VariantKind::PrefixProbe));
        }
    }

    out
}

/// Append a variant unless empty, too short to query, or already present.
fn push(out: &mut Vec<TermVariant>, variant: TermVariant) {
    let text = variant.text.trim();
    if text.len() < 2 {
        return;
    }
    if out.iter().any(|v| v.text == text) {
        return;
    }
    if text == variant.text {
        out.push(variant);
    } else {
        out.push(TermVariant::new(text, variant.kind));
    }
}

fn case_folds(term: &str) -> Vec<String> {
    vec![term.to_lowercase(), term.to_uppercase(), title_case(term)]
}

fn title_case(term: &str) -> String {
    term.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A term is URL-shaped if it carries URL punctuation or is a lone token
/// (lone tokens get domain-suffix expansions).
fn is_url_shaped(term: &str) -> bool {
    term.contains('.')
        || term.contains('/')
        || term.contains('?')
        || !term.contains(char::is_whitespace)
}

/// All URL-derived forms, in priority order.
fn url_derivations(term: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();

    let stripped = strip_protocol(term);
    out.push(stripped.to_string());

    let (domain, rest) = split_domain(stripped);
    out.push(domain.to_string());

    let (path, query, fragment) = split_rest(rest);
    if !path.is_empty() {
        out.push(path.to_string());
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            out.push(segment.to_string());
        }
    }
    for pair in query.split('&').filter(|s| !s.is_empty()) {
        match pair.split_once('=') {
            Some((key, value)) => {
                out.push(key.to_string());
                out.push(value.to_string());
            }
            None => out.push(pair.to_string()),
        }
    }
    if !fragment.is_empty() {
        out.push(fragment.to_string());
    }

    // Subdomain / main-domain split
    let labels: Vec<&str> = domain.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() > 2 {
        out.push(labels[0].to_string());
        out.push(labels[labels.len() - 2..].join("."));
    }

    // A lone dotless word might be a domain typed without its suffix
    if !term.contains('.') && !term.contains('/') && !term.contains(char::is_whitespace) {
        for suffix in DOMAIN_SUFFIXES {
            out.push(format!("{}{}", term.to_lowercase(), suffix));
        }
    }

    out
}

fn strip_protocol(term: &str) -> &str {
    for proto in ["https://", "http://"] {
        // get() rather than indexing: a multibyte term may have no char
        // boundary at the protocol length.
        match term.get(..proto.len()) {
            Some(prefix) if prefix.eq_ignore_ascii_case(proto) && term.len() > proto.len() => {
                return &term[proto.len()..];
            }
            _ => {}
        }
    }
    term
}

/// Split a protocol-stripped term into domain and everything after it.
fn split_domain(stripped: &str) -> (&str, &str) {
    match stripped.find(['/', '?', '#']) {
        Some(pos) => (&stripped[..pos], &stripped[pos..]),
        None => (stripped, ""),
    }
}

/// Split the post-domain remainder into (path, query, fragment).
fn split_rest(rest: &str) -> (&str, &str, &str) {
    let (before_fragment, fragment) = match rest.split_once('#') {
        Some((b, f)) => (b, f),
        None => (rest, ""),
    };
    let (path, query) = match before_fragment.split_once('?') {
        Some((p, q)) => (p, q),
        None => (before_fragment, ""),
    };
    (path.trim_start_matches('/'), query, fragment)
}
