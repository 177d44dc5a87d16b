//! Single pattern registry shared by the enhancer and the ranker.
//!
//! §9 Design Notes calls out "pattern tables duplicated across modules" as
//! a rearchitecture target: rather than the enhancer and the ranker's
//! `pattern_match` factor each keeping their own keyword/pattern tables,
//! both read from this one registry — a keyword → pattern map (used to
//! infer which patterns a query is about) and a pattern → related-patterns
//! map (used to widen a match without requiring an exact keyword hit).

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// `(keyword, pattern)` pairs. A keyword may map to more than one pattern.
const KEYWORD_PATTERNS: &[(&str, &str)] = &[
    ("singleton", "singleton"),
    ("instance", "singleton"),
    ("factory", "factory"),
    ("builder", "factory"),
    ("async", "async"),
    ("await", "async"),
    ("concurrent", "async"),
    ("retry", "retry"),
    ("backoff", "retry"),
    ("retries", "retry"),
    ("observer", "observer"),
    ("listener", "observer"),
    ("subscribe", "observer"),
    ("decorator", "decorator"),
    ("wrapper", "decorator"),
    ("strategy", "strategy"),
    ("adapter", "adapter"),
    ("cache", "cache"),
    ("memoize", "cache"),
    ("pool", "pool"),
];

/// `pattern → related patterns`, used to broaden a candidate's pattern
/// match beyond the literal set inferred from the query.
const RELATED_PATTERNS: &[(&str, &[&str])] = &[
    ("factory", &["singleton", "builder"]),
    ("singleton", &["factory", "cache"]),
    ("retry", &["async"]),
    ("async", &["retry"]),
    ("cache", &["singleton", "pool"]),
    ("pool", &["cache"]),
];

struct PatternRegistry {
    keyword_to_pattern: HashMap<&'static str, &'static str>,
    related: HashMap<&'static str, &'static [&'static str]>,
}

static REGISTRY: Lazy<PatternRegistry> = Lazy::new(|| PatternRegistry {
    keyword_to_pattern: KEYWORD_PATTERNS.iter().copied().collect(),
    related: RELATED_PATTERNS.iter().copied().collect(),
});

/// All distinct pattern names known to the registry.
pub fn known_patterns() -> Vec<&'static str> {
    let mut patterns: Vec<&'static str> = REGISTRY.keyword_to_pattern.values().copied().collect();
    patterns.sort_unstable();
    patterns.dedup();
    patterns
}

/// Infer the set of patterns a query text is "about" from the keywords it
/// contains. Returns an empty set when no known keyword appears — the
/// `pattern_match` factor contract (§4.5.8) treats that as "no patterns
/// inferred" and scores 0, not "matches everything".
pub fn infer_patterns(query_text: &str) -> Vec<&'static str> {
    let lower = query_text.to_lowercase();
    let mut found: Vec<&'static str> = REGISTRY
        .keyword_to_pattern
        .iter()
        .filter(|(keyword, _)| lower.contains(*keyword))
        .map(|(_, pattern)| *pattern)
        .collect();
    found.sort_unstable();
    found.dedup();
    found
}

/// Patterns related to `pattern`, used to widen a candidate match.
pub fn related_to(pattern: &str) -> &'static [&'static str] {
    REGISTRY.related.get(pattern).copied().unwrap_or(&[])
}

/// Fraction of `expected` patterns that appear (directly, or via
/// [`related_to`]) in `candidate_text`. Returns 0.0 when `expected` is
/// empty, per the §4.5.8 contract ("0 if no patterns inferred").
pub fn pattern_match_fraction(expected: &[&'static str], candidate_text: &str) -> f32 {
    if expected.is_empty() {
        return 0.0;
    }
    let lower = candidate_text.to_lowercase();
    let hits = expected
        .iter()
        .filter(|pattern| {
            lower.contains(*pattern)
                || related_to(pattern).iter().any(|related| lower.contains(related))
        })
        .count();
    hits as f32 / expected.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_patterns_finds_known_keywords() {
        let patterns = infer_patterns("implement a retry with exponential backoff");
        assert!(patterns.contains(&"retry"));
    }

    #[test]
    fn infer_patterns_empty_when_nothing_known() {
        assert!(infer_patterns("what color is the sky").is_empty());
    }

    #[test]
    fn pattern_match_fraction_is_zero_with_no_expected_patterns() {
        assert_eq!(pattern_match_fraction(&[], "anything"), 0.0);
    }

    #[test]
    fn pattern_match_fraction_counts_direct_hits() {
        let frac = pattern_match_fraction(&["retry", "async"], "fn retry_request() {}");
        assert!((frac - 0.5).abs() < 1e-6);
    }
}
