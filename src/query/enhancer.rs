//! Intent classification, variant generation and exact-term extraction
//! (§4.3). Deterministic and rule-based — no model call.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::EnhancedQuery;
use crate::types::Intent;

const MAX_VARIANTS: usize = 10;
const MAX_EXACT_TERMS: usize = 16;
const MAX_TERM_LEN: usize = 200;

/// Weighted keyword lexicon per intent. A keyword occurrence contributes
/// its weight to that intent's score; the highest-scoring intent wins,
/// ties broken by [`Intent::break_tie`]'s fixed priority order.
const LEXICON: &[(Intent, &[(&str, f32)])] = &[
    (
        Intent::Debug,
        &[
            ("error", 2.0),
            ("bug", 2.0),
            ("fix", 1.5),
            ("crash", 2.0),
            ("fails", 1.5),
            ("failing", 1.5),
            ("broken", 1.5),
            ("exception", 2.0),
            ("debug", 2.0),
            ("wrong", 1.0),
            ("issue", 1.0),
        ],
    ),
    (
        Intent::Implement,
        &[
            ("implement", 2.0),
            ("write", 1.5),
            ("create", 1.5),
            ("build", 1.5),
            ("add", 1.0),
            ("new", 1.0),
            ("feature", 1.0),
        ],
    ),
    (
        Intent::Test,
        &[
            ("test", 2.0),
            ("tests", 2.0),
            ("unit test", 2.0),
            ("coverage", 1.5),
            ("assert", 1.5),
            ("mock", 1.0),
        ],
    ),
    (
        Intent::Refactor,
        &[
            ("refactor", 2.0),
            ("cleanup", 1.5),
            ("simplify", 1.5),
            ("restructure", 1.5),
            ("rename", 1.0),
            ("extract", 1.0),
        ],
    ),
    (
        Intent::Document,
        &[
            ("document", 2.0),
            ("docs", 1.5),
            ("documentation", 2.0),
            ("comment", 1.0),
            ("readme", 1.5),
            ("explain", 1.0),
        ],
    ),
    (
        Intent::Understand,
        &[
            ("understand", 2.0),
            ("how does", 1.5),
            ("what is", 1.0),
            ("explore", 1.0),
            ("learn", 1.0),
            ("review", 1.0),
        ],
    ),
];

/// Verb synonym groups; a word in a group can be rewritten as any other
/// word in the same group.
const VERB_SYNONYMS: &[&[&str]] = &[
    &["create", "implement", "build"],
    &["fix", "resolve", "debug"],
    &["find", "locate", "search"],
    &["remove", "delete"],
    &["update", "modify", "change"],
];

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z0-9_]+").unwrap());
static QUOTED_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]{1,200})""#).unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap());
static CALL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\([^()]*\)").unwrap());
static CAMEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-z][a-zA-Z0-9]*[A-Z][a-zA-Z0-9]*\b").unwrap());
static SNAKE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[a-zA-Z][a-zA-Z0-9]*_[a-zA-Z0-9_]*\b").unwrap());

/// Deterministic, rule-based query enhancer: classifies intent, generates
/// lexical variants, and extracts exact-match terms.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryEnhancer;

impl QueryEnhancer {
    pub fn new() -> Self {
        Self
    }

    /// Run the full enhancement pipeline. `intent_hint`, when present,
    /// overrides classification entirely (§4.3: "Caller-provided hint
    /// overrides").
    pub fn enhance(&self, text: &str, intent_hint: Option<Intent>) -> EnhancedQuery {
        let intent = intent_hint.unwrap_or_else(|| classify_intent(text));
        let variants = generate_variants(text);
        let exact_terms = extract_exact_terms(text);

        EnhancedQuery {
            original: text.to_string(),
            intent,
            variants,
            exact_terms,
        }
    }
}

/// Score every intent against the lexicon and return the winner, ties
/// broken by the fixed DEBUG > IMPLEMENT > TEST > REFACTOR > DOCUMENT >
/// UNDERSTAND priority order.
fn classify_intent(text: &str) -> Intent {
    let lower = text.to_lowercase();
    let mut best: Option<(Intent, f32)> = None;

    for (intent, keywords) in LEXICON {
        let score: f32 = keywords
            .iter()
            .filter(|(kw, _)| lower.contains(kw))
            .map(|(_, weight)| *weight)
            .sum();
        if score <= 0.0 {
            continue;
        }
        best = Some(match best {
            None => (*intent, score),
            Some((_, prev_score)) if score > prev_score => (*intent, score),
            Some((prev_intent, prev_score)) if score == prev_score => {
                (Intent::break_tie(prev_intent, *intent), prev_score)
            }
            Some(prev) => prev,
        });
    }

    best.map(|(intent, _)| intent).unwrap_or(Intent::Understand)
}

/// Generate up to 10 deduplicated lexical rewrites of `text`: verb-synonym
/// substitution, a plural/singular flip of the last noun-like token, and a
/// "how to X" template. The original text is never included in the output.
fn generate_variants(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    seen.insert(text.to_lowercase());
    let mut variants = Vec::new();

    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return variants;
    }

    let mut push = |variants: &mut Vec<String>, candidate: String| {
        if variants.len() >= MAX_VARIANTS {
            return;
        }
        let key = candidate.to_lowercase();
        if seen.insert(key) {
            variants.push(candidate);
        }
    };

    // Verb synonym substitution: replace the first word found in any
    // synonym group with each of its groupmates.
    for (i, word) in words.iter().enumerate() {
        let lower = word.to_lowercase();
        if let Some(group) = VERB_SYNONYMS.iter().find(|g| g.contains(&lower.as_str())) {
            for synonym in group.iter().filter(|s| **s != lower) {
                let mut rewritten = words.to_vec();
                let owned = synonym.to_string();
                rewritten[i] = &owned;
                push(&mut variants, rewritten.join(" "));
                if variants.len() >= MAX_VARIANTS {
                    return variants;
                }
            }
            break;
        }
    }

    // Plural/singular flip of the last word.
    if let Some(last) = words.last() {
        if let Some(flipped) = flip_plurality(last) {
            let mut rewritten = words[..words.len() - 1].to_vec();
            rewritten.push(flipped.as_str());
            push(&mut variants, rewritten.join(" "));
        }
    }

    // "how to X" template.
    push(&mut variants, format!("how to {text}"));

    variants.truncate(MAX_VARIANTS);
    variants
}

fn flip_plurality(word: &str) -> Option<String> {
    if let Some(stem) = word.strip_suffix("ies") {
        return Some(format!("{stem}y"));
    }
    if let Some(stem) = word.strip_suffix('s') {
        if !word.ends_with("ss") {
            return Some(stem.to_string());
        }
        return None;
    }
    if word.ends_with('y') && word.len() > 1 {
        let stem = &word[..word.len() - 1];
        return Some(format!("{stem}ies"));
    }
    Some(format!("{word}s"))
}

/// Extract literal terms per §4.3: quoted phrases, integers/decimals,
/// camelCase/snake_case tokens of at least 3 characters, and
/// `name(...)`-shaped call references. Deduplicates preserving first
/// occurrence and caps at 16 terms, each clamped to 200 printable-ASCII
/// characters.
fn extract_exact_terms(text: &str) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut terms = Vec::new();

    let mut push = |terms: &mut Vec<String>, raw: &str| {
        if terms.len() >= MAX_EXACT_TERMS {
            return;
        }
        let sanitized = sanitize_term(raw);
        if sanitized.is_empty() {
            return;
        }
        if seen.insert(sanitized.clone()) {
            terms.push(sanitized);
        }
    };

    for capture in QUOTED_RE.captures_iter(text) {
        push(&mut terms, &capture[1]);
    }
    for call in CALL_RE.captures_iter(text) {
        push(&mut terms, &call[1]);
    }
    for number in NUMBER_RE.find_iter(text) {
        push(&mut terms, number.as_str());
    }
    for snake in SNAKE_RE.find_iter(text) {
        if snake.as_str().len() >= 3 {
            push(&mut terms, snake.as_str());
        }
    }
    for camel in CAMEL_RE.find_iter(text) {
        if camel.as_str().len() >= 3 {
            push(&mut terms, camel.as_str());
        }
    }

    terms.truncate(MAX_EXACT_TERMS);
    terms
}

/// Clamp to 200 chars and drop non-printable-ASCII characters, matching
/// the hybrid searcher's own sanitation rule (§4.2 step 1) so a term
/// extracted here never needs re-sanitizing downstream.
fn sanitize_term(raw: &str) -> String {
    let filtered: String = raw
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .take(MAX_TERM_LEN)
        .collect();
    filtered.trim().to_string()
}

/// True if `text` contains at least one recognizable word token; used by
/// callers deciding whether a query is worth enhancing at all.
pub fn has_word_tokens(text: &str) -> bool {
    WORD_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_debug_over_implement_by_weight() {
        assert_eq!(classify_intent("there is a bug causing a crash"), Intent::Debug);
    }

    #[test]
    fn classifies_implement_for_feature_requests() {
        assert_eq!(classify_intent("implement a new caching layer"), Intent::Implement);
    }

    #[test]
    fn falls_back_to_understand_with_no_keywords() {
        assert_eq!(classify_intent("the quick brown fox"), Intent::Understand);
    }

    #[test]
    fn hint_overrides_classification() {
        let enhancer = QueryEnhancer::new();
        let enhanced = enhancer.enhance("fix the bug", Some(Intent::Test));
        assert_eq!(enhanced.intent, Intent::Test);
    }

    #[test]
    fn variants_exclude_original_and_cap_at_ten() {
        let variants = generate_variants("create a new user session");
        assert!(variants.len() <= MAX_VARIANTS);
        assert!(!variants.iter().any(|v| v.eq_ignore_ascii_case("create a new user session")));
    }

    #[test]
    fn variants_include_verb_synonym_rewrite() {
        let variants = generate_variants("create user accounts");
        assert!(variants.iter().any(|v| v.contains("implement") || v.contains("build")));
    }

    #[test]
    fn exact_terms_extracts_quoted_phrase_and_number() {
        let terms = extract_exact_terms(r#""HTTP/1.1" parse headers version 1.1"#);
        assert!(terms.iter().any(|t| t == "HTTP/1.1"));
        assert!(terms.iter().any(|t| t == "1.1"));
    }

    #[test]
    fn exact_terms_extracts_function_call_and_identifiers() {
        let terms = extract_exact_terms("why does parseHeader(req) fail for snake_case_field");
        assert!(terms.iter().any(|t| t == "parseHeader"));
        assert!(terms.iter().any(|t| t == "snake_case_field"));
    }

    #[test]
    fn exact_terms_caps_at_sixteen_and_dedupes() {
        let text = (0..30).map(|i| format!("term_{i} term_{i}")).collect::<Vec<_>>().join(" ");
        let terms = extract_exact_terms(&text);
        assert!(terms.len() <= MAX_EXACT_TERMS);
    }

    #[test]
    fn exact_terms_are_sanitized_ascii_and_clamped() {
        let text = format!("\"{}\"", "é".repeat(10) + &"x".repeat(300));
        let terms = extract_exact_terms(&text);
        for term in &terms {
            assert!(term.chars().all(|c| c.is_ascii()));
            assert!(term.chars().count() <= MAX_TERM_LEN);
        }
    }
}
