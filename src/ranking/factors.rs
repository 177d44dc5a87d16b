//! Per-candidate factor computation (§4.5).
//!
//! Grounded on the teacher's `search/ranking.rs` (`extract_symbols`,
//! `jaccard_similarity`) for the identifier-overlap factors, generalized
//! from a single Jaccard boost into the eight independently-normalized
//! factors the ranker scores against.

use std::collections::HashSet;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::Factor;
use crate::types::FactorSource;
use crate::types::QueryContext;
use crate::types::RankingFactors;
use crate::types::SearchResult;

static SYMBOL_SPLIT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\s.,/#!$%^&*;:{}=\-_`~()\[\]<>"'\\|+@?]+"#).unwrap());

/// Tokenize text into a lowercase identifier/symbol set.
pub fn extract_symbols(text: &str) -> HashSet<String> {
    SYMBOL_SPLIT
        .split(text)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_lowercase())
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

/// Min-max normalize a batch of raw scores into `[0,1]`. A degenerate
/// batch (all equal, or a single candidate) normalizes to 1.0 for every
/// member rather than dividing by zero.
fn min_max_normalize(raw_scores: &[f32], value: f32) -> f32 {
    let min = raw_scores.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = raw_scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !min.is_finite() || !max.is_finite() || (max - min).abs() <= f32::EPSILON {
        return 1.0;
    }
    (value - min) / (max - min)
}

fn path_tokens(path: &str) -> HashSet<String> {
    let path = Path::new(path);
    let mut tokens = HashSet::new();
    for component in path.components() {
        if let Some(s) = component.as_os_str().to_str() {
            tokens.extend(extract_symbols(s));
        }
    }
    tokens
}

/// Directory-level distance between two file paths: the number of path
/// segments that differ once the common prefix is removed.
fn path_distance(a: &str, b: &str) -> usize {
    let segs_a: Vec<&str> = Path::new(a).components().filter_map(|c| c.as_os_str().to_str()).collect();
    let segs_b: Vec<&str> = Path::new(b).components().filter_map(|c| c.as_os_str().to_str()).collect();
    let common = segs_a.iter().zip(segs_b.iter()).take_while(|(x, y)| x == y).count();
    (segs_a.len() - common) + (segs_b.len() - common)
}

/// Monotone-decreasing proximity curve, dampened by `log(1+4d)/log(5)`
/// (§4.5 factor 5).
fn proximity_from_distance(distance: usize) -> f32 {
    let d = distance as f32;
    let damped = (1.0 + 4.0 * d).ln() / 5f32.ln();
    (1.0 - damped).clamp(0.0, 1.0)
}

/// Piecewise-linear recency curve (§4.5 factor 6).
fn recency_from_days(days: i64) -> f32 {
    match days {
        d if d <= 7 => 1.0,
        d if d <= 30 => 0.8,
        d if d <= 90 => 0.5,
        d if d <= 365 => 0.2,
        _ => 0.0,
    }
}

fn has_docstring(snippet: &str) -> bool {
    snippet.lines().any(|line| {
        let trimmed = line.trim_start();
        trimmed.starts_with("///") || trimmed.starts_with("/**") || trimmed.starts_with("\"\"\"") || trimmed.starts_with("##")
    })
}

/// Compute all eight ranking factors for one candidate against the full
/// batch it was retrieved alongside.
pub fn compute_factors(
    candidate: &SearchResult,
    batch_raw_scores: &[f32],
    query_text: &str,
    context: &QueryContext,
    now_unix_seconds: i64,
) -> RankingFactors {
    let text_relevance = Factor::new(
        min_max_normalize(batch_raw_scores, candidate.raw_score),
        1.0,
        FactorSource::Measured,
    );

    let semantic_similarity = if candidate.metadata.vector_used {
        Factor::new(min_max_normalize(batch_raw_scores, candidate.raw_score), 1.0, FactorSource::Measured)
    } else {
        let query_symbols = extract_symbols(query_text);
        let candidate_symbols = extract_symbols(&candidate.code_snippet);
        Factor::new(jaccard(&query_symbols, &candidate_symbols), 0.6, FactorSource::JaccardFallback)
    };

    let context_overlap = match &context.current_file {
        Some(current_file) => {
            let current_tokens = path_tokens(current_file);
            let candidate_tokens = extract_symbols(&candidate.code_snippet);
            Factor::new(jaccard(&current_tokens, &candidate_tokens), 0.6, FactorSource::JaccardFallback)
        }
        None => Factor::new(0.0, 0.0, FactorSource::NoContext),
    };

    // Import-set extraction requires the AST/context analyzer, an external
    // collaborator (§1 Out of scope); this factor is always absent here.
    let import_similarity = Factor::new(0.0, 0.0, FactorSource::NoContext);

    let proximity_score = match &context.current_file {
        Some(current_file) => {
            let distance = path_distance(current_file, &candidate.file_path);
            Factor::new(proximity_from_distance(distance), 1.0, FactorSource::Measured)
        }
        None => Factor::new(0.0, 0.0, FactorSource::NoContext),
    };

    let recency_score = match candidate.modified_time {
        Some(modified_time) => {
            let days = ((now_unix_seconds - modified_time).max(0)) / 86_400;
            Factor::new(recency_from_days(days), 1.0, FactorSource::Measured)
        }
        None => Factor::new(0.5, 0.2, FactorSource::Default),
    };

    let quality_score = if has_docstring(&candidate.code_snippet) {
        // Only the docstring signal is observable without an external
        // coverage/complexity analyzer; blend it against the neutral
        // baseline for the unavailable signals.
        Factor::new(0.2 * 1.0 + 0.8 * 0.5, 0.2, FactorSource::Default)
    } else {
        Factor::new(0.5, 0.2, FactorSource::Default)
    };

    let expected_patterns = crate::query::patterns::infer_patterns(query_text);
    let pattern_match = if expected_patterns.is_empty() {
        Factor::new(0.0, 0.0, FactorSource::NoContext)
    } else {
        Factor::new(
            crate::query::patterns::pattern_match_fraction(&expected_patterns, &candidate.code_snippet),
            1.0,
            FactorSource::Measured,
        )
    };

    RankingFactors {
        text_relevance,
        semantic_similarity,
        context_overlap,
        import_similarity,
        proximity_score,
        recency_score,
        quality_score,
        pattern_match,
    }
}

/// Replace any NaN/Inf factor values with the documented coercion: value
/// 0.5, confidence 0, source CoercedNaN (§4.5 Scoring). Returns the number
/// of factors coerced, for metrics.
pub fn coerce_non_finite(factors: &mut RankingFactors) -> u32 {
    let mut coerced = 0u32;
    for factor in [
        &mut factors.text_relevance,
        &mut factors.semantic_similarity,
        &mut factors.context_overlap,
        &mut factors.import_similarity,
        &mut factors.proximity_score,
        &mut factors.recency_score,
        &mut factors.quality_score,
        &mut factors.pattern_match,
    ] {
        if !factor.value.is_finite() || !factor.confidence.is_finite() {
            *factor = Factor::new(0.5, 0.0, FactorSource::CoercedNaN);
            coerced += 1;
        }
    }
    coerced
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultMetadata;

    fn candidate(id: &str, raw_score: f32, file_path: &str) -> SearchResult {
        SearchResult {
            id: id.to_string(),
            file_path: file_path.to_string(),
            repository: None,
            language: None,
            code_snippet: "fn foo() { bar() }".to_string(),
            highlights: Default::default(),
            start_line: 1,
            end_line: 2,
            function_name: Some("foo".to_string()),
            class_name: None,
            modified_time: None,
            raw_score,
            ranked_score: 0.0,
            ranking_factors: None,
            explanation: None,
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn text_relevance_is_min_max_normalized_across_the_batch() {
        let batch = vec![1.0, 2.0, 3.0];
        assert_eq!(min_max_normalize(&batch, 1.0), 0.0);
        assert_eq!(min_max_normalize(&batch, 3.0), 1.0);
        assert!((min_max_normalize(&batch, 2.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn proximity_decays_to_near_zero_one_directory_away() {
        assert_eq!(proximity_from_distance(0), 1.0);
        assert!(proximity_from_distance(1) <= 0.01);
    }

    #[test]
    fn recency_matches_the_documented_buckets() {
        assert_eq!(recency_from_days(3), 1.0);
        assert_eq!(recency_from_days(20), 0.8);
        assert_eq!(recency_from_days(60), 0.5);
        assert_eq!(recency_from_days(200), 0.2);
        assert_eq!(recency_from_days(1000), 0.0);
    }

    #[test]
    fn coerce_non_finite_replaces_nan_with_neutral_factor() {
        let mut factors = RankingFactors {
            text_relevance: Factor::new(f32::NAN, 1.0, FactorSource::Measured),
            semantic_similarity: Factor::new(0.5, 1.0, FactorSource::Measured),
            context_overlap: Factor::new(0.0, 0.0, FactorSource::NoContext),
            import_similarity: Factor::new(0.0, 0.0, FactorSource::NoContext),
            proximity_score: Factor::new(0.0, 0.0, FactorSource::NoContext),
            recency_score: Factor::new(0.5, 0.2, FactorSource::Default),
            quality_score: Factor::new(0.5, 0.2, FactorSource::Default),
            pattern_match: Factor::new(0.0, 0.0, FactorSource::NoContext),
        };
        let coerced = coerce_non_finite(&mut factors);
        assert_eq!(coerced, 1);
        assert_eq!(factors.text_relevance.value, 0.5);
        assert_eq!(factors.text_relevance.confidence, 0.0);
        assert_eq!(factors.text_relevance.source, FactorSource::CoercedNaN);
    }

    #[test]
    fn no_current_file_yields_no_context_for_proximity_and_overlap() {
        let candidate = candidate("a", 1.0, "src/a.rs");
        let context = QueryContext::default();
        let factors = compute_factors(&candidate, &[1.0], "find bug", &context, 0);
        assert_eq!(factors.context_overlap.source, FactorSource::NoContext);
        assert_eq!(factors.proximity_score.source, FactorSource::NoContext);
    }
}
