//! Deduplication by `(file_path, start_line)` (§4.2 step 5).
//!
//! Grounded on the teacher's `search/dedup.rs` (`deduplicate_results`):
//! same "group, keep the better one" shape, simplified from the teacher's
//! overlap-merging behavior (which extends line ranges across chunks) to
//! the spec's exact-key rule, since the spec calls for retaining "the
//! candidate with the higher rrf" rather than merging chunk content.

use std::collections::HashMap;

use crate::types::SearchResult;

/// Keep, for each distinct `(file_path, start_line)`, only the candidate
/// with the higher `raw_score` (the fused RRF score at this point in the
/// pipeline).
pub fn deduplicate_by_location(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut best: HashMap<(String, i32), SearchResult> = HashMap::new();

    for result in results {
        let key = (result.file_path.clone(), result.start_line);
        match best.get(&key) {
            Some(existing) if existing.raw_score >= result.raw_score => {}
            _ => {
                best.insert(key, result);
            }
        }
    }

    let mut deduped: Vec<SearchResult> = best.into_values().collect();
    deduped.sort_by(|a, b| b.raw_score.partial_cmp(&a.raw_score).unwrap_or(std::cmp::Ordering::Equal));
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResultMetadata;

    fn result(file_path: &str, start_line: i32, score: f32) -> SearchResult {
        SearchResult {
            id: format!("{file_path}:{start_line}:{score}"),
            file_path: file_path.to_string(),
            repository: None,
            language: None,
            code_snippet: String::new(),
            highlights: Default::default(),
            start_line,
            end_line: start_line + 1,
            function_name: None,
            class_name: None,
            modified_time: None,
            raw_score: score,
            ranked_score: 0.0,
            ranking_factors: None,
            explanation: None,
            metadata: ResultMetadata::default(),
        }
    }

    #[test]
    fn keeps_higher_scoring_duplicate() {
        let results = vec![result("a.rs", 10, 0.5), result("a.rs", 10, 0.9)];
        let deduped = deduplicate_by_location(results);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].raw_score, 0.9);
    }

    #[test]
    fn distinct_locations_are_both_kept() {
        let results = vec![result("a.rs", 10, 0.5), result("a.rs", 20, 0.6), result("b.rs", 10, 0.4)];
        let deduped = deduplicate_by_location(results);
        assert_eq!(deduped.len(), 3);
    }
}
