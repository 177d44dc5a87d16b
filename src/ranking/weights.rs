//! Per-intent factor weight tables (§4.5 reference table).

use crate::config::AdaptiveRankingConfig;
use crate::error::CoreError;
use crate::error::Result;
use crate::types::Intent;
use crate::types::RankingFactors;

/// The eight factor weights for one intent. Field order matches
/// [`RankingFactors::as_pairs`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightTable {
    pub text_relevance: f32,
    pub semantic_similarity: f32,
    pub context_overlap: f32,
    pub import_similarity: f32,
    pub proximity_score: f32,
    pub recency_score: f32,
    pub quality_score: f32,
    pub pattern_match: f32,
}

impl WeightTable {
    pub fn as_array(&self) -> [f32; 8] {
        [
            self.text_relevance,
            self.semantic_similarity,
            self.context_overlap,
            self.import_similarity,
            self.proximity_score,
            self.recency_score,
            self.quality_score,
            self.pattern_match,
        ]
    }

    pub fn from_array(values: [f32; 8]) -> Self {
        Self {
            text_relevance: values[0],
            semantic_similarity: values[1],
            context_overlap: values[2],
            import_similarity: values[3],
            proximity_score: values[4],
            recency_score: values[5],
            quality_score: values[6],
            pattern_match: values[7],
        }
    }

    pub fn sum(&self) -> f32 {
        self.as_array().iter().sum()
    }

    /// Renormalize so the eight weights sum to exactly 1.0 (§4.5 invariant 1
    /// / §8 invariant 1). A degenerate all-zero table falls back to the
    /// intent's reference table rather than dividing by zero.
    pub fn renormalize(self, intent: Intent) -> Self {
        let total = self.sum();
        if total <= f32::EPSILON {
            return reference_table(intent);
        }
        Self::from_array(self.as_array().map(|w| w / total))
    }

    /// Clamp every weight into `[min, max]`. Callers must renormalize
    /// afterward to restore the sum-to-1.0 invariant.
    pub fn clamp(self, min: f32, max: f32) -> Self {
        Self::from_array(self.as_array().map(|w| w.clamp(min, max)))
    }

    /// Weighted sum of the eight ranking factors.
    pub fn score(&self, factors: &RankingFactors) -> f32 {
        self.as_array()
            .iter()
            .zip(factors.as_pairs().iter())
            .map(|(w, (_, factor))| w * factor.value)
            .sum()
    }

    /// Index of the factor with the largest weighted contribution, used
    /// both for explanations and for adaptive-weight updates.
    pub fn top_contributing_index(&self, factors: &RankingFactors) -> usize {
        let contributions = self.as_array();
        let pairs = factors.as_pairs();
        (0..8)
            .map(|i| (i, contributions[i] * pairs[i].1.value))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    /// Validate the sum-to-1.0 invariant within the documented tolerance.
    pub fn validate(&self) -> Result<()> {
        let total = self.sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(CoreError::validation(format!(
                "weight table sums to {total}, expected 1.0"
            )));
        }
        Ok(())
    }
}

/// The spec's fixed per-intent reference table (§4.5).
pub fn reference_table(intent: Intent) -> WeightTable {
    match intent {
        Intent::Implement => WeightTable {
            text_relevance: 0.15,
            semantic_similarity: 0.25,
            context_overlap: 0.10,
            import_similarity: 0.15,
            proximity_score: 0.05,
            recency_score: 0.05,
            quality_score: 0.20,
            pattern_match: 0.05,
        },
        Intent::Debug => WeightTable {
            text_relevance: 0.30,
            semantic_similarity: 0.15,
            context_overlap: 0.15,
            import_similarity: 0.10,
            proximity_score: 0.10,
            recency_score: 0.10,
            quality_score: 0.05,
            pattern_match: 0.05,
        },
        Intent::Understand => WeightTable {
            text_relevance: 0.25,
            semantic_similarity: 0.30,
            context_overlap: 0.10,
            import_similarity: 0.10,
            proximity_score: 0.05,
            recency_score: 0.05,
            quality_score: 0.10,
            pattern_match: 0.05,
        },
        Intent::Refactor => WeightTable {
            text_relevance: 0.15,
            semantic_similarity: 0.20,
            context_overlap: 0.15,
            import_similarity: 0.15,
            proximity_score: 0.10,
            recency_score: 0.05,
            quality_score: 0.15,
            pattern_match: 0.05,
        },
        Intent::Test => WeightTable {
            text_relevance: 0.25,
            semantic_similarity: 0.15,
            context_overlap: 0.15,
            import_similarity: 0.10,
            proximity_score: 0.10,
            recency_score: 0.05,
            quality_score: 0.15,
            pattern_match: 0.05,
        },
        Intent::Document => WeightTable {
            text_relevance: 0.30,
            semantic_similarity: 0.25,
            context_overlap: 0.10,
            import_similarity: 0.05,
            proximity_score: 0.05,
            recency_score: 0.05,
            quality_score: 0.15,
            pattern_match: 0.05,
        },
    }
}

/// All six reference tables, keyed by intent.
pub fn all_reference_tables() -> Vec<(Intent, WeightTable)> {
    Intent::TIE_BREAK_ORDER.iter().map(|&intent| (intent, reference_table(intent))).collect()
}

/// Bounds a single weight adjustment to the configured step size, in
/// preparation for a clamp-then-renormalize pass (§4.5 adaptive weights).
pub fn clamp_step(delta: f32, config: &AdaptiveRankingConfig) -> f32 {
    delta.clamp(-config.max_step, config.max_step)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_reference_table_sums_to_one() {
        for (_, table) in all_reference_tables() {
            table.validate().unwrap();
        }
    }

    #[test]
    fn renormalize_restores_sum_to_one_after_clamping() {
        let table = reference_table(Intent::Debug).clamp(0.05, 0.50);
        let normalized = table.renormalize(Intent::Debug);
        assert!((normalized.sum() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn renormalize_falls_back_to_reference_on_degenerate_zero_table() {
        let zeroed = WeightTable::from_array([0.0; 8]);
        let normalized = zeroed.renormalize(Intent::Test);
        assert_eq!(normalized, reference_table(Intent::Test));
    }
}
