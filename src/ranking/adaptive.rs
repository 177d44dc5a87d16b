//! Adaptive per-intent weight learning from feedback (§4.5 "Adaptive
//! weights").
//!
//! Grounded on the teacher's `service.rs` `INSTANCES: Lazy<BlockingLruCache<...>>`
//! pattern for the "single writer, many readers" shape, generalized here
//! from a cache of service instances to a cache of per-intent weight
//! snapshots guarded by a `std::sync::RwLock` rather than a blocking
//! mutex, since weight reads happen on the hot ranking path and must never
//! block on a writer holding the lock across an await point (§5: "no lock
//! held across a suspension point" — weight updates never await).

use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::RwLock;

use crate::config::AdaptiveRankingConfig;
use crate::metrics::PipelineMetrics;
use crate::ranking::weights::clamp_step;
use crate::ranking::weights::reference_table;
use crate::ranking::weights::WeightTable;
use crate::types::FeedbackEvent;
use crate::types::FeedbackKind;
use crate::types::Intent;
use crate::types::RankingFactors;

struct IntentState {
    current: WeightTable,
    history: VecDeque<WeightTable>,
    pending: Vec<(usize, f32)>,
}

impl IntentState {
    fn new(intent: Intent) -> Self {
        Self {
            current: reference_table(intent),
            history: VecDeque::new(),
            pending: Vec::new(),
        }
    }
}

/// Learns per-intent weight adjustments from a rolling window of feedback
/// signals. Reads never block on a writer: the whole table swap happens
/// under a single short-lived write-lock acquisition.
pub struct AdaptiveRanker {
    config: AdaptiveRankingConfig,
    state: RwLock<HashMap<Intent, IntentState>>,
}

impl AdaptiveRanker {
    pub fn new(config: AdaptiveRankingConfig) -> Self {
        Self {
            config,
            state: RwLock::new(HashMap::new()),
        }
    }

    /// Current weight table for `intent`, falling back to the reference
    /// table the first time this intent is seen.
    pub fn weights_for(&self, intent: Intent) -> WeightTable {
        if let Ok(state) = self.state.read() {
            if let Some(entry) = state.get(&intent) {
                return entry.current;
            }
        }
        reference_table(intent)
    }

    /// Record one feedback signal against the ranking factors that were in
    /// play when the result was shown. Once `window_size` signals have
    /// accumulated for an intent, applies a bounded weight update.
    pub fn observe(&self, event: &FeedbackEvent, factors: &RankingFactors, metrics: &PipelineMetrics) {
        if !self.config.enabled {
            return;
        }
        let direction = match event.kind {
            FeedbackKind::Click | FeedbackKind::OutcomeSuccess => 1.0,
            FeedbackKind::OutcomeFailure => -1.0,
            FeedbackKind::Copy => 0.5,
        };

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => return,
        };
        let entry = state.entry(event.intent).or_insert_with(|| IntentState::new(event.intent));
        let top_index = entry.current.top_contributing_index(factors);
        entry.pending.push((top_index, direction));

        if entry.pending.len() >= self.config.window_size {
            apply_window(entry, event.intent, &self.config);
            metrics.record_adaptive_update();
        }
    }

    /// Roll back `intent`'s weights to the previous snapshot, if one
    /// exists. Used when a monitored metric regresses (§4.5).
    pub fn rollback(&self, intent: Intent, metrics: &PipelineMetrics) -> bool {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => return false,
        };
        if let Some(entry) = state.get_mut(&intent) {
            if let Some(previous) = entry.history.pop_back() {
                entry.current = previous;
                metrics.record_adaptive_rollback();
                return true;
            }
        }
        false
    }
}

fn apply_window(entry: &mut IntentState, intent: Intent, config: &AdaptiveRankingConfig) {
    let mut deltas = [0f32; 8];
    for (index, direction) in entry.pending.drain(..) {
        deltas[index] += direction;
    }

    let window = config.window_size.max(1) as f32;
    let mut values = entry.current.as_array();
    for (value, raw_delta) in values.iter_mut().zip(deltas.iter()) {
        let normalized_delta = raw_delta / window;
        *value += clamp_step(normalized_delta, config);
    }

    let proposed = WeightTable::from_array(values).clamp(config.min_weight, config.max_weight).renormalize(intent);

    entry.history.push_back(entry.current);
    if entry.history.len() > config.history_len {
        entry.history.pop_front();
    }
    entry.current = proposed;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Factor;
    use crate::types::FactorSource;

    fn neutral_factors() -> RankingFactors {
        let f = Factor::new(0.5, 1.0, FactorSource::Measured);
        RankingFactors {
            text_relevance: f,
            semantic_similarity: f,
            context_overlap: f,
            import_similarity: f,
            proximity_score: f,
            recency_score: f,
            quality_score: f,
            pattern_match: f,
        }
    }

    fn feedback(kind: FeedbackKind, intent: Intent) -> FeedbackEvent {
        FeedbackEvent {
            kind,
            query_id: "q1".to_string(),
            result_id: "r1".to_string(),
            position: 0,
            dwell_ms: None,
            timestamp: 0,
            intent,
        }
    }

    #[test]
    fn weights_for_unseen_intent_returns_reference_table() {
        let ranker = AdaptiveRanker::new(AdaptiveRankingConfig::default());
        assert_eq!(ranker.weights_for(Intent::Debug), reference_table(Intent::Debug));
    }

    #[test]
    fn window_update_keeps_weights_summing_to_one() {
        let config = AdaptiveRankingConfig {
            window_size: 5,
            ..AdaptiveRankingConfig::default()
        };
        let ranker = AdaptiveRanker::new(config);
        let metrics = PipelineMetrics::new();
        let factors = neutral_factors();

        for _ in 0..5 {
            ranker.observe(&feedback(FeedbackKind::OutcomeSuccess, Intent::Debug), &factors, &metrics);
        }

        let updated = ranker.weights_for(Intent::Debug);
        assert!((updated.sum() - 1.0).abs() < 1e-5);
        assert_eq!(metrics.snapshot().adaptive_updates, 1);
    }

    #[test]
    fn rollback_restores_the_previous_snapshot() {
        let config = AdaptiveRankingConfig {
            window_size: 2,
            ..AdaptiveRankingConfig::default()
        };
        let ranker = AdaptiveRanker::new(config);
        let metrics = PipelineMetrics::new();
        let factors = neutral_factors();
        let before = ranker.weights_for(Intent::Implement);

        for _ in 0..2 {
            ranker.observe(&feedback(FeedbackKind::OutcomeSuccess, Intent::Implement), &factors, &metrics);
        }
        assert_ne!(ranker.weights_for(Intent::Implement), before);

        assert!(ranker.rollback(Intent::Implement, &metrics));
        assert_eq!(ranker.weights_for(Intent::Implement), before);
        assert_eq!(metrics.snapshot().adaptive_rollbacks, 1);
    }
}
