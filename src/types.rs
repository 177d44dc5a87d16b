//! Core data types shared across the retrieval pipeline.
//!
//! These are the only types that cross module boundaries. Anything that
//! arrives from the backend or from a caller is normalized into one of
//! these before it is used internally — there is no untyped `serde_json::Value`
//! passed between stages.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Detail level requested for a query's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Full,
    Compact,
    Ultra,
}

impl Default for DetailLevel {
    fn default() -> Self {
        DetailLevel::Full
    }
}

/// Enumerated query intent. Drives ranking weight selection.
///
/// Tie-break priority when the classifier scores two intents equally:
/// DEBUG > IMPLEMENT > TEST > REFACTOR > DOCUMENT > UNDERSTAND.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Intent {
    Implement,
    Debug,
    Understand,
    Refactor,
    Test,
    Document,
}

impl Intent {
    /// All intents in their fixed tie-break priority order (highest first).
    pub const TIE_BREAK_ORDER: [Intent; 6] = [
        Intent::Debug,
        Intent::Implement,
        Intent::Test,
        Intent::Refactor,
        Intent::Document,
        Intent::Understand,
    ];

    fn tie_break_rank(self) -> usize {
        Self::TIE_BREAK_ORDER
            .iter()
            .position(|i| *i == self)
            .expect("all intents listed in TIE_BREAK_ORDER")
    }

    /// Pick the winner between two equally-scored intents using the fixed
    /// priority order.
    pub fn break_tie(a: Intent, b: Intent) -> Intent {
        if a.tie_break_rank() <= b.tie_break_rank() {
            a
        } else {
            b
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Intent::Implement => "IMPLEMENT",
            Intent::Debug => "DEBUG",
            Intent::Understand => "UNDERSTAND",
            Intent::Refactor => "REFACTOR",
            Intent::Test => "TEST",
            Intent::Document => "DOCUMENT",
        };
        f.write_str(s)
    }
}

/// Caller context passed by value through the pipeline.
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub current_file: Option<String>,
    pub workspace_root: Option<String>,
    pub session_id: Option<String>,
    pub user_preferences: HashMap<String, String>,
}

/// A user request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub current_file: Option<String>,
    pub workspace_root: Option<String>,
    pub session_id: Option<String>,
    pub intent_hint: Option<Intent>,
    pub language: Option<String>,
    pub repository: Option<String>,
    pub max_results: i32,
    pub skip: i32,
    pub bm25_only: bool,
    pub exact_terms: Vec<String>,
    pub detail_level: DetailLevel,
    pub disable_cache: bool,
}

impl Query {
    /// Construct a query with required fields and the documented defaults
    /// for everything else.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            current_file: None,
            workspace_root: None,
            session_id: None,
            intent_hint: None,
            language: None,
            repository: None,
            max_results: 10,
            skip: 0,
            bm25_only: false,
            exact_terms: Vec::new(),
            detail_level: DetailLevel::Full,
            disable_cache: false,
        }
    }

    /// Validate boundary conditions the pipeline promises to enforce before
    /// doing any work: a non-empty query and non-negative skip/max_results.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.text.trim().is_empty() {
            return Err(crate::error::CoreError::validation("query text must not be empty"));
        }
        if self.max_results < 0 {
            return Err(crate::error::CoreError::validation("max_results must be >= 0"));
        }
        if self.skip < 0 {
            return Err(crate::error::CoreError::validation("skip must be >= 0"));
        }
        Ok(())
    }
}

/// Output of the query enhancer / intent classifier.
#[derive(Debug, Clone)]
pub struct EnhancedQuery {
    pub original: String,
    pub intent: Intent,
    /// 1-10 lexical rewrites, original excluded, deduplicated case-insensitively.
    pub variants: Vec<String>,
    /// Extracted literal terms, each <=200 chars, printable ASCII, capped at 16.
    pub exact_terms: Vec<String>,
}

/// Which stage(s) contributed a [`SearchResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Semantic,
    Vector,
    Exact,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::Semantic => "semantic",
            StageKind::Vector => "vector",
            StageKind::Exact => "exact",
        };
        f.write_str(s)
    }
}

/// Metadata attached to a result by the hybrid searcher and carried through
/// to the response. Deliberately typed rather than a loose JSON map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub exact_boost: bool,
    pub vector_used: bool,
    pub stages: Vec<StageKind>,
}

/// A single normalized, per-factor ranking signal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Factor {
    pub value: f32,
    pub confidence: f32,
    pub source: FactorSource,
}

impl Factor {
    pub fn new(value: f32, confidence: f32, source: FactorSource) -> Self {
        Self {
            value: value.clamp(0.0, 1.0),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

/// Provenance tag for a ranking factor, used in explanations and metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorSource {
    Measured,
    JaccardFallback,
    NoContext,
    CoercedNaN,
    Default,
}

/// Per-candidate ranking signals, one instance per [`SearchResult`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RankingFactors {
    pub text_relevance: Factor,
    pub semantic_similarity: Factor,
    pub context_overlap: Factor,
    pub import_similarity: Factor,
    pub proximity_score: Factor,
    pub recency_score: Factor,
    pub quality_score: Factor,
    pub pattern_match: Factor,
}

impl RankingFactors {
    /// Iterate the eight factors paired with their weight-table key, in the
    /// fixed order used by the weight vectors and by explanations.
    pub fn as_pairs(&self) -> [(&'static str, Factor); 8] {
        [
            ("text_relevance", self.text_relevance),
            ("semantic_similarity", self.semantic_similarity),
            ("context_overlap", self.context_overlap),
            ("import_similarity", self.import_similarity),
            ("proximity_score", self.proximity_score),
            ("recency_score", self.recency_score),
            ("quality_score", self.quality_score),
            ("pattern_match", self.pattern_match),
        ]
    }
}

/// A ranked candidate code chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub file_path: String,
    pub repository: Option<String>,
    pub language: Option<String>,
    pub code_snippet: String,
    /// field -> highlighted fragments, each <=200 chars, tags stripped.
    pub highlights: BTreeMap<String, Vec<String>>,
    pub start_line: i32,
    pub end_line: i32,
    pub function_name: Option<String>,
    pub class_name: Option<String>,
    pub modified_time: Option<i64>,
    pub raw_score: f32,
    pub ranked_score: f32,
    pub ranking_factors: Option<RankingFactors>,
    pub explanation: Option<String>,
    pub metadata: ResultMetadata,
}

impl SearchResult {
    /// Sanitize a highlight fragment per the contract: strip `<`/`>` and
    /// clamp to 200 chars.
    pub fn sanitize_highlight(raw: &str) -> String {
        let stripped: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
        clamp_chars(&stripped, 200)
    }
}

/// Clamp a string to at most `max_chars` Unicode scalar values.
pub fn clamp_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Deterministic cache key derived from the shape of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Compute the fingerprint of a query. Two queries that differ only in
    /// whitespace or in the ordering of `exact_terms` hash identically.
    pub fn compute(query: &Query) -> Self {
        let normalized_text = query.text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        let mut exact_terms = query.exact_terms.clone();
        exact_terms.sort();

        let mut hasher = Sha256::new();
        hasher.update(normalized_text.as_bytes());
        hasher.update([0u8]);
        if let Some(intent) = query.intent_hint {
            hasher.update(intent.to_string().as_bytes());
        }
        hasher.update([0u8]);
        hasher.update(query.language.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(query.repository.as_deref().unwrap_or("").as_bytes());
        hasher.update([0u8]);
        hasher.update(query.max_results.to_le_bytes());
        hasher.update(query.skip.to_le_bytes());
        hasher.update([query.bm25_only as u8]);
        for term in &exact_terms {
            hasher.update(term.as_bytes());
            hasher.update([0u8]);
        }
        hasher.update(format!("{:?}", query.detail_level).as_bytes());

        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Fingerprint(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Kind of user signal recorded by the feedback collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    Click,
    Copy,
    OutcomeSuccess,
    OutcomeFailure,
}

/// An append-only user signal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackEvent {
    pub kind: FeedbackKind,
    pub query_id: String,
    pub result_id: String,
    pub position: i32,
    pub dwell_ms: Option<i64>,
    pub timestamp: i64,
    /// Intent active when this result was ranked; drives which per-intent
    /// weight vector the adaptive ranker updates.
    pub intent: Intent,
}

/// Overall indexer run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexerOverallStatus {
    Unknown,
    Error,
    Running,
}

/// Status of a single indexer execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerRunResult {
    pub status: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub items_processed: i64,
    pub items_failed: i64,
}

/// Backend indexer state, polled via the gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub overall_status: IndexerOverallStatus,
    pub last_result: Option<IndexerRunResult>,
    /// Truncated to the last 5 runs.
    pub execution_history: Vec<IndexerRunResult>,
    pub max_run_time_seconds: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_tie_break_order() {
        assert_eq!(Intent::break_tie(Intent::Understand, Intent::Debug), Intent::Debug);
        assert_eq!(Intent::break_tie(Intent::Refactor, Intent::Test), Intent::Test);
        assert_eq!(Intent::break_tie(Intent::Document, Intent::Understand), Intent::Document);
    }

    #[test]
    fn fingerprint_ignores_exact_term_order_and_whitespace() {
        let mut q1 = Query::new("find   the   bug");
        q1.exact_terms = vec!["foo".into(), "bar".into()];
        let mut q2 = Query::new("find the bug");
        q2.exact_terms = vec!["bar".into(), "foo".into()];

        assert_eq!(Fingerprint::compute(&q1), Fingerprint::compute(&q2));
    }

    #[test]
    fn fingerprint_distinguishes_different_queries() {
        let q1 = Query::new("find the bug");
        let q2 = Query::new("fix the bug");
        assert_ne!(Fingerprint::compute(&q1), Fingerprint::compute(&q2));
    }

    #[test]
    fn sanitize_highlight_strips_tags_and_clamps() {
        let raw = format!("<em>{}</em>", "x".repeat(250));
        let sanitized = SearchResult::sanitize_highlight(&raw);
        assert!(!sanitized.contains('<'));
        assert!(!sanitized.contains('>'));
        assert!(sanitized.chars().count() <= 200);
    }

    #[test]
    fn query_validate_rejects_empty_text() {
        let q = Query::new("   ");
        assert!(q.validate().is_err());
    }
}
