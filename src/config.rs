//! Configuration for the retrieval core.
//!
//! A single immutable [`RetrievalConfig`] is built once at startup via
//! [`RetrievalConfig::from_env`]. Required values (`INDEX_ENDPOINT`,
//! `INDEX_API_KEY`, `INDEX_NAME`) are validated eagerly — a missing or
//! malformed required value fails construction with a [`CoreError::ConfigError`]
//! rather than letting a half-configured pipeline start. Everything else
//! falls back to the documented defaults below.

use std::env;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::CoreError;
use crate::error::Result;

/// Gateway/backend connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BackendConfig {
    pub endpoint: String,
    pub api_key: String,
    pub index_name: String,
    pub rest_timeout_seconds: u64,
    pub indexer_timeout_seconds: u64,
    pub indexer_poll_interval_seconds: u64,
    pub semantic_config_name: String,
    pub connection_pool_size: usize,
}

/// Response cache settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 60,
            max_entries: 500,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

/// Hybrid search / RRF tunables.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchConfig {
    pub embedding_dimensions: i32,
    /// Default weight for the exact-match stage in RRF fusion.
    pub default_exact_weight: f32,
    /// Semaphore bound on concurrently in-flight stage calls.
    pub max_concurrent_stages: usize,
    pub rrf_k: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            embedding_dimensions: 3072,
            default_exact_weight: 0.2,
            max_concurrent_stages: 8,
            rrf_k: 60.0,
        }
    }
}

/// Pipeline-level orchestration settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { deadline_ms: 10_000 }
    }
}

/// Adaptive ranking settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AdaptiveRankingConfig {
    pub enabled: bool,
    pub window_size: usize,
    pub max_step: f32,
    pub min_weight: f32,
    pub max_weight: f32,
    pub history_len: usize,
}

impl Default for AdaptiveRankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_size: 100,
            max_step: 0.05,
            min_weight: 0.05,
            max_weight: 0.50,
            history_len: 10,
        }
    }
}

/// Top-level, immutable configuration for the retrieval core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    pub backend: BackendConfig,
    pub cache: CacheConfig,
    pub search: SearchConfig,
    pub pipeline: PipelineConfig,
    pub adaptive_ranking: AdaptiveRankingConfig,
    pub log_level: String,
}

fn env_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env_var(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| CoreError::config(format!("{key} is set but not a valid value: {raw:?}"))),
    }
}

impl RetrievalConfig {
    /// Build configuration from environment variables, failing fast if a
    /// required value is missing or malformed.
    ///
    /// Required: `INDEX_ENDPOINT`, `INDEX_API_KEY`, `INDEX_NAME`.
    pub fn from_env() -> Result<Self> {
        let endpoint = env_var("INDEX_ENDPOINT")
            .ok_or_else(|| CoreError::config("INDEX_ENDPOINT is required"))?;
        let api_key = env_var("INDEX_API_KEY")
            .ok_or_else(|| CoreError::config("INDEX_API_KEY is required"))?;
        let index_name = env_var("INDEX_NAME")
            .ok_or_else(|| CoreError::config("INDEX_NAME is required"))?;

        let backend = BackendConfig {
            endpoint,
            api_key,
            index_name,
            rest_timeout_seconds: env_parse("REST_TIMEOUT_SECONDS", 30)?,
            indexer_timeout_seconds: env_parse("INDEXER_TIMEOUT_SECONDS", 300)?,
            indexer_poll_interval_seconds: env_parse("INDEXER_POLL_INTERVAL_SECONDS", 2)?,
            semantic_config_name: env_var("SEMANTIC_CONFIG_NAME")
                .unwrap_or_else(|| "semantic-config".to_string()),
            connection_pool_size: env_parse("CONNECTION_POOL_SIZE", 32usize)?,
        };

        let cache = CacheConfig {
            ttl_seconds: env_parse("CACHE_TTL_SECONDS", 60)?,
            max_entries: env_parse("CACHE_MAX_ENTRIES", 500usize)?,
        };

        let mut search = SearchConfig::default();
        search.embedding_dimensions = env_parse("EMBEDDING_DIMENSIONS", 3072)?;

        let adaptive_ranking = AdaptiveRankingConfig {
            enabled: env_parse("ADAPTIVE_RANKING", true)?,
            ..AdaptiveRankingConfig::default()
        };

        let log_level = env_var("LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let config = Self {
            backend,
            cache,
            search,
            pipeline: PipelineConfig::default(),
            adaptive_ranking,
            log_level,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants beyond simple parseability.
    pub fn validate(&self) -> Result<()> {
        if self.backend.endpoint.trim().is_empty() {
            return Err(CoreError::config("backend endpoint must not be empty"));
        }
        if self.backend.api_key.trim().is_empty() {
            return Err(CoreError::config("backend api_key must not be empty"));
        }
        if self.backend.index_name.trim().is_empty() {
            return Err(CoreError::config("backend index_name must not be empty"));
        }
        if !(0.0..=1.0).contains(&self.search.default_exact_weight) {
            return Err(CoreError::config("default_exact_weight must be in [0,1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clear_env() {
        for key in [
            "INDEX_ENDPOINT",
            "INDEX_API_KEY",
            "INDEX_NAME",
            "REST_TIMEOUT_SECONDS",
            "CACHE_TTL_SECONDS",
            "CACHE_MAX_ENTRIES",
            "ADAPTIVE_RANKING",
        ] {
            unsafe { env::remove_var(key) };
        }
    }

    #[test]
    fn from_env_fails_fast_without_required_vars() {
        clear_env();
        let result = RetrievalConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    fn from_env_succeeds_with_required_vars_and_applies_defaults() {
        clear_env();
        unsafe {
            env::set_var("INDEX_ENDPOINT", "https://example.search.windows.net");
            env::set_var("INDEX_API_KEY", "test-key");
            env::set_var("INDEX_NAME", "code-index");
        }
        let config = RetrievalConfig::from_env().unwrap();
        assert_eq!(config.cache.ttl_seconds, 60);
        assert_eq!(config.cache.max_entries, 500);
        assert!(config.adaptive_ranking.enabled);
        clear_env();
    }

    #[test]
    fn from_env_rejects_malformed_numeric_override() {
        clear_env();
        unsafe {
            env::set_var("INDEX_ENDPOINT", "https://example.search.windows.net");
            env::set_var("INDEX_API_KEY", "test-key");
            env::set_var("INDEX_NAME", "code-index");
            env::set_var("CACHE_TTL_SECONDS", "not-a-number");
        }
        let result = RetrievalConfig::from_env();
        assert!(result.is_err());
        clear_env();
    }
}
