//! Configuration module for the indexing and retrieval engine.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `DF_` and use double underscores
//! to separate nested levels:
//! - `DF_CACHE__MAX_ENTRIES=512` sets `cache.max_entries`
//! - `DF_SEARCH__DEFAULT_LIMIT=25` sets `search.default_limit`
//! - `DF_TOKENIZER__MIN_TOKEN_LEN=3` sets `tokenizer.min_token_len`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SearchError, SearchResult};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Path to the index directory
    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    /// Tokenization policy, shared between indexing and query time
    #[serde(default)]
    pub tokenizer: TokenizerConfig,

    /// Search behavior defaults and provider weighting
    #[serde(default)]
    pub search: SearchConfig,

    /// Query-result cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Embedding model settings
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Indexing settings
    #[serde(default)]
    pub indexing: IndexingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TokenizerConfig {
    /// Tokens shorter than this are dropped
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Stop words removed at both indexing and query time
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    /// Default number of results when the query does not specify a limit
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Default similarity cutoff for the vector provider
    #[serde(default = "default_threshold")]
    pub default_threshold: f32,

    /// Default snippet window size in characters
    #[serde(default = "default_context_length")]
    pub context_length: usize,

    /// Per-provider deadline in milliseconds
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,

    /// Per-document budget for regex scans, in milliseconds
    #[serde(default = "default_regex_doc_timeout_ms")]
    pub regex_doc_timeout_ms: u64,

    /// Weight of the text provider in combined ranking
    #[serde(default = "default_weight")]
    pub text_weight: f32,

    /// Weight of the regex provider in combined ranking
    #[serde(default = "default_weight")]
    pub regex_weight: f32,

    /// Weight of the vector provider in combined ranking
    #[serde(default = "default_weight")]
    pub vector_weight: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached query results
    #[serde(default = "default_cache_entries")]
    pub max_entries: usize,

    /// Time-to-live per cache entry, in seconds
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EmbeddingConfig {
    /// Model identity the engine expects of its embedder and records in the
    /// vector index. Defaults to the offline hash embedder; set to a
    /// fastembed model name under the `local-embeddings` feature.
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Expected vector dimensionality
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    /// Number of parallel threads for batch indexing and reindex
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".docfind/index")
}
fn default_min_token_len() -> usize {
    2
}
fn default_stop_words() -> Vec<String> {
    ["a", "an", "and", "are", "as", "at", "be", "by", "for", "in", "is", "it", "of", "on", "or",
     "the", "to", "with"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_limit() -> usize {
    10
}
fn default_threshold() -> f32 {
    0.6
}
fn default_context_length() -> usize {
    100
}
fn default_provider_timeout_ms() -> u64 {
    5_000
}
fn default_regex_doc_timeout_ms() -> u64 {
    250
}
fn default_weight() -> f32 {
    1.0
}
fn default_cache_entries() -> usize {
    256
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_embedding_model() -> String {
    "hash-bow".to_string()
}
fn default_embedding_dimension() -> usize {
    384
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            tokenizer: TokenizerConfig::default(),
            search: SearchConfig::default(),
            cache: CacheConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            min_token_len: default_min_token_len(),
            stop_words: default_stop_words(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            default_threshold: default_threshold(),
            context_length: default_context_length(),
            provider_timeout_ms: default_provider_timeout_ms(),
            regex_doc_timeout_ms: default_regex_doc_timeout_ms(),
            text_weight: default_weight(),
            regex_weight: default_weight(),
            vector_weight: default_weight(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_cache_entries(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
        }
    }
}

impl Settings {
    /// Load settings with layering: defaults, then a TOML file, then
    /// `DF_`-prefixed environment variables.
    pub fn load(config_file: Option<&Path>) -> SearchResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment
            .merge(Env::prefixed("DF_").split("__"))
            .extract()
            .map_err(|e| SearchError::Config {
                reason: e.to_string(),
            })
    }

    /// Write the current settings as a TOML file, creating parent
    /// directories as needed. Used to seed a default config.
    pub fn save(&self, path: &Path) -> SearchResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SearchError::Config {
                reason: format!("failed to create config directory: {e}"),
            })?;
        }
        let toml = toml::to_string_pretty(self).map_err(|e| SearchError::Config {
            reason: format!("failed to serialize settings: {e}"),
        })?;
        std::fs::write(path, toml).map_err(|e| SearchError::Config {
            reason: format!("failed to write config file: {e}"),
        })
    }

    /// Validate cross-field constraints that serde defaults cannot express
    pub fn validate(&self) -> SearchResult<()> {
        if self.embedding.dimension == 0 {
            return Err(SearchError::Config {
                reason: "embedding.dimension must be non-zero".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.search.default_threshold) {
            return Err(SearchError::Config {
                reason: format!(
                    "search.default_threshold must be in [0.0, 1.0], got {}",
                    self.search.default_threshold
                ),
            });
        }
        for (name, w) in [
            ("text_weight", self.search.text_weight),
            ("regex_weight", self.search.regex_weight),
            ("vector_weight", self.search.vector_weight),
        ] {
            if w.is_nan() || w < 0.0 {
                return Err(SearchError::Config {
                    reason: format!("search.{name} must be a non-negative number"),
                });
            }
        }
        Ok(())
    }
}
