//! Query definition, result types, and the stable query signature used as
//! the cache key.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

use crate::types::DocumentId;

/// Which providers a query runs against.
///
/// A closed set: the facade dispatches on this, and `Combined` fans out to
/// all three providers with merged ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderSelection {
    Text,
    Regex,
    Vector,
    Combined,
}

impl ProviderSelection {
    fn tag(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Regex => "regex",
            Self::Vector => "vector",
            Self::Combined => "combined",
        }
    }
}

/// Identifies which provider produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Text,
    Regex,
    Vector,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text => write!(f, "text"),
            Self::Regex => write!(f, "regex"),
            Self::Vector => write!(f, "vector"),
        }
    }
}

/// Metadata predicate applied by the result combiner.
///
/// Range bounds compare lexicographically, which works for the zero-padded
/// date and numeric formats the extraction pipeline produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum MetadataFilter {
    Equals {
        key: String,
        value: String,
    },
    Range {
        key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<String>,
    },
}

impl MetadataFilter {
    /// Whether a document's metadata satisfies this predicate.
    /// A missing key fails the predicate.
    pub fn matches(&self, metadata: &HashMap<String, String>) -> bool {
        match self {
            Self::Equals { key, value } => metadata.get(key).is_some_and(|v| v == value),
            Self::Range { key, min, max } => metadata.get(key).is_some_and(|v| {
                min.as_ref().is_none_or(|lo| v.as_str() >= lo.as_str())
                    && max.as_ref().is_none_or(|hi| v.as_str() <= hi.as_str())
            }),
        }
    }

    /// Canonical rendering for the query signature
    fn canonical(&self) -> String {
        match self {
            Self::Equals { key, value } => format!("eq:{key}={value}"),
            Self::Range { key, min, max } => format!(
                "range:{key}=[{}..{}]",
                min.as_deref().unwrap_or(""),
                max.as_deref().unwrap_or("")
            ),
        }
    }
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

/// A search request against the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,

    #[serde(default = "default_providers")]
    pub providers: ProviderSelection,

    #[serde(default)]
    pub filters: Vec<MetadataFilter>,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Similarity cutoff, vector provider only
    #[serde(default = "default_threshold")]
    pub threshold: f32,

    /// Snippet window size in characters
    #[serde(default = "default_context_length")]
    pub context_length: usize,
}

fn default_providers() -> ProviderSelection {
    ProviderSelection::Text
}

impl Query {
    pub fn new(text: impl Into<String>, providers: ProviderSelection) -> Self {
        Self {
            text: text.into(),
            providers,
            filters: Vec::new(),
            limit: default_limit(),
            threshold: default_threshold(),
            context_length: default_context_length(),
        }
    }

    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_context_length(mut self, context_length: usize) -> Self {
        self.context_length = context_length;
        self
    }

    /// Stable signature over the full query, used as the cache key.
    ///
    /// Filters are sorted before hashing so semantically identical queries
    /// hash identically regardless of the order fields were supplied in.
    pub fn signature(&self) -> String {
        let mut filters: Vec<String> = self.filters.iter().map(|f| f.canonical()).collect();
        filters.sort_unstable();

        let canonical = format!(
            "providers={};text={};filters=[{}];limit={};threshold={:08x};context={}",
            self.providers.tag(),
            self.text,
            filters.join(","),
            self.limit,
            self.threshold.to_bits(),
            self.context_length,
        );

        let digest = Sha256::digest(canonical.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Provider-specific evidence attached to a hit for explainability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchEvidence {
    /// Query terms that matched (text provider)
    Terms(Vec<String>),
    /// The pattern that matched (regex provider)
    Pattern(String),
    /// Cosine similarity under the named model (vector provider)
    Similarity { model: String },
}

/// One ranked search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub doc_id: DocumentId,
    /// Provider-native score; normalized to [0, 1] by the combiner
    pub score: f32,
    pub snippet: String,
    pub provider: ProviderKind,
    pub evidence: MatchEvidence,
}

/// Why a provider's contribution to a response is incomplete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    TimedOut,
    Failed,
    DocumentsSkipped,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderWarning {
    pub provider: ProviderKind,
    pub kind: WarningKind,
    pub detail: String,
}

/// The engine's answer to a query: ranked hits plus response metadata
/// describing which providers completed, timed out, or failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub hits: Vec<SearchHit>,
    pub warnings: Vec<ProviderWarning>,
    /// Providers that ran to completion
    pub completed: Vec<ProviderKind>,
    /// Providers that hit their deadline and returned partial results
    pub timed_out: Vec<ProviderKind>,
    pub from_cache: bool,
}
