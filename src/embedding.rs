//! Embedding provider interface.
//!
//! The engine never generates embeddings itself; it calls an external
//! provider through the narrow [`Embedder`] trait. Two implementations are
//! provided: a fastembed-backed model (behind the `local-embeddings`
//! feature) and a deterministic hashing embedder that needs no model
//! download, used as an offline fallback and in tests.

use std::hash::{DefaultHasher, Hash, Hasher};

use crate::error::{SearchError, SearchResult};

/// Narrow interface to the external embedding provider.
///
/// All vectors produced by one `Embedder` instance share a single model
/// identity and dimensionality; the vector index enforces this.
pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-length vector.
    ///
    /// Fails with [`SearchError::EmbeddingUnavailable`] when the underlying
    /// provider cannot be reached or errors out.
    fn embed(&self, text: &str) -> SearchResult<Vec<f32>>;

    /// Dimensionality of every vector this provider produces
    fn dimension(&self) -> usize;

    /// Stable model identity recorded in the vector index
    fn model_id(&self) -> &str;
}

/// Deterministic bag-of-words hashing embedder.
///
/// Each token is hashed into a bucket with an alternating sign, and the
/// resulting vector is L2-normalized. Not a semantic model, but it is
/// deterministic across processes, which makes it suitable for offline
/// operation and for exercising the vector pipeline in tests.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let lowered = token.to_lowercase();
            let mut hasher = DefaultHasher::new();
            lowered.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if h & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        "hash-bow"
    }
}

/// fastembed-backed embedding provider (AllMiniLML6V2).
#[cfg(feature = "local-embeddings")]
pub mod fastembed_provider {
    use super::Embedder;
    use crate::error::{SearchError, SearchResult};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::path::Path;
    use std::sync::Mutex;

    /// Embedder backed by a locally cached fastembed model.
    pub struct FastembedEmbedder {
        /// The embedding model (wrapped in Mutex for interior mutability)
        model: Mutex<TextEmbedding>,
        dimension: usize,
    }

    impl FastembedEmbedder {
        /// Initialize the AllMiniLML6V2 model, downloading it into
        /// `cache_dir` on first use.
        pub fn new(cache_dir: &Path) -> SearchResult<Self> {
            let mut model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_cache_dir(cache_dir.to_path_buf())
                    .with_show_download_progress(false),
            )
            .map_err(|e| SearchError::EmbeddingUnavailable {
                reason: format!("failed to initialize embedding model: {e}"),
            })?;

            // Probe the model once to learn its output dimensionality
            let probe = model
                .embed(vec!["probe"], None)
                .map_err(|e| SearchError::EmbeddingUnavailable {
                    reason: format!("embedding probe failed: {e}"),
                })?;
            let dimension = probe
                .into_iter()
                .next()
                .map(|v| v.len())
                .ok_or_else(|| SearchError::EmbeddingUnavailable {
                    reason: "embedding probe returned no vector".into(),
                })?;

            Ok(Self {
                model: Mutex::new(model),
                dimension,
            })
        }
    }

    impl Embedder for FastembedEmbedder {
        fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
            let mut model = self
                .model
                .lock()
                .map_err(|_| SearchError::EmbeddingUnavailable {
                    reason: "embedding model lock poisoned".into(),
                })?;
            let embeddings =
                model
                    .embed(vec![text], None)
                    .map_err(|e| SearchError::EmbeddingUnavailable {
                        reason: format!("embedding call failed: {e}"),
                    })?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| SearchError::EmbeddingUnavailable {
                    reason: "embedding call returned no vector".into(),
                })
        }

        fn dimension(&self) -> usize {
            self.dimension
        }

        fn model_id(&self) -> &str {
            "AllMiniLML6V2"
        }
    }
}

#[cfg(feature = "local-embeddings")]
pub use fastembed_provider::FastembedEmbedder;
