//! Persistence of the full index state.
//!
//! The contract is restart-equivalence: saving, restarting, and loading
//! with no writes in between must reproduce identical query results. The
//! whole state (documents, postings, vectors) is written as one versioned
//! bincode blob through a temp-file rename, so readers never observe a
//! partially written index.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{SearchError, SearchResult};
use crate::storage::IndexState;

/// Current on-disk format version
const FORMAT_VERSION: u32 = 1;

const INDEX_FILE: &str = "index.bin";

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    state: IndexState,
}

/// Manages persistence of the index
#[derive(Debug)]
pub struct IndexPersistence {
    base_path: PathBuf,
}

impl IndexPersistence {
    /// Create a new persistence manager
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    fn index_file(&self) -> PathBuf {
        self.base_path.join(INDEX_FILE)
    }

    /// Whether a persisted index exists at the base path
    pub fn exists(&self) -> bool {
        self.index_file().exists()
    }

    /// Save the full index state atomically.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn save(&self, state: &IndexState) -> SearchResult<()> {
        std::fs::create_dir_all(&self.base_path).map_err(|e| SearchError::Persistence {
            path: self.base_path.clone(),
            source: Box::new(e),
        })?;

        let persisted = PersistedIndex {
            version: FORMAT_VERSION,
            state: state.clone(),
        };
        let bytes = bincode::serde::encode_to_vec(&persisted, bincode::config::standard())
            .map_err(|e| SearchError::Persistence {
                path: self.index_file(),
                source: Box::new(e),
            })?;

        // Write to a temp file first, then rename into place
        let tmp = self.base_path.join(format!("{INDEX_FILE}.tmp"));
        std::fs::write(&tmp, &bytes).map_err(|e| SearchError::Persistence {
            path: tmp.clone(),
            source: Box::new(e),
        })?;
        std::fs::rename(&tmp, self.index_file()).map_err(|e| SearchError::Persistence {
            path: self.index_file(),
            source: Box::new(e),
        })?;

        info!(
            documents = state.documents.len(),
            terms = state.text.term_count(),
            vectors = state.vectors.len(),
            bytes = bytes.len(),
            "saved index state"
        );
        Ok(())
    }

    /// Load the index state from disk.
    #[must_use = "Load errors should be handled appropriately"]
    pub fn load(&self) -> SearchResult<IndexState> {
        let path = self.index_file();
        let bytes = std::fs::read(&path).map_err(|e| SearchError::Persistence {
            path: path.clone(),
            source: Box::new(e),
        })?;

        let (persisted, _): (PersistedIndex, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| SearchError::Persistence {
                    path: path.clone(),
                    source: Box::new(e),
                },
            )?;

        if persisted.version != FORMAT_VERSION {
            return Err(SearchError::VersionMismatch {
                expected: FORMAT_VERSION,
                actual: persisted.version,
            });
        }

        debug!(
            documents = persisted.state.documents.len(),
            "loaded index state"
        );
        Ok(persisted.state)
    }
}
