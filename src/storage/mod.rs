//! Durable storage: document records, stored text, and index persistence.

mod document_store;
mod persistence;

pub use document_store::{Document, DocumentStore, StoredDocument, content_hash};
pub use persistence::IndexPersistence;

use serde::{Deserialize, Serialize};

use crate::text::TextIndex;
use crate::types::IndexStats;
use crate::vector::VectorIndex;

/// The complete queryable state: document store, inverted index, and vector
/// index.
///
/// The index manager is the sole writer; providers read through a shared
/// lock. Keeping the three structures in one value is what makes an update
/// transactional from a reader's point of view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexState {
    pub documents: DocumentStore,
    pub text: TextIndex,
    pub vectors: VectorIndex,
}

impl IndexState {
    pub fn new(vectors: VectorIndex) -> Self {
        Self {
            documents: DocumentStore::new(),
            text: TextIndex::new(),
            vectors,
        }
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            document_count: self.documents.len(),
            term_count: self.text.term_count(),
            vector_count: self.vectors.len(),
            embedding_model: self.vectors.model_id().to_string(),
        }
    }
}
