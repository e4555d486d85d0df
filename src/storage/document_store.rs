//! Document records and stored text.
//!
//! The store is the leaf dependency of the whole engine: the text and
//! vector indexes reference documents only by id, and ids are allocated
//! here, one per canonical path, stable across restarts because the store
//! is persisted with the rest of the index state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use crate::types::DocumentId;

/// SHA-256 content hash, lowercase hex. Changes iff the content changes.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Metadata record for an indexed document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub path: PathBuf,
    pub content_hash: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Key-value metadata supplied by the external extraction pipeline
    pub metadata: HashMap<String, String>,
    pub tags: BTreeSet<String>,
}

/// A document record together with its stored text.
///
/// The text is kept so the regex provider can scan it and so reindexing
/// can rebuild postings and vectors without re-reading source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub document: Document,
    pub content: String,
}

/// In-memory document store with id allocation per path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentStore {
    docs: HashMap<DocumentId, StoredDocument>,
    path_ids: HashMap<PathBuf, DocumentId>,
    next_id: u32,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self {
            docs: HashMap::new(),
            path_ids: HashMap::new(),
            next_id: 1,
        }
    }

    /// Id for a path, allocating a fresh one on first sight.
    ///
    /// The path-to-id mapping survives removal of the document, so a path
    /// that is re-ingested later keeps its old id.
    pub fn id_for_path(&mut self, path: &Path) -> DocumentId {
        if let Some(id) = self.path_ids.get(path) {
            return *id;
        }
        let id = DocumentId(self.next_id);
        self.next_id += 1;
        self.path_ids.insert(path.to_path_buf(), id);
        id
    }

    /// Existing id for a path, without allocating
    pub fn get_id(&self, path: &Path) -> Option<DocumentId> {
        self.path_ids.get(path).copied()
    }

    pub fn insert(&mut self, stored: StoredDocument) {
        self.path_ids
            .insert(stored.document.path.clone(), stored.document.id);
        self.docs.insert(stored.document.id, stored);
    }

    pub fn get(&self, id: DocumentId) -> Option<&StoredDocument> {
        self.docs.get(&id)
    }

    pub fn content(&self, id: DocumentId) -> Option<&str> {
        self.docs.get(&id).map(|d| d.content.as_str())
    }

    /// Remove the document record. Idempotent. The path keeps its id.
    pub fn remove(&mut self, id: DocumentId) -> Option<StoredDocument> {
        self.docs.remove(&id)
    }

    pub fn contains(&self, id: DocumentId) -> bool {
        self.docs.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Ids of all stored documents, sorted for deterministic iteration
    pub fn ids(&self) -> Vec<DocumentId> {
        let mut ids: Vec<DocumentId> = self.docs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &StoredDocument> {
        self.docs.values()
    }
}
