use serde::{Deserialize, Serialize};

/// Stable identifier for an indexed document.
///
/// Ids are allocated per canonical path by the document store and persisted,
/// so the same path keeps the same id across restarts. Zero is reserved as
/// an uninitialized sentinel and never a valid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentId(pub u32);

impl DocumentId {
    pub fn new(value: u32) -> Option<Self> {
        if value == 0 { None } else { Some(Self(value)) }
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Convert to the underlying u32 value
    pub fn to_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of an upsert operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Document content changed and was (re)indexed
    Indexed(DocumentId),
    /// Content hash was unchanged, nothing was touched
    Unchanged(DocumentId),
}

impl UpsertOutcome {
    pub fn document_id(&self) -> DocumentId {
        match self {
            UpsertOutcome::Indexed(id) => *id,
            UpsertOutcome::Unchanged(id) => *id,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, UpsertOutcome::Unchanged(_))
    }
}

/// Counters describing the current index state, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub document_count: usize,
    pub term_count: usize,
    pub vector_count: usize,
    pub embedding_model: String,
}
