//! Rollback support for a single document upsert.

use tracing::warn;

use crate::storage::{IndexState, StoredDocument};
use crate::text::Tokenizer;
use crate::types::DocumentId;

/// Captures the pre-upsert state of one document so a failed upsert can be
/// rolled back, leaving all three structures as they were.
///
/// Must be resolved with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); dropping an unresolved transaction logs a
/// warning because it means an upsert path returned without deciding.
pub(crate) struct UpsertTransaction {
    doc_id: DocumentId,
    prior_doc: Option<StoredDocument>,
    prior_vector: Option<Vec<f32>>,
    resolved: bool,
}

impl UpsertTransaction {
    pub(crate) fn begin(state: &IndexState, doc_id: DocumentId) -> Self {
        Self {
            doc_id,
            prior_doc: state.documents.get(doc_id).cloned(),
            prior_vector: state.vectors.get(doc_id).map(<[f32]>::to_vec),
            resolved: false,
        }
    }

    pub(crate) fn commit(mut self) {
        self.resolved = true;
    }

    /// Restore the captured state.
    ///
    /// The prior vector came out of this same index, so re-inserting it can
    /// only fail if the index was corrupted concurrently; that is logged
    /// rather than propagated because rollback is already the error path.
    pub(crate) fn rollback(mut self, state: &mut IndexState, tokenizer: &Tokenizer) {
        self.resolved = true;
        let doc_id = self.doc_id;

        match self.prior_doc.take() {
            Some(prior) => {
                let tokens = tokenizer.tokenize_with_positions(&prior.content);
                state.text.add_document(doc_id, &tokens);
                state.documents.insert(prior);
            }
            None => {
                state.text.remove_document(doc_id);
                state.documents.remove(doc_id);
            }
        }

        match self.prior_vector.take() {
            Some(vector) => {
                let model_id = state.vectors.model_id().to_string();
                if let Err(e) = state.vectors.insert(doc_id, vector, &model_id) {
                    warn!(%doc_id, error = %e, "failed to restore vector during rollback");
                }
            }
            None => {
                state.vectors.remove(doc_id);
            }
        }
        warn!(%doc_id, "rolled back upsert");
    }
}

impl Drop for UpsertTransaction {
    fn drop(&mut self) {
        if !self.resolved {
            warn!(doc_id = %self.doc_id, "upsert transaction dropped without commit or rollback");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Document, content_hash};
    use crate::vector::{VectorDimension, VectorIndex};
    use std::collections::{BTreeSet, HashMap};
    use std::path::PathBuf;

    fn state() -> IndexState {
        IndexState::new(VectorIndex::new(
            VectorDimension::new(3).unwrap(),
            "test-model",
        ))
    }

    fn insert_doc(state: &mut IndexState, tokenizer: &Tokenizer, path: &str, content: &str) -> DocumentId {
        let id = state.documents.id_for_path(std::path::Path::new(path));
        state.documents.insert(StoredDocument {
            document: Document {
                id,
                path: PathBuf::from(path),
                content_hash: content_hash(content),
                size: content.len() as u64,
                modified: chrono::Utc::now(),
                metadata: HashMap::new(),
                tags: BTreeSet::new(),
            },
            content: content.to_string(),
        });
        state
            .text
            .add_document(id, &tokenizer.tokenize_with_positions(content));
        id
    }

    #[test]
    fn test_rollback_restores_prior_document() {
        let mut state = state();
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        let id = insert_doc(&mut state, &tokenizer, "/doc", "original content");
        state
            .vectors
            .insert(id, vec![1.0, 0.0, 0.0], "test-model")
            .unwrap();

        let tx = UpsertTransaction::begin(&state, id);

        // Simulate a partial update that then fails
        insert_doc(&mut state, &tokenizer, "/doc", "replacement content");
        state.vectors.remove(id);

        tx.rollback(&mut state, &tokenizer);

        assert_eq!(state.documents.content(id), Some("original content"));
        assert!(state.text.postings("original").is_some());
        assert!(state.text.postings("replacement").is_none());
        assert_eq!(state.vectors.get(id), Some(&[1.0, 0.0, 0.0][..]));
    }

    #[test]
    fn test_rollback_of_fresh_insert_removes_everything() {
        let mut state = state();
        let tokenizer = Tokenizer::new(Vec::new(), 2);

        let id = state.documents.id_for_path(std::path::Path::new("/new"));
        let tx = UpsertTransaction::begin(&state, id);

        insert_doc(&mut state, &tokenizer, "/new", "fresh content");
        state
            .vectors
            .insert(id, vec![0.0, 1.0, 0.0], "test-model")
            .unwrap();

        tx.rollback(&mut state, &tokenizer);

        assert!(!state.documents.contains(id));
        assert!(!state.text.contains(id));
        assert!(!state.vectors.contains(id));
    }

    #[test]
    fn test_commit_keeps_changes() {
        let mut state = state();
        let tokenizer = Tokenizer::new(Vec::new(), 2);
        let id = insert_doc(&mut state, &tokenizer, "/doc", "kept content");

        let tx = UpsertTransaction::begin(&state, id);
        tx.commit();

        assert_eq!(state.documents.content(id), Some("kept content"));
    }
}
