//! Mapping from document ids to embedding vectors with cosine-similarity
//! nearest-neighbor search.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{SearchError, SearchResult};
use crate::types::DocumentId;
use crate::vector::{Score, VectorDimension, cosine_similarity};

/// Vector index holding one embedding per document.
///
/// All vectors share one model identity and dimensionality; inserting a
/// vector from a different model is rejected rather than mixed in. Swapping
/// models requires a full reindex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorIndex {
    vectors: HashMap<DocumentId, Vec<f32>>,
    dimension: VectorDimension,
    model_id: String,
}

impl VectorIndex {
    pub fn new(dimension: VectorDimension, model_id: impl Into<String>) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
            model_id: model_id.into(),
        }
    }

    /// Insert or replace the embedding for a document.
    ///
    /// Fails when the vector's dimensionality or model does not match the
    /// index.
    pub fn insert(
        &mut self,
        doc_id: DocumentId,
        vector: Vec<f32>,
        model_id: &str,
    ) -> SearchResult<()> {
        if model_id != self.model_id {
            return Err(SearchError::ModelMismatch {
                expected: self.model_id.clone(),
                actual: model_id.to_string(),
            });
        }
        self.dimension.validate_vector(&vector)?;
        self.vectors.insert(doc_id, vector);
        Ok(())
    }

    /// Remove the embedding for a document. Idempotent; returns the removed
    /// vector when one existed.
    pub fn remove(&mut self, doc_id: DocumentId) -> Option<Vec<f32>> {
        self.vectors.remove(&doc_id)
    }

    pub fn contains(&self, doc_id: DocumentId) -> bool {
        self.vectors.contains_key(&doc_id)
    }

    pub fn get(&self, doc_id: DocumentId) -> Option<&[f32]> {
        self.vectors.get(&doc_id).map(|v| v.as_slice())
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
    }

    /// Searches for the nearest neighbors to a query vector.
    ///
    /// Computes cosine similarity against every stored vector, discards
    /// candidates below `threshold`, and returns up to `limit` results
    /// sorted by descending similarity with a stable doc-id tie-break.
    pub fn search(
        &self,
        query: &[f32],
        limit: usize,
        threshold: f32,
    ) -> SearchResult<Vec<(DocumentId, Score)>> {
        self.dimension.validate_vector(query)?;

        let mut candidates: Vec<(DocumentId, Score)> = self
            .vectors
            .iter()
            .filter_map(|(id, vector)| {
                let similarity = cosine_similarity(query, vector);
                if similarity >= threshold {
                    Some((*id, Score::clamped(similarity)))
                } else {
                    None
                }
            })
            .collect();

        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates.truncate(limit);
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: u32) -> DocumentId {
        DocumentId::new(id).unwrap()
    }

    fn index() -> VectorIndex {
        VectorIndex::new(VectorDimension::new(3).unwrap(), "test-model")
    }

    #[test]
    fn test_insert_and_search() {
        let mut idx = index();
        idx.insert(doc(1), vec![1.0, 0.0, 0.0], "test-model").unwrap();
        idx.insert(doc(2), vec![0.0, 1.0, 0.0], "test-model").unwrap();
        idx.insert(doc(3), vec![0.9, 0.1, 0.0], "test-model").unwrap();

        let results = idx.search(&[1.0, 0.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(results[0].0, doc(1));
        assert_eq!(results[1].0, doc(3));
        // doc2 is orthogonal, below the threshold
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_threshold_law() {
        let mut idx = index();
        idx.insert(doc(1), vec![1.0, 0.0, 0.0], "test-model").unwrap();
        idx.insert(doc(2), vec![0.5, 0.5, 0.0], "test-model").unwrap();
        idx.insert(doc(3), vec![0.0, 0.0, 1.0], "test-model").unwrap();

        let threshold = 0.6;
        let results = idx.search(&[1.0, 0.0, 0.0], 10, threshold).unwrap();
        for (_, score) in &results {
            assert!(score.get() >= threshold);
        }
    }

    #[test]
    fn test_model_mismatch_rejected() {
        let mut idx = index();
        let err = idx
            .insert(doc(1), vec![1.0, 0.0, 0.0], "other-model")
            .unwrap_err();
        assert_eq!(err.status_code(), "MODEL_MISMATCH");
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let mut idx = index();
        assert!(idx.insert(doc(1), vec![1.0, 0.0], "test-model").is_err());
        assert!(idx.search(&[1.0, 0.0], 10, 0.0).is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut idx = index();
        idx.insert(doc(1), vec![1.0, 0.0, 0.0], "test-model").unwrap();
        assert!(idx.remove(doc(1)).is_some());
        assert!(idx.remove(doc(1)).is_none());
        assert!(!idx.contains(doc(1)));
    }

    #[test]
    fn test_tie_break_by_doc_id() {
        let mut idx = index();
        idx.insert(doc(5), vec![1.0, 0.0, 0.0], "test-model").unwrap();
        idx.insert(doc(2), vec![1.0, 0.0, 0.0], "test-model").unwrap();

        let results = idx.search(&[1.0, 0.0, 0.0], 10, 0.5).unwrap();
        assert_eq!(results[0].0, doc(2));
        assert_eq!(results[1].0, doc(5));
    }

    #[test]
    fn test_empty_index_search() {
        let idx = index();
        let results = idx.search(&[1.0, 0.0, 0.0], 5, 0.0).unwrap();
        assert!(results.is_empty());
    }
}
