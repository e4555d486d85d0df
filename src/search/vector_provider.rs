//! Semantic search provider backed by the vector index.

use std::time::Instant;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::SearchResult;
use crate::search::query::{MatchEvidence, ProviderKind, SearchHit};
use crate::search::{ProviderRun, snippet_around};
use crate::storage::IndexState;

/// Answers semantic queries by embedding the query text and ranking stored
/// vectors by cosine similarity.
///
/// The embedding call is the only external dependency; when it fails the
/// error propagates as `EmbeddingUnavailable` and the facade degrades by
/// excluding this provider from combination.
pub struct VectorProvider<'a> {
    state: &'a IndexState,
    embedder: &'a dyn Embedder,
}

impl<'a> VectorProvider<'a> {
    pub fn new(state: &'a IndexState, embedder: &'a dyn Embedder) -> Self {
        Self { state, embedder }
    }

    pub fn search(
        &self,
        query_text: &str,
        threshold: f32,
        limit: usize,
        context_length: usize,
        deadline: Instant,
    ) -> SearchResult<ProviderRun> {
        // The deadline is checked around the embedding call, the slowest
        // step; an expired deadline surfaces as a partial-result timeout,
        // the same contract the other providers honor.
        if Instant::now() >= deadline {
            return Ok(timed_out_run());
        }
        let query_vector = self.embedder.embed(query_text)?;
        if Instant::now() >= deadline {
            return Ok(timed_out_run());
        }
        let matches = self.state.vectors.search(&query_vector, limit, threshold)?;

        let model = self.state.vectors.model_id().to_string();
        let hits: Vec<SearchHit> = matches
            .into_iter()
            .map(|(doc_id, score)| {
                let snippet = self
                    .state
                    .documents
                    .content(doc_id)
                    .map(|content| snippet_around(content, 0, context_length))
                    .unwrap_or_default();
                SearchHit {
                    doc_id,
                    score: score.get(),
                    snippet,
                    provider: ProviderKind::Vector,
                    evidence: MatchEvidence::Similarity {
                        model: model.clone(),
                    },
                }
            })
            .collect();

        debug!(hits = hits.len(), threshold, "vector provider finished");
        Ok(ProviderRun::complete(ProviderKind::Vector, hits))
    }
}

fn timed_out_run() -> ProviderRun {
    ProviderRun {
        provider: ProviderKind::Vector,
        hits: Vec::new(),
        timed_out: true,
        skipped: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::error::SearchError;
    use crate::storage::{Document, StoredDocument, content_hash};
    use crate::vector::{VectorDimension, VectorIndex};
    use std::collections::{BTreeSet, HashMap};
    use std::path::PathBuf;
    use std::time::Duration;

    fn far_deadline() -> Instant {
        Instant::now() + Duration::from_secs(60)
    }

    struct FailingEmbedder;

    impl Embedder for FailingEmbedder {
        fn embed(&self, _text: &str) -> SearchResult<Vec<f32>> {
            Err(SearchError::EmbeddingUnavailable {
                reason: "provider offline".into(),
            })
        }
        fn dimension(&self) -> usize {
            8
        }
        fn model_id(&self) -> &str {
            "failing"
        }
    }

    fn state_with(embedder: &HashEmbedder, docs: &[(&str, &str)]) -> IndexState {
        let mut state = IndexState::new(VectorIndex::new(
            VectorDimension::new(embedder.dimension()).unwrap(),
            embedder.model_id(),
        ));
        for (path, content) in docs {
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
            let vector = embedder.embed(content).unwrap();
            state
                .vectors
                .insert(id, vector, embedder.model_id())
                .unwrap();
        }
        state
    }

    #[test]
    fn test_finds_identical_content() {
        let embedder = HashEmbedder::new(64);
        let state = state_with(
            &embedder,
            &[("/doc1", "revenue growth analysis"), ("/doc2", "zebra habitats")],
        );
        let provider = VectorProvider::new(&state, &embedder);

        let run = provider
            .search("revenue growth analysis", 0.9, 10, 100, far_deadline())
            .unwrap();
        assert_eq!(run.hits.len(), 1);
        assert_eq!(run.hits[0].doc_id.value(), 1);
    }

    #[test]
    fn test_threshold_law() {
        let embedder = HashEmbedder::new(64);
        let state = state_with(
            &embedder,
            &[
                ("/doc1", "revenue growth analysis"),
                ("/doc2", "revenue report"),
                ("/doc3", "zebra habitats"),
            ],
        );
        let provider = VectorProvider::new(&state, &embedder);

        let threshold = 0.3;
        let run = provider
            .search("revenue growth", threshold, 10, 100, far_deadline())
            .unwrap();
        for hit in &run.hits {
            assert!(hit.score >= threshold);
        }
    }

    #[test]
    fn test_embedding_failure_propagates() {
        let embedder = HashEmbedder::new(8);
        let state = state_with(&embedder, &[("/doc1", "anything")]);
        let failing = FailingEmbedder;
        let provider = VectorProvider::new(&state, &failing);

        let err = provider
            .search("query", 0.6, 10, 100, far_deadline())
            .unwrap_err();
        assert_eq!(err.status_code(), "EMBEDDING_UNAVAILABLE");
    }

    #[test]
    fn test_expired_deadline_reports_timeout_without_embedding() {
        // An expired deadline must short-circuit before the embedding call;
        // a failing embedder proves it was never reached.
        let embedder = HashEmbedder::new(8);
        let state = state_with(&embedder, &[("/doc1", "anything")]);
        let failing = FailingEmbedder;
        let provider = VectorProvider::new(&state, &failing);

        let run = provider
            .search("query", 0.6, 10, 100, Instant::now())
            .unwrap();
        assert!(run.timed_out);
        assert!(run.hits.is_empty());
    }

    #[test]
    fn test_limit_is_respected() {
        let embedder = HashEmbedder::new(64);
        let state = state_with(
            &embedder,
            &[
                ("/doc1", "alpha beta"),
                ("/doc2", "alpha beta gamma"),
                ("/doc3", "alpha beta delta"),
            ],
        );
        let provider = VectorProvider::new(&state, &embedder);
        let run = provider
            .search("alpha beta", 0.0, 2, 100, far_deadline())
            .unwrap();
        assert!(run.hits.len() <= 2);
    }
}
