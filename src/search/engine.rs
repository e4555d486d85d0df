//! The engine facade: opens the index, dispatches providers, combines
//! results, and owns the cache and saved-search store.

use parking_lot::RwLock;
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};
use crate::indexing::{BatchOutcome, DocumentInput, IndexManager};
use crate::search::query::{
    ProviderKind, ProviderSelection, ProviderWarning, Query, SearchResponse, WarningKind,
};
use crate::search::{
    ProviderRun, ProviderWeights, QueryCache, RegexProvider, SavedSearchStore, TextProvider,
    VectorProvider, combine,
};
use crate::storage::{IndexPersistence, IndexState};
use crate::text::Tokenizer;
use crate::types::{DocumentId, IndexStats, UpsertOutcome};
use crate::vector::{VectorDimension, VectorIndex};

/// Extra wall-clock allowance past the provider deadline before the facade
/// stops waiting on the blocking dispatch. Providers check their own
/// deadline cooperatively; this bound covers a provider stuck inside a call
/// that cannot observe it, such as a hung embedding backend.
const DISPATCH_GRACE: Duration = Duration::from_millis(500);

/// Facade over the whole engine: indexing, searching, persistence, and
/// saved searches.
///
/// Concurrent searches share one read lock acquisition per query, so every
/// provider of a query sees the same index state even while writes are
/// queued. Writes go through the [`IndexManager`] under the write lock.
pub struct SearchEngine {
    settings: Arc<Settings>,
    state: Arc<RwLock<IndexState>>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<Tokenizer>,
    cache: Arc<QueryCache>,
    saved: SavedSearchStore,
    persistence: IndexPersistence,
    manager: IndexManager,
}

impl std::fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchEngine").finish_non_exhaustive()
    }
}

impl SearchEngine {
    /// Open the engine at the configured index path, loading persisted
    /// state when present.
    ///
    /// A persisted index built with a different embedding model or
    /// dimensionality is rejected; run a full reindex with the new model
    /// instead of mixing vectors.
    pub fn open(settings: Settings, embedder: Arc<dyn Embedder>) -> SearchResult<Self> {
        settings.validate()?;
        check_embedder(&settings, embedder.as_ref())?;
        let persistence = IndexPersistence::new(&settings.index_path);

        let state = if persistence.exists() {
            let state = persistence.load()?;
            if state.vectors.model_id() != embedder.model_id() {
                return Err(SearchError::ModelMismatch {
                    expected: state.vectors.model_id().to_string(),
                    actual: embedder.model_id().to_string(),
                });
            }
            if state.vectors.dimension().get() != embedder.dimension() {
                return Err(SearchError::DimensionMismatch {
                    expected: state.vectors.dimension().get(),
                    actual: embedder.dimension(),
                });
            }
            info!(
                documents = state.documents.len(),
                "opened persisted index"
            );
            state
        } else {
            IndexState::new(VectorIndex::new(
                VectorDimension::new(embedder.dimension())?,
                embedder.model_id(),
            ))
        };

        let saved = SavedSearchStore::open(&settings.index_path)?;
        Ok(Self::assemble(settings, embedder, state, saved, persistence))
    }

    /// An engine with no persistence, for embedding in tests and tools.
    pub fn in_memory(settings: Settings, embedder: Arc<dyn Embedder>) -> SearchResult<Self> {
        settings.validate()?;
        check_embedder(&settings, embedder.as_ref())?;
        let persistence = IndexPersistence::new(&settings.index_path);
        let state = IndexState::new(VectorIndex::new(
            VectorDimension::new(embedder.dimension())?,
            embedder.model_id(),
        ));
        let saved = SavedSearchStore::in_memory();
        Ok(Self::assemble(settings, embedder, state, saved, persistence))
    }

    fn assemble(
        settings: Settings,
        embedder: Arc<dyn Embedder>,
        state: IndexState,
        saved: SavedSearchStore,
        persistence: IndexPersistence,
    ) -> Self {
        let settings = Arc::new(settings);
        let state = Arc::new(RwLock::new(state));
        let tokenizer = Arc::new(Tokenizer::from_settings(&settings));
        let cache = Arc::new(QueryCache::new(&settings.cache));
        let manager = IndexManager::new(
            Arc::clone(&state),
            Arc::clone(&embedder),
            Arc::clone(&tokenizer),
            Arc::clone(&cache),
            Arc::clone(&settings),
        );
        Self {
            settings,
            state,
            embedder,
            tokenizer,
            cache,
            saved,
            persistence,
            manager,
        }
    }

    /// Execute a query.
    ///
    /// Providers run in parallel against one consistent snapshot of the
    /// index. In combined mode a failing or timed-out provider degrades to
    /// a warning on the response; a single-provider query propagates its
    /// provider's error. Results identical to a recent query are answered
    /// from the cache.
    pub async fn search(&self, query: &Query) -> SearchResult<SearchResponse> {
        if query.text.trim().is_empty() {
            return Ok(SearchResponse {
                hits: Vec::new(),
                warnings: Vec::new(),
                completed: Vec::new(),
                timed_out: Vec::new(),
                from_cache: false,
            });
        }

        let mut kinds = match query.providers {
            ProviderSelection::Text => vec![ProviderKind::Text],
            ProviderSelection::Regex => vec![ProviderKind::Regex],
            ProviderSelection::Vector => vec![ProviderKind::Vector],
            ProviderSelection::Combined => vec![
                ProviderKind::Text,
                ProviderKind::Regex,
                ProviderKind::Vector,
            ],
        };

        // Pattern validity is checked before dispatch. A regex-only query
        // fails outright; in combined mode the query text is usually plain
        // language, so a pattern that does not compile just excludes the
        // regex provider.
        let mut pre_warnings = Vec::new();
        let regex = match RegexProvider::compile(&query.text) {
            Ok(r) => Some(r),
            Err(e) => {
                if query.providers == ProviderSelection::Regex {
                    return Err(e);
                }
                if query.providers == ProviderSelection::Combined {
                    kinds.retain(|k| *k != ProviderKind::Regex);
                    pre_warnings.push(ProviderWarning {
                        provider: ProviderKind::Regex,
                        kind: WarningKind::Failed,
                        detail: e.to_string(),
                    });
                }
                None
            }
        };

        let signature = query.signature();
        if let Some(hits) = self.cache.get(&signature) {
            debug!(%signature, "cache hit");
            // No provider ran; from_cache carries the provenance.
            return Ok(SearchResponse {
                hits,
                warnings: Vec::new(),
                completed: Vec::new(),
                timed_out: Vec::new(),
                from_cache: true,
            });
        }

        let state = Arc::clone(&self.state);
        let embedder = Arc::clone(&self.embedder);
        let tokenizer = Arc::clone(&self.tokenizer);
        let settings = Arc::clone(&self.settings);
        let query_owned = query.clone();
        let dispatch_kinds = kinds.clone();

        let task = tokio::task::spawn_blocking(move || {
            run_providers(
                &state,
                &embedder,
                &tokenizer,
                &settings,
                &query_owned,
                &dispatch_kinds,
                regex,
            )
        });
        let budget =
            Duration::from_millis(self.settings.search.provider_timeout_ms) + DISPATCH_GRACE;
        let mut response = match tokio::time::timeout(budget, task).await {
            Ok(joined) => {
                joined.map_err(|e| SearchError::General(format!("search task failed: {e}")))??
            }
            Err(_) => {
                // The dispatch is stuck past every provider deadline; stop
                // waiting and report every selected provider as timed out.
                // The blocking task finishes on its own thread eventually.
                debug!(%signature, "provider dispatch abandoned past its deadline");
                SearchResponse {
                    hits: Vec::new(),
                    warnings: kinds
                        .iter()
                        .map(|k| ProviderWarning {
                            provider: *k,
                            kind: WarningKind::TimedOut,
                            detail: "provider dispatch exceeded its deadline".into(),
                        })
                        .collect(),
                    completed: Vec::new(),
                    timed_out: kinds,
                    from_cache: false,
                }
            }
        };

        if !pre_warnings.is_empty() {
            pre_warnings.extend(response.warnings.drain(..));
            response.warnings = pre_warnings;
        }
        if response.warnings.is_empty() && response.timed_out.is_empty() {
            self.cache.insert(signature, response.hits.clone());
        }
        Ok(response)
    }

    /// Build a query seeded from the configured search defaults.
    pub fn query(&self, text: impl Into<String>, providers: ProviderSelection) -> Query {
        Query::new(text, providers)
            .with_limit(self.settings.search.default_limit)
            .with_threshold(self.settings.search.default_threshold)
            .with_context_length(self.settings.search.context_length)
    }

    /// Load a saved search by name and execute it
    pub async fn search_saved(&self, name: &str) -> SearchResult<SearchResponse> {
        let query = self.saved.load(name)?;
        self.search(&query).await
    }

    pub fn save_search(&self, name: impl Into<String>, query: Query) -> SearchResult<()> {
        self.saved.save(name, query)
    }

    pub fn load_search(&self, name: &str) -> SearchResult<Query> {
        self.saved.load(name)
    }

    pub fn list_searches(&self) -> Vec<String> {
        self.saved.list()
    }

    pub fn delete_search(&self, name: &str) -> SearchResult<()> {
        self.saved.delete(name)
    }

    pub fn index(&self, input: DocumentInput) -> SearchResult<UpsertOutcome> {
        self.manager.upsert(input)
    }

    pub fn index_batch(
        &self,
        inputs: Vec<DocumentInput>,
        cancel: &CancellationToken,
    ) -> SearchResult<BatchOutcome> {
        self.manager.index_batch(inputs, cancel)
    }

    pub fn remove_document(&self, path: &Path) -> SearchResult<bool> {
        self.manager.remove_path(path)
    }

    pub fn remove_document_id(&self, id: DocumentId) -> SearchResult<bool> {
        self.manager.remove(id)
    }

    pub fn reindex(&self, ids: Option<&[DocumentId]>) -> SearchResult<usize> {
        self.manager.reindex(ids)
    }

    /// Write the full index state to disk
    pub fn persist(&self) -> SearchResult<()> {
        let state = self.state.read();
        self.persistence.save(&state)
    }

    pub fn stats(&self) -> IndexStats {
        self.manager.stats()
    }
}

/// The embedder handed to the engine must be the one the settings describe;
/// a mismatch would silently index under a different model than configured.
fn check_embedder(settings: &Settings, embedder: &dyn Embedder) -> SearchResult<()> {
    if embedder.model_id() != settings.embedding.model {
        return Err(SearchError::ModelMismatch {
            expected: settings.embedding.model.clone(),
            actual: embedder.model_id().to_string(),
        });
    }
    if embedder.dimension() != settings.embedding.dimension {
        return Err(SearchError::DimensionMismatch {
            expected: settings.embedding.dimension,
            actual: embedder.dimension(),
        });
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_providers(
    state: &RwLock<IndexState>,
    embedder: &Arc<dyn Embedder>,
    tokenizer: &Tokenizer,
    settings: &Settings,
    query: &Query,
    kinds: &[ProviderKind],
    regex: Option<Regex>,
) -> SearchResult<SearchResponse> {
    // One read guard for the whole query: every provider sees the same
    // index state.
    let guard = state.read();
    let deadline = Instant::now() + Duration::from_millis(settings.search.provider_timeout_ms);
    let per_doc_budget = Duration::from_millis(settings.search.regex_doc_timeout_ms);

    let results: Vec<(ProviderKind, SearchResult<ProviderRun>)> = kinds
        .par_iter()
        .map(|kind| {
            let result = match kind {
                ProviderKind::Text => Ok(TextProvider::new(&guard, tokenizer).search(
                    &query.text,
                    query.context_length,
                    deadline,
                )),
                ProviderKind::Regex => match &regex {
                    Some(r) => Ok(RegexProvider::new(&guard, tokenizer).search(
                        r,
                        query.context_length,
                        per_doc_budget,
                        deadline,
                    )),
                    None => Err(SearchError::InvalidQuery {
                        reason: "regex provider dispatched without a compiled pattern".into(),
                    }),
                },
                ProviderKind::Vector => VectorProvider::new(&guard, embedder.as_ref()).search(
                    &query.text,
                    query.threshold,
                    query.limit,
                    query.context_length,
                    deadline,
                ),
            };
            (*kind, result)
        })
        .collect();

    let mut runs: Vec<ProviderRun> = Vec::new();
    let mut warnings: Vec<ProviderWarning> = Vec::new();
    let mut completed: Vec<ProviderKind> = Vec::new();
    let mut timed_out: Vec<ProviderKind> = Vec::new();
    let mut first_error: Option<SearchError> = None;

    for (kind, result) in results {
        match result {
            Ok(run) => {
                if run.timed_out {
                    timed_out.push(kind);
                    warnings.push(ProviderWarning {
                        provider: kind,
                        kind: WarningKind::TimedOut,
                        detail: "provider deadline reached, results are partial".into(),
                    });
                } else {
                    completed.push(kind);
                }
                if !run.skipped.is_empty() {
                    warnings.push(ProviderWarning {
                        provider: kind,
                        kind: WarningKind::DocumentsSkipped,
                        detail: run.skipped.join("; "),
                    });
                }
                runs.push(run);
            }
            Err(e) => {
                warnings.push(ProviderWarning {
                    provider: kind,
                    kind: WarningKind::Failed,
                    detail: e.to_string(),
                });
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    // Degradation stops where every provider failed
    if runs.is_empty()
        && let Some(e) = first_error
    {
        return Err(e);
    }

    let weights = ProviderWeights::from_config(&settings.search);
    let hits = combine(&runs, &guard, &query.filters, &weights, query.limit);

    debug!(
        providers = runs.len(),
        hits = hits.len(),
        warnings = warnings.len(),
        "query finished"
    );
    Ok(SearchResponse {
        hits,
        warnings,
        completed,
        timed_out,
        from_cache: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::search::query::MetadataFilter;

    fn engine() -> SearchEngine {
        let mut settings = Settings::default();
        settings.embedding.dimension = 64;
        SearchEngine::in_memory(settings, Arc::new(HashEmbedder::new(64))).unwrap()
    }

    struct SlowEmbedder {
        inner: HashEmbedder,
        delay: Duration,
    }

    impl Embedder for SlowEmbedder {
        fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
            std::thread::sleep(self.delay);
            self.inner.embed(text)
        }
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }
        fn model_id(&self) -> &str {
            self.inner.model_id()
        }
    }

    fn seed(engine: &SearchEngine) {
        for (path, content, doc_type) in [
            ("/docs/q1.txt", "quarterly revenue report data42", "report"),
            ("/docs/q2.txt", "revenue growth analysis", "analysis"),
            ("/docs/recipes.txt", "unrelated cooking recipes", "note"),
        ] {
            engine
                .index(
                    DocumentInput::new(path, content).with_metadata("document_type", doc_type),
                )
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_text_search() {
        let engine = engine();
        seed(&engine);

        let response = engine
            .search(&Query::new("revenue", ProviderSelection::Text))
            .await
            .unwrap();
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.completed, vec![ProviderKind::Text]);
        assert!(!response.from_cache);
    }

    #[tokio::test]
    async fn test_empty_query_is_empty_response() {
        let engine = engine();
        seed(&engine);

        let response = engine
            .search(&Query::new("   ", ProviderSelection::Combined))
            .await
            .unwrap();
        assert!(response.hits.is_empty());
        assert!(response.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_regex_is_an_error() {
        let engine = engine();
        let err = engine
            .search(&Query::new("data[", ProviderSelection::Regex))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), "INVALID_QUERY");
    }

    #[tokio::test]
    async fn test_combined_degrades_on_invalid_pattern() {
        let engine = engine();
        seed(&engine);

        let response = engine
            .search(&Query::new("revenue (growth", ProviderSelection::Combined))
            .await
            .unwrap();
        assert!(!response.hits.is_empty());
        assert!(
            response
                .warnings
                .iter()
                .any(|w| w.provider == ProviderKind::Regex && w.kind == WarningKind::Failed)
        );
        assert!(!response.completed.contains(&ProviderKind::Regex));
    }

    #[tokio::test]
    async fn test_second_query_is_cached() {
        let engine = engine();
        seed(&engine);

        let query = Query::new("revenue", ProviderSelection::Text);
        let first = engine.search(&query).await.unwrap();
        let second = engine.search(&query).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.hits, second.hits);
        // No provider ran for the cached answer
        assert!(second.completed.is_empty());
        assert!(second.timed_out.is_empty());
    }

    #[tokio::test]
    async fn test_slow_embedding_surfaces_vector_timeout() {
        let mut settings = Settings::default();
        settings.embedding.dimension = 16;
        settings.search.provider_timeout_ms = 5;
        let embedder = Arc::new(SlowEmbedder {
            inner: HashEmbedder::new(16),
            delay: Duration::from_millis(50),
        });
        let engine = SearchEngine::in_memory(settings, embedder).unwrap();
        engine
            .index(DocumentInput::new("/doc.txt", "anything at all"))
            .unwrap();

        let response = engine
            .search(&Query::new("anything", ProviderSelection::Vector))
            .await
            .unwrap();
        assert!(response.hits.is_empty());
        assert_eq!(response.timed_out, vec![ProviderKind::Vector]);
        assert!(
            response
                .warnings
                .iter()
                .any(|w| w.provider == ProviderKind::Vector && w.kind == WarningKind::TimedOut)
        );
    }

    #[tokio::test]
    async fn test_query_builder_uses_configured_defaults() {
        let mut settings = Settings::default();
        settings.embedding.dimension = 64;
        settings.search.default_limit = 3;
        settings.search.default_threshold = 0.4;
        settings.search.context_length = 42;
        let engine = SearchEngine::in_memory(settings, Arc::new(HashEmbedder::new(64))).unwrap();

        let query = engine.query("revenue", ProviderSelection::Combined);
        assert_eq!(query.limit, 3);
        assert_eq!(query.threshold, 0.4);
        assert_eq!(query.context_length, 42);
    }

    #[tokio::test]
    async fn test_engine_rejects_embedder_not_matching_settings() {
        let mut settings = Settings::default();
        settings.embedding.dimension = 32;
        let err = SearchEngine::in_memory(settings, Arc::new(HashEmbedder::new(64))).unwrap_err();
        assert_eq!(err.status_code(), "DIMENSION_MISMATCH");

        let mut settings = Settings::default();
        settings.embedding.dimension = 64;
        settings.embedding.model = "some-other-model".into();
        let err = SearchEngine::in_memory(settings, Arc::new(HashEmbedder::new(64))).unwrap_err();
        assert_eq!(err.status_code(), "MODEL_MISMATCH");
    }

    #[tokio::test]
    async fn test_write_invalidates_cache() {
        let engine = engine();
        seed(&engine);

        let query = Query::new("revenue", ProviderSelection::Text);
        engine.search(&query).await.unwrap();
        engine
            .index(DocumentInput::new("/docs/new.txt", "more revenue details"))
            .unwrap();

        let after = engine.search(&query).await.unwrap();
        assert!(!after.from_cache);
        assert_eq!(after.hits.len(), 3);
    }

    #[tokio::test]
    async fn test_combined_with_filter() {
        let engine = engine();
        seed(&engine);

        let query = Query::new("revenue", ProviderSelection::Combined)
            .with_threshold(0.0)
            .with_filter(MetadataFilter::Equals {
                key: "document_type".into(),
                value: "report".into(),
            });
        let response = engine.search(&query).await.unwrap();
        assert_eq!(response.hits.len(), 1);
        assert_eq!(response.hits[0].doc_id.value(), 1);
    }

    #[tokio::test]
    async fn test_saved_search_round_trip() {
        let engine = engine();
        seed(&engine);

        let query = Query::new("revenue", ProviderSelection::Text);
        engine.save_search("quarterly", query.clone()).unwrap();
        assert_eq!(engine.list_searches(), vec!["quarterly"]);
        assert_eq!(engine.load_search("quarterly").unwrap(), query);

        let response = engine.search_saved("quarterly").await.unwrap();
        assert_eq!(response.hits.len(), 2);

        engine.delete_search("quarterly").unwrap();
        assert!(engine.search_saved("quarterly").await.is_err());
    }

    #[tokio::test]
    async fn test_combined_determinism() {
        let engine = engine();
        seed(&engine);

        let query = Query::new("revenue report", ProviderSelection::Combined).with_threshold(0.0);
        let first = engine.search(&query).await.unwrap();
        engine.cache.invalidate_all();
        let second = engine.search(&query).await.unwrap();

        assert!(!second.from_cache);
        assert_eq!(first.hits, second.hits);
    }
}
