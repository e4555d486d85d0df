//! Index lifecycle: upserts, removals, reindexing, and batch ingestion.
//!
//! The [`IndexManager`] is the sole writer to the shared [`IndexState`].
//! Every mutation happens under the write lock, so readers either see the
//! state fully before or fully after an update, never in between.

mod transaction;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::embedding::Embedder;
use crate::error::{SearchError, SearchResult};
use crate::search::QueryCache;
use crate::storage::{Document, IndexState, StoredDocument, content_hash};
use crate::text::{TextIndex, Tokenizer};
use crate::types::{DocumentId, IndexStats, UpsertOutcome};
use crate::vector::{VectorDimension, VectorIndex};

use transaction::UpsertTransaction;

/// One document as handed over by the external extraction pipeline:
/// canonical path, extracted text, and optional metadata and embedding.
#[derive(Debug, Clone)]
pub struct DocumentInput {
    pub path: PathBuf,
    pub content: String,
    pub modified: Option<DateTime<Utc>>,
    pub metadata: HashMap<String, String>,
    pub tags: BTreeSet<String>,
    /// Pre-computed embedding for the content. When absent the manager
    /// embeds the content itself; if that fails the document is indexed
    /// for text and regex search only.
    pub embedding: Option<Vec<f32>>,
}

impl DocumentInput {
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            modified: None,
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
            embedding: None,
        }
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Counters for a batch ingestion run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub indexed: usize,
    pub unchanged: usize,
    /// The run was cancelled; documents processed before the cancellation
    /// remain indexed.
    pub cancelled: bool,
}

/// Sole writer to the shared index state.
pub struct IndexManager {
    state: Arc<RwLock<IndexState>>,
    embedder: Arc<dyn Embedder>,
    tokenizer: Arc<Tokenizer>,
    cache: Arc<QueryCache>,
    settings: Arc<Settings>,
}

impl IndexManager {
    pub fn new(
        state: Arc<RwLock<IndexState>>,
        embedder: Arc<dyn Embedder>,
        tokenizer: Arc<Tokenizer>,
        cache: Arc<QueryCache>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            state,
            embedder,
            tokenizer,
            cache,
            settings,
        }
    }

    /// Insert or update one document across all three structures.
    ///
    /// A content hash short-circuit makes re-ingesting unchanged documents
    /// a no-op. Hashing, tokenization, and embedding all run before the
    /// write lock is taken, so searches keep answering while the embedder
    /// works. On any failure the document's previous state is restored
    /// before the error is returned, so a failed upsert never leaves the
    /// text index, vector index, and document store disagreeing.
    pub fn upsert(&self, input: DocumentInput) -> SearchResult<UpsertOutcome> {
        let DocumentInput {
            path,
            content,
            modified,
            metadata,
            tags,
            embedding,
        } = input;
        let hash = content_hash(&content);

        {
            let state = self.state.read();
            if let Some(id) = state.documents.get_id(&path)
                && let Some(existing) = state.documents.get(id)
                && existing.document.content_hash == hash
                && existing.document.metadata == metadata
                && existing.document.tags == tags
            {
                debug!(%id, path = %path.display(), "content unchanged, skipping");
                return Ok(UpsertOutcome::Unchanged(id));
            }
        }

        let vector = match embedding {
            Some(v) => Some(v),
            None => match self.embedder.embed(&content) {
                Ok(v) => Some(v),
                Err(SearchError::EmbeddingUnavailable { reason }) => {
                    warn!(
                        path = %path.display(),
                        %reason,
                        "embedding failed, indexing for text search only"
                    );
                    None
                }
                Err(e) => return Err(e),
            },
        };
        let tokens = self.tokenizer.tokenize_with_positions(&content);

        let mut state = self.state.write();
        let id = state.documents.id_for_path(&path);

        // Re-checked under the write lock: a concurrent upsert of the same
        // path may have landed this exact content between the two locks.
        if let Some(existing) = state.documents.get(id)
            && existing.document.content_hash == hash
            && existing.document.metadata == metadata
            && existing.document.tags == tags
        {
            debug!(%id, path = %path.display(), "content unchanged, skipping");
            return Ok(UpsertOutcome::Unchanged(id));
        }

        let tx = UpsertTransaction::begin(&state, id);
        state.text.add_document(id, &tokens);

        let has_vector = match vector {
            Some(v) => {
                let model_id = state.vectors.model_id().to_string();
                if let Err(e) = state.vectors.insert(id, v, &model_id) {
                    tx.rollback(&mut state, &self.tokenizer);
                    return Err(e);
                }
                true
            }
            None => {
                // No fresh embedding: a vector from the old content must not
                // survive the update.
                state.vectors.remove(id);
                false
            }
        };

        let size = content.len() as u64;
        state.documents.insert(StoredDocument {
            document: Document {
                id,
                path,
                content_hash: hash,
                size,
                modified: modified.unwrap_or_else(Utc::now),
                metadata,
                tags,
            },
            content,
        });

        let consistent = state.documents.contains(id)
            && state.text.contains(id)
            && state.vectors.contains(id) == has_vector;
        if !consistent {
            tx.rollback(&mut state, &self.tokenizer);
            return Err(SearchError::IndexCorrupted {
                reason: format!("document {id} is not consistently present after upsert"),
            });
        }

        tx.commit();
        drop(state);
        self.cache.invalidate_all();
        Ok(UpsertOutcome::Indexed(id))
    }

    /// Remove a document from all three structures. Removing an unknown id
    /// is a no-op and does not invalidate the cache.
    pub fn remove(&self, id: DocumentId) -> SearchResult<bool> {
        let mut state = self.state.write();
        if !state.documents.contains(id) {
            return Ok(false);
        }

        state.text.remove_document(id);
        state.vectors.remove(id);
        state.documents.remove(id);
        debug!(%id, "removed document");

        drop(state);
        self.cache.invalidate_all();
        Ok(true)
    }

    /// Remove a document by its canonical path
    pub fn remove_path(&self, path: &Path) -> SearchResult<bool> {
        let id = self.state.read().documents.get_id(path);
        match id {
            Some(id) => self.remove(id),
            None => Ok(false),
        }
    }

    /// Rebuild derived structures from stored document text.
    ///
    /// With no ids, the text and vector indexes are rebuilt from scratch
    /// with the current tokenizer and embedder; this is also how an
    /// embedding model change takes effect. With ids, only those documents
    /// are re-tokenized and re-embedded in place.
    pub fn reindex(&self, ids: Option<&[DocumentId]>) -> SearchResult<usize> {
        let count = match ids {
            None => self.reindex_full()?,
            Some(ids) => self.reindex_partial(ids)?,
        };
        self.cache.invalidate_all();
        Ok(count)
    }

    fn reindex_full(&self) -> SearchResult<usize> {
        // Snapshot under the read lock so searches keep answering from the
        // old index while the new one is built.
        let snapshot: Vec<(DocumentId, String, String)> = {
            let state = self.state.read();
            state
                .documents
                .iter()
                .map(|d| {
                    (
                        d.document.id,
                        d.document.content_hash.clone(),
                        d.content.clone(),
                    )
                })
                .collect()
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.settings.indexing.parallel_threads)
            .build()
            .map_err(|e| SearchError::General(format!("failed to build reindex pool: {e}")))?;

        let embedder = Arc::clone(&self.embedder);
        let tokenizer = Arc::clone(&self.tokenizer);
        type Rebuilt = (DocumentId, String, Vec<(String, u32)>, Vec<f32>);
        let rebuilt: SearchResult<Vec<Rebuilt>> = pool.install(|| {
            snapshot
                .par_iter()
                .map(|(id, hash, content)| {
                    let tokens = tokenizer.tokenize_with_positions(content);
                    let vector = embedder.embed(content)?;
                    Ok((*id, hash.clone(), tokens, vector))
                })
                .collect()
        });
        // Nothing has been swapped yet, so an embedding failure aborts the
        // reindex with the old state intact.
        let rebuilt = rebuilt?;

        let mut state = self.state.write();
        let mut text = TextIndex::new();
        let mut vectors = VectorIndex::new(
            VectorDimension::new(self.embedder.dimension())?,
            self.embedder.model_id(),
        );
        let mut count = 0usize;
        for (id, hash, tokens, vector) in rebuilt {
            // Documents removed or rewritten while the rebuild ran fall
            // through to the catch-up pass below.
            let unchanged = state
                .documents
                .get(id)
                .is_some_and(|d| d.document.content_hash == hash);
            if unchanged {
                text.add_document(id, &tokens);
                vectors.insert(id, vector, self.embedder.model_id())?;
                count += 1;
            }
        }
        // Catch-up for documents upserted during the off-lock build
        for id in state.documents.ids() {
            if text.contains(id) {
                continue;
            }
            let Some(content) = state.documents.content(id).map(str::to_string) else {
                continue;
            };
            let tokens = self.tokenizer.tokenize_with_positions(&content);
            let vector = self.embedder.embed(&content)?;
            text.add_document(id, &tokens);
            vectors.insert(id, vector, self.embedder.model_id())?;
            count += 1;
        }

        state.text = text;
        state.vectors = vectors;
        info!(documents = count, "full reindex complete");
        Ok(count)
    }

    fn reindex_partial(&self, ids: &[DocumentId]) -> SearchResult<usize> {
        // Snapshot and re-embed off the lock, like the full rebuild; the
        // write lock is only held to apply the results.
        let snapshot: Vec<(DocumentId, String, String)> = {
            let state = self.state.read();
            let mut snapshot = Vec::with_capacity(ids.len());
            for &id in ids {
                match state.documents.get(id) {
                    Some(d) => {
                        snapshot.push((id, d.document.content_hash.clone(), d.content.clone()));
                    }
                    None => warn!(%id, "reindex skipped unknown document"),
                }
            }
            snapshot
        };

        type Rebuilt = (DocumentId, String, Vec<(String, u32)>, Vec<f32>);
        let mut rebuilt: Vec<Rebuilt> = Vec::with_capacity(snapshot.len());
        for (id, hash, content) in snapshot {
            let tokens = self.tokenizer.tokenize_with_positions(&content);
            let vector = self.embedder.embed(&content)?;
            rebuilt.push((id, hash, tokens, vector));
        }

        let mut state = self.state.write();
        let mut count = 0usize;
        for (id, hash, tokens, vector) in rebuilt {
            // A document rewritten while we embedded was already re-indexed
            // by its own upsert; applying the stale rebuild would regress it.
            let current = state
                .documents
                .get(id)
                .is_some_and(|d| d.document.content_hash == hash);
            if !current {
                warn!(%id, "reindex skipped concurrently modified document");
                continue;
            }
            state.text.add_document(id, &tokens);
            // Inserting with the embedder's own model identity means an
            // embedder that no longer matches the index is rejected here
            // instead of silently mixing models.
            state.vectors.insert(id, vector, self.embedder.model_id())?;
            count += 1;
        }

        info!(requested = ids.len(), reindexed = count, "partial reindex complete");
        Ok(count)
    }

    /// Upsert a batch of documents, checking for cancellation between
    /// documents. Cancellation stops cleanly at a document boundary.
    pub fn index_batch(
        &self,
        inputs: Vec<DocumentInput>,
        cancel: &CancellationToken,
    ) -> SearchResult<BatchOutcome> {
        let mut outcome = BatchOutcome::default();

        for input in inputs {
            if cancel.is_cancelled() {
                outcome.cancelled = true;
                info!(
                    indexed = outcome.indexed,
                    unchanged = outcome.unchanged,
                    "batch indexing cancelled"
                );
                break;
            }
            match self.upsert(input)? {
                UpsertOutcome::Indexed(_) => outcome.indexed += 1,
                UpsertOutcome::Unchanged(_) => outcome.unchanged += 1,
            }
        }
        Ok(outcome)
    }

    pub fn stats(&self) -> IndexStats {
        self.state.read().stats()
    }
}
