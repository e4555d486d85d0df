//! File indexing and retrieval engine.
//!
//! Documents arrive from an external extraction pipeline as text plus
//! metadata, get indexed into an inverted index and a vector index, and
//! become searchable through three providers: TF-IDF keyword search,
//! regex pattern search, and cosine-similarity semantic search. A combined
//! mode runs all three in parallel against one consistent snapshot and
//! merges the results into a single ranked list.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use docfind::{DocumentInput, HashEmbedder, ProviderSelection, Query, SearchEngine, Settings};
//!
//! # async fn run() -> Result<(), docfind::SearchError> {
//! let settings = Settings::load(None)?;
//! let engine = SearchEngine::open(settings, Arc::new(HashEmbedder::new(384)))?;
//!
//! engine.index(DocumentInput::new("/docs/q1.txt", "quarterly revenue report"))?;
//!
//! let response = engine
//!     .search(&Query::new("revenue", ProviderSelection::Combined))
//!     .await?;
//! for hit in &response.hits {
//!     println!("{}: {:.3} {}", hit.doc_id, hit.score, hit.snippet);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod embedding;
pub mod error;
pub mod indexing;
pub mod search;
pub mod storage;
pub mod text;
pub mod types;
pub mod vector;

pub use config::Settings;
pub use embedding::{Embedder, HashEmbedder};
#[cfg(feature = "local-embeddings")]
pub use embedding::FastembedEmbedder;
pub use error::{SearchError, SearchResult};
pub use indexing::{BatchOutcome, DocumentInput, IndexManager};
pub use search::{
    MatchEvidence, MetadataFilter, ProviderKind, ProviderSelection, ProviderWarning, Query,
    SearchEngine, SearchHit, SearchResponse, WarningKind,
};
pub use storage::{Document, DocumentStore, IndexState, StoredDocument};
pub use types::{DocumentId, IndexStats, UpsertOutcome};
