//! Named saved searches with optional JSON persistence.

use dashmap::DashMap;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{SearchError, SearchResult};
use crate::search::query::Query;

const SAVED_SEARCHES_FILE: &str = "saved_searches.json";

/// Stores complete queries under user-chosen names.
///
/// Saving under an existing name overwrites silently. When a storage path
/// is configured, every mutation rewrites the JSON file atomically so the
/// store survives restarts.
pub struct SavedSearchStore {
    searches: DashMap<String, Query>,
    storage_path: Option<PathBuf>,
}

impl SavedSearchStore {
    /// Open the store backed by `base_path/saved_searches.json`, loading
    /// any previously persisted entries.
    pub fn open(base_path: &Path) -> SearchResult<Self> {
        let file = base_path.join(SAVED_SEARCHES_FILE);
        let searches = DashMap::new();

        if file.exists() {
            let data = fs::read_to_string(&file).map_err(|e| SearchError::Persistence {
                path: file.clone(),
                source: Box::new(e),
            })?;
            let entries: BTreeMap<String, Query> =
                serde_json::from_str(&data).map_err(|e| SearchError::Persistence {
                    path: file.clone(),
                    source: Box::new(e),
                })?;
            for (name, query) in entries {
                searches.insert(name, query);
            }
            info!(count = searches.len(), "loaded saved searches");
        }

        Ok(Self {
            searches,
            storage_path: Some(file),
        })
    }

    /// An ephemeral store that never touches the filesystem
    pub fn in_memory() -> Self {
        Self {
            searches: DashMap::new(),
            storage_path: None,
        }
    }

    pub fn save(&self, name: impl Into<String>, query: Query) -> SearchResult<()> {
        let name = name.into();
        debug!(%name, "saving search");
        self.searches.insert(name, query);
        self.persist()
    }

    pub fn load(&self, name: &str) -> SearchResult<Query> {
        self.searches
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SearchError::NotFound {
                name: name.to_string(),
            })
    }

    /// All saved names, sorted for stable listings
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.searches.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    /// Deleting an absent name is a no-op
    pub fn delete(&self, name: &str) -> SearchResult<()> {
        if self.searches.remove(name).is_some() {
            debug!(%name, "deleted saved search");
            self.persist()?;
        }
        Ok(())
    }

    fn persist(&self) -> SearchResult<()> {
        let Some(path) = &self.storage_path else {
            return Ok(());
        };

        // Snapshot into a sorted map so the file is diffable
        let snapshot: BTreeMap<String, Query> = self
            .searches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let json =
            serde_json::to_string_pretty(&snapshot).map_err(|e| SearchError::Persistence {
                path: path.clone(),
                source: Box::new(e),
            })?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SearchError::Persistence {
                path: path.clone(),
                source: Box::new(e),
            })?;
        }

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| SearchError::Persistence {
            path: tmp.clone(),
            source: Box::new(e),
        })?;
        fs::rename(&tmp, path).map_err(|e| SearchError::Persistence {
            path: path.clone(),
            source: Box::new(e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::query::ProviderSelection;

    #[test]
    fn test_save_load_round_trip() {
        let store = SavedSearchStore::in_memory();
        let query = Query::new("revenue", ProviderSelection::Combined).with_limit(5);

        store.save("quarterly", query.clone()).unwrap();
        assert_eq!(store.load("quarterly").unwrap(), query);
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let store = SavedSearchStore::in_memory();
        let err = store.load("absent").unwrap_err();
        assert_eq!(err.status_code(), "NOT_FOUND");
    }

    #[test]
    fn test_save_overwrites_silently() {
        let store = SavedSearchStore::in_memory();
        store
            .save("q", Query::new("first", ProviderSelection::Text))
            .unwrap();
        store
            .save("q", Query::new("second", ProviderSelection::Regex))
            .unwrap();

        assert_eq!(store.load("q").unwrap().text, "second");
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_list_is_sorted() {
        let store = SavedSearchStore::in_memory();
        for name in ["zeta", "alpha", "mid"] {
            store
                .save(name, Query::new("x", ProviderSelection::Text))
                .unwrap();
        }
        assert_eq!(store.list(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = SavedSearchStore::in_memory();
        store
            .save("q", Query::new("x", ProviderSelection::Text))
            .unwrap();
        store.delete("q").unwrap();
        store.delete("q").unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let query = Query::new("revenue", ProviderSelection::Vector).with_threshold(0.8);

        {
            let store = SavedSearchStore::open(dir.path()).unwrap();
            store.save("semantic", query.clone()).unwrap();
        }

        let reopened = SavedSearchStore::open(dir.path()).unwrap();
        assert_eq!(reopened.load("semantic").unwrap(), query);
        assert_eq!(reopened.list(), vec!["semantic"]);
    }
}
