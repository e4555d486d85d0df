//! Bounded query result cache with TTL expiry and LRU eviction.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CacheConfig;
use crate::search::query::SearchHit;

struct CacheEntry {
    hits: Vec<SearchHit>,
    inserted: Instant,
    /// Monotonic use counter; the smallest value is the LRU victim
    last_used: u64,
}

struct CacheInner {
    entries: HashMap<String, CacheEntry>,
    tick: u64,
}

/// Caches combined result lists keyed by query signature.
///
/// Entries expire after the configured TTL and the least recently used
/// entry is evicted when the cache is full. Any index mutation invalidates
/// the whole cache; the engine never serves hits for documents that have
/// been removed or re-indexed since the entry was stored.
pub struct QueryCache {
    inner: Mutex<CacheInner>,
    max_entries: usize,
    ttl: Duration,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                entries: HashMap::new(),
                tick: 0,
            }),
            max_entries: config.max_entries,
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    /// Look up a signature, dropping the entry instead when its TTL has
    /// passed.
    pub fn get(&self, signature: &str) -> Option<Vec<SearchHit>> {
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        let expired = match inner.entries.get_mut(signature) {
            Some(entry) if entry.inserted.elapsed() <= self.ttl => {
                entry.last_used = tick;
                return Some(entry.hits.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            inner.entries.remove(signature);
        }
        None
    }

    pub fn insert(&self, signature: String, hits: Vec<SearchHit>) {
        if self.max_entries == 0 {
            return;
        }
        let mut inner = self.inner.lock();
        inner.tick += 1;
        let tick = inner.tick;

        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&signature) {
            if let Some(victim) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&victim);
            }
        }

        inner.entries.insert(
            signature,
            CacheEntry {
                hits,
                inserted: Instant::now(),
                last_used: tick,
            },
        );
    }

    /// Drop every entry. Called after any index mutation.
    pub fn invalidate_all(&self) {
        let mut inner = self.inner.lock();
        let dropped = inner.entries.len();
        inner.entries.clear();
        if dropped > 0 {
            debug!(dropped, "query cache invalidated");
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
