//! Rendered-review cache keyed by target identity.
//!
//! Reopening a review for the same pull/merge request within a session
//! shows the stored HTML instead of fetching and streaming again.

pub mod store;

use std::sync::Arc;

use crate::models::TargetIdentity;

pub use store::{CacheStats, FileStore, MemoryStore, SessionStore, default_store, session_dir};

/// Session-scoped cache of rendered review HTML.
#[derive(Clone)]
pub struct ResultCache {
    enabled: bool,
    store: Arc<dyn SessionStore>,
}

impl ResultCache {
    /// Create a cache over the given store. A disabled cache never hits and
    /// never writes.
    pub fn new(store: Arc<dyn SessionStore>, enabled: bool) -> Self {
        Self { enabled, store }
    }

    /// Cache backed by process memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), true)
    }

    /// Previously rendered HTML for `key`.
    pub fn get(&self, key: &TargetIdentity) -> Option<String> {
        if !self.enabled {
            return None;
        }
        self.store.get(key.as_str())
    }

    /// Store rendered HTML for `key`, replacing any earlier entry.
    pub fn set(&self, key: &TargetIdentity, html: &str) {
        if !self.enabled {
            return;
        }
        self.evict(key);
        if let Err(e) = self.store.set(key.as_str(), html) {
            tracing::warn!(key = %key, error = %e, "failed to write cache entry");
        }
    }

    /// Drop the entry for `key`, if any.
    pub fn evict(&self, key: &TargetIdentity) {
        if let Err(e) = self.store.remove(key.as_str()) {
            tracing::warn!(key = %key, error = %e, "failed to evict cache entry");
        }
    }

    /// Remove all cached entries.
    pub fn clear(&self) -> std::io::Result<CacheStats> {
        self.store.clear()
    }

    /// Compute statistics about the cache.
    pub fn stats(&self) -> std::io::Result<CacheStats> {
        self.store.stats()
    }

    /// Where the backing store keeps its entries.
    pub fn path(&self) -> Option<std::path::PathBuf> {
        self.store.path()
    }
}
