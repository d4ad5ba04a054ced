//! Built graphs cached by knowledge-base id.
//!
//! The cache is an explicit object owned by the caller. Nothing is evicted
//! implicitly; callers invalidate entries when their sources change.

use anyhow::Result;
use kgforge_model::KnowledgeGraph;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct GraphBuilderCache {
    entries: RwLock<HashMap<String, Arc<KnowledgeGraph>>>,
}

impl GraphBuilderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Arc<KnowledgeGraph>> {
        self.entries.read().get(key).cloned()
    }

    /// Cached graph for `key`, building and storing it on a miss.
    ///
    /// The build runs without holding the lock. If two callers race, the
    /// first stored graph is kept and returned to both.
    pub fn get_or_build<F>(&self, key: &str, build: F) -> Result<Arc<KnowledgeGraph>>
    where
        F: FnOnce() -> Result<KnowledgeGraph>,
    {
        if let Some(hit) = self.get(key) {
            tracing::debug!(key, "builder cache hit");
            return Ok(hit);
        }
        let built = Arc::new(build()?);
        let mut entries = self.entries.write();
        let entry = entries.entry(key.to_string()).or_insert(built);
        tracing::debug!(key, entities = entry.entity_count(), "builder cache filled");
        Ok(Arc::clone(entry))
    }

    pub fn insert(&self, key: impl Into<String>, graph: KnowledgeGraph) -> Option<Arc<KnowledgeGraph>> {
        self.entries.write().insert(key.into(), Arc::new(graph))
    }

    pub fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries.write().remove(key).is_some();
        if removed {
            tracing::debug!(key, "builder cache entry invalidated");
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
