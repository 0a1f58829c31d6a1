//! Process-wide visited-URL index: in-memory set, optionally mirrored to a
//! persistent sink. Reads never consult the persistent store (§4.7: "the
//! process is authoritative for its own session").

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;

/// Pluggable external key-value sink. Only `visit` (write) is required by the
/// current design; `is_visited` exists for future persistence-aware resume
/// and is unused by `VisitedIndex` itself, per §6.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    async fn visit(&self, url: &str);
    async fn is_visited(&self, url: &str) -> bool;
}

pub struct NoopStore;

#[async_trait]
impl PersistentStore for NoopStore {
    async fn visit(&self, _url: &str) {}
    async fn is_visited(&self, _url: &str) -> bool {
        false
    }
}

pub struct VisitedIndex {
    seen: RwLock<HashSet<String>>,
    store: Option<Box<dyn PersistentStore>>,
}

impl VisitedIndex {
    pub fn new() -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
            store: None,
        }
    }

    pub fn with_store(store: Box<dyn PersistentStore>) -> Self {
        Self {
            seen: RwLock::new(HashSet::new()),
            store: Some(store),
        }
    }

    pub async fn visit(&self, url: &str) {
        self.seen.write().expect("visited lock poisoned").insert(url.to_string());
        if let Some(store) = &self.store {
            store.visit(url).await;
        }
    }

    pub fn is_visited(&self, url: &str) -> bool {
        self.seen.read().expect("visited lock poisoned").contains(url)
    }
}

impl Default for VisitedIndex {
    fn default() -> Self {
        Self::new()
    }
}
