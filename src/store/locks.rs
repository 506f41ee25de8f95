use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

/// Registry of per-collection reader/writer locks. Locks are
/// collection-scoped, never global: writers on different collections never
/// contend, readers on one collection only wait for its writer.
#[derive(Default)]
pub struct CollectionLocks {
    inner: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl CollectionLocks {
    pub fn new() -> Self {
        CollectionLocks::default()
    }

    pub fn for_collection(&self, collection: &str) -> Arc<RwLock<()>> {
        let mut inner = self.inner.lock();
        inner.entry(collection.to_string()).or_default().clone()
    }
}
