use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use log::debug;

use crate::inventory::Inventory;

const DEFAULT_CAPACITY: usize = 512;

/// The capability set a repository requires of an inventory cache. Implementations must
/// be safe to share across threads.
pub trait Cache<K, V>: Send + Sync {
    fn get(&self, key: &K) -> Option<V>;

    fn put(&self, key: K, value: V);

    fn invalidate(&self, key: &K);

    fn invalidate_all(&self);
}

/// Bounded LRU cache of loaded inventories, keyed by object id. Loaded inventories are
/// immutable and shared; mutation always goes through a deep-copying builder.
pub struct InventoryCache {
    inner: Mutex<lru::LruCache<String, Arc<Inventory>>>,
}

impl InventoryCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY).unwrap());

        Self {
            inner: Mutex::new(lru::LruCache::new(capacity)),
        }
    }
}

impl Default for InventoryCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Cache<String, Arc<Inventory>> for InventoryCache {
    fn get(&self, key: &String) -> Option<Arc<Inventory>> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn put(&self, key: String, value: Arc<Inventory>) {
        self.inner.lock().unwrap().put(key, value);
    }

    fn invalidate(&self, key: &String) {
        debug!("Invalidating cached inventory for object {}", key);
        self.inner.lock().unwrap().pop(key);
    }

    fn invalidate_all(&self) {
        debug!("Invalidating all cached inventories");
        self.inner.lock().unwrap().clear();
    }
}
