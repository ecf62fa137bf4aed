//! In-memory cache of the current version of each entity.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Write-through cache mapping an entity's key to its decoded current
/// version.
///
/// The cache is advisory: it mirrors the current row per key and can always
/// be rebuilt from storage, so correctness must hold with the cache empty.
/// Only the owning table's insert/delete/rollback paths write here. Those
/// paths populate an entry strictly after the corresponding storage write
/// and evict strictly after the corresponding storage deletion. If a write
/// transaction fails after table calls already ran inside it, the caller
/// must [`clear`](EntityCache::clear) the cache before reusing it, since
/// entries may then reflect rolled-back rows.
///
/// Handles are cheap clones sharing one map; one cache instance is injected
/// per table at construction.
pub struct EntityCache<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Clone for EntityCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> Default for EntityCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> EntityCache<K, V> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone, V: Clone> EntityCache<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.read().get(key).cloned()
    }

    pub fn put(&self, key: K, value: V) {
        self.inner.write().insert(key, value);
    }

    pub fn remove(&self, key: &K) {
        self.inner.write().remove(key);
    }

    pub fn clear(&self) {
        self.inner.write().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_remove_roundtrip() {
        let cache: EntityCache<u64, String> = EntityCache::new();
        assert!(cache.get(&1).is_none());

        cache.put(1, "one".into());
        assert_eq!(cache.get(&1).as_deref(), Some("one"));
        assert_eq!(cache.len(), 1);

        cache.remove(&1);
        assert!(cache.get(&1).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn clones_share_the_map() {
        let cache: EntityCache<u64, u64> = EntityCache::new();
        let other = cache.clone();
        cache.put(7, 49);
        assert_eq!(other.get(&7), Some(49));
        other.clear();
        assert!(cache.is_empty());
    }
}
