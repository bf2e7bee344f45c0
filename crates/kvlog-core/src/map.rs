//! In-memory key-value table guarded by a reader/writer lock.

use std::hash::Hash;

use hashbrown::HashMap;
use parking_lot::{RwLock, RwLockWriteGuard};

/// Concurrent key-value table.
///
/// Many readers may hold the lock at once; a writer excludes everyone.
/// Per-key last-writer-wins is the only consistency guarantee.
pub struct ConcurrentMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K: Eq + Hash, V: Clone> ConcurrentMap<K, V> {
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    /// Clone of the value for `key`, taken under the read lock.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().get(key).cloned()
    }

    /// Insert or overwrite under the write lock.
    pub fn set(&self, key: K, value: V) {
        self.inner.write().insert(key, value);
    }

    /// Remove under the write lock. Absent keys are a no-op.
    pub fn delete<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.write().remove(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Exclusive lock over the whole table.
    ///
    /// The store holds this across the map update and the log submission so
    /// both happen in the same order for any one key.
    pub fn write(&self) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.inner.write()
    }
}

impl<K: Eq + Hash, V: Clone> Default for ConcurrentMap<K, V> {
    fn default() -> Self { Self::new() }
}
