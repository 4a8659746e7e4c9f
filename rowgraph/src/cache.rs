//!
//! Read-through memoization shared by every plan cache.
//!
//! Readers only take a shared lock. Derivation runs outside of any lock, so two
//! threads may derive the same entry at once; the first insert wins and the
//! other result is dropped. Derivations are pure, so both are equal anyway.
//! Failed derivations are not cached.
//!

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::RowGraphResult;

pub struct Memo<K, V> {
    entries: RwLock<HashMap<K, Arc<V>>>,
}

impl<K, V> Memo<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &K) -> Option<Arc<V>> {
        self.entries.read().get(key).cloned()
    }

    pub fn get_or_derive<F>(&self, key: K, derive: F) -> RowGraphResult<Arc<V>>
    where
        F: FnOnce(&K) -> RowGraphResult<V>,
    {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let derived = Arc::new(derive(&key)?);

        Ok(self.entries.write().entry(key).or_insert(derived).clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<K, V> Default for Memo<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
