//! Reference counted cache for resources that several owners load from the same source, such as a texture
//! referenced by multiple meshes.
//!
//! Each entry stores the resource together with a strong count. [`SharedCache::acquire`] increments the count,
//! creating the resource on a miss, and hands out a [`Shared`] handle. Dropping the handle decrements the count,
//! and the resource itself is dropped together with the last handle.
//!
//! # Example
//! ```
//! # use deimos::*;
//! # use anyhow::Result;
//! # fn main() -> Result<()> {
//! let cache = SharedCache::<String, Vec<u8>>::new();
//! let first = cache.acquire("brick.png".to_string(), |_| Ok(vec![0u8; 16]))?;
//! let second = cache.acquire("brick.png".to_string(), |_| unreachable!())?;
//! assert_eq!(cache.ref_count(&"brick.png".to_string())?, 2);
//! drop(first);
//! drop(second);
//! assert!(cache.is_empty()?);
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::Error;

struct Entry<V> {
    value: Arc<V>,
    count: usize,
}

type Store<K, V> = Arc<Mutex<HashMap<K, Entry<V>>>>;

/// Cache mapping a key to a shared resource and the number of live handles to it.
#[derive(Derivative)]
#[derivative(Debug(bound = ""), Clone(bound = ""))]
pub struct SharedCache<K: Hash + Eq + Clone, V> {
    #[derivative(Debug = "ignore")]
    store: Store<K, V>,
}

/// Handle to a resource in a [`SharedCache`]. Dereferences to the resource.
#[derive(Derivative)]
#[derivative(Debug(bound = ""))]
pub struct Shared<K: Hash + Eq + Clone, V> {
    #[derivative(Debug = "ignore")]
    store: Store<K, V>,
    #[derivative(Debug = "ignore")]
    key: K,
    #[derivative(Debug = "ignore")]
    value: Arc<V>,
}

impl<K: Hash + Eq + Clone, V> Default for SharedCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq + Clone, V> SharedCache<K, V> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get a handle to the resource stored under `key`, calling `create` to make it if there is none yet.
    /// If `create` fails, nothing is inserted. The cache is not locked while `create` runs, so it may acquire other
    /// resources from the same cache.
    pub fn acquire(&self, key: K, create: impl FnOnce(&K) -> Result<V>) -> Result<Shared<K, V>> {
        let cached = retain(&mut *self.store.lock().map_err(|_| Error::PoisonError)?, &key);
        let value = match cached {
            Some(value) => value,
            None => {
                let created = Arc::new(create(&key)?);
                let mut store = self.store.lock().map_err(|_| Error::PoisonError)?;
                // Another owner may have created the same resource in the meantime. Theirs wins.
                match retain(&mut store, &key) {
                    Some(value) => value,
                    None => {
                        store.insert(
                            key.clone(),
                            Entry {
                                value: created.clone(),
                                count: 1,
                            },
                        );
                        created
                    }
                }
            }
        };
        Ok(Shared {
            store: self.store.clone(),
            key,
            value,
        })
    }

    /// Number of live handles to the resource under `key`. Zero if it is not cached.
    pub fn ref_count(&self, key: &K) -> Result<usize> {
        let store = self.store.lock().map_err(|_| Error::PoisonError)?;
        Ok(store.get(key).map(|entry| entry.count).unwrap_or(0))
    }

    /// Number of distinct resources currently alive.
    pub fn len(&self) -> Result<usize> {
        Ok(self.store.lock().map_err(|_| Error::PoisonError)?.len())
    }

    /// Whether no resources are alive.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

fn retain<K: Hash + Eq, V>(store: &mut HashMap<K, Entry<V>>, key: &K) -> Option<Arc<V>> {
    store.get_mut(key).map(|entry| {
        entry.count += 1;
        entry.value.clone()
    })
}

impl<K: Hash + Eq + Clone, V> Shared<K, V> {
    /// Key this resource was acquired with.
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Hash + Eq + Clone, V> Deref for Shared<K, V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<K: Hash + Eq + Clone, V> Clone for Shared<K, V> {
    fn clone(&self) -> Self {
        // A poisoned store can no longer release anything, so the count does not matter anymore.
        if let Ok(mut store) = self.store.lock() {
            if let Some(entry) = store.get_mut(&self.key) {
                entry.count += 1;
            }
        }
        Self {
            store: self.store.clone(),
            key: self.key.clone(),
            value: self.value.clone(),
        }
    }
}

impl<K: Hash + Eq + Clone, V> Drop for Shared<K, V> {
    fn drop(&mut self) {
        let Ok(mut store) = self.store.lock() else {
            error!("Shared resource cache poisoned, resource leaked");
            return;
        };
        let released = match store.get_mut(&self.key) {
            Some(entry) => {
                entry.count -= 1;
                entry.count == 0
            }
            None => false,
        };
        if released {
            store.remove(&self.key);
        }
    }
}

static_assertions::assert_impl_all!(SharedCache<String, u32>: Send, Sync);
