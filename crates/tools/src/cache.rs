//! Instance cache for expensive collaborators.
//!
//! Graph engines, HTTP clients, and fixture datasets are built once and
//! reused: given the same key, `get_or_create` returns the identical
//! instance on every subsequent call. Lookup/create is serialized with a
//! mutex; the cached instances themselves must be concurrency-safe.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

#[derive(Default)]
pub struct InstanceCache {
    instances: Mutex<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl InstanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached instance for `key`, building it with `init` on
    /// first use.
    ///
    /// A key cached under a different type is rebuilt (and the stale
    /// entry replaced) — callers are expected to keep keys type-stable.
    pub fn get_or_create<T, F>(&self, key: &str, init: F) -> Arc<T>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T,
    {
        let mut instances = self.instances.lock();
        if let Some(existing) = instances.get(key) {
            match existing.clone().downcast::<T>() {
                Ok(typed) => return typed,
                Err(_) => {
                    tracing::warn!(key, "instance cache type mismatch, rebuilding");
                }
            }
        }
        let instance = Arc::new(init());
        instances.insert(key.to_string(), instance.clone());
        instance
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.lock().is_empty()
    }
}
