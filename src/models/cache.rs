//! Process-wide sharing of loaded encoder weights.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::Result;

/// Implemented by encoder options to produce a stable cache key.
pub trait ModelOptions {
    /// Key identifying the weights these options load.
    fn cache_key(&self) -> String;
}

type Entries = HashMap<(TypeId, String), Box<dyn Any + Send + Sync>>;

/// Holds weak references to loaded models.
///
/// A model stays shared while any encoder holds it and is freed when the
/// last one drops; the next request reloads it.
pub struct ModelCache {
    entries: Mutex<Entries>,
}

impl ModelCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the live model under `key`, or load and register a new one.
    pub fn get_or_create<M, F>(&self, key: &str, loader: F) -> Result<Arc<M>>
    where
        M: Send + Sync + 'static,
        F: FnOnce() -> Result<M>,
    {
        let entry_key = (TypeId::of::<M>(), key.to_string());

        {
            let mut entries = self.lock();
            let live = entries
                .get(&entry_key)
                .and_then(|boxed| boxed.downcast_ref::<Weak<M>>())
                .and_then(Weak::upgrade);
            if let Some(model) = live {
                tracing::debug!(key, "reusing loaded model");
                return Ok(model);
            }
            entries.remove(&entry_key);
        }

        // Loaded outside the lock; the last concurrent insert wins.
        let model = Arc::new(loader()?);
        self.lock()
            .insert(entry_key, Box::new(Arc::downgrade(&model)));
        Ok(model)
    }

    /// Number of registered entries, live or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for ModelCache {
    fn default() -> Self {
        Self::new()
    }
}

static GLOBAL_MODEL_CACHE: once_cell::sync::Lazy<ModelCache> =
    once_cell::sync::Lazy::new(ModelCache::new);

/// The cache shared by all encoder builders.
pub fn global_cache() -> &'static ModelCache {
    &GLOBAL_MODEL_CACHE
}
