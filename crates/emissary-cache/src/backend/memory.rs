//! In-memory LRU backend and its capacity presets.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use emissary_core::{CacheEntry, EmissaryError, Entity, Result};
use parking_lot::Mutex;
use tracing::debug;

use super::{CacheBackend, CacheReceipt, LruStore};
use crate::metrics::CacheMetrics;

/// Capacity of the `small` preset.
pub const SMALL_CAPACITY: usize = 2;
/// Capacity of the `large` preset.
pub const LARGE_CAPACITY: usize = 10;

/// In-memory [`CacheBackend`] over an [`LruStore`].
///
/// The worker is the only writer, the mutex only guards the `&self` trait
/// surface.
#[derive(Debug)]
pub struct LruBackend {
    name: String,
    store: Mutex<LruStore<Entity>>,
    metrics: CacheMetrics,
}

impl LruBackend {
    /// Creates a backend named `name` holding at most `capacity` entities.
    pub fn new(name: impl Into<String>, capacity: usize) -> Result<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| {
            EmissaryError::startup_fatal("cache backend capacity must be greater than zero")
        })?;

        Ok(Self {
            name: name.into(),
            store: Mutex::new(LruStore::new(capacity)),
            metrics: CacheMetrics::new(),
        })
    }

    /// The `small` preset.
    pub fn small() -> Self {
        Self::preset("small", SMALL_CAPACITY)
    }

    /// The `large` preset.
    pub fn large() -> Self {
        Self::preset("large", LARGE_CAPACITY)
    }

    fn preset(name: &str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            name: name.to_string(),
            store: Mutex::new(LruStore::new(capacity)),
            metrics: CacheMetrics::new(),
        }
    }

    /// Metrics recorded by this backend.
    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }
}

#[async_trait]
impl CacheBackend for LruBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn capacity(&self) -> usize {
        self.store.lock().capacity().get()
    }

    async fn len(&self) -> usize {
        self.store.lock().len()
    }

    async fn retrieve(&self) -> Result<Vec<Entity>> {
        Ok(self.store.lock().values().cloned().collect())
    }

    async fn add(&self, entity: Entity) -> Result<CacheReceipt> {
        let (insertion, len) = {
            let mut store = self.store.lock();
            let insertion = store.insert(entity);
            (insertion, store.len())
        };

        self.metrics.record_add();
        if let Some(evicted) = insertion.evicted {
            self.metrics.record_eviction();
            debug!(backend = %self.name, key = evicted, "Entry evicted");
        }
        self.metrics.update_entry_count(len);

        Ok(insertion.into())
    }

    async fn get(&self, key: u64) -> Result<Option<Entity>> {
        Ok(self.store.lock().get(key).cloned())
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        Ok(self
            .store
            .lock()
            .entries()
            .map(|(key, value)| CacheEntry::new(key, value.clone()))
            .collect())
    }
}
