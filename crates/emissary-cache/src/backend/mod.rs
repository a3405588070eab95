//! Cache backends.
//!
//! A backend is the bounded store the cache worker commits entities to.
//! Exactly one backend is active per process, chosen at startup through the
//! [`PluginRegistry`](crate::registry::PluginRegistry).

pub mod lru;
pub mod memory;

use async_trait::async_trait;
use emissary_core::{CacheEntry, Entity, Result};

pub use lru::{Insertion, LruStore};
pub use memory::LruBackend;

/// Acknowledgement of a successful add.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheReceipt {
    /// Key assigned to the entity.
    pub key: u64,
    /// Key silently evicted to make room, if any.
    pub evicted: Option<u64>,
}

impl From<Insertion> for CacheReceipt {
    fn from(insertion: Insertion) -> Self {
        Self {
            key: insertion.key,
            evicted: insertion.evicted,
        }
    }
}

/// A bounded entity store.
///
/// Implementations must be substitutable for one another: callers only rely
/// on the ordering and eviction contract described on each method.
///
/// # Example
///
/// ```ignore
/// use emissary_cache::{CacheBackend, CacheReceipt};
///
/// struct Forgetful;
///
/// #[async_trait]
/// impl CacheBackend for Forgetful {
///     fn name(&self) -> &str { "forgetful" }
///     fn capacity(&self) -> usize { 0 }
///     async fn len(&self) -> usize { 0 }
///     async fn retrieve(&self) -> Result<Vec<Entity>> { Ok(Vec::new()) }
///     async fn add(&self, _: Entity) -> Result<CacheReceipt> { ... }
///     async fn get(&self, _: u64) -> Result<Option<Entity>> { Ok(None) }
///     async fn entries(&self) -> Result<Vec<CacheEntry>> { Ok(Vec::new()) }
/// }
/// ```
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Identifier used in logs.
    fn name(&self) -> &str;

    /// Maximum number of resident entries.
    fn capacity(&self) -> usize;

    /// Number of resident entries.
    async fn len(&self) -> usize;

    /// Resident entities in insertion order.
    ///
    /// A bulk read does not refresh recency.
    async fn retrieve(&self) -> Result<Vec<Entity>>;

    /// Stores `entity` under a fresh key.
    ///
    /// Eviction is not an error: when the store is full the least recently
    /// touched entry is dropped and reported in the receipt.
    ///
    /// # Errors
    ///
    /// Only if the backend itself is unreachable.
    async fn add(&self, entity: Entity) -> Result<CacheReceipt>;

    /// Returns the entity stored under `key`, refreshing its recency.
    async fn get(&self, key: u64) -> Result<Option<Entity>>;

    /// Resident entries with their keys, in insertion order.
    async fn entries(&self) -> Result<Vec<CacheEntry>>;
}
