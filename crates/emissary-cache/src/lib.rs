//! # Emissary Cache
//!
//! The cache service: a bounded, pluggable entity store reachable only
//! through the message bus, fed by a concurrently applied transformation
//! chain.
//!
//! ## Features
//!
//! - Exact LRU store with insertion-ordered reads (`small` = 2, `large` = 10)
//! - All-or-nothing transformation chain
//! - Plugin registry resolved once at startup from a manifest
//! - A single, exclusively registered [`CacheWorker`] serializing every mutation
//!
//! ## Example
//!
//! ```no_run
//! use emissary_bus::{DeliveryOptions, MessageBus, install_correlation_interceptors};
//! use emissary_cache::{
//!     ADD_TO_CACHE, CacheWorker, PluginManifest, PluginRegistry, RETRIEVE_FROM_CACHE, WorkerConfig,
//! };
//! use serde_json::json;
//!
//! # #[tokio::main]
//! # async fn main() -> emissary_core::Result<()> {
//! let bus = MessageBus::with_defaults();
//! install_correlation_interceptors(&bus);
//!
//! let manifest = PluginManifest::new("small").with_transformation("uppercase-name");
//! let _worker = CacheWorker::start(
//!     &PluginRegistry::with_builtins(),
//!     &manifest,
//!     &bus,
//!     WorkerConfig::immediate(),
//! )?;
//!
//! bus.request(ADD_TO_CACHE, json!({"name": "simone"}), DeliveryOptions::new()).await?;
//! let reply = bus
//!     .request(RETRIEVE_FROM_CACHE, json!({}), DeliveryOptions::new().local_only(true))
//!     .await?;
//! assert_eq!(reply.body(), &json!([{"name": "SIMONE"}]));
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod metrics;
pub mod registry;
pub mod transform;
pub mod worker;

// Re-exports
pub use backend::{CacheBackend, CacheReceipt, Insertion, LruBackend, LruStore};
pub use metrics::{CacheMetrics, register_cache_metrics};
pub use registry::{PluginManifest, PluginRegistry, Plugins};
pub use transform::{
    Identity, RandomAgeOffset, TransformError, Transformation, TransformationChain, UppercaseName,
};
pub use worker::{
    ADD_TO_CACHE, CacheWorker, DEFAULT_MAX, GET_FROM_CACHE, KEY_HEADER, LatencyHook, MAX_HEADER,
    RETRIEVE_FROM_CACHE, WorkerConfig, WorkerHandle, WorkerState,
};
