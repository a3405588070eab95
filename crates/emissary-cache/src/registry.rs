//! Plugin registry: resolves the cache backend and transformations named in
//! the manifest into runtime instances.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use emissary_core::{EmissaryError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backend::{CacheBackend, LruBackend};
use crate::transform::{Identity, RandomAgeOffset, Transformation, TransformationChain, UppercaseName};

/// Builds a cache backend.
pub type BackendFactory = Arc<dyn Fn() -> Box<dyn CacheBackend> + Send + Sync>;
/// Builds a transformation.
pub type TransformationFactory = Arc<dyn Fn() -> Arc<dyn Transformation> + Send + Sync>;

/// Which implementations to activate, by capability.
///
/// ```toml
/// [plugins]
/// CacheBackend = "small"
/// Transformation = ["uppercase-name", "random-age"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Exactly one backend id. Required.
    #[serde(rename = "CacheBackend", default)]
    pub cache_backend: Option<String>,

    /// Zero or more transformation ids.
    #[serde(rename = "Transformation", default)]
    pub transformations: Vec<String>,
}

impl PluginManifest {
    pub fn new(cache_backend: impl Into<String>) -> Self {
        Self {
            cache_backend: Some(cache_backend.into()),
            transformations: Vec::new(),
        }
    }

    pub fn with_transformation(mut self, id: impl Into<String>) -> Self {
        self.transformations.push(id.into());
        self
    }
}

/// The resolved plugin set.
pub struct Plugins {
    pub backend: Arc<dyn CacheBackend>,
    pub chain: TransformationChain,
}

impl fmt::Debug for Plugins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plugins")
            .field("backend", &self.backend.name())
            .field("chain", &self.chain)
            .finish()
    }
}

/// Capability name to implementation id to factory.
#[derive(Clone, Default)]
pub struct PluginRegistry {
    backends: BTreeMap<String, BackendFactory>,
    transformations: BTreeMap<String, TransformationFactory>,
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the `small` and `large` backends and the
    /// `noop`, `uppercase-name` and `random-age` transformations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_backend("small", || Box::new(LruBackend::small()));
        registry.register_backend("large", || Box::new(LruBackend::large()));
        registry.register_transformation("noop", || Arc::new(Identity));
        registry.register_transformation("uppercase-name", || Arc::new(UppercaseName));
        registry.register_transformation("random-age", || Arc::new(RandomAgeOffset::default()));
        registry
    }

    /// Registers a backend factory under `id`, replacing any previous one.
    pub fn register_backend<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn CacheBackend> + Send + Sync + 'static,
    {
        self.backends.insert(id.into(), Arc::new(factory));
        self
    }

    /// Registers a transformation factory under `id`, replacing any previous one.
    pub fn register_transformation<F>(&mut self, id: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn() -> Arc<dyn Transformation> + Send + Sync + 'static,
    {
        self.transformations.insert(id.into(), Arc::new(factory));
        self
    }

    /// Registered backend ids, sorted.
    pub fn backend_ids(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    /// Registered transformation ids, sorted.
    pub fn transformation_ids(&self) -> Vec<&str> {
        self.transformations.keys().map(String::as_str).collect()
    }

    /// Instantiates the plugins named in `manifest`.
    ///
    /// Transformations keep the manifest order.
    ///
    /// # Errors
    ///
    /// `StartupFatal` when the manifest names no backend, or names a backend
    /// or transformation that is not registered.
    pub fn resolve(&self, manifest: &PluginManifest) -> Result<Plugins> {
        let backend_id = manifest
            .cache_backend
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| EmissaryError::startup_fatal("no CacheBackend implementation configured"))?;

        let backend_factory = self.backends.get(backend_id).ok_or_else(|| {
            EmissaryError::startup_fatal(format!(
                "unknown CacheBackend '{}' (available: {})",
                backend_id,
                self.backend_ids().join(", ")
            ))
        })?;

        let members = manifest
            .transformations
            .iter()
            .map(|id| {
                self.transformations
                    .get(id.trim())
                    .map(|factory| factory())
                    .ok_or_else(|| {
                        EmissaryError::startup_fatal(format!(
                            "unknown Transformation '{}' (available: {})",
                            id,
                            self.transformation_ids().join(", ")
                        ))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        let backend: Arc<dyn CacheBackend> = Arc::from(backend_factory());
        let chain = TransformationChain::new(members);

        info!(
            backend = %backend.name(),
            capacity = backend.capacity(),
            transformations = ?chain.names(),
            "Plugins resolved"
        );

        Ok(Plugins { backend, chain })
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("backends", &self.backend_ids())
            .field("transformations", &self.transformation_ids())
            .finish()
    }
}
