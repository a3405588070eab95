//! Transformaciones de prueba registradas junto a las builtins.

use std::sync::Arc;

use async_trait::async_trait;
use emissary_cache::{PluginRegistry, TransformError, Transformation};
use emissary_core::{CorrelationId, SharedEntity, correlation};
use serde_json::json;

/// Always fails.
pub struct Failing;

#[async_trait]
impl Transformation for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn apply(&self, _entity: &SharedEntity) -> Result<(), TransformError> {
        Err(TransformError::other("rejected by test"))
    }
}

/// Copies the ambient correlation id into the `seen` field.
pub struct RecordCorrelation;

#[async_trait]
impl Transformation for RecordCorrelation {
    fn name(&self) -> &str {
        "record-correlation"
    }

    async fn apply(&self, entity: &SharedEntity) -> Result<(), TransformError> {
        let seen = correlation::current().map(CorrelationId::into_inner);
        entity.with_mut(|e| e.insert("seen".to_string(), json!(seen)));
        Ok(())
    }
}

/// Builtins plus the test transformations above.
pub fn registry() -> PluginRegistry {
    let mut registry = PluginRegistry::with_builtins();
    registry
        .register_transformation("failing", || Arc::new(Failing))
        .register_transformation("record-correlation", || Arc::new(RecordCorrelation));
    registry
}
