//! Test helpers para emissary-cache.

#![allow(dead_code, unused_imports)]

use std::sync::Arc;

use async_trait::async_trait;
use emissary_bus::{DeliveryOptions, Message, MessageBus, install_correlation_interceptors};
use emissary_cache::{
    ADD_TO_CACHE, CacheWorker, MAX_HEADER, PluginManifest, PluginRegistry, RETRIEVE_FROM_CACHE,
    TransformError, Transformation, WorkerConfig, WorkerHandle,
};
use emissary_core::{CorrelationId, Result, SharedEntity, correlation};
use serde_json::{Value, json};

/// Always fails.
pub struct Failing;

#[async_trait]
impl Transformation for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn apply(&self, _entity: &SharedEntity) -> std::result::Result<(), TransformError> {
        Err(TransformError::other("rejected by test"))
    }
}

/// Mutates the entity, then fails.
pub struct ScribbleThenFail;

#[async_trait]
impl Transformation for ScribbleThenFail {
    fn name(&self) -> &str {
        "scribble-then-fail"
    }

    async fn apply(&self, entity: &SharedEntity) -> std::result::Result<(), TransformError> {
        entity.with_mut(|e| e.insert("scribbled".to_string(), json!(true)));
        Err(TransformError::other("half done"))
    }
}

/// Copies the ambient correlation id into the `seen` field.
pub struct RecordCorrelation;

#[async_trait]
impl Transformation for RecordCorrelation {
    fn name(&self) -> &str {
        "record-correlation"
    }

    async fn apply(&self, entity: &SharedEntity) -> std::result::Result<(), TransformError> {
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
        .register_transformation("scribble-then-fail", || Arc::new(ScribbleThenFail))
        .register_transformation("record-correlation", || Arc::new(RecordCorrelation));
    registry
}

pub fn bus() -> MessageBus {
    let bus = MessageBus::with_defaults();
    install_correlation_interceptors(&bus);
    bus
}

/// A bus with a zero-latency worker resolved from `manifest`.
pub fn start(manifest: PluginManifest) -> (MessageBus, WorkerHandle) {
    let bus = bus();
    let worker = CacheWorker::start(&registry(), &manifest, &bus, WorkerConfig::immediate())
        .expect("worker should start");
    (bus, worker)
}

pub async fn add(bus: &MessageBus, entity: Value) -> Result<Message> {
    bus.request(ADD_TO_CACHE, entity, DeliveryOptions::new()).await
}

pub async fn retrieve(bus: &MessageBus, max: Option<&str>) -> Result<Vec<Value>> {
    let mut options = DeliveryOptions::new().local_only(true);
    if let Some(max) = max {
        options = options.header(MAX_HEADER, max);
    }
    let reply = bus.request(RETRIEVE_FROM_CACHE, json!({}), options).await?;
    Ok(reply.into_body().as_array().cloned().unwrap_or_default())
}

pub fn names(entities: &[Value]) -> Vec<String> {
    entities
        .iter()
        .filter_map(|e| e["name"].as_str().map(str::to_string))
        .collect()
}

pub fn named(name: &str) -> Value {
    json!({ "name": name })
}
