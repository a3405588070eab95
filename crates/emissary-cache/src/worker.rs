//! The cache worker: the single owner of the cache backend and the
//! transformation chain, reachable only through the message bus.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use emissary_bus::{ConsumerHandle, ConsumerOptions, Delivery, MessageBus, MessageHandler};
use emissary_core::{CorrelationId, Entity, Result, entity_from_value};
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::backend::{CacheBackend, CacheReceipt};
use crate::metrics::CacheMetrics;
use crate::registry::{PluginManifest, PluginRegistry};
use crate::transform::TransformationChain;

/// Transforms and stores the entity in the body.
pub const ADD_TO_CACHE: &str = "add.to.cache";
/// Replies with the resident entities, oldest insertion first.
pub const RETRIEVE_FROM_CACHE: &str = "retrieve.from.cache";
/// Replies with the entity stored under the `key` header.
pub const GET_FROM_CACHE: &str = "get.from.cache";

/// Upper bound on the number of entities a retrieve returns.
pub const MAX_HEADER: &str = "max";
/// Key looked up by a get.
pub const KEY_HEADER: &str = "key";
/// Bound used when a retrieve carries no `max` header.
pub const DEFAULT_MAX: usize = 10;

/// Reply body of a successful add.
pub const ADD_ACK: &str = "OK";

/// Lifecycle of the cache worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Uninitialized,
    Ready,
    Processing,
    /// Unregistered from the bus after a stop.
    Stopped,
    /// No backend could be resolved, the worker never became ready.
    Failed,
}

impl WorkerState {
    /// Whether the worker accepts requests.
    pub fn is_serving(&self) -> bool {
        matches!(self, Self::Ready | Self::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Ready => "READY",
            Self::Processing => "PROCESSING",
            Self::Stopped => "STOPPED",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artificial delay applied before an add is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyHook {
    #[default]
    None,
    Fixed(Duration),
    /// Uniformly distributed between `min` and `max`, both inclusive.
    Uniform { min: Duration, max: Duration },
}

impl LatencyHook {
    /// Builds a hook from a millisecond range; `0..=0` disables the delay.
    pub fn from_millis(min: u64, max: u64) -> Self {
        let (min, max) = (min.min(max), min.max(max));
        match (min, max) {
            (0, 0) => Self::None,
            (min, max) if min == max => Self::Fixed(Duration::from_millis(min)),
            (min, max) => Self::Uniform {
                min: Duration::from_millis(min),
                max: Duration::from_millis(max),
            },
        }
    }

    /// Picks the next delay.
    pub fn sample(&self) -> Option<Duration> {
        match *self {
            Self::None => None,
            Self::Fixed(delay) => Some(delay),
            Self::Uniform { min, max } if min >= max => Some(min),
            Self::Uniform { min, max } => Some(rand::rng().random_range(min..=max)),
        }
    }
}

/// Worker settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub latency: LatencyHook,
}

impl WorkerConfig {
    /// No artificial delay.
    pub fn immediate() -> Self {
        Self {
            latency: LatencyHook::None,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            latency: LatencyHook::from_millis(100, 350),
        }
    }
}

type SharedState = Arc<RwLock<WorkerState>>;

/// Owns the backend and the chain; handles one delivery at a time.
pub struct CacheWorker {
    backend: Arc<dyn CacheBackend>,
    chain: TransformationChain,
    latency: LatencyHook,
    state: SharedState,
    metrics: CacheMetrics,
}

impl CacheWorker {
    /// Resolves the plugins and registers the worker on the bus.
    ///
    /// The registration is exclusive: starting a second worker anywhere in
    /// the cluster fails with `AddressInUse`.
    ///
    /// # Errors
    ///
    /// - `StartupFatal` if the manifest does not resolve
    /// - `AddressInUse` if a cache worker is already registered
    pub fn start(
        registry: &PluginRegistry,
        manifest: &PluginManifest,
        bus: &MessageBus,
        config: WorkerConfig,
    ) -> Result<WorkerHandle> {
        let state: SharedState = Arc::new(RwLock::new(WorkerState::Uninitialized));

        let plugins = registry.resolve(manifest).inspect_err(|e| {
            *state.write() = WorkerState::Failed;
            error!(error = %e, "Cache worker failed to start");
        })?;

        let backend = Arc::clone(&plugins.backend);
        let worker = CacheWorker {
            backend: plugins.backend,
            chain: plugins.chain,
            latency: config.latency,
            state: Arc::clone(&state),
            metrics: CacheMetrics::new(),
        };

        let consumer = bus
            .consumer(
                &[ADD_TO_CACHE, RETRIEVE_FROM_CACHE, GET_FROM_CACHE],
                worker,
                ConsumerOptions::default().exclusive(),
            )
            .inspect_err(|e| {
                *state.write() = WorkerState::Failed;
                error!(error = %e, "Cache worker failed to register");
            })?;

        *state.write() = WorkerState::Ready;
        info!(
            node = %bus.node_id(),
            backend = %backend.name(),
            capacity = backend.capacity(),
            latency = ?config.latency,
            "Cache worker ready"
        );

        Ok(WorkerHandle {
            state,
            backend,
            consumer: Arc::new(Mutex::new(Some(consumer))),
        })
    }

    /// Moves to `to` only from `from`, so a stop is never undone by a
    /// delivery still draining from the mailbox.
    fn transition(&self, from: WorkerState, to: WorkerState) {
        let mut state = self.state.write();
        if *state == from {
            *state = to;
        }
    }

    async fn add(&self, mut delivery: Delivery) {
        let _timer = self.metrics.time("add");

        if let Some(delay) = self.latency.sample() {
            tokio::time::sleep(delay).await;
        }

        let entity = match entity_from_value(delivery.take_body()) {
            Ok(entity) => entity,
            Err(e) => return delivery.fail(400, e.to_string()),
        };

        match self.commit(entity).await {
            Ok(receipt) => {
                debug!(key = receipt.key, evicted = ?receipt.evicted, "Entity cached");
                delivery.reply(json!(ADD_ACK));
            },
            Err(e) => {
                warn!(error = %e, "Entity rejected");
                delivery.fail(500, e.to_string());
            },
        }
    }

    /// Runs the chain, then stores the result. Nothing is stored on failure.
    async fn commit(&self, entity: Entity) -> Result<CacheReceipt> {
        let transformed = self.chain.apply(entity).await?;
        self.backend.add(transformed).await
    }

    async fn retrieve(&self, delivery: Delivery) {
        let _timer = self.metrics.time("retrieve");

        let max = match parse_header(&delivery, MAX_HEADER) {
            Ok(max) => max.unwrap_or(DEFAULT_MAX),
            Err(reason) => return delivery.fail(400, reason),
        };

        match self.backend.retrieve().await {
            Ok(entities) => {
                let slice: Vec<Value> = entities.into_iter().take(max).map(Value::Object).collect();
                debug!(max, returned = slice.len(), "Entities retrieved");
                delivery.reply(Value::Array(slice));
            },
            Err(e) => delivery.fail(500, e.to_string()),
        }
    }

    async fn get(&self, delivery: Delivery) {
        let _timer = self.metrics.time("get");

        let key = match parse_header::<u64>(&delivery, KEY_HEADER) {
            Ok(Some(key)) => key,
            Ok(None) => return delivery.fail(400, format!("missing '{KEY_HEADER}' header")),
            Err(reason) => return delivery.fail(400, reason),
        };

        match self.backend.get(key).await {
            Ok(Some(entity)) => delivery.reply(Value::Object(entity)),
            Ok(None) => delivery.fail(404, format!("no entity under key {key}")),
            Err(e) => delivery.fail(500, e.to_string()),
        }
    }
}

/// Parses an optional decimal header. Surrounding whitespace is ignored.
fn parse_header<T: std::str::FromStr>(
    delivery: &Delivery,
    name: &str,
) -> std::result::Result<Option<T>, String> {
    match delivery.headers().get(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| format!("invalid '{name}' header: {raw:?}")),
    }
}

#[async_trait]
impl MessageHandler for CacheWorker {
    async fn handle(&mut self, delivery: Delivery) {
        self.transition(WorkerState::Ready, WorkerState::Processing);
        let address = delivery.address().to_string();

        let span = info_span!(
            "cache_worker",
            address = %address,
            correlation_id = delivery
                .correlation_id()
                .map(CorrelationId::as_str)
                .unwrap_or("-"),
        );

        async {
            match address.as_str() {
                ADD_TO_CACHE => self.add(delivery).await,
                RETRIEVE_FROM_CACHE => self.retrieve(delivery).await,
                GET_FROM_CACHE => self.get(delivery).await,
                other => {
                    let reason = format!("unsupported address '{other}'");
                    delivery.fail(404, reason);
                },
            }
        }
        .instrument(span)
        .await;

        self.metrics.update_entry_count(self.backend.len().await);
        self.transition(WorkerState::Processing, WorkerState::Ready);
    }
}

impl fmt::Debug for CacheWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheWorker")
            .field("backend", &self.backend.name())
            .field("chain", &self.chain)
            .field("latency", &self.latency)
            .field("state", &*self.state.read())
            .finish()
    }
}

/// Handle to a running cache worker.
///
/// Cheap to clone. The backend is exposed for inspection only: mutations go
/// through the bus.
#[derive(Clone)]
pub struct WorkerHandle {
    state: SharedState,
    backend: Arc<dyn CacheBackend>,
    consumer: Arc<Mutex<Option<ConsumerHandle>>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.read()
    }

    /// Name of the active backend.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn capacity(&self) -> usize {
        self.backend.capacity()
    }

    /// Number of resident entities.
    pub async fn len(&self) -> usize {
        self.backend.len().await
    }

    /// Unregisters the worker from the bus.
    ///
    /// Requests already queued are still answered.
    pub fn stop(&self) {
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.unregister();
            *self.state.write() = WorkerState::Stopped;
            info!("Cache worker stopped");
        }
    }
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("state", &self.state())
            .field("backend", &self.backend.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_from_millis() {
        assert_eq!(LatencyHook::from_millis(0, 0), LatencyHook::None);
        assert_eq!(
            LatencyHook::from_millis(50, 50),
            LatencyHook::Fixed(Duration::from_millis(50))
        );
        assert_eq!(
            LatencyHook::from_millis(350, 100),
            LatencyHook::Uniform {
                min: Duration::from_millis(100),
                max: Duration::from_millis(350),
            }
        );
    }

    #[test]
    fn test_latency_sample_stays_in_range() {
        let hook = WorkerConfig::default().latency;

        for _ in 0..100 {
            let delay = hook.sample().unwrap();
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(350));
        }
        assert_eq!(WorkerConfig::immediate().latency.sample(), None);
    }

    #[test]
    fn test_worker_state_serving() {
        assert!(WorkerState::Ready.is_serving());
        assert!(WorkerState::Processing.is_serving());
        assert!(!WorkerState::Failed.is_serving());
        assert!(!WorkerState::Stopped.is_serving());
        assert_eq!(WorkerState::Ready.to_string(), "READY");
    }
}
