//! Application state.

use std::time::Duration;

use emissary_bus::MessageBus;
use emissary_cache::WorkerHandle;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The bus the handlers talk to the cache worker through.
    bus: MessageBus,
    worker: WorkerHandle,
    call_timeout: Duration,
}

impl AppState {
    pub fn new(bus: MessageBus, worker: WorkerHandle, call_timeout: Duration) -> Self {
        Self {
            bus,
            worker,
            call_timeout,
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Bound on the wait for a cache worker reply.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}
