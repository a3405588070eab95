//! Application bootstrap: bus, interceptors, cache worker, HTTP router.

use axum::Router;
use config::ConfigError;
use emissary_bus::{MessageBus, install_correlation_interceptors};
use emissary_cache::{CacheWorker, PluginRegistry};
use emissary_core::EmissaryError;
use metrics_exporter_prometheus::PrometheusHandle;
use thiserror::Error;
use tracing::info;

use crate::server::{create_router_with_state, run_server_with_state};
use crate::settings::Settings;
use crate::state::AppState;

/// Why the application could not start or stopped serving.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Emissary(#[from] EmissaryError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// A started application: the cache worker is registered and ready.
#[derive(Debug)]
pub struct Application {
    settings: Settings,
    state: AppState,
}

impl Application {
    /// Starts the application with the built-in plugins.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(settings: Settings) -> Result<Self, StartupError> {
        Self::start_with_registry(settings, &PluginRegistry::with_builtins())
    }

    /// Starts the application resolving plugins from `registry`.
    ///
    /// # Errors
    ///
    /// `StartupError::Emissary` wrapping `StartupFatal` when the configured
    /// plugins do not resolve.
    pub fn start_with_registry(
        settings: Settings,
        registry: &PluginRegistry,
    ) -> Result<Self, StartupError> {
        let bus = MessageBus::new(settings.bus_config());
        install_correlation_interceptors(&bus);

        let worker =
            CacheWorker::start(registry, &settings.manifest(), &bus, settings.worker_config())?;

        info!(
            node = %bus.node_id(),
            backend = %worker.backend_name(),
            call_timeout_ms = settings.server.call_timeout_ms,
            "Application started"
        );

        let state = AppState::new(bus, worker, settings.call_timeout());
        Ok(Self { settings, state })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The HTTP router over this application's state.
    pub fn router(&self, prometheus_handle: PrometheusHandle) -> Router {
        create_router_with_state(self.state.clone(), prometheus_handle)
    }

    /// Serves HTTP until a shutdown signal arrives.
    pub async fn run(self, prometheus_handle: PrometheusHandle) -> Result<(), StartupError> {
        let addr = self.settings.listen_addr()?;
        run_server_with_state(addr, self.state, prometheus_handle).await?;
        Ok(())
    }
}
