//! Emissary server binary.

use emissary_server::{Application, Settings};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Emissary Server v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    tracing::info!(
        host = %settings.server.host,
        port = settings.server.port,
        backend = ?settings.plugins.cache_backend,
        transformations = ?settings.plugins.transformations,
        "Settings loaded"
    );

    let prometheus_handle = emissary_server::metrics::init_metrics()?;

    // Fails fast when no cache backend resolves
    let app = Application::start(settings)?;

    app.run(prometheus_handle).await?;

    Ok(())
}
