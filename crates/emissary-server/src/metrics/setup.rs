//! Metrics setup and initialization.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

use super::http::register_http_metrics;

/// Buckets para histogramas (en segundos). Cubren desde operaciones del
/// cache en memoria hasta adds con la latencia artificial del worker.
const BUCKETS: &[f64] = &[
    0.0001, // 100 microsegundos
    0.0005, // 500 microsegundos
    0.001,  // 1 milisegundo
    0.005,  // 5 milisegundos
    0.01,   // 10 milisegundos
    0.05,   // 50 milisegundos
    0.1,    // 100 milisegundos
    0.25,   // 250 milisegundos
    0.5,    // 500 milisegundos
    1.0,    // 1 segundo
    5.0,    // 5 segundos
];

/// Inicializa el sistema de metricas y retorna el handle para el endpoint.
///
/// Instala el recorder global; solo puede llamarse una vez por proceso.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets(BUCKETS)?
        .install_recorder()?;

    register_http_metrics();
    emissary_cache::register_cache_metrics();

    info!("Metrics system initialized");
    Ok(handle)
}

/// Handle sin recorder global, para tests y routers embebidos.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}
