//! Cache metrics recording.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Registra las metricas del cache.
/// Llamar una vez al inicio, despues de instalar el recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!("emissary_cache_adds_total", "Entities committed to the cache");
    metrics::describe_counter!(
        "emissary_cache_evictions_total",
        "Entries evicted to make room for new ones"
    );
    metrics::describe_gauge!("emissary_cache_entries", "Current number of entries in cache");
    metrics::describe_counter!(
        "emissary_transformation_failures_total",
        "Transformation chain failures by transformation"
    );
    metrics::describe_histogram!(
        "emissary_cache_operation_seconds",
        "Time spent on cache worker operations"
    );
}

/// Recorder de metricas del cache.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    adds: Arc<AtomicU64>,
    evictions: Arc<AtomicU64>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra un add confirmado
    pub fn record_add(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
        counter!("emissary_cache_adds_total").increment(1);
    }

    /// Registra una eviction
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
        counter!("emissary_cache_evictions_total").increment(1);
    }

    /// Actualiza el gauge de entries
    pub fn update_entry_count(&self, count: usize) {
        gauge!("emissary_cache_entries").set(count as f64);
    }

    /// Registra el fallo de una transformacion
    pub fn record_transformation_failure(&self, transformation: &str) {
        counter!(
            "emissary_transformation_failures_total",
            "transformation" => transformation.to_string()
        )
        .increment(1);
    }

    /// Registra la duracion de una operacion
    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("emissary_cache_operation_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Starts timing `operation`; the duration is recorded when the guard drops.
    pub fn time(&self, operation: &'static str) -> OperationTimer {
        OperationTimer {
            metrics: self.clone(),
            operation,
            start: Instant::now(),
        }
    }

    pub fn adds(&self) -> u64 {
        self.adds.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

/// Records an operation's duration on drop.
#[derive(Debug)]
pub struct OperationTimer {
    metrics: CacheMetrics,
    operation: &'static str,
    start: Instant,
}

impl Drop for OperationTimer {
    fn drop(&mut self) {
        self.metrics
            .record_operation_duration(self.operation, self.start.elapsed());
    }
}
