//! Store Metrics
//!
//! Prometheus counters for the striped store, rendered in the text exposition
//! format on `/metrics`.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::{Error, Result};

/// Counters updated by the store facade
#[derive(Clone)]
pub struct StoreMetrics {
    registry: Registry,
    pub objects_written: IntCounter,
    pub objects_read: IntCounter,
    pub degraded_reads: IntCounter,
    pub reconstructed_blocks: IntCounter,
    pub bytes_written: IntCounter,
    pub bytes_read: IntCounter,
    pub errors: IntCounterVec,
}

impl std::fmt::Debug for StoreMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreMetrics")
            .field("objects_written", &self.objects_written.get())
            .field("objects_read", &self.objects_read.get())
            .field("degraded_reads", &self.degraded_reads.get())
            .finish()
    }
}

impl StoreMetrics {
    /// Create counters in a private registry
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let objects_written = counter(
            &registry,
            "tristore_objects_written_total",
            "Objects published",
        )?;
        let objects_read = counter(&registry, "tristore_objects_read_total", "Objects read")?;
        let degraded_reads = counter(
            &registry,
            "tristore_degraded_reads_total",
            "Reads served with a data stripe missing",
        )?;
        let reconstructed_blocks = counter(
            &registry,
            "tristore_reconstructed_blocks_total",
            "Blocks rebuilt from parity during reads",
        )?;
        let bytes_written = counter(
            &registry,
            "tristore_bytes_written_total",
            "Payload bytes written, padding excluded",
        )?;
        let bytes_read = counter(&registry, "tristore_bytes_read_total", "Payload bytes read")?;

        let errors = IntCounterVec::new(
            Opts::new("tristore_errors_total", "Failed store operations"),
            &["op", "kind"],
        )
        .map_err(metrics_error)?;
        registry
            .register(Box::new(errors.clone()))
            .map_err(metrics_error)?;

        Ok(Self {
            registry,
            objects_written,
            objects_read,
            degraded_reads,
            reconstructed_blocks,
            bytes_written,
            bytes_read,
            errors,
        })
    }

    /// Count a failed operation by error kind
    pub fn record_error(&self, op: &str, err: &Error) {
        self.errors.with_label_values(&[op, err.kind()]).inc();
    }

    /// Render every counter in the text exposition format
    pub fn encode_text(&self) -> Result<(String, Vec<u8>)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(metrics_error)?;
        Ok((encoder.format_type().to_string(), buffer))
    }
}

fn counter(registry: &Registry, name: &str, help: &str) -> Result<IntCounter> {
    let counter = IntCounter::new(name, help).map_err(metrics_error)?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(metrics_error)?;
    Ok(counter)
}

fn metrics_error(e: prometheus::Error) -> Error {
    Error::Internal(format!("metrics registry: {}", e))
}
