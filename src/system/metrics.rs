//! Metrics collection for the replication target
//!
//! Counters live in a private Prometheus registry so embedding the library
//! does not pollute the host's default registry.

use crate::core::error::Result;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_with_registry, IntCounter, Registry, TextEncoder};

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

/// Counters for replication traffic
pub struct Metrics {
    /// Documents written through `store` (creates, updates, replays)
    pub documents_written: IntCounter,
    /// Documents replaced by a tombstone through `remove`
    pub documents_deleted: IntCounter,
    /// Writes rejected by the conflict checker
    pub write_conflicts: IntCounter,
    /// `_bulk_docs` entries reported as failed
    pub bulk_entries_failed: IntCounter,
    /// Attachments received in multipart uploads
    pub attachments_received: IntCounter,
    /// Change events written to `_changes` responses
    pub change_events_served: IntCounter,
}

impl Metrics {
    /// Create new metrics instance registered with the crate registry
    pub fn new() -> Result<Self> {
        Ok(Self {
            documents_written: register_int_counter_with_registry!(
                "replica_documents_written_total",
                "Total number of documents written",
                REGISTRY
            )?,
            documents_deleted: register_int_counter_with_registry!(
                "replica_documents_deleted_total",
                "Total number of documents deleted",
                REGISTRY
            )?,
            write_conflicts: register_int_counter_with_registry!(
                "replica_write_conflicts_total",
                "Total number of writes rejected with a conflict",
                REGISTRY
            )?,
            bulk_entries_failed: register_int_counter_with_registry!(
                "replica_bulk_entries_failed_total",
                "Total number of failed bulk_docs entries",
                REGISTRY
            )?,
            attachments_received: register_int_counter_with_registry!(
                "replica_attachments_received_total",
                "Total number of attachments received in multipart uploads",
                REGISTRY
            )?,
            change_events_served: register_int_counter_with_registry!(
                "replica_change_events_served_total",
                "Total number of change events served",
                REGISTRY
            )?,
        })
    }

    /// Get the global metrics instance
    pub fn global() -> &'static Metrics {
        static INSTANCE: Lazy<Metrics> =
            Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
        &INSTANCE
    }
}

/// Register the global metrics so they appear before first use
pub fn init_registry() {
    let _ = Metrics::global();
}

/// Get the Prometheus registry for serving metrics to monitoring systems
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Collect all metrics in the Prometheus text exposition format
pub fn collect_metrics() -> Result<String> {
    init_registry();
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    Ok(encoder.encode_to_string(&metric_families)?)
}
