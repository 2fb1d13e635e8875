//! Metric names and recording helpers.
//!
//! Everything goes through the `metrics` facade; nothing is exported unless
//! the embedding program installs a recorder.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metrics collection and management
#[derive(Debug, Clone, Copy)]
pub struct MetricsCollector {
    // Ingestion metrics
    pub files_ingested_total: &'static str,
    pub parse_failures_total: &'static str,

    // Repository metrics
    pub messages_saved_total: &'static str,
    pub messages_deleted_total: &'static str,
    pub conversations_rebuilt_total: &'static str,
    pub rebuild_duration: &'static str,

    // Snapshot metrics
    pub snapshot_imports_total: &'static str,
    pub snapshot_exports_total: &'static str,

    // Storage metrics
    pub storage_size_bytes: &'static str,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self {
            files_ingested_total: "vmg_files_ingested_total",
            parse_failures_total: "vmg_parse_failures_total",

            messages_saved_total: "vmg_messages_saved_total",
            messages_deleted_total: "vmg_messages_deleted_total",
            conversations_rebuilt_total: "vmg_conversations_rebuilt_total",
            rebuild_duration: "vmg_rebuild_duration_seconds",

            snapshot_imports_total: "vmg_snapshot_imports_total",
            snapshot_exports_total: "vmg_snapshot_exports_total",

            storage_size_bytes: "vmg_storage_size_bytes",
        }
    }
}

impl MetricsCollector {
    /// Record one ingested file, successful or not
    pub fn record_file_ingested(&self, success: bool) {
        let status = if success { "success" } else { "error" };
        counter!(self.files_ingested_total, "status" => status).increment(1);
    }

    /// Record a file whose text was not a well-formed VMG message
    pub fn record_parse_failure(&self) {
        counter!(self.parse_failures_total).increment(1);
    }

    /// Record a saved message
    pub fn record_message_saved(&self, direction: &'static str) {
        counter!(self.messages_saved_total, "direction" => direction).increment(1);
    }

    /// Record deleted messages
    pub fn record_messages_deleted(&self, count: usize) {
        counter!(self.messages_deleted_total).increment(count as u64);
    }

    /// Record a conversation rebuild
    pub fn record_rebuild(&self, conversations: usize, duration: Duration) {
        counter!(self.conversations_rebuilt_total).increment(conversations as u64);
        histogram!(self.rebuild_duration).record(duration.as_secs_f64());
    }

    /// Record a snapshot import
    pub fn record_import(&self) {
        counter!(self.snapshot_imports_total).increment(1);
    }

    /// Record a snapshot export
    pub fn record_export(&self) {
        counter!(self.snapshot_exports_total).increment(1);
    }

    /// Record the current serialized store size
    pub fn record_storage_size(&self, bytes: usize) {
        gauge!(self.storage_size_bytes).set(bytes as f64);
    }
}
