//! Lock-free metrics collection
//!
//! Plain atomic counters incremented from the ingestion paths and reported
//! periodically as one structured log line. Relaxed ordering is fine here:
//! counters are monotonic and only read for reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Callbacks that reached the decoder (any POST body)
    callbacks_received: AtomicU64,
    /// Callbacks that decoded into a usable scan
    scans_decoded: AtomicU64,
    /// Valid payloads that were not face scans (door events, heartbeats)
    callbacks_ignored: AtomicU64,
    /// Bodies with no recoverable JSON
    callbacks_malformed: AtomicU64,
    /// Scans lost to a full session channel
    scans_dropped: AtomicU64,
    /// Telemetry lines read off the serial port
    scale_lines: AtomicU64,
    /// Telemetry lines that matched no pattern
    scale_lines_ignored: AtomicU64,
    collections_started: AtomicU64,
    collections_completed: AtomicU64,
    lookups_failed: AtomicU64,
    saves_ok: AtomicU64,
    saves_failed: AtomicU64,
}

/// Point-in-time snapshot for reporting
#[derive(Debug, Clone, Copy)]
pub struct MetricsSummary {
    pub callbacks_received: u64,
    pub scans_decoded: u64,
    pub callbacks_ignored: u64,
    pub callbacks_malformed: u64,
    pub scans_dropped: u64,
    pub scale_lines: u64,
    pub scale_lines_ignored: u64,
    pub collections_started: u64,
    pub collections_completed: u64,
    pub lookups_failed: u64,
    pub saves_ok: u64,
    pub saves_failed: u64,
}

impl MetricsSummary {
    pub fn log(&self) {
        info!(
            callbacks = %self.callbacks_received,
            scans = %self.scans_decoded,
            ignored = %self.callbacks_ignored,
            malformed = %self.callbacks_malformed,
            dropped = %self.scans_dropped,
            scale_lines = %self.scale_lines,
            scale_noise = %self.scale_lines_ignored,
            collections_started = %self.collections_started,
            collections_completed = %self.collections_completed,
            lookups_failed = %self.lookups_failed,
            saves_ok = %self.saves_ok,
            saves_failed = %self.saves_failed,
            "metrics_summary"
        );
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_callback_received(&self) {
        self.callbacks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_decoded(&self) {
        self.scans_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_ignored(&self) {
        self.callbacks_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_callback_malformed(&self) {
        self.callbacks_malformed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scan_dropped(&self) {
        self.scans_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scale_line(&self) {
        self.scale_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_scale_line_ignored(&self) {
        self.scale_lines_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collection_started(&self) {
        self.collections_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_collection_completed(&self) {
        self.collections_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_lookup_failed(&self) {
        self.lookups_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save_ok(&self) {
        self.saves_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_save_failed(&self) {
        self.saves_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> MetricsSummary {
        MetricsSummary {
            callbacks_received: self.callbacks_received.load(Ordering::Relaxed),
            scans_decoded: self.scans_decoded.load(Ordering::Relaxed),
            callbacks_ignored: self.callbacks_ignored.load(Ordering::Relaxed),
            callbacks_malformed: self.callbacks_malformed.load(Ordering::Relaxed),
            scans_dropped: self.scans_dropped.load(Ordering::Relaxed),
            scale_lines: self.scale_lines.load(Ordering::Relaxed),
            scale_lines_ignored: self.scale_lines_ignored.load(Ordering::Relaxed),
            collections_started: self.collections_started.load(Ordering::Relaxed),
            collections_completed: self.collections_completed.load(Ordering::Relaxed),
            lookups_failed: self.lookups_failed.load(Ordering::Relaxed),
            saves_ok: self.saves_ok.load(Ordering::Relaxed),
            saves_failed: self.saves_failed.load(Ordering::Relaxed),
        }
    }
}
