//! Observability infrastructure for the warden
//!
//! Provides:
//! - Prometheus metrics (measurement volume, offenses, punishments,
//!   tracked entities, report latency, cluster traffic)
//! - Structured JSON event logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for report generation (seconds); generation can
/// legitimately poll for several seconds
const REPORT_BUCKETS: &[f64] = &[0.005, 0.025, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<WardenMetricsInner> = OnceLock::new();

struct WardenMetricsInner {
    measurements_total: IntCounter,
    offenses_total: IntCounter,
    punishments_total: IntCounterVec,
    owners_tracked: IntGauge,
    units_tracked: IntGauge,
    report_duration_seconds: Histogram,
    reports_generated: IntCounter,
    cluster_messages_total: IntCounterVec,
    cluster_discarded_total: IntCounter,
}

impl WardenMetricsInner {
    fn new() -> Self {
        Self {
            measurements_total: register_int_counter!(
                "warden_measurements_total",
                "Measurement events recorded"
            )
            .expect("Failed to register measurements_total"),

            offenses_total: register_int_counter!(
                "warden_offenses_total",
                "Offenses recorded across all units"
            )
            .expect("Failed to register offenses_total"),

            punishments_total: register_int_counter_vec!(
                "warden_punishments_total",
                "Punishments applied, labeled by reason",
                &["reason"]
            )
            .expect("Failed to register punishments_total"),

            owners_tracked: register_int_gauge!(
                "warden_owners_tracked",
                "Owners currently tracked by the store"
            )
            .expect("Failed to register owners_tracked"),

            units_tracked: register_int_gauge!(
                "warden_units_tracked",
                "Units currently tracked by the store"
            )
            .expect("Failed to register units_tracked"),

            report_duration_seconds: register_histogram!(
                "warden_report_duration_seconds",
                "Time spent generating a report, including peer waits",
                REPORT_BUCKETS.to_vec()
            )
            .expect("Failed to register report_duration_seconds"),

            reports_generated: register_int_counter!(
                "warden_reports_generated_total",
                "Reports rendered, complete or partial"
            )
            .expect("Failed to register reports_generated"),

            cluster_messages_total: register_int_counter_vec!(
                "warden_cluster_messages_total",
                "Cluster envelopes handled, labeled by kind",
                &["kind"]
            )
            .expect("Failed to register cluster_messages_total"),

            cluster_discarded_total: register_int_counter!(
                "warden_cluster_discarded_total",
                "Inbound cluster payloads discarded (malformed or self-originated)"
            )
            .expect("Failed to register cluster_discarded_total"),
        }
    }
}

/// Warden metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct WardenMetrics {
    _private: (),
}

impl Default for WardenMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl WardenMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(WardenMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &WardenMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn inc_measurements(&self) {
        self.inner().measurements_total.inc();
    }

    pub fn inc_offenses(&self) {
        self.inner().offenses_total.inc();
    }

    pub fn inc_punishments(&self, reason: &str) {
        self.inner()
            .punishments_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn set_tracked(&self, owners: i64, units: i64) {
        self.inner().owners_tracked.set(owners);
        self.inner().units_tracked.set(units);
    }

    pub fn observe_report_duration(&self, duration_secs: f64) {
        self.inner().report_duration_seconds.observe(duration_secs);
        self.inner().reports_generated.inc();
    }

    pub fn inc_cluster_message(&self, kind: &str) {
        self.inner()
            .cluster_messages_total
            .with_label_values(&[kind])
            .inc();
    }

    pub fn inc_cluster_discarded(&self) {
        self.inner().cluster_discarded_total.inc();
    }
}

/// Structured logger for warden events
///
/// Consistent JSON-formatted logging for offenses, punishments, reports
/// and cluster traffic.
#[derive(Clone)]
pub struct WardenLogger {
    node_id: u64,
}

impl WardenLogger {
    pub fn new(node_id: u64) -> Self {
        Self { node_id }
    }

    pub fn log_startup(&self, version: &str) {
        info!(
            event = "warden_started",
            node = self.node_id,
            version = %version,
            "Runtime warden started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "warden_shutdown",
            node = self.node_id,
            reason = %reason,
            "Runtime warden shutting down"
        );
    }

    pub fn log_offense(
        &self,
        owner_id: u64,
        unit_id: u64,
        limit_kind: &str,
        measured_ms: f64,
        limit_ms: f64,
        offense_count: u32,
    ) {
        info!(
            event = "offense_recorded",
            node = self.node_id,
            owner_id = owner_id,
            unit_id = unit_id,
            limit_kind = %limit_kind,
            measured_ms = measured_ms,
            limit_ms = limit_ms,
            offense_count = offense_count,
            "Runtime offense recorded"
        );
    }

    pub fn log_punishment(
        &self,
        owner_id: u64,
        unit_id: u64,
        reason: &str,
        kind: &str,
        delayed_secs: u64,
    ) {
        warn!(
            event = "punishment",
            node = self.node_id,
            owner_id = owner_id,
            unit_id = unit_id,
            reason = %reason,
            kind = %kind,
            delayed_secs = delayed_secs,
            "Punishing unit"
        );
    }

    pub fn log_enforcement_skipped(&self, owner_id: u64, unit_id: u64, error: &str) {
        warn!(
            event = "enforcement_skipped",
            node = self.node_id,
            owner_id = owner_id,
            unit_id = unit_id,
            error = %error,
            "Unit handle absent at enforcement time"
        );
    }

    pub fn log_report_generated(&self, owners: usize, peers_responded: usize, partial: bool) {
        info!(
            event = "report_generated",
            node = self.node_id,
            owners = owners,
            peers_responded = peers_responded,
            partial = partial,
            "Report generated"
        );
    }

    pub fn log_settings_applied(&self, from_node: u64) {
        info!(
            event = "settings_applied",
            node = self.node_id,
            from_node = from_node,
            "Applied configuration pushed by peer"
        );
    }

    pub fn log_push_rejected(&self, from_node: u64, what: &str) {
        info!(
            event = "push_rejected",
            node = self.node_id,
            from_node = from_node,
            what = %what,
            "Discarded cluster push; node has not opted in"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_handle_is_usable() {
        // Registration happens once per process; observing through a
        // second handle must not panic.
        let metrics = WardenMetrics::new();
        metrics.inc_measurements();
        metrics.inc_offenses();
        metrics.inc_punishments("extreme_usage");
        metrics.set_tracked(2, 5);
        metrics.observe_report_duration(0.25);
        metrics.inc_cluster_message("report_request");
        metrics.inc_cluster_discarded();

        let again = WardenMetrics::new();
        again.inc_measurements();
    }

    #[test]
    fn logger_carries_node_id() {
        let logger = WardenLogger::new(4);
        assert_eq!(logger.node_id, 4);
    }
}
