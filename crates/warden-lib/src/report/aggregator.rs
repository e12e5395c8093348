//! Report generation
//!
//! Generation is process-wide exclusive: one flag, acquired with a
//! try-lock and a 250 ms polling protocol rather than a blocking mutex.
//! The cluster path opens a response round, asks every peer for its
//! snapshot, and waits with the same bounded polling budget; whatever
//! accumulated by the deadline is rendered.

use super::render::{render_owner_section, render_report, ReportMeta};
use super::snapshot::{merge_into, sorted_owners};
use crate::cluster::ClusterSync;
use crate::config::ConfigHandle;
use crate::models::OwnerReport;
use crate::observability::{WardenLogger, WardenMetrics};
use crate::store::RuntimeStore;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Interval between acquisition / peer-wait polls
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Poll attempts before giving up (20 * 250 ms = 5 s)
pub const POLL_ATTEMPTS: u32 = 20;

/// Minimum spacing between self-reports per requester
const SELF_REPORT_COOLDOWN: Duration = Duration::from_secs(30);

const BUSY_RESPONSE: &str = "A report is already being generated; try again in a moment.";

/// Builds, merges and renders reports over the runtime store
pub struct ReportAggregator {
    store: Arc<RuntimeStore>,
    config: Arc<ConfigHandle>,
    cluster: Option<Arc<ClusterSync>>,
    generating: AtomicBool,
    self_report_marks: DashMap<u64, Instant>,
    metrics: WardenMetrics,
    logger: WardenLogger,
}

/// Releases the generation flag even on an early return
struct GenerationGuard<'a>(&'a AtomicBool);

impl Drop for GenerationGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ReportAggregator {
    pub fn new(
        store: Arc<RuntimeStore>,
        config: Arc<ConfigHandle>,
        cluster: Option<Arc<ClusterSync>>,
        metrics: WardenMetrics,
        logger: WardenLogger,
    ) -> Self {
        Self {
            store,
            config,
            cluster,
            generating: AtomicBool::new(false),
            self_report_marks: DashMap::new(),
            metrics,
            logger,
        }
    }

    fn try_acquire(&self) -> bool {
        self.generating
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Generate the full report.
    ///
    /// Always returns text: the report, or a busy note when another
    /// generation held the flag for the whole polling budget.
    pub async fn generate(&self, request_cluster_data: bool) -> String {
        let mut acquired = self.try_acquire();
        if !acquired {
            for _ in 0..POLL_ATTEMPTS {
                tokio::time::sleep(POLL_INTERVAL).await;
                if self.try_acquire() {
                    acquired = true;
                    break;
                }
            }
        }
        if !acquired {
            return BUSY_RESPONSE.to_string();
        }
        let _guard = GenerationGuard(&self.generating);
        let started = Instant::now();

        let cfg = self.config.snapshot();
        let mut merged: HashMap<u64, OwnerReport> = HashMap::new();
        let mut meta = ReportMeta {
            node_id: cfg.node_id,
            generated_at: chrono::Utc::now(),
            cluster_requested: false,
            peers_known: 0,
            peers_responded: 0,
        };

        let cluster = self
            .cluster
            .as_ref()
            .filter(|_| request_cluster_data && cfg.cluster_enabled);

        match cluster {
            Some(cluster) => {
                meta.cluster_requested = true;
                cluster.begin_round();
                if let Err(e) = cluster.request_reports() {
                    warn!(error = %e, "Failed to request peer reports");
                }
                merge_into(
                    &mut merged,
                    self.store.snapshot_owners(cfg.node_id, &self.config),
                );

                meta.peers_known = cluster.peer_count();
                for _ in 0..POLL_ATTEMPTS {
                    if cluster.round_responded() >= meta.peers_known {
                        break;
                    }
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
                let (peer_reports, responded) = cluster.finish_round();
                meta.peers_responded = responded;
                merge_into(&mut merged, peer_reports);
            }
            None => {
                merge_into(
                    &mut merged,
                    self.store.snapshot_owners(cfg.node_id, &self.config),
                );
            }
        }

        let owners = sorted_owners(merged);
        let text = render_report(&owners, &meta);

        self.metrics
            .observe_report_duration(started.elapsed().as_secs_f64());
        self.logger
            .log_report_generated(owners.len(), meta.peers_responded, meta.is_partial());

        text
    }

    /// Single-owner fast path, rate-limited per requester and never
    /// touching the cluster.
    pub fn self_report(&self, owner_id: u64) -> String {
        let now = Instant::now();
        if let Some(mark) = self.self_report_marks.get(&owner_id) {
            if now.duration_since(*mark) < SELF_REPORT_COOLDOWN {
                return format!(
                    "Your report was generated less than {} seconds ago; try again later.",
                    SELF_REPORT_COOLDOWN.as_secs()
                );
            }
        }
        self.self_report_marks.insert(owner_id, now);

        let cfg = self.config.snapshot();
        match self.store.snapshot_owner(owner_id, cfg.node_id, &self.config) {
            Some(report) => render_owner_section(&report),
            None => "No tracked units for your owner id.".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterTransport;
    use crate::config::WardenConfig;
    use crate::models::MeasurementEvent;

    fn event(owner: u64, unit: u64, ms: f64) -> MeasurementEvent {
        MeasurementEvent {
            owner_id: owner,
            unit_id: unit,
            unit_name: format!("unit-{}", unit),
            grid_name: "grid".to_string(),
            owner_name: format!("owner-{}", owner),
            duration_ms: ms,
        }
    }

    fn local_aggregator(cfg: WardenConfig) -> (ReportAggregator, Arc<RuntimeStore>) {
        let store = Arc::new(RuntimeStore::new());
        (
            ReportAggregator::new(
                store.clone(),
                Arc::new(ConfigHandle::new(cfg)),
                None,
                WardenMetrics::new(),
                WardenLogger::new(0),
            ),
            store,
        )
    }

    /// Transport that knows a peer but can never reach it
    struct DeafTransport;

    impl ClusterTransport for DeafTransport {
        fn send_to(&self, _node_id: u64, _payload: Vec<u8>) {}
        fn broadcast(&self, _payload: Vec<u8>) {}
        fn peers(&self) -> Vec<u64> {
            vec![99]
        }
    }

    #[tokio::test]
    async fn local_report_renders_tracked_owners() {
        let (aggregator, store) = local_aggregator(WardenConfig::default());
        store.record(&event(1, 10, 0.5), 4);
        store.record(&event(2, 20, 0.7), 4);

        let text = aggregator.generate(false).await;

        assert!(text.contains("owner-1 (#1)"));
        assert!(text.contains("owner-2 (#2)"));
        assert!(!text.contains("Peers responded"));
    }

    #[tokio::test(start_paused = true)]
    async fn busy_flag_yields_busy_response_after_budget() {
        let (aggregator, _store) = local_aggregator(WardenConfig::default());
        aggregator.generating.store(true, Ordering::Release);

        let text = aggregator.generate(false).await;

        assert_eq!(text, BUSY_RESPONSE);
        // The stuck generation still owns the flag
        assert!(aggregator.generating.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn flag_is_released_after_generation() {
        let (aggregator, _store) = local_aggregator(WardenConfig::default());
        let _ = aggregator.generate(false).await;
        assert!(!aggregator.generating.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn unresponsive_peer_yields_partial_report() {
        let store = Arc::new(RuntimeStore::new());
        let mut cfg = WardenConfig::default();
        cfg.cluster_enabled = true;
        cfg.node_id = 1;
        let config = Arc::new(ConfigHandle::new(cfg));
        let cluster = Arc::new(ClusterSync::new(
            config.clone(),
            store.clone(),
            Arc::new(DeafTransport),
            WardenMetrics::new(),
            WardenLogger::new(1),
        ));
        let aggregator = ReportAggregator::new(
            store.clone(),
            config,
            Some(cluster),
            WardenMetrics::new(),
            WardenLogger::new(1),
        );
        store.record(&event(1, 10, 0.5), 4);

        let text = aggregator.generate(true).await;

        assert!(text.contains("Peers responded: 0/1"));
        assert!(text.contains("partial"));
        assert!(text.contains("owner-1 (#1)"));
    }

    #[tokio::test]
    async fn self_report_is_rate_limited_per_requester() {
        let (aggregator, store) = local_aggregator(WardenConfig::default());
        store.record(&event(1, 10, 0.5), 4);

        let first = aggregator.self_report(1);
        assert!(first.contains("unit 10"));

        let second = aggregator.self_report(1);
        assert!(second.contains("try again later"));

        // A different requester is not throttled
        let other = aggregator.self_report(2);
        assert!(other.contains("No tracked units"));
    }
}
