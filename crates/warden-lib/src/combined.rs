//! Combined owner-wide limit sweep
//!
//! Periodically sums each owner's per-unit last durations and averages and
//! punishes owners whose totals exceed the combined allowances. The last
//! and average checks are independent; an owner can be hit by both in the
//! same pass.

use crate::config::ConfigHandle;
use crate::engine::PunishmentEngine;
use crate::models::PunishReason;
use crate::store::{OwnerTotals, RuntimeStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Results from one sweep pass
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepStats {
    pub owners_checked: usize,
    pub combined_runtime_hits: usize,
    pub combined_average_hits: usize,
    pub units_punished: usize,
}

/// Periodic evaluator for owner-wide combined limits
pub struct CombinedSweep {
    store: Arc<RuntimeStore>,
    config: Arc<ConfigHandle>,
    engine: PunishmentEngine,
}

impl CombinedSweep {
    pub fn new(
        store: Arc<RuntimeStore>,
        config: Arc<ConfigHandle>,
        engine: PunishmentEngine,
    ) -> Self {
        Self {
            store,
            config,
            engine,
        }
    }

    /// Run the sweep until shutdown
    pub async fn run(self, mut shutdown: tokio::sync::broadcast::Receiver<()>) {
        let interval_secs = self.config.snapshot().combined_check_interval_secs.max(1);
        info!(interval_secs, "Starting combined-limit sweep");

        let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let stats = self.sweep_once().await;
                    if stats.units_punished > 0 {
                        info!(
                            owners_checked = stats.owners_checked,
                            combined_runtime_hits = stats.combined_runtime_hits,
                            combined_average_hits = stats.combined_average_hits,
                            units_punished = stats.units_punished,
                            "Combined-limit sweep punished units"
                        );
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down combined-limit sweep");
                    break;
                }
            }
        }
    }

    /// One pass over every tracked owner
    pub async fn sweep_once(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        let cfg = self.config.snapshot();
        if !cfg.enabled || !cfg.check_combined_limits {
            return stats;
        }

        for totals in self.store.owner_totals() {
            let opted_out = self
                .config
                .override_for(totals.owner_id)
                .map(|o| o.ignore_combined_limits)
                .unwrap_or(false);
            if opted_out {
                debug!(owner_id = totals.owner_id, "Owner opted out of combined limits");
                continue;
            }
            stats.owners_checked += 1;

            let limits = self.config.effective_limits(totals.owner_id);

            if totals.sum_last_ms > limits.max_combined_run_time_ms {
                stats.combined_runtime_hits += 1;
                stats.units_punished += self
                    .punish_combined(
                        &totals,
                        PunishReason::CombinedRuntimeOverLimit,
                        cfg.punish_all_on_combined_excess,
                        format!(
                            "combined runtime {:.2} ms exceeds the {:.2} ms allowance",
                            totals.sum_last_ms, limits.max_combined_run_time_ms
                        ),
                    )
                    .await;
            }

            if totals.sum_avg_ms > limits.max_combined_avg_ms {
                stats.combined_average_hits += 1;
                stats.units_punished += self
                    .punish_combined(
                        &totals,
                        PunishReason::CombinedAverageRuntimeOverLimit,
                        cfg.punish_all_on_combined_excess,
                        format!(
                            "combined average {:.2} ms exceeds the {:.2} ms allowance",
                            totals.sum_avg_ms, limits.max_combined_avg_ms
                        ),
                    )
                    .await;
            }
        }

        stats
    }

    async fn punish_combined(
        &self,
        totals: &OwnerTotals,
        reason: PunishReason,
        punish_all: bool,
        note: String,
    ) -> usize {
        if totals.unit_ids.is_empty() {
            return 0;
        }

        let victims: Vec<u64> = if punish_all {
            totals.unit_ids.clone()
        } else {
            vec![totals.unit_ids[pick_index(totals.unit_ids.len())]]
        };

        for &unit_id in &victims {
            self.engine
                .punish(totals.owner_id, unit_id, reason, None, Some(note.clone()))
                .await;
        }
        victims.len()
    }
}

/// Pick a victim index without a full RNG; the nanosecond clock is spread
/// enough for an occasional uniform-ish choice
fn pick_index(len: usize) -> usize {
    if len <= 1 {
        return 0;
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as usize;
    now % len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrivilegedOverride, WardenConfig};
    use crate::enforcement::{RecordingSink, SinkAction};
    use crate::models::{MeasurementEvent, PunishmentKind};
    use crate::observability::{WardenLogger, WardenMetrics};

    fn event(owner: u64, unit: u64, ms: f64) -> MeasurementEvent {
        MeasurementEvent {
            owner_id: owner,
            unit_id: unit,
            unit_name: format!("unit-{}", unit),
            grid_name: "grid".to_string(),
            owner_name: String::new(),
            duration_ms: ms,
        }
    }

    fn sweep_fixture(cfg: WardenConfig) -> (CombinedSweep, Arc<RuntimeStore>, Arc<RecordingSink>) {
        let store = Arc::new(RuntimeStore::new());
        let config = Arc::new(ConfigHandle::new(cfg));
        let sink = Arc::new(RecordingSink::new());
        let engine = PunishmentEngine::new(
            store.clone(),
            config.clone(),
            sink.clone(),
            WardenMetrics::new(),
            WardenLogger::new(0),
        );
        (
            CombinedSweep::new(store.clone(), config, engine),
            store,
            sink,
        )
    }

    fn combined_config() -> WardenConfig {
        let mut cfg = WardenConfig::default();
        cfg.check_combined_limits = true;
        cfg.max_combined_run_time_ms = 4.0;
        cfg.max_combined_avg_ms = 100.0;
        cfg.graceful_shutdown_delay_secs = 0;
        // Cap 1 so each unit's average equals its one sample
        cfg.max_samples_tracked = 1;
        cfg
    }

    fn count_graceful(actions: &[SinkAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, SinkAction::GracefulStop { .. }))
            .count()
    }

    #[tokio::test]
    async fn combined_runtime_excess_punishes_one_random_unit() {
        let (sweep, store, sink) = sweep_fixture(combined_config());
        store.record(&event(1, 10, 3.0), 1);
        store.record(&event(1, 11, 3.0), 1);

        let stats = sweep.sweep_once().await;

        assert_eq!(stats.combined_runtime_hits, 1);
        assert_eq!(stats.units_punished, 1);
        assert_eq!(count_graceful(&sink.actions()), 1);
    }

    #[tokio::test]
    async fn punish_all_hits_every_unit() {
        let mut cfg = combined_config();
        cfg.punish_all_on_combined_excess = true;
        let (sweep, store, sink) = sweep_fixture(cfg);
        store.record(&event(1, 10, 3.0), 1);
        store.record(&event(1, 11, 3.0), 1);
        store.record(&event(1, 12, 3.0), 1);

        let stats = sweep.sweep_once().await;

        assert_eq!(stats.units_punished, 3);
        assert_eq!(count_graceful(&sink.actions()), 3);
    }

    #[tokio::test]
    async fn runtime_and_average_checks_fire_independently() {
        let mut cfg = combined_config();
        cfg.max_combined_avg_ms = 4.0;
        let (sweep, store, _sink) = sweep_fixture(cfg);
        store.record(&event(1, 10, 3.0), 1);
        store.record(&event(1, 11, 3.0), 1);

        let stats = sweep.sweep_once().await;

        assert_eq!(stats.combined_runtime_hits, 1);
        assert_eq!(stats.combined_average_hits, 1);
        assert_eq!(stats.units_punished, 2);
    }

    #[tokio::test]
    async fn overridden_owner_can_opt_out() {
        let mut cfg = combined_config();
        cfg.overrides.push(PrivilegedOverride {
            owner_id: 1,
            label: String::new(),
            max_run_time_ms: 1.0,
            max_run_time_avg_ms: 1.0,
            max_combined_run_time_ms: 1.0,
            max_combined_avg_ms: 1.0,
            max_offenses: 3,
            punishment: PunishmentKind::TurnOff,
            graceful_shutdown_delay_secs: 0,
            startup_grace_secs: 0,
            ignore_combined_limits: true,
        });
        let (sweep, store, sink) = sweep_fixture(cfg);
        store.record(&event(1, 10, 50.0), 1);

        let stats = sweep.sweep_once().await;

        assert_eq!(stats.owners_checked, 0);
        assert_eq!(stats.units_punished, 0);
        assert!(sink.actions().is_empty());
    }

    #[tokio::test]
    async fn sweep_is_inert_when_feature_disabled() {
        let mut cfg = combined_config();
        cfg.check_combined_limits = false;
        let (sweep, store, sink) = sweep_fixture(cfg);
        store.record(&event(1, 10, 50.0), 1);

        let stats = sweep.sweep_once().await;

        assert_eq!(stats.owners_checked, 0);
        assert!(sink.actions().is_empty());
    }

    #[test]
    fn pick_index_stays_in_bounds() {
        for len in 1..10 {
            assert!(pick_index(len) < len);
        }
        assert_eq!(pick_index(0), 0);
        assert_eq!(pick_index(1), 0);
    }
}
