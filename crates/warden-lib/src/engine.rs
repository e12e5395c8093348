//! Punishment engine
//!
//! Evaluates each measurement against the thresholds in effect for the
//! unit's owner, escalates through the offense tracker, and carries out
//! punishments through the enforcement sink. The destructive part of a
//! punishment runs after a grace delay on a detached task; once scheduled
//! it is not cancelled, and it tolerates the unit disappearing in the
//! meantime.

use crate::config::ConfigHandle;
use crate::enforcement::EnforcementSink;
use crate::models::{MeasurementEvent, PunishReason, PunishmentKind};
use crate::observability::{WardenLogger, WardenMetrics};
use crate::offense::OffenseOutcome;
use crate::store::RuntimeStore;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome of evaluating one measurement, decided under the unit lock
/// and acted on after it is released
#[derive(Debug, Clone)]
enum EvalDecision {
    Skip,
    Warn {
        limit_kind: &'static str,
        measured_ms: f64,
        limit_ms: f64,
        count: u32,
        budget: u32,
    },
    Punish {
        reason: PunishReason,
        kind_override: Option<PunishmentKind>,
        note: Option<String>,
    },
}

/// Decision and enforcement logic on top of the runtime store
#[derive(Clone)]
pub struct PunishmentEngine {
    store: Arc<RuntimeStore>,
    config: Arc<ConfigHandle>,
    sink: Arc<dyn EnforcementSink>,
    metrics: WardenMetrics,
    logger: WardenLogger,
}

impl PunishmentEngine {
    pub fn new(
        store: Arc<RuntimeStore>,
        config: Arc<ConfigHandle>,
        sink: Arc<dyn EnforcementSink>,
        metrics: WardenMetrics,
        logger: WardenLogger,
    ) -> Self {
        Self {
            store,
            config,
            sink,
            metrics,
            logger,
        }
    }

    pub fn store(&self) -> &Arc<RuntimeStore> {
        &self.store
    }

    pub fn config(&self) -> &Arc<ConfigHandle> {
        &self.config
    }

    /// Record one measurement and evaluate it.
    ///
    /// Recording always happens; evaluation is skipped while the warden
    /// is disabled.
    pub async fn observe(&self, event: &MeasurementEvent) {
        let cfg = self.config.snapshot();
        let recorded = self.store.record(event, cfg.max_samples_tracked);
        self.metrics.inc_measurements();
        self.metrics.set_tracked(
            self.store.owner_count() as i64,
            self.store.unit_count() as i64,
        );

        if !cfg.enabled {
            return;
        }
        self.evaluate(event.owner_id, event.unit_id, recorded.last_ms)
            .await;
    }

    /// The unit's underlying program was recompiled; clear its tracking
    /// state when the configuration says so.
    pub fn handle_recompile(&self, owner_id: u64, unit_id: u64) -> bool {
        if !self.config.snapshot().reset_on_recompile {
            return false;
        }
        self.store.reset_unit(owner_id, unit_id)
    }

    async fn evaluate(&self, owner_id: u64, unit_id: u64, last_ms: f64) {
        let cfg = self.config.snapshot();
        let limits = self.config.effective_limits(owner_id);
        let now = Instant::now();
        let max_age = Duration::from_secs(cfg.offense_max_age_mins * 60);
        let spacing = Duration::from_secs(cfg.grace_after_offense_secs);

        let decision = self.store.with_unit_mut(owner_id, unit_id, |unit| {
            if !unit.grace_elapsed {
                let grace = Duration::from_secs(limits.startup_grace_secs);
                if now.duration_since(unit.first_seen) < grace {
                    return EvalDecision::Skip;
                }
                // Checked once; never re-examined for this unit
                unit.grace_elapsed = true;
            }

            if last_ms >= cfg.instant_kill_ms {
                return EvalDecision::Punish {
                    reason: PunishReason::ExtremeUsage,
                    kind_override: Some(PunishmentKind::Destroy),
                    note: Some(format!("a single run took {:.2} ms", last_ms)),
                };
            }

            if last_ms > limits.max_run_time_ms {
                return match unit.offenses.note_violation(
                    now,
                    max_age,
                    spacing,
                    limits.max_offenses,
                ) {
                    OffenseOutcome::DroppedByGrace => EvalDecision::Skip,
                    OffenseOutcome::Warned(count) => EvalDecision::Warn {
                        limit_kind: "single_run",
                        measured_ms: last_ms,
                        limit_ms: limits.max_run_time_ms,
                        count,
                        budget: limits.max_offenses,
                    },
                    OffenseOutcome::OverBudget(_) => EvalDecision::Punish {
                        reason: PunishReason::SingleRuntimeOverLimit,
                        kind_override: None,
                        note: None,
                    },
                };
            }

            let avg = unit.window.average();
            if avg > limits.max_run_time_avg_ms {
                return match unit.offenses.note_violation(
                    now,
                    max_age,
                    spacing,
                    limits.max_offenses,
                ) {
                    OffenseOutcome::DroppedByGrace => EvalDecision::Skip,
                    OffenseOutcome::Warned(count) => EvalDecision::Warn {
                        limit_kind: "average",
                        measured_ms: avg,
                        limit_ms: limits.max_run_time_avg_ms,
                        count,
                        budget: limits.max_offenses,
                    },
                    OffenseOutcome::OverBudget(_) => EvalDecision::Punish {
                        reason: PunishReason::AverageRuntimeOverLimit,
                        kind_override: None,
                        note: None,
                    },
                };
            }

            EvalDecision::Skip
        });

        match decision {
            None | Some(EvalDecision::Skip) => {}
            Some(EvalDecision::Warn {
                limit_kind,
                measured_ms,
                limit_ms,
                count,
                budget,
            }) => {
                self.metrics.inc_offenses();
                self.logger
                    .log_offense(owner_id, unit_id, limit_kind, measured_ms, limit_ms, count);
                self.sink
                    .notify_owner(
                        owner_id,
                        format!(
                            "Warning: unit {} exceeded its {} runtime limit \
                             ({:.3} ms > {:.3} ms). Offense {} of {} before punishment.",
                            unit_id, limit_kind, measured_ms, limit_ms, count, budget
                        ),
                    )
                    .await;
            }
            Some(EvalDecision::Punish {
                reason,
                kind_override,
                note,
            }) => {
                if !matches!(reason, PunishReason::ExtremeUsage) {
                    self.metrics.inc_offenses();
                }
                self.punish(owner_id, unit_id, reason, kind_override, note)
                    .await;
            }
        }
    }

    /// Carry out a punishment.
    ///
    /// `ExtremeUsage` applies the destructive action synchronously with no
    /// grace notice. Every other reason asks the unit to stop on its own
    /// first, then applies the corrective action after the grace delay on
    /// a detached, uncancellable task.
    pub async fn punish(
        &self,
        owner_id: u64,
        unit_id: u64,
        reason: PunishReason,
        kind_override: Option<PunishmentKind>,
        note: Option<String>,
    ) {
        let limits = self.config.effective_limits(owner_id);
        let kind = kind_override.unwrap_or(limits.punishment);
        let grace_secs = limits.graceful_shutdown_delay_secs;

        self.metrics.inc_punishments(reason.key());

        if matches!(reason, PunishReason::ExtremeUsage) {
            self.logger
                .log_punishment(owner_id, unit_id, reason.key(), kind.key(), 0);
            self.apply(owner_id, unit_id, kind, reason, note).await;
            return;
        }

        self.logger
            .log_punishment(owner_id, unit_id, reason.key(), kind.key(), grace_secs);

        if let Err(e) = self
            .sink
            .request_graceful_stop(owner_id, unit_id, grace_secs)
            .await
        {
            self.logger
                .log_enforcement_skipped(owner_id, unit_id, &e.to_string());
        }

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(grace_secs)).await;
            engine.apply(owner_id, unit_id, kind, reason, note).await;
        });
    }

    async fn apply(
        &self,
        owner_id: u64,
        unit_id: u64,
        kind: PunishmentKind,
        reason: PunishReason,
        note: Option<String>,
    ) {
        let explanation = match note {
            Some(n) => format!(
                "Unit {} is being punished for {}: {}.",
                unit_id, reason, n
            ),
            None => format!("Unit {} is being punished for {}.", unit_id, reason),
        };
        // The sink suppresses delivery when the owner is offline
        self.sink.notify_owner(owner_id, explanation).await;

        let result = match kind {
            PunishmentKind::TurnOff => self.sink.disable(owner_id, unit_id).await,
            PunishmentKind::Destroy => {
                self.sink.apply_damage(owner_id, unit_id, 0.0, true).await
            }
            PunishmentKind::Damage => {
                let amount = self.config.snapshot().damage_amount;
                match self.sink.apply_damage(owner_id, unit_id, amount, false).await {
                    Ok(()) => self.sink.disable(owner_id, unit_id).await,
                    Err(e) => Err(e),
                }
            }
        };

        match result {
            Ok(()) => debug!(
                owner_id,
                unit_id,
                kind = kind.key(),
                "Punishment applied"
            ),
            Err(e) => self
                .logger
                .log_enforcement_skipped(owner_id, unit_id, &e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PrivilegedOverride, WardenConfig};
    use crate::enforcement::{RecordingSink, SinkAction};

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

    /// Override with no startup grace and no shutdown delay so tests run
    /// without sleeping through real grace windows
    fn immediate_override(owner_id: u64, kind: PunishmentKind) -> PrivilegedOverride {
        PrivilegedOverride {
            owner_id,
            label: String::new(),
            max_run_time_ms: 0.8,
            max_run_time_avg_ms: 100.0,
            max_combined_run_time_ms: 100.0,
            max_combined_avg_ms: 100.0,
            max_offenses: 3,
            punishment: kind,
            graceful_shutdown_delay_secs: 0,
            startup_grace_secs: 0,
            ignore_combined_limits: false,
        }
    }

    fn engine_with(config: WardenConfig, sink: Arc<RecordingSink>) -> PunishmentEngine {
        PunishmentEngine::new(
            Arc::new(RuntimeStore::new()),
            Arc::new(ConfigHandle::new(config)),
            sink,
            WardenMetrics::new(),
            WardenLogger::new(0),
        )
    }

    fn count_disables(actions: &[SinkAction]) -> usize {
        actions
            .iter()
            .filter(|a| matches!(a, SinkAction::Disable { .. }))
            .count()
    }

    #[tokio::test]
    async fn fourth_violation_punishes_exactly_once() {
        let mut cfg = WardenConfig::default();
        cfg.grace_after_offense_secs = 0;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::TurnOff));
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        for _ in 0..4 {
            engine.observe(&event(1, 10, 1.0)).await;
        }
        // Let the zero-delay corrective task land
        tokio::time::sleep(Duration::from_millis(50)).await;

        let actions = sink.actions();
        assert_eq!(count_disables(&actions), 1);
        let graceful = actions
            .iter()
            .filter(|a| matches!(a, SinkAction::GracefulStop { .. }))
            .count();
        assert_eq!(graceful, 1);

        // Three warnings before the punishment, one explanation with it
        let notifies = actions
            .iter()
            .filter(|a| matches!(a, SinkAction::Notify { .. }))
            .count();
        assert_eq!(notifies, 4);

        // The explanation names the single-runtime reason
        assert!(actions.iter().any(|a| matches!(
            a,
            SinkAction::Notify { message, .. } if message.contains("single runtime over limit")
        )));
    }

    #[tokio::test]
    async fn instant_kill_bypasses_offense_accounting() {
        let mut cfg = WardenConfig::default();
        cfg.instant_kill_ms = 10.0;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::TurnOff));
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        engine.observe(&event(1, 10, 25.0)).await;

        let actions = sink.actions();
        // Destroy lands synchronously: lethal damage, no graceful stop
        assert!(actions.iter().any(|a| matches!(
            a,
            SinkAction::Damage { lethal: true, .. }
        )));
        assert!(!actions
            .iter()
            .any(|a| matches!(a, SinkAction::GracefulStop { .. })));

        let offense_count = engine
            .store()
            .with_unit_mut(1, 10, |u| u.offenses.count())
            .unwrap();
        assert_eq!(offense_count, 0);
    }

    #[tokio::test]
    async fn startup_grace_skips_evaluation() {
        // No override: the fixed 2 s startup default applies
        let cfg = WardenConfig::default();
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        engine.observe(&event(1, 10, 50.0)).await;

        assert!(sink.actions().is_empty());
        let grace_elapsed = engine
            .store()
            .with_unit_mut(1, 10, |u| u.grace_elapsed)
            .unwrap();
        assert!(!grace_elapsed);
    }

    #[tokio::test]
    async fn violations_inside_offense_spacing_are_dropped() {
        let mut cfg = WardenConfig::default();
        cfg.grace_after_offense_secs = 3600;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::TurnOff));
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        engine.observe(&event(1, 10, 1.0)).await;
        engine.observe(&event(1, 10, 1.0)).await;

        let offense_count = engine
            .store()
            .with_unit_mut(1, 10, |u| u.offenses.count())
            .unwrap();
        assert_eq!(offense_count, 1);
        assert_eq!(count_disables(&sink.actions()), 0);
    }

    #[tokio::test]
    async fn damage_kind_damages_then_disables() {
        let mut cfg = WardenConfig::default();
        cfg.grace_after_offense_secs = 0;
        cfg.damage_amount = 42.0;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::Damage));
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        for _ in 0..4 {
            engine.observe(&event(1, 10, 1.0)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        let actions = sink.actions();
        assert!(actions.iter().any(|a| matches!(
            a,
            SinkAction::Damage {
                lethal: false,
                ..
            }
        )));
        assert_eq!(count_disables(&actions), 1);
    }

    #[tokio::test]
    async fn absent_handle_aborts_single_action_without_panic() {
        let mut cfg = WardenConfig::default();
        cfg.instant_kill_ms = 10.0;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::TurnOff));
        let sink = Arc::new(RecordingSink::new());
        sink.mark_gone(1, 10);
        let engine = engine_with(cfg, sink.clone());

        engine.observe(&event(1, 10, 25.0)).await;

        // Only the owner notification landed; the lethal blow was skipped
        let actions = sink.actions();
        assert!(actions
            .iter()
            .all(|a| matches!(a, SinkAction::Notify { .. })));
    }

    #[tokio::test]
    async fn recompile_reset_is_config_gated() {
        let mut cfg = WardenConfig::default();
        cfg.reset_on_recompile = false;
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink);

        engine.observe(&event(1, 10, 0.1)).await;
        assert!(!engine.handle_recompile(1, 10));

        engine.config().set_enabled(true);
        let mut cfg2 = (*engine.config().snapshot()).clone();
        cfg2.reset_on_recompile = true;
        engine.config().replace(cfg2);
        assert!(engine.handle_recompile(1, 10));
    }

    #[tokio::test]
    async fn disabled_warden_records_but_never_acts() {
        let mut cfg = WardenConfig::default();
        cfg.enabled = false;
        cfg.instant_kill_ms = 10.0;
        cfg.overrides
            .push(immediate_override(1, PunishmentKind::TurnOff));
        let sink = Arc::new(RecordingSink::new());
        let engine = engine_with(cfg, sink.clone());

        engine.observe(&event(1, 10, 100.0)).await;

        assert!(sink.actions().is_empty());
        assert_eq!(engine.store().unit_count(), 1);
    }
}
