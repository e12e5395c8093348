//! Warden configuration
//!
//! Global thresholds plus the per-owner privileged override map. Components
//! read an immutable `Arc<WardenConfig>` snapshot through [`ConfigHandle`];
//! updates (local or pushed from a peer node) swap the snapshot atomically.

use crate::models::PunishmentKind;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Startup allowance for units without a privileged override
pub const DEFAULT_STARTUP_GRACE_SECS: u64 = 2;

/// Global warden configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WardenConfig {
    /// Master switch; when false, evaluation is a no-op
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Single-run cap in milliseconds
    #[serde(default = "default_max_run_time_ms")]
    pub max_run_time_ms: f64,

    /// Moving-average cap in milliseconds
    #[serde(default = "default_max_run_time_avg_ms")]
    pub max_run_time_avg_ms: f64,

    /// A single run at or above this fires an immediate destroy
    #[serde(default = "default_instant_kill_ms")]
    pub instant_kill_ms: f64,

    /// Sample window size; the average stays 0 until the window is full
    #[serde(default = "default_max_samples_tracked")]
    pub max_samples_tracked: usize,

    /// Offense budget; punishment fires once the count exceeds this
    #[serde(default = "default_max_offenses")]
    pub max_offenses: u32,

    /// Offenses older than this are evicted from the top of the stack
    #[serde(default = "default_offense_max_age_mins")]
    pub offense_max_age_mins: u64,

    /// Violations within this window of the last offense are dropped
    #[serde(default = "default_grace_after_offense_secs")]
    pub grace_after_offense_secs: u64,

    #[serde(default = "default_punishment")]
    pub punishment: PunishmentKind,

    /// Window given to a unit to stop on its own before the corrective
    /// action lands
    #[serde(default = "default_graceful_shutdown_delay_secs")]
    pub graceful_shutdown_delay_secs: u64,

    /// Damage applied by `PunishmentKind::Damage`
    #[serde(default = "default_damage_amount")]
    pub damage_amount: f64,

    #[serde(default)]
    pub check_combined_limits: bool,

    /// Owner-wide cap on the sum of last run times
    #[serde(default = "default_max_combined_run_time_ms")]
    pub max_combined_run_time_ms: f64,

    /// Owner-wide cap on the sum of averages
    #[serde(default = "default_max_combined_avg_ms")]
    pub max_combined_avg_ms: f64,

    /// Punish every unit on a combined excess instead of one random unit
    #[serde(default)]
    pub punish_all_on_combined_excess: bool,

    #[serde(default = "default_combined_check_interval_secs")]
    pub combined_check_interval_secs: u64,

    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Units idle past this window are removed by the cleanup sweep
    #[serde(default = "default_idle_unit_timeout_secs")]
    pub idle_unit_timeout_secs: u64,

    /// Clear a unit's sample/offense state when its program is recompiled
    #[serde(default = "default_reset_on_recompile")]
    pub reset_on_recompile: bool,

    #[serde(default)]
    pub cluster_enabled: bool,

    /// Accept whole-configuration pushes from peer nodes
    #[serde(default)]
    pub accept_pushed_settings: bool,

    /// Accept privileged-override pushes from peer nodes
    #[serde(default)]
    pub accept_pushed_overrides: bool,

    /// This node's identity in the cluster
    #[serde(default)]
    pub node_id: u64,

    /// Seed overrides; the live map is owned by [`ConfigHandle`]
    #[serde(default)]
    pub overrides: Vec<PrivilegedOverride>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_run_time_ms() -> f64 {
    1.0
}

fn default_max_run_time_avg_ms() -> f64 {
    0.8
}

fn default_instant_kill_ms() -> f64 {
    10.0
}

fn default_max_samples_tracked() -> usize {
    30
}

fn default_max_offenses() -> u32 {
    3
}

fn default_offense_max_age_mins() -> u64 {
    30
}

fn default_grace_after_offense_secs() -> u64 {
    60
}

fn default_punishment() -> PunishmentKind {
    PunishmentKind::TurnOff
}

fn default_graceful_shutdown_delay_secs() -> u64 {
    10
}

fn default_damage_amount() -> f64 {
    100.0
}

fn default_max_combined_run_time_ms() -> f64 {
    4.0
}

fn default_max_combined_avg_ms() -> f64 {
    2.0
}

fn default_combined_check_interval_secs() -> u64 {
    30
}

fn default_cleanup_interval_secs() -> u64 {
    60
}

fn default_idle_unit_timeout_secs() -> u64 {
    600
}

fn default_reset_on_recompile() -> bool {
    true
}

impl Default for WardenConfig {
    fn default() -> Self {
        serde_json::from_str("{}").expect("defaults are total")
    }
}

/// Per-owner replacement thresholds superseding the global configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivilegedOverride {
    pub owner_id: u64,
    #[serde(default)]
    pub label: String,
    pub max_run_time_ms: f64,
    pub max_run_time_avg_ms: f64,
    pub max_combined_run_time_ms: f64,
    pub max_combined_avg_ms: f64,
    pub max_offenses: u32,
    pub punishment: PunishmentKind,
    pub graceful_shutdown_delay_secs: u64,
    pub startup_grace_secs: u64,
    #[serde(default)]
    pub ignore_combined_limits: bool,
}

/// Thresholds in effect for one owner after override resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveLimits {
    pub owner_id: u64,
    pub privileged: bool,
    pub max_run_time_ms: f64,
    pub max_run_time_avg_ms: f64,
    pub max_combined_run_time_ms: f64,
    pub max_combined_avg_ms: f64,
    pub max_offenses: u32,
    pub punishment: PunishmentKind,
    pub graceful_shutdown_delay_secs: u64,
    pub startup_grace_secs: u64,
}

/// Shared configuration access point
///
/// The snapshot is immutable; `replace` swaps it wholesale. The override
/// map lives outside the snapshot because privileged-owner pushes from the
/// cluster mutate it independently.
pub struct ConfigHandle {
    current: RwLock<Arc<WardenConfig>>,
    overrides: DashMap<u64, PrivilegedOverride>,
}

impl ConfigHandle {
    pub fn new(config: WardenConfig) -> Self {
        let overrides = DashMap::new();
        for o in &config.overrides {
            overrides.insert(o.owner_id, o.clone());
        }
        Self {
            current: RwLock::new(Arc::new(config)),
            overrides,
        }
    }

    /// Current immutable snapshot
    pub fn snapshot(&self) -> Arc<WardenConfig> {
        self.current.read().expect("config lock poisoned").clone()
    }

    /// Swap the whole configuration. The local node identity is kept; a
    /// pushed configuration must not change who this node is.
    pub fn replace(&self, mut config: WardenConfig) {
        let node_id = self.snapshot().node_id;
        config.node_id = node_id;
        for o in &config.overrides {
            self.overrides.insert(o.owner_id, o.clone());
        }
        *self.current.write().expect("config lock poisoned") = Arc::new(config);
    }

    /// Flip the master switch without touching other fields
    pub fn set_enabled(&self, enabled: bool) {
        let mut config = (*self.snapshot()).clone();
        config.enabled = enabled;
        *self.current.write().expect("config lock poisoned") = Arc::new(config);
    }

    pub fn override_for(&self, owner_id: u64) -> Option<PrivilegedOverride> {
        self.overrides.get(&owner_id).map(|o| o.clone())
    }

    pub fn is_privileged(&self, owner_id: u64) -> bool {
        self.overrides.contains_key(&owner_id)
    }

    /// Insert-or-replace one override record
    pub fn upsert_override(&self, o: PrivilegedOverride) {
        self.overrides.insert(o.owner_id, o);
    }

    pub fn overrides(&self) -> Vec<PrivilegedOverride> {
        self.overrides.iter().map(|o| o.clone()).collect()
    }

    /// Resolve the thresholds in effect for one owner
    pub fn effective_limits(&self, owner_id: u64) -> EffectiveLimits {
        let cfg = self.snapshot();
        match self.override_for(owner_id) {
            Some(o) => EffectiveLimits {
                owner_id,
                privileged: true,
                max_run_time_ms: o.max_run_time_ms,
                max_run_time_avg_ms: o.max_run_time_avg_ms,
                max_combined_run_time_ms: o.max_combined_run_time_ms,
                max_combined_avg_ms: o.max_combined_avg_ms,
                max_offenses: o.max_offenses,
                punishment: o.punishment,
                graceful_shutdown_delay_secs: o.graceful_shutdown_delay_secs,
                startup_grace_secs: o.startup_grace_secs,
            },
            None => EffectiveLimits {
                owner_id,
                privileged: false,
                max_run_time_ms: cfg.max_run_time_ms,
                max_run_time_avg_ms: cfg.max_run_time_avg_ms,
                max_combined_run_time_ms: cfg.max_combined_run_time_ms,
                max_combined_avg_ms: cfg.max_combined_avg_ms,
                max_offenses: cfg.max_offenses,
                punishment: cfg.punishment,
                graceful_shutdown_delay_secs: cfg.graceful_shutdown_delay_secs,
                startup_grace_secs: DEFAULT_STARTUP_GRACE_SECS,
            },
        }
    }
}
