//! Runtime sample store
//!
//! Concurrent owner/unit registry fed by measurement events from many
//! parallel worker threads. Owners and units are created lazily on first
//! sight and removed by a periodic cleanup sweep once their workload is
//! gone or idle.

mod samples;

pub use samples::SampleWindow;

use crate::config::ConfigHandle;
use crate::enforcement::EnforcementSink;
use crate::models::{MeasurementEvent, OwnerReport, UnitSnapshot};
use crate::offense::OffenseStack;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::interval;
use tracing::{debug, info};

/// Mutable tracking state for one unit
#[derive(Debug)]
pub struct UnitRecord {
    pub unit_id: u64,
    pub unit_name: String,
    pub grid_name: String,
    pub window: SampleWindow,
    pub offenses: OffenseStack,
    pub first_seen: Instant,
    pub grace_elapsed: bool,
    pub recompiles: u32,
    pub last_activity: Instant,
}

impl UnitRecord {
    fn new(unit_id: u64, unit_name: String, grid_name: String, cap: usize) -> Self {
        let now = Instant::now();
        Self {
            unit_id,
            unit_name,
            grid_name,
            window: SampleWindow::new(cap),
            offenses: OffenseStack::new(),
            first_seen: now,
            grace_elapsed: false,
            recompiles: 0,
            last_activity: now,
        }
    }

    fn snapshot(&self, node_id: u64) -> UnitSnapshot {
        UnitSnapshot {
            unit_id: self.unit_id,
            unit_name: self.unit_name.clone(),
            grid_name: self.grid_name.clone(),
            node_id,
            last_duration_ms: self.window.last(),
            avg_duration_ms: self.window.average(),
            offenses: self.offenses.count(),
            recompiles: self.recompiles,
        }
    }
}

/// One tracked owner and their units
pub struct OwnerRecord {
    pub owner_id: u64,
    display_name: std::sync::RwLock<String>,
    units: DashMap<u64, UnitRecord>,
}

impl OwnerRecord {
    fn new(owner_id: u64) -> Self {
        Self {
            owner_id,
            display_name: std::sync::RwLock::new(String::new()),
            units: DashMap::new(),
        }
    }

    pub fn display_name(&self) -> String {
        self.display_name.read().expect("name lock").clone()
    }
}

/// Result of recording one measurement
#[derive(Debug, Clone, Copy)]
pub struct Recorded {
    pub last_ms: f64,
    pub avg_ms: f64,
}

/// Owner-wide sums used by the combined-limit sweep
#[derive(Debug, Clone)]
pub struct OwnerTotals {
    pub owner_id: u64,
    pub sum_last_ms: f64,
    pub sum_avg_ms: f64,
    pub unit_ids: Vec<u64>,
}

/// Concurrent registry of tracked owners and units
pub struct RuntimeStore {
    owners: DashMap<u64, Arc<OwnerRecord>>,
}

impl Default for RuntimeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeStore {
    pub fn new() -> Self {
        Self {
            owners: DashMap::new(),
        }
    }

    /// Append one measurement, creating owner and unit records on first
    /// sight. Returns the unit's post-append view.
    pub fn record(&self, event: &MeasurementEvent, sample_cap: usize) -> Recorded {
        let owner = self
            .owners
            .entry(event.owner_id)
            .or_insert_with(|| Arc::new(OwnerRecord::new(event.owner_id)))
            .clone();

        if !event.owner_name.is_empty() {
            let mut name = owner.display_name.write().expect("name lock");
            if *name != event.owner_name {
                *name = event.owner_name.clone();
            }
        }

        let mut unit = owner.units.entry(event.unit_id).or_insert_with(|| {
            debug!(
                owner_id = event.owner_id,
                unit_id = event.unit_id,
                unit_name = %event.unit_name,
                "Tracking new unit"
            );
            UnitRecord::new(
                event.unit_id,
                event.unit_name.clone(),
                event.grid_name.clone(),
                sample_cap,
            )
        });

        if unit.unit_name != event.unit_name {
            unit.unit_name = event.unit_name.clone();
        }
        if unit.grid_name != event.grid_name {
            unit.grid_name = event.grid_name.clone();
        }
        unit.window.push(event.duration_ms, sample_cap);
        unit.last_activity = Instant::now();

        Recorded {
            last_ms: unit.window.last(),
            avg_ms: unit.window.average(),
        }
    }

    /// Run `f` against one unit's mutable record. Returns `None` when the
    /// owner or unit is not tracked.
    ///
    /// The closure runs under the unit's shard lock; callers must not
    /// re-enter the store or await inside it.
    pub fn with_unit_mut<R>(
        &self,
        owner_id: u64,
        unit_id: u64,
        f: impl FnOnce(&mut UnitRecord) -> R,
    ) -> Option<R> {
        let owner = self.owners.get(&owner_id)?.clone();
        let mut unit = owner.units.get_mut(&unit_id)?;
        Some(f(&mut unit))
    }

    /// Clear a unit's sample and offense state after its program was
    /// recompiled. The unit stays tracked; the startup-grace clock
    /// restarts and the recompile counter advances by one.
    pub fn reset_unit(&self, owner_id: u64, unit_id: u64) -> bool {
        self.with_unit_mut(owner_id, unit_id, |unit| {
            unit.window.clear();
            unit.offenses.clear();
            unit.recompiles += 1;
            unit.first_seen = Instant::now();
            unit.grace_elapsed = false;
        })
        .is_some()
    }

    pub fn owner_count(&self) -> usize {
        self.owners.len()
    }

    pub fn unit_count(&self) -> usize {
        self.owners.iter().map(|o| o.units.len()).sum()
    }

    /// Per-unit projections for one owner, or `None` if untracked
    pub fn owner_units(&self, owner_id: u64, node_id: u64) -> Option<Vec<UnitSnapshot>> {
        let owner = self.owners.get(&owner_id)?;
        Some(owner.units.iter().map(|u| u.snapshot(node_id)).collect())
    }

    /// Snapshot of one owner for reporting
    pub fn snapshot_owner(
        &self,
        owner_id: u64,
        node_id: u64,
        config: &ConfigHandle,
    ) -> Option<OwnerReport> {
        let owner = self.owners.get(&owner_id)?;
        Some(OwnerReport {
            owner_id,
            owner_name: owner.display_name(),
            privileged: config.is_privileged(owner_id),
            units: owner.units.iter().map(|u| u.snapshot(node_id)).collect(),
        })
    }

    /// Snapshot every tracked owner for reporting or cluster exchange
    pub fn snapshot_owners(&self, node_id: u64, config: &ConfigHandle) -> Vec<OwnerReport> {
        self.owners
            .iter()
            .map(|entry| OwnerReport {
                owner_id: entry.owner_id,
                owner_name: entry.display_name(),
                privileged: config.is_privileged(entry.owner_id),
                units: entry.units.iter().map(|u| u.snapshot(node_id)).collect(),
            })
            .collect()
    }

    /// Owner-wide runtime sums for the combined-limit sweep
    pub fn owner_totals(&self) -> Vec<OwnerTotals> {
        self.owners
            .iter()
            .map(|entry| {
                let mut totals = OwnerTotals {
                    owner_id: entry.owner_id,
                    sum_last_ms: 0.0,
                    sum_avg_ms: 0.0,
                    unit_ids: Vec::with_capacity(entry.units.len()),
                };
                for unit in entry.units.iter() {
                    totals.sum_last_ms += unit.window.last();
                    totals.sum_avg_ms += unit.window.average();
                    totals.unit_ids.push(unit.unit_id);
                }
                totals
            })
            .collect()
    }

    /// Remove units whose external handle is gone or that have been idle
    /// past `idle_timeout`, then owners left with zero units.
    pub async fn cleanup(
        &self,
        sink: &dyn EnforcementSink,
        idle_timeout: Duration,
    ) -> CleanupStats {
        let mut stats = CleanupStats::default();

        let owner_ids: Vec<u64> = self.owners.iter().map(|o| o.owner_id).collect();
        for owner_id in owner_ids {
            let Some(owner) = self.owners.get(&owner_id).map(|o| o.clone()) else {
                continue;
            };

            let unit_ids: Vec<u64> = owner.units.iter().map(|u| u.unit_id).collect();
            for unit_id in unit_ids {
                let idle = owner
                    .units
                    .get(&unit_id)
                    .map(|u| u.last_activity.elapsed() > idle_timeout)
                    .unwrap_or(false);
                let gone = !sink.exists(owner_id, unit_id).await;

                if idle || gone {
                    if owner.units.remove(&unit_id).is_some() {
                        debug!(owner_id, unit_id, idle, gone, "Dropped tracked unit");
                        stats.units_removed += 1;
                    }
                }
            }

            if owner.units.is_empty() && self.owners.remove_if(&owner_id, |_, o| o.units.is_empty()).is_some() {
                debug!(owner_id, "Dropped owner with no live units");
                stats.owners_removed += 1;
            }
        }

        stats
    }
}

/// Counts from one cleanup pass
#[derive(Debug, Default, Clone, Copy)]
pub struct CleanupStats {
    pub units_removed: usize,
    pub owners_removed: usize,
}

/// Periodic cleanup sweep over the store
pub async fn run_cleanup_loop(
    store: Arc<RuntimeStore>,
    sink: Arc<dyn EnforcementSink>,
    config: Arc<ConfigHandle>,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let cfg = config.snapshot();
    info!(
        interval_secs = cfg.cleanup_interval_secs,
        "Starting store cleanup sweep"
    );
    let mut ticker = interval(Duration::from_secs(cfg.cleanup_interval_secs.max(1)));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let idle = Duration::from_secs(config.snapshot().idle_unit_timeout_secs);
                let stats = store.cleanup(sink.as_ref(), idle).await;
                if stats.units_removed > 0 || stats.owners_removed > 0 {
                    info!(
                        units_removed = stats.units_removed,
                        owners_removed = stats.owners_removed,
                        "Cleanup pass complete"
                    );
                }
            }
            _ = shutdown.recv() => {
                info!("Shutting down store cleanup sweep");
                break;
            }
        }
    }
}
