//! Core data models for the runtime warden

use serde::{Deserialize, Serialize};

/// One measured execution of a tracked unit, delivered by the host's
/// execution framework once per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementEvent {
    pub owner_id: u64,
    pub unit_id: u64,
    pub unit_name: String,
    pub grid_name: String,
    #[serde(default)]
    pub owner_name: String,
    pub duration_ms: f64,
}

/// Corrective action applied to a unit once its offense budget is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishmentKind {
    /// Disable the unit; the host re-instantiates it later
    TurnOff,
    /// Lethal blow: damage equal to remaining integrity minus one
    Destroy,
    /// Fixed damage amount, then disable
    Damage,
}

impl PunishmentKind {
    /// Stable snake_case key for logs and metric labels
    pub fn key(&self) -> &'static str {
        match self {
            PunishmentKind::TurnOff => "turn_off",
            PunishmentKind::Destroy => "destroy",
            PunishmentKind::Damage => "damage",
        }
    }
}

impl std::fmt::Display for PunishmentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PunishmentKind::TurnOff => write!(f, "turn_off"),
            PunishmentKind::Destroy => write!(f, "destroy"),
            PunishmentKind::Damage => write!(f, "damage"),
        }
    }
}

/// Why a punishment fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PunishReason {
    SingleRuntimeOverLimit,
    AverageRuntimeOverLimit,
    CombinedRuntimeOverLimit,
    CombinedAverageRuntimeOverLimit,
    ExtremeUsage,
}

impl PunishReason {
    /// Stable snake_case key for logs and metric labels
    pub fn key(&self) -> &'static str {
        match self {
            PunishReason::SingleRuntimeOverLimit => "single_runtime_over_limit",
            PunishReason::AverageRuntimeOverLimit => "average_runtime_over_limit",
            PunishReason::CombinedRuntimeOverLimit => "combined_runtime_over_limit",
            PunishReason::CombinedAverageRuntimeOverLimit => "combined_average_runtime_over_limit",
            PunishReason::ExtremeUsage => "extreme_usage",
        }
    }
}

impl std::fmt::Display for PunishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PunishReason::SingleRuntimeOverLimit => "single runtime over limit",
            PunishReason::AverageRuntimeOverLimit => "average runtime over limit",
            PunishReason::CombinedRuntimeOverLimit => "combined runtime over limit",
            PunishReason::CombinedAverageRuntimeOverLimit => {
                "combined average runtime over limit"
            }
            PunishReason::ExtremeUsage => "extreme usage",
        };
        write!(f, "{}", s)
    }
}

/// Immutable projection of one tracked unit, used for reporting and
/// cluster exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitSnapshot {
    pub unit_id: u64,
    pub unit_name: String,
    pub grid_name: String,
    pub node_id: u64,
    pub last_duration_ms: f64,
    pub avg_duration_ms: f64,
    pub offenses: u32,
    pub recompiles: u32,
}

/// Immutable projection of one owner's current tracking state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerReport {
    pub owner_id: u64,
    pub owner_name: String,
    pub privileged: bool,
    pub units: Vec<UnitSnapshot>,
}

impl OwnerReport {
    /// Merge another snapshot for the same owner by concatenating unit
    /// lists. Units are not deduplicated across snapshots.
    pub fn absorb(&mut self, other: OwnerReport) {
        debug_assert_eq!(self.owner_id, other.owner_id);
        self.units.extend(other.units);
        if self.owner_name.is_empty() && !other.owner_name.is_empty() {
            self.owner_name = other.owner_name;
        }
        self.privileged = self.privileged || other.privileged;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u64, node: u64) -> UnitSnapshot {
        UnitSnapshot {
            unit_id: id,
            unit_name: format!("unit-{}", id),
            grid_name: "grid".to_string(),
            node_id: node,
            last_duration_ms: 1.0,
            avg_duration_ms: 0.5,
            offenses: 0,
            recompiles: 0,
        }
    }

    #[test]
    fn absorb_concatenates_without_dedup() {
        let mut a = OwnerReport {
            owner_id: 7,
            owner_name: "alice".to_string(),
            privileged: false,
            units: vec![unit(1, 0), unit(2, 0)],
        };
        let b = OwnerReport {
            owner_id: 7,
            owner_name: String::new(),
            privileged: true,
            units: vec![unit(1, 1), unit(3, 1)],
        };

        a.absorb(b);

        // Duplicate unit ids across nodes are kept
        assert_eq!(a.units.len(), 4);
        assert!(a.privileged);
        assert_eq!(a.owner_name, "alice");
    }

    #[test]
    fn measurement_event_owner_name_defaults_empty() {
        let json =
            r#"{"owner_id":1,"unit_id":2,"unit_name":"u","grid_name":"g","duration_ms":0.4}"#;
        let ev: MeasurementEvent = serde_json::from_str(json).unwrap();
        assert_eq!(ev.owner_name, "");
        assert!((ev.duration_ms - 0.4).abs() < f64::EPSILON);
    }
}
