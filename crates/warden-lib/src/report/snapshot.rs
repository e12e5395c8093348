//! Snapshot merging for report aggregation

use crate::models::OwnerReport;
use std::collections::HashMap;

/// Merge snapshots into the per-owner accumulation map.
///
/// Two snapshots sharing an owner id have their unit lists concatenated;
/// units are never deduplicated across nodes.
pub fn merge_into(merged: &mut HashMap<u64, OwnerReport>, reports: Vec<OwnerReport>) {
    for report in reports {
        match merged.get_mut(&report.owner_id) {
            Some(existing) => existing.absorb(report),
            None => {
                merged.insert(report.owner_id, report);
            }
        }
    }
}

/// Deterministic owner ordering for rendering
pub fn sorted_owners(merged: HashMap<u64, OwnerReport>) -> Vec<OwnerReport> {
    let mut owners: Vec<OwnerReport> = merged.into_values().collect();
    owners.sort_by_key(|o| o.owner_id);
    owners
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UnitSnapshot;

    fn report(owner: u64, units: &[(u64, u64)]) -> OwnerReport {
        OwnerReport {
            owner_id: owner,
            owner_name: format!("owner-{}", owner),
            privileged: false,
            units: units
                .iter()
                .map(|&(unit, node)| UnitSnapshot {
                    unit_id: unit,
                    unit_name: format!("unit-{}", unit),
                    grid_name: "grid".to_string(),
                    node_id: node,
                    last_duration_ms: 1.0,
                    avg_duration_ms: 0.5,
                    offenses: 0,
                    recompiles: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn merge_concatenates_same_owner_across_nodes() {
        let mut merged = HashMap::new();
        merge_into(&mut merged, vec![report(1, &[(10, 0)]), report(2, &[(20, 0)])]);
        merge_into(&mut merged, vec![report(1, &[(10, 5), (11, 5)])]);

        assert_eq!(merged.len(), 2);
        // Same unit id from another node is a second entry, not a merge
        assert_eq!(merged[&1].units.len(), 3);
        assert_eq!(merged[&2].units.len(), 1);
    }

    #[test]
    fn sorted_owners_orders_by_id() {
        let mut merged = HashMap::new();
        merge_into(
            &mut merged,
            vec![report(9, &[]), report(2, &[]), report(5, &[])],
        );
        let owners = sorted_owners(merged);
        let ids: Vec<u64> = owners.iter().map(|o| o.owner_id).collect();
        assert_eq!(ids, vec![2, 5, 9]);
    }
}
