//! Text rendering of merged report data
//!
//! Produces the deterministic multi-section summary: overall statistics,
//! per-node totals, then one section per owner with a per-unit breakdown.
//! Superlatives are single-pass maximum tracking; ties keep the candidate
//! seen first.

use crate::models::{OwnerReport, UnitSnapshot};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Context lines for the report header
#[derive(Debug, Clone)]
pub struct ReportMeta {
    pub node_id: u64,
    pub generated_at: chrono::DateTime<chrono::Utc>,
    pub cluster_requested: bool,
    pub peers_known: usize,
    pub peers_responded: usize,
}

impl ReportMeta {
    pub fn is_partial(&self) -> bool {
        self.cluster_requested && self.peers_responded < self.peers_known
    }
}

struct Superlatives<'a> {
    hottest_unit_last: Option<(&'a OwnerReport, &'a UnitSnapshot)>,
    hottest_unit_avg: Option<(&'a OwnerReport, &'a UnitSnapshot)>,
    hottest_owner_last: Option<(&'a OwnerReport, f64)>,
    hottest_owner_avg: Option<(&'a OwnerReport, f64)>,
    most_units: Option<&'a OwnerReport>,
    most_offenses: Option<(&'a OwnerReport, &'a UnitSnapshot)>,
    most_recompiles: Option<(&'a OwnerReport, &'a UnitSnapshot)>,
}

fn scan(owners: &[OwnerReport]) -> Superlatives<'_> {
    let mut s = Superlatives {
        hottest_unit_last: None,
        hottest_unit_avg: None,
        hottest_owner_last: None,
        hottest_owner_avg: None,
        most_units: None,
        most_offenses: None,
        most_recompiles: None,
    };

    for owner in owners {
        let mut owner_last = 0.0;
        let mut owner_avg = 0.0;
        for unit in &owner.units {
            owner_last += unit.last_duration_ms;
            owner_avg += unit.avg_duration_ms;

            if s.hottest_unit_last
                .map(|(_, u)| unit.last_duration_ms > u.last_duration_ms)
                .unwrap_or(true)
            {
                s.hottest_unit_last = Some((owner, unit));
            }
            if s.hottest_unit_avg
                .map(|(_, u)| unit.avg_duration_ms > u.avg_duration_ms)
                .unwrap_or(true)
            {
                s.hottest_unit_avg = Some((owner, unit));
            }
            if s.most_offenses
                .map(|(_, u)| unit.offenses > u.offenses)
                .unwrap_or(true)
            {
                s.most_offenses = Some((owner, unit));
            }
            if s.most_recompiles
                .map(|(_, u)| unit.recompiles > u.recompiles)
                .unwrap_or(true)
            {
                s.most_recompiles = Some((owner, unit));
            }
        }

        if s.hottest_owner_last
            .map(|(_, last)| owner_last > last)
            .unwrap_or(true)
        {
            s.hottest_owner_last = Some((owner, owner_last));
        }
        if s.hottest_owner_avg
            .map(|(_, avg)| owner_avg > avg)
            .unwrap_or(true)
        {
            s.hottest_owner_avg = Some((owner, owner_avg));
        }
        if s.most_units
            .map(|o| owner.units.len() > o.units.len())
            .unwrap_or(true)
        {
            s.most_units = Some(owner);
        }
    }

    s
}

fn owner_label(owner: &OwnerReport) -> String {
    if owner.owner_name.is_empty() {
        format!("owner #{}", owner.owner_id)
    } else {
        format!("{} (#{})", owner.owner_name, owner.owner_id)
    }
}

/// Render the full multi-section report
pub fn render_report(owners: &[OwnerReport], meta: &ReportMeta) -> String {
    let mut out = String::new();
    let unit_count: usize = owners.iter().map(|o| o.units.len()).sum();
    let offense_count: u64 = owners
        .iter()
        .flat_map(|o| o.units.iter())
        .map(|u| u.offenses as u64)
        .sum();

    let _ = writeln!(out, "=== Runtime Warden Report ===");
    let _ = writeln!(
        out,
        "Generated {} on node {}",
        meta.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
        meta.node_id
    );
    let _ = writeln!(
        out,
        "Owners: {}  Units: {}  Offenses: {}",
        owners.len(),
        unit_count,
        offense_count
    );
    if meta.cluster_requested {
        let _ = writeln!(
            out,
            "Peers responded: {}/{}{}",
            meta.peers_responded,
            meta.peers_known,
            if meta.is_partial() {
                "  (partial: not all peers answered in time)"
            } else {
                ""
            }
        );
    }

    if owners.is_empty() {
        let _ = writeln!(out, "\nNo tracked units.");
        return out;
    }

    let s = scan(owners);
    let _ = writeln!(out, "\n-- Overall --");
    if let Some((owner, unit)) = s.hottest_unit_last {
        let _ = writeln!(
            out,
            "Hottest unit by last run: '{}' of {} at {:.3} ms",
            unit.unit_name,
            owner_label(owner),
            unit.last_duration_ms
        );
    }
    if let Some((owner, unit)) = s.hottest_unit_avg {
        let _ = writeln!(
            out,
            "Hottest unit by average:  '{}' of {} at {:.3} ms",
            unit.unit_name,
            owner_label(owner),
            unit.avg_duration_ms
        );
    }
    if let Some((owner, last)) = s.hottest_owner_last {
        let _ = writeln!(
            out,
            "Hottest owner by last run: {} at {:.3} ms",
            owner_label(owner),
            last
        );
    }
    if let Some((owner, avg)) = s.hottest_owner_avg {
        let _ = writeln!(
            out,
            "Hottest owner by average:  {} at {:.3} ms",
            owner_label(owner),
            avg
        );
    }
    if let Some(owner) = s.most_units {
        let _ = writeln!(
            out,
            "Most units: {} with {}",
            owner_label(owner),
            owner.units.len()
        );
    }
    if let Some((owner, unit)) = s.most_offenses {
        let _ = writeln!(
            out,
            "Most offenses: '{}' of {} with {}",
            unit.unit_name,
            owner_label(owner),
            unit.offenses
        );
    }
    if let Some((owner, unit)) = s.most_recompiles {
        let _ = writeln!(
            out,
            "Most recompiles: '{}' of {} with {}",
            unit.unit_name,
            owner_label(owner),
            unit.recompiles
        );
    }

    // Per-node totals, ordered by node id
    let mut node_totals: BTreeMap<u64, (usize, f64, f64)> = BTreeMap::new();
    for unit in owners.iter().flat_map(|o| o.units.iter()) {
        let entry = node_totals.entry(unit.node_id).or_insert((0, 0.0, 0.0));
        entry.0 += 1;
        entry.1 += unit.last_duration_ms;
        entry.2 += unit.avg_duration_ms;
    }
    let _ = writeln!(out, "\n-- Node totals --");
    for (node_id, (units, last, avg)) in &node_totals {
        let _ = writeln!(
            out,
            "node {}: {} units, {:.3} ms last, {:.3} ms avg",
            node_id, units, last, avg
        );
    }

    for owner in owners {
        out.push('\n');
        out.push_str(&render_owner_section(owner));
    }

    out
}

/// Render one owner's section with a per-unit breakdown
pub fn render_owner_section(owner: &OwnerReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "-- {}{} --",
        owner_label(owner),
        if owner.privileged { " [privileged]" } else { "" }
    );
    if owner.units.is_empty() {
        let _ = writeln!(out, "  no tracked units");
        return out;
    }
    for unit in &owner.units {
        let _ = writeln!(
            out,
            "  unit {} '{}' @ {} (node {}): last {:.3} ms, avg {:.3} ms, offenses {}, recompiles {}",
            unit.unit_id,
            unit.unit_name,
            unit.grid_name,
            unit.node_id,
            unit.last_duration_ms,
            unit.avg_duration_ms,
            unit.offenses,
            unit.recompiles
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(id: u64, last: f64, avg: f64, offenses: u32, recompiles: u32) -> UnitSnapshot {
        UnitSnapshot {
            unit_id: id,
            unit_name: format!("unit-{}", id),
            grid_name: "grid".to_string(),
            node_id: 0,
            last_duration_ms: last,
            avg_duration_ms: avg,
            offenses,
            recompiles,
        }
    }

    fn meta() -> ReportMeta {
        ReportMeta {
            node_id: 0,
            generated_at: chrono::DateTime::from_timestamp(1_700_000_000, 0)
                .expect("valid timestamp"),
            cluster_requested: false,
            peers_known: 0,
            peers_responded: 0,
        }
    }

    fn owners() -> Vec<OwnerReport> {
        vec![
            OwnerReport {
                owner_id: 1,
                owner_name: "alice".to_string(),
                privileged: false,
                units: vec![unit(10, 3.0, 1.0, 2, 0), unit(11, 1.0, 2.5, 0, 4)],
            },
            OwnerReport {
                owner_id: 2,
                owner_name: "bob".to_string(),
                privileged: true,
                units: vec![unit(20, 0.5, 0.2, 1, 1)],
            },
        ]
    }

    #[test]
    fn report_contains_all_sections() {
        let text = render_report(&owners(), &meta());
        assert!(text.contains("=== Runtime Warden Report ==="));
        assert!(text.contains("-- Overall --"));
        assert!(text.contains("-- Node totals --"));
        assert!(text.contains("-- alice (#1) --"));
        assert!(text.contains("-- bob (#2) [privileged] --"));
        assert!(text.contains("Owners: 2  Units: 3"));
    }

    #[test]
    fn superlatives_pick_expected_candidates() {
        let text = render_report(&owners(), &meta());
        assert!(text.contains("Hottest unit by last run: 'unit-10' of alice (#1) at 3.000 ms"));
        assert!(text.contains("Hottest unit by average:  'unit-11' of alice (#1) at 2.500 ms"));
        assert!(text.contains("Most units: alice (#1) with 2"));
        assert!(text.contains("Most offenses: 'unit-10' of alice (#1) with 2"));
        assert!(text.contains("Most recompiles: 'unit-11' of alice (#1) with 4"));
    }

    #[test]
    fn ties_keep_first_seen_candidate() {
        let tied = vec![
            OwnerReport {
                owner_id: 1,
                owner_name: "first".to_string(),
                privileged: false,
                units: vec![unit(10, 2.0, 2.0, 1, 1)],
            },
            OwnerReport {
                owner_id: 2,
                owner_name: "second".to_string(),
                privileged: false,
                units: vec![unit(20, 2.0, 2.0, 1, 1)],
            },
        ];
        let text = render_report(&tied, &meta());
        assert!(text.contains("Hottest unit by last run: 'unit-10' of first (#1)"));
        assert!(text.contains("Hottest owner by last run: first (#1)"));
    }

    #[test]
    fn empty_report_says_so() {
        let text = render_report(&[], &meta());
        assert!(text.contains("No tracked units."));
    }

    #[test]
    fn partial_cluster_report_is_flagged() {
        let mut m = meta();
        m.cluster_requested = true;
        m.peers_known = 3;
        m.peers_responded = 1;
        let text = render_report(&owners(), &m);
        assert!(text.contains("Peers responded: 1/3  (partial"));
    }

    #[test]
    fn owner_section_lists_every_unit() {
        let section = render_owner_section(&owners()[0]);
        assert!(section.contains("unit 10"));
        assert!(section.contains("unit 11"));
        assert!(section.contains("offenses 2"));
    }
}
