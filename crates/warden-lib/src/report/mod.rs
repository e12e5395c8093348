//! Report aggregation
//!
//! Builds per-owner snapshots from the runtime store, merges peer
//! snapshots collected over the cluster, and renders the human-readable
//! summary.

mod aggregator;
mod render;
mod snapshot;

pub use aggregator::{ReportAggregator, POLL_ATTEMPTS, POLL_INTERVAL};
pub use render::{render_owner_section, render_report, ReportMeta};
pub use snapshot::{merge_into, sorted_owners};
