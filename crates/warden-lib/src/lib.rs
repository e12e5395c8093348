//! Core library for the runtime warden
//!
//! This crate provides:
//! - Runtime sample tracking per owner and unit
//! - Offense escalation and punishment enforcement
//! - Owner-wide combined limit sweeps
//! - Report aggregation across cluster peers
//! - Health checks and observability

pub mod cluster;
pub mod combined;
pub mod config;
pub mod enforcement;
pub mod engine;
pub mod health;
pub mod models;
pub mod observability;
pub mod offense;
pub mod report;
pub mod store;

pub use cluster::{ClusterSync, ClusterTransport, LoopbackTransport};
pub use config::{ConfigHandle, EffectiveLimits, PrivilegedOverride, WardenConfig};
pub use engine::PunishmentEngine;
pub use enforcement::EnforcementSink;
pub use health::{ComponentState, HealthRegistry, HealthSummary, ReadinessSummary};
pub use models::*;
pub use observability::{WardenLogger, WardenMetrics};
pub use report::ReportAggregator;
pub use store::RuntimeStore;
