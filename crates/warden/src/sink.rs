//! Logging enforcement sink
//!
//! Stand-in sink for deployments where the warden observes and reports
//! but the hosting application has not wired a real enforcement backend.
//! Every action is logged; units are always treated as present.

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};
use warden_lib::EnforcementSink;

#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EnforcementSink for LogSink {
    async fn request_graceful_stop(
        &self,
        owner_id: u64,
        unit_id: u64,
        grace_secs: u64,
    ) -> Result<()> {
        info!(
            event = "graceful_stop_requested",
            owner_id,
            unit_id,
            grace_secs,
            "Asked unit to stop on its own"
        );
        Ok(())
    }

    async fn disable(&self, owner_id: u64, unit_id: u64) -> Result<()> {
        warn!(event = "unit_disabled", owner_id, unit_id, "Disabled unit");
        Ok(())
    }

    async fn apply_damage(
        &self,
        owner_id: u64,
        unit_id: u64,
        amount: f64,
        lethal: bool,
    ) -> Result<()> {
        warn!(
            event = "unit_damaged",
            owner_id,
            unit_id,
            amount,
            lethal,
            "Applied damage to unit"
        );
        Ok(())
    }

    async fn notify_owner(&self, owner_id: u64, message: String) {
        info!(event = "owner_notified", owner_id, message = %message, "Owner notification");
    }

    async fn exists(&self, _owner_id: u64, _unit_id: u64) -> bool {
        true
    }
}
