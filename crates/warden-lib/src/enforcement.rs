//! Enforcement sink seam
//!
//! The warden never touches a workload directly. Disabling, damaging and
//! notifying all go through this capability, implemented by the hosting
//! application.

use anyhow::Result;
use async_trait::async_trait;

/// External capability that carries out corrective actions.
///
/// Methods addressing a unit return an error when the unit's external
/// handle is gone; callers log and abort that single action.
#[async_trait]
pub trait EnforcementSink: Send + Sync {
    /// Ask the unit to stop on its own within `grace_secs`
    async fn request_graceful_stop(&self, owner_id: u64, unit_id: u64, grace_secs: u64)
        -> Result<()>;

    /// Disable the unit; the host marks it for re-instantiation
    async fn disable(&self, owner_id: u64, unit_id: u64) -> Result<()>;

    /// Apply damage. With `lethal` set the host applies remaining
    /// structural integrity minus one, ignoring `amount`.
    async fn apply_damage(&self, owner_id: u64, unit_id: u64, amount: f64, lethal: bool)
        -> Result<()>;

    /// Deliver a user-facing message; the host suppresses delivery when
    /// the owner is not reachable.
    async fn notify_owner(&self, owner_id: u64, message: String);

    /// Whether the unit's external handle still exists
    async fn exists(&self, owner_id: u64, unit_id: u64) -> bool;
}

/// One observed sink call, for assertions in tests and for the demo sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkAction {
    GracefulStop {
        owner_id: u64,
        unit_id: u64,
        grace_secs: u64,
    },
    Disable {
        owner_id: u64,
        unit_id: u64,
    },
    Damage {
        owner_id: u64,
        unit_id: u64,
        amount: f64,
        lethal: bool,
    },
    Notify {
        owner_id: u64,
        message: String,
    },
}

/// In-memory sink that records every call.
///
/// Units listed as gone produce handle-absent errors, mirroring a host
/// whose workload disappeared between decision and action.
#[derive(Default)]
pub struct RecordingSink {
    actions: std::sync::Mutex<Vec<SinkAction>>,
    gone: std::sync::Mutex<std::collections::HashSet<(u64, u64)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<SinkAction> {
        self.actions.lock().expect("sink lock").clone()
    }

    pub fn mark_gone(&self, owner_id: u64, unit_id: u64) {
        self.gone
            .lock()
            .expect("sink lock")
            .insert((owner_id, unit_id));
    }

    fn is_gone(&self, owner_id: u64, unit_id: u64) -> bool {
        self.gone
            .lock()
            .expect("sink lock")
            .contains(&(owner_id, unit_id))
    }

    fn record(&self, action: SinkAction) {
        self.actions.lock().expect("sink lock").push(action);
    }
}

#[async_trait]
impl EnforcementSink for RecordingSink {
    async fn request_graceful_stop(
        &self,
        owner_id: u64,
        unit_id: u64,
        grace_secs: u64,
    ) -> Result<()> {
        if self.is_gone(owner_id, unit_id) {
            anyhow::bail!("unit {}/{} handle is gone", owner_id, unit_id);
        }
        self.record(SinkAction::GracefulStop {
            owner_id,
            unit_id,
            grace_secs,
        });
        Ok(())
    }

    async fn disable(&self, owner_id: u64, unit_id: u64) -> Result<()> {
        if self.is_gone(owner_id, unit_id) {
            anyhow::bail!("unit {}/{} handle is gone", owner_id, unit_id);
        }
        self.record(SinkAction::Disable { owner_id, unit_id });
        Ok(())
    }

    async fn apply_damage(
        &self,
        owner_id: u64,
        unit_id: u64,
        amount: f64,
        lethal: bool,
    ) -> Result<()> {
        if self.is_gone(owner_id, unit_id) {
            anyhow::bail!("unit {}/{} handle is gone", owner_id, unit_id);
        }
        self.record(SinkAction::Damage {
            owner_id,
            unit_id,
            amount,
            lethal,
        });
        Ok(())
    }

    async fn notify_owner(&self, owner_id: u64, message: String) {
        self.record(SinkAction::Notify { owner_id, message });
    }

    async fn exists(&self, owner_id: u64, unit_id: u64) -> bool {
        !self.is_gone(owner_id, unit_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recording_sink_captures_calls_in_order() {
        let sink = RecordingSink::new();
        sink.request_graceful_stop(1, 2, 10).await.unwrap();
        sink.disable(1, 2).await.unwrap();
        sink.notify_owner(1, "hello".to_string()).await;

        let actions = sink.actions();
        assert_eq!(actions.len(), 3);
        assert_eq!(
            actions[0],
            SinkAction::GracefulStop {
                owner_id: 1,
                unit_id: 2,
                grace_secs: 10
            }
        );
    }

    #[tokio::test]
    async fn gone_units_error_but_notify_still_lands() {
        let sink = RecordingSink::new();
        sink.mark_gone(1, 2);

        assert!(!sink.exists(1, 2).await);
        assert!(sink.disable(1, 2).await.is_err());
        assert!(sink.apply_damage(1, 2, 5.0, false).await.is_err());

        sink.notify_owner(1, "unit vanished".to_string()).await;
        assert_eq!(sink.actions().len(), 1);
    }
}
