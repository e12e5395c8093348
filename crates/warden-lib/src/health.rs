//! Component health tracking for liveness and readiness probes

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Health of one warden component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentState {
    /// Working normally
    Up,
    /// Impaired but still operating
    Degraded,
    /// Not operating
    Down,
}

/// One component's current state with an optional explanation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub state: ComponentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: i64,
}

impl ComponentReport {
    fn now(state: ComponentState, detail: Option<String>) -> Self {
        Self {
            state,
            detail,
            checked_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Aggregated health response for the probe endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSummary {
    pub state: ComponentState,
    pub components: HashMap<String, ComponentReport>,
}

/// Readiness response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessSummary {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names registered by the daemon
pub mod components {
    pub const STORE: &str = "store";
    pub const SWEEPER: &str = "sweeper";
    pub const CLUSTER: &str = "cluster";
    pub const REPORTER: &str = "reporter";
}

/// Tracks per-component health and overall readiness
#[derive(Clone, Default)]
pub struct HealthRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

#[derive(Default)]
struct RegistryState {
    components: HashMap<String, ComponentReport>,
    ready: bool,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component as up
    pub async fn register(&self, name: &str) {
        self.inner
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentReport::now(ComponentState::Up, None));
    }

    pub async fn mark_up(&self, name: &str) {
        self.set(name, ComponentState::Up, None).await;
    }

    pub async fn mark_degraded(&self, name: &str, detail: impl Into<String>) {
        self.set(name, ComponentState::Degraded, Some(detail.into()))
            .await;
    }

    pub async fn mark_down(&self, name: &str, detail: impl Into<String>) {
        self.set(name, ComponentState::Down, Some(detail.into()))
            .await;
    }

    async fn set(&self, name: &str, state: ComponentState, detail: Option<String>) {
        self.inner
            .write()
            .await
            .components
            .insert(name.to_string(), ComponentReport::now(state, detail));
    }

    pub async fn set_ready(&self, ready: bool) {
        self.inner.write().await.ready = ready;
    }

    /// Overall health: down if any component is down, degraded if any is
    /// degraded, otherwise up.
    pub async fn summary(&self) -> HealthSummary {
        let state = self.inner.read().await;
        let mut overall = ComponentState::Up;
        for report in state.components.values() {
            match report.state {
                ComponentState::Down => {
                    overall = ComponentState::Down;
                    break;
                }
                ComponentState::Degraded => overall = ComponentState::Degraded,
                ComponentState::Up => {}
            }
        }
        HealthSummary {
            state: overall,
            components: state.components.clone(),
        }
    }

    /// Ready only after startup completed and no component is down
    pub async fn readiness(&self) -> ReadinessSummary {
        let summary = self.summary().await;
        let state = self.inner.read().await;
        if !state.ready {
            return ReadinessSummary {
                ready: false,
                reason: Some("starting up".to_string()),
            };
        }
        if summary.state == ComponentState::Down {
            return ReadinessSummary {
                ready: false,
                reason: Some("a component is down".to_string()),
            };
        }
        ReadinessSummary {
            ready: true,
            reason: None,
        }
    }
}
