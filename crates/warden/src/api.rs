//! HTTP API: measurement ingestion, report and limit queries, control
//! switches, cluster pushes, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use warden_lib::{
    ClusterSync, ComponentState, HealthRegistry, MeasurementEvent, PunishmentEngine,
    ReportAggregator,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: PunishmentEngine,
    pub aggregator: Arc<ReportAggregator>,
    pub cluster: Arc<ClusterSync>,
    pub health: HealthRegistry,
}

impl AppState {
    pub fn new(
        engine: PunishmentEngine,
        aggregator: Arc<ReportAggregator>,
        cluster: Arc<ClusterSync>,
        health: HealthRegistry,
    ) -> Self {
        Self {
            engine,
            aggregator,
            cluster,
            health,
        }
    }
}

/// Health check - 200 while operational, 503 when a component is down
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = state.health.summary().await;
    let status_code = match summary.state {
        ComponentState::Up | ComponentState::Degraded => StatusCode::OK,
        ComponentState::Down => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(summary))
}

/// Readiness check - 200 once startup finished and nothing is down
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;
    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// One measurement event from the hosting application
async fn ingest_measurement(
    State(state): State<Arc<AppState>>,
    Json(event): Json<MeasurementEvent>,
) -> impl IntoResponse {
    state.engine.observe(&event).await;
    StatusCode::ACCEPTED
}

#[derive(Debug, Deserialize)]
struct RecompileNotice {
    owner_id: u64,
    unit_id: u64,
}

#[derive(Debug, Serialize)]
struct RecompileOutcome {
    reset: bool,
}

/// The host recompiled a unit's program
async fn notify_recompile(
    State(state): State<Arc<AppState>>,
    Json(notice): Json<RecompileNotice>,
) -> impl IntoResponse {
    let reset = state.engine.handle_recompile(notice.owner_id, notice.unit_id);
    (StatusCode::OK, Json(RecompileOutcome { reset }))
}

#[derive(Debug, Deserialize)]
struct ReportQuery {
    #[serde(default)]
    cluster: bool,
}

async fn report(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportQuery>,
) -> impl IntoResponse {
    state.aggregator.generate(query.cluster).await
}

async fn owner_report(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<u64>,
) -> impl IntoResponse {
    state.aggregator.self_report(owner_id)
}

async fn owner_limits(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<u64>,
) -> impl IntoResponse {
    Json(state.engine.config().effective_limits(owner_id))
}

async fn owner_runtimes(
    State(state): State<Arc<AppState>>,
    Path(owner_id): Path<u64>,
) -> impl IntoResponse {
    let node_id = state.engine.config().snapshot().node_id;
    match state.engine.store().owner_units(owner_id, node_id) {
        Some(units) => (StatusCode::OK, Json(units)).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "owner not tracked"})),
        )
            .into_response(),
    }
}

#[derive(Debug, Serialize)]
struct StatusSummary {
    enabled: bool,
    node_id: u64,
    owners_tracked: usize,
    units_tracked: usize,
    cluster_enabled: bool,
    peers_known: usize,
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let cfg = state.engine.config().snapshot();
    Json(StatusSummary {
        enabled: cfg.enabled,
        node_id: cfg.node_id,
        owners_tracked: state.engine.store().owner_count(),
        units_tracked: state.engine.store().unit_count(),
        cluster_enabled: cfg.cluster_enabled,
        peers_known: state.cluster.peer_count(),
    })
}

async fn enable(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.engine.config().set_enabled(true);
    info!("Warden enabled via API");
    StatusCode::OK
}

async fn disable(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.engine.config().set_enabled(false);
    info!("Warden disabled via API");
    StatusCode::OK
}

async fn push_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.cluster.push_settings() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({"pushed": true}))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

#[derive(Debug, Deserialize)]
struct PushOverrideRequest {
    owner_id: u64,
}

async fn push_override(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PushOverrideRequest>,
) -> impl IntoResponse {
    match state.cluster.push_override(request.owner_id) {
        Ok(true) => (StatusCode::OK, Json(serde_json::json!({"pushed": true}))),
        Ok(false) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"error": "owner has no override"})),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({"error": e.to_string()})),
        ),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/measurements", post(ingest_measurement))
        .route("/recompiles", post(notify_recompile))
        .route("/report", get(report))
        .route("/owners/:owner_id/report", get(owner_report))
        .route("/owners/:owner_id/limits", get(owner_limits))
        .route("/owners/:owner_id/runtimes", get(owner_runtimes))
        .route("/status", get(status))
        .route("/enable", post(enable))
        .route("/disable", post(disable))
        .route("/cluster/push-settings", post(push_settings))
        .route("/cluster/push-override", post(push_override))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
