//! HTTP API for health checks, Prometheus metrics and the latest verdicts

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use fleet_lib::{
    health::{ComponentStatus, HealthRegistry},
    poll::CycleOutcome,
};
use anyhow::Context;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    /// Most recent cycle outcome, if any cycle has run
    pub latest: Arc<RwLock<Option<CycleOutcome>>>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry) -> Self {
        Self {
            health_registry,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// Record a finished cycle
    pub async fn record(&self, outcome: CycleOutcome) {
        self.health_registry.record_outcome(&outcome).await;
        *self.latest.write().await = Some(outcome);
    }
}

/// Returns 200 while operational, 503 once the inventory is unavailable
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Latest cycle outcome; 404 until the first cycle has finished
async fn decisions(State(state): State<Arc<AppState>>) -> Response {
    match state.latest.read().await.as_ref() {
        Some(outcome) => Json(outcome.clone()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/decisions", get(decisions))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind API server to {}", addr))?;
    axum::serve(listener, app).await.context("API server stopped")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use chrono::Utc;
    use fleet_lib::decision::DecisionSet;
    use fleet_lib::models::{Decision, Operation, Verdict};
    use fleet_lib::poll::CycleReport;
    use fleet_lib::FleetMetrics;
    use tower::ServiceExt;

    fn setup() -> (Router, Arc<AppState>) {
        let state = Arc::new(AppState::new(HealthRegistry::new()));
        (create_router(state.clone()), state)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if body.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, json)
    }

    fn completed_cycle() -> CycleOutcome {
        CycleOutcome::Completed(CycleReport {
            cycle: 1,
            started_at: Utc::now(),
            elapsed_ms: 12,
            selected: vec!["i-1".to_string()],
            decisions: DecisionSet {
                decisions: vec![Decision {
                    id: "i-1".to_string(),
                    mean_value: 35.0,
                    samples: 2,
                    verdict: Verdict::Reclaim,
                }],
                abstained: Vec::new(),
            },
            failures: Vec::new(),
            terminated: Vec::new(),
        })
    }

    #[tokio::test]
    async fn test_healthz_healthy_before_first_cycle() {
        let (app, state) = setup();
        state.health_registry.register_all().await;

        let (status, json) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "healthy");
    }

    #[tokio::test]
    async fn test_readyz_waits_for_first_cycle() {
        let (app, state) = setup();

        let (status, json) = get_json(app.clone(), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["ready"], false);

        state.record(completed_cycle()).await;
        let (status, json) = get_json(app, "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ready"], true);
    }

    #[tokio::test]
    async fn test_failed_cycle_makes_healthz_unavailable() {
        let (app, state) = setup();
        state
            .record(CycleOutcome::Failed {
                cycle: 1,
                operation: Operation::Snapshot,
                error: "throttled".to_string(),
            })
            .await;

        let (status, json) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json["components"]["inventory"]["status"], "unhealthy");
    }

    #[tokio::test]
    async fn test_decisions_endpoint() {
        let (app, state) = setup();

        let (status, _) = get_json(app.clone(), "/decisions").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        state.record(completed_cycle()).await;
        let (status, json) = get_json(app, "/decisions").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "completed");
        assert_eq!(json["decisions"]["decisions"][0]["verdict"], "reclaim");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let metrics = FleetMetrics::new();
        metrics.inc_cycles_completed();
        let (app, _) = setup();

        let response = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("fleet_monitor_cycles_completed_total"));
    }

    #[tokio::test]
    async fn test_serve_reports_port_in_use() {
        let taken = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        let (_, state) = setup();

        let err = serve(port, state).await.unwrap_err();
        assert!(err.to_string().contains(&port.to_string()));
    }
}
