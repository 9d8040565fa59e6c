use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use farmhand_storage::Database;
use farmhand_util::{AppConfig, AuditDefaults};
use metrics_exporter_prometheus::PrometheusHandle;

use crate::dashboard::DashboardService;
use crate::worker::WorkerService;
use crate::{ipc, telemetry};

#[derive(Clone)]
pub struct AppState {
    metrics: PrometheusHandle,
    storage: Database,
    audit: AuditDefaults,
    workers: WorkerService,
    dashboard: DashboardService,
}

impl AppState {
    pub fn new(metrics: PrometheusHandle, storage: Database, config: &AppConfig) -> Self {
        let clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync> = Arc::new(Utc::now);
        Self {
            metrics,
            workers: WorkerService::new(storage.clone(), clock),
            dashboard: DashboardService::new(storage.clone(), config.dashboard_activity_limit),
            storage,
            audit: config.audit.clone(),
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.workers = WorkerService::new(self.storage.clone(), clock);
        self
    }

    pub fn metrics(&self) -> &PrometheusHandle {
        &self.metrics
    }

    pub fn storage(&self) -> &Database {
        &self.storage
    }

    pub fn audit_defaults(&self) -> &AuditDefaults {
        &self.audit
    }

    pub fn workers(&self) -> &WorkerService {
        &self.workers
    }

    pub fn dashboard(&self) -> &DashboardService {
        &self.dashboard
    }
}

pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .route("/ipc", post(ipc::handle))
        .with_state(state)
}

async fn healthz(State(state): State<AppState>) -> StatusCode {
    match sqlx::query("SELECT 1").execute(state.storage().pool()).await {
        Ok(_) => StatusCode::OK,
        Err(err) => {
            tracing::error!(stage = "storage", error = %err, "health check query failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    let body = telemetry::render_metrics(state.metrics());
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        Body::from(body),
    )
        .into_response()
}
