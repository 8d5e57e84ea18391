//! # Admin/Status Surface (§10)
//!
//! A minimal axum router, not the full REST routing framework the
//! specification explicitly excludes as a plugin-facing feature: health,
//! a JSON metrics snapshot, a Prometheus text exposition, and worker-pool
//! introspection for operators. Structurally this plays the role the
//! teacher's `server::create_server` plays — build shared state, wire the
//! middleware stack, mount routes — trimmed from "the whole gateway's
//! request surface" to "what an operator needs to see into the runtime."

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

use crate::backend::worker_pool::WorkerPoolBackend;
use crate::backend::ExecutionBackend;
use crate::config::RuntimeConfig;
use crate::plugin::PluginRegistry;
use crate::scheduler::broker::JobBroker;

use crate::middleware::{logging_middleware, metrics_middleware};

/// Shared state for the admin surface. Not the capability context handlers
/// run under — this is operator-facing, read-only introspection.
pub struct AppState {
    pub config: Arc<RuntimeConfig>,
    pub registry: Arc<tokio::sync::RwLock<PluginRegistry>>,
    pub backend: Arc<dyn ExecutionBackend>,
    /// Present only when the worker-pool backend is active; gives the admin
    /// surface a health-check view the `ExecutionBackend` trait itself
    /// doesn't expose (the in-process backend has no pool to inspect).
    pub worker_pool: Option<Arc<WorkerPoolBackend>>,
    pub broker: Option<Arc<JobBroker>>,
}

impl Clone for AppState {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: self.registry.clone(),
            backend: self.backend.clone(),
            worker_pool: self.worker_pool.clone(),
            broker: self.broker.clone(),
        }
    }
}

pub async fn create_server(state: AppState) -> anyhow::Result<Router> {
    let timeout = state.config.server.timeout;
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_snapshot))
        .route("/metrics/prometheus", get(metrics_prometheus))
        .route("/admin/workers", get(worker_status))
        .route("/admin/plugins", get(list_plugins))
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    logging_middleware,
                ))
                .layer(axum::middleware::from_fn_with_state(
                    state.clone(),
                    metrics_middleware,
                ))
                .layer(TimeoutLayer::new(timeout)),
        )
        .with_state(state);

    Ok(app)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn metrics_snapshot() -> impl IntoResponse {
    Json(crate::metrics::all_snapshots().await)
}

async fn metrics_prometheus(State(_state): State<AppState>) -> impl IntoResponse {
    crate::metrics::prometheus_text().await
}

async fn worker_status(State(state): State<AppState>) -> impl IntoResponse {
    match &state.worker_pool {
        Some(pool) => Json(serde_json::json!({ "backend": "worker_pool", "workers": pool.health_check().await })),
        None => Json(serde_json::json!({ "backend": "in_process" })),
    }
}

async fn list_plugins(State(state): State<AppState>) -> impl IntoResponse {
    let registry = state.registry.read().await;
    Json(registry.plugin_ids())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::in_process::InProcessBackend;
    use crate::runner::Runner;
    use axum_test::TestServer;
    use pluginhost_sdk::PlatformBundle;

    async fn test_state() -> AppState {
        let registry = Arc::new(tokio::sync::RwLock::new(PluginRegistry::new()));
        let runner = Arc::new(Runner::new(registry.clone(), Arc::new(PlatformBundle::default()), None));
        AppState {
            config: Arc::new(RuntimeConfig::default()),
            registry,
            backend: Arc::new(InProcessBackend::new(runner)),
            worker_pool: None,
            broker: None,
        }
    }

    #[tokio::test]
    async fn health_check_reports_ok() {
        let app = create_server(test_state().await).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/health").await;
        assert_eq!(response.status_code(), axum::http::StatusCode::OK);
        let body: serde_json::Value = response.json();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn worker_status_reports_in_process_when_no_pool() {
        let app = create_server(test_state().await).await.unwrap();
        let server = TestServer::new(app).unwrap();
        let response = server.get("/admin/workers").await;
        let body: serde_json::Value = response.json();
        assert_eq!(body["backend"], "in_process");
    }
}
