//! Prometheus /metrics + health check HTTP endpoints
//!
//! Endpoints:
//!   GET /metrics  Prometheus text format
//!   GET /healthz  Liveness probe (always 200 if process is running)
//!   GET /readyz  Readiness probe (200 if storage answers a ping)

use anyhow::Result;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use lockbox_storage::UserRepository;
use prometheus_client::{encoding::text::encode, metrics::counter::Counter, registry::Registry};
use std::sync::Arc;
use std::time::Duration;

/// Server counters. Cloning shares the underlying values.
#[derive(Clone, Debug, Default)]
pub struct Metrics {
    pub auth_failures: Counter,
    pub records_saved: Counter,
    pub records_deactivated: Counter,
    pub upload_bytes: Counter,
    pub stream_bytes: Counter,
}

impl Metrics {
    pub fn register(registry: &mut Registry) -> Self {
        let metrics = Self::default();
        registry.register(
            "lockbox_auth_failures",
            "Calls rejected for a missing or invalid session token, or bad login",
            metrics.auth_failures.clone(),
        );
        registry.register(
            "lockbox_records_saved",
            "Vault records stored (unary saves and file uploads)",
            metrics.records_saved.clone(),
        );
        registry.register(
            "lockbox_records_deactivated",
            "Vault records soft-deleted",
            metrics.records_deactivated.clone(),
        );
        registry.register(
            "lockbox_upload_bytes",
            "Encrypted bytes received through file uploads",
            metrics.upload_bytes.clone(),
        );
        registry.register(
            "lockbox_stream_bytes",
            "Encrypted bytes sent through streamed listings",
            metrics.stream_bytes.clone(),
        );
        metrics
    }
}

/// Shared state for the HTTP endpoints
#[derive(Clone)]
pub struct HealthState {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn UserRepository>,
}

/// Serve Prometheus metrics and health endpoints on `addr` (e.g. "127.0.0.1:9108")
pub async fn serve(addr: String, state: HealthState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("metrics bind {addr}: {e}"))?;

    tracing::info!(addr = %addr, "metrics: listening on /metrics, /healthz, /readyz");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("metrics server: {e}"))
}

pub fn router(state: HealthState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .with_state(state)
}

async fn metrics_handler(State(state): State<HealthState>) -> impl IntoResponse {
    let mut body = String::new();
    match encode(&mut body, &state.registry) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            body,
        ),
        Err(e) => {
            tracing::error!("metrics encode failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                e.to_string(),
            )
        }
    }
}

/// Liveness probe: returns 200 if the process is running.
async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe: returns 200 if storage is reachable, 503 otherwise.
async fn readyz_handler(State(state): State<HealthState>) -> impl IntoResponse {
    match lockbox_storage::check_health(state.store.as_ref(), Duration::from_secs(1)).await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "storage unreachable"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lockbox_storage::MemoryStore;
    use tower::ServiceExt;

    fn state() -> (HealthState, Metrics) {
        let mut registry = Registry::default();
        let metrics = Metrics::register(&mut registry);
        let state = HealthState {
            registry: Arc::new(registry),
            store: Arc::new(MemoryStore::new()),
        };
        (state, metrics)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(uri)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_metrics_exposes_counters() {
        let (state, metrics) = state();
        metrics.records_saved.inc();
        metrics.records_saved.inc();

        let (status, body) = get_body(router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("lockbox_records_saved_total 2"), "{body}");
        assert!(body.contains("lockbox_auth_failures_total 0"));
    }

    #[tokio::test]
    async fn test_probes() {
        let (state, _) = state();
        let (status, _) = get_body(router(state.clone()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let (status, body) = get_body(router(state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");
    }
}
