//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection statistics, and Prometheus
//! metrics, served on its own port.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (not ready while draining)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::RuleSource;
use crate::domain::connection::ConnectionRegistry;
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::store::InMemoryStore;
use crate::infrastructure::usage::UsageLedger;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Live streaming connections.
    pub connections: ConnectionStatus,
    /// Stored data.
    pub store: StoreStatus,
    /// Events metered since startup.
    pub events_delivered: u64,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Accepting streams.
    Healthy,
    /// Shutting down; open streams are being cancelled.
    Draining,
}

/// Connection statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectionStatus {
    /// Subscribers with at least one stream.
    pub subscribers: usize,
    /// Open streams.
    pub total: usize,
}

/// Store statistics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StoreStatus {
    /// Stored posts.
    pub content: usize,
    /// Active rules.
    pub rules: usize,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    registry: Arc<ConnectionRegistry>,
    store: Arc<InMemoryStore>,
    usage: Arc<UsageLedger>,
    shutdown: CancellationToken,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        registry: Arc<ConnectionRegistry>,
        store: Arc<InMemoryStore>,
        usage: Arc<UsageLedger>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            registry,
            store,
            usage,
            shutdown,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = health_router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Router for the health endpoints.
pub fn health_router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    match determine_health_status(state.shutdown.is_cancelled()) {
        HealthStatus::Healthy => (StatusCode::OK, "READY"),
        HealthStatus::Draining => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY"),
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let stats = state.registry.stats();

    HealthResponse {
        status: determine_health_status(state.shutdown.is_cancelled()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connections: ConnectionStatus {
            subscribers: stats.subscriber_count,
            total: stats.connection_count,
        },
        store: StoreStatus {
            content: state.store.content_count(),
            rules: state.store.active_rules().len(),
        },
        events_delivered: state.usage.total_events(),
    }
}

const fn determine_health_status(shutting_down: bool) -> HealthStatus {
    if shutting_down {
        HealthStatus::Draining
    } else {
        HealthStatus::Healthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(shutdown: CancellationToken) -> Arc<HealthServerState> {
        Arc::new(HealthServerState::new(
            "test".to_string(),
            Arc::new(ConnectionRegistry::new()),
            Arc::new(InMemoryStore::new()),
            Arc::new(UsageLedger::new()),
            shutdown,
        ))
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Draining).unwrap(),
            "\"draining\""
        );
    }

    #[test]
    fn draining_after_shutdown() {
        assert_eq!(determine_health_status(false), HealthStatus::Healthy);
        assert_eq!(determine_health_status(true), HealthStatus::Draining);
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let registry_state = state(CancellationToken::new());
        let _registration = registry_state
            .registry
            .register("alice", CancellationToken::new());

        let response = build_health_response(&registry_state);
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.connections.total, 1);
        assert_eq!(response.connections.subscribers, 1);
        assert_eq!(response.store.rules, 0);
    }

    #[tokio::test]
    async fn readiness_fails_while_draining() {
        let shutdown = CancellationToken::new();
        let app = health_router(state(shutdown.clone()));

        let ready = app
            .clone()
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(ready.status(), StatusCode::OK);

        shutdown.cancel();
        let draining = app
            .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(draining.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
