//! Health Check Server - Probes, Status and Metrics Export
//!
//! Serves read-only snapshots of the controller over axum 0.7:
//! - `/live`: 200 while the process is up
//! - `/ready`: 200 only when health is `healthy` or `degraded`
//! - `/health`: JSON health verdict and reason
//! - `/status`: JSON `OracleStatus`
//! - `/cycles?hours=N`: journaled cycles of the last N hours (default 24)
//! - `/metrics`: Prometheus text format

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::TimeDelta;
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{error, info, instrument};

use crate::domain::health::HealthStatus;
use crate::usecases::OracleController;

use super::prometheus::MetricsRegistry;

/// Default look-back for `/cycles`.
const DEFAULT_CYCLE_WINDOW_HOURS: u32 = 24;

/// Handles shared by every route.
#[derive(Clone)]
pub struct ServerState {
    pub controller: Arc<OracleController>,
    pub metrics: Arc<MetricsRegistry>,
}

/// Axum-based health, status and metrics server.
pub struct HealthServer {
    state: ServerState,
    /// Listen address, e.g. "0.0.0.0:9090".
    bind_address: String,
}

impl HealthServer {
    pub fn new(
        controller: Arc<OracleController>,
        metrics: Arc<MetricsRegistry>,
        bind_address: impl Into<String>,
    ) -> Self {
        Self {
            state: ServerState {
                controller,
                metrics,
            },
            bind_address: bind_address.into(),
        }
    }

    /// Route table.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/live", get(liveness))
            .route("/ready", get(readiness))
            .route("/health", get(health))
            .route("/status", get(status))
            .route("/cycles", get(cycles))
            .route("/metrics", get(metrics))
            .with_state(self.state.clone())
    }

    /// Serve until `shutdown_rx` fires.
    #[instrument(skip(self, shutdown_rx), fields(address = %self.bind_address))]
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> anyhow::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;

        info!(address = %self.bind_address, "Health server started");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness(State(state): State<ServerState>) -> Response {
    let report = state.controller.health().await;
    match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => (StatusCode::OK, "READY").into_response(),
        HealthStatus::Unhealthy => (StatusCode::SERVICE_UNAVAILABLE, "NOT READY").into_response(),
    }
}

async fn health(State(state): State<ServerState>) -> Response {
    let report = state.controller.health().await;
    let code = if report.status == HealthStatus::Unhealthy {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (code, Json(report)).into_response()
}

async fn status(State(state): State<ServerState>) -> Response {
    Json(state.controller.status().await).into_response()
}

#[derive(Debug, Deserialize)]
struct CyclesQuery {
    hours: Option<u32>,
}

async fn cycles(State(state): State<ServerState>, Query(query): Query<CyclesQuery>) -> Response {
    let hours = query.hours.unwrap_or(DEFAULT_CYCLE_WINDOW_HOURS);
    match state.controller.recent_cycles(TimeDelta::hours(i64::from(hours))).await {
        Ok(cycles) => Json(cycles).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to read cycle journal");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn metrics(State(state): State<ServerState>) -> Response {
    match state.metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
