//! Health and Metrics Endpoints
//!
//! Plain HTTP on its own listener, next to the WebSocket port:
//! `GET /health` for load balancers and `GET /metrics` for scrapers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::game::Registry;

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    /// Always `"healthy"` while the process can answer.
    pub status: &'static str,
    /// Connected players, lobby and sessions combined.
    pub players: usize,
    /// Live sessions.
    pub sessions: usize,
}

/// Build the side-channel router.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

async fn health(State(registry): State<Arc<Registry>>) -> Json<HealthReport> {
    let (players, sessions) = registry.counts().await;
    Json(HealthReport {
        status: "healthy",
        players,
        sessions,
    })
}

async fn metrics(State(registry): State<Arc<Registry>>) -> impl IntoResponse {
    let (players, sessions) = registry.counts().await;
    let body = registry.telemetry().export_prometheus(players, sessions).await;
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    )
}
