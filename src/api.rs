// src/api.rs
//! Host-facing HTTP surface: liveness, cache stats, Prometheus scrape.

use std::sync::Arc;

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::cors::CorsLayer;

use crate::cache::CacheStats;
use crate::ingest::scheduler::{CycleState, Pipeline};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    let mut r = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats));
    if state.metrics.is_some() {
        r = r.route("/metrics", get(metrics));
    }
    r.layer(CorsLayer::very_permissive()).with_state(state)
}

#[derive(Serialize)]
struct HealthOut {
    status: &'static str,
    timestamp: String,
}

async fn health() -> Json<HealthOut> {
    Json(HealthOut {
        status: "healthy",
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Serialize)]
struct StatsOut {
    cache_stats: CacheStats,
    running: bool,
    state: CycleState,
    dispatch_in_flight: usize,
}

async fn stats(State(state): State<AppState>) -> Json<StatsOut> {
    let p = &state.pipeline;
    tracing::debug!(target: "api", cached = p.cache().len(), "stats requested");
    Json(StatsOut {
        cache_stats: p.cache().stats(),
        running: p.is_running(),
        state: p.state(),
        dispatch_in_flight: p.dispatcher().in_flight(),
    })
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let body = state.metrics.as_ref().map(|h| h.render()).unwrap_or_default();
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}
