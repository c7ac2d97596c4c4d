// tests/api_http.rs
//
// HTTP-level tests for the host Router without opening sockets,
// driven through tower::ServiceExt::oneshot.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{self, Body},
    Router,
};
use http::{Request, StatusCode};
use chrono::Utc;
use serde_json::Value as Json;
use tower::ServiceExt as _;

use news_alert_aggregator::api::{self, AppState};
use news_alert_aggregator::notify::LogTransport;
use news_alert_aggregator::{DedupCache, Dispatcher, FetchCoordinator, InMemoryRuleStore, Item, Pipeline};

const BODY_LIMIT: usize = 1024 * 1024;

fn test_router(cache: Arc<DedupCache>) -> Router {
    let pipeline = Pipeline::new(
        FetchCoordinator::new(Vec::new(), Duration::from_secs(1)),
        cache,
        Arc::new(news_alert_aggregator::classify::MockClassifier::fixed("world", 0.5)),
        Arc::new(InMemoryRuleStore::new()),
        Arc::new(Dispatcher::new(Arc::new(LogTransport), 1)),
        10,
    );
    api::router(AppState {
        pipeline: Arc::new(pipeline),
        metrics: None,
    })
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request");
    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT).await.expect("read body");
    let json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_healthy() {
    let (status, body) = get_json(test_router(Arc::new(DedupCache::default())), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn stats_exposes_cache_snapshot() {
    let cache = Arc::new(DedupCache::new(Duration::from_secs(7200)));
    let a = Item::new("1", "One", "", "u", "s", Utc::now());
    cache.add(a.clone());
    cache.add(Item::new("2", "Two", "", "u", "s", Utc::now()));
    cache.mark_processed(&a.fingerprint);

    let (status, body) = get_json(test_router(cache), "/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cache_stats"]["total_cached_items"], 2);
    assert_eq!(body["cache_stats"]["processed_count"], 1);
    assert_eq!(body["cache_stats"]["retention_secs"], 7200);
    assert_eq!(body["running"], false);
    assert_eq!(body["state"], "idle");
    assert_eq!(body["dispatch_in_flight"], 0);
}

#[tokio::test]
async fn metrics_route_absent_without_exporter() {
    let (status, _) = get_json(test_router(Arc::new(DedupCache::default())), "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
