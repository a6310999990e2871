//! Integration tests for the metrics exposition endpoint

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use loadtest_lib::exposition::create_router;
use loadtest_lib::observability::{CounterMetric, LoadTestMetrics, TrendMetric};
use tower::ServiceExt;

#[tokio::test]
async fn test_metrics_endpoint_serves_run_registry() {
    let metrics = LoadTestMetrics::new();
    metrics.inc(CounterMetric::CreateCount);
    metrics.inc(CounterMetric::CreateCount);
    metrics.observe(TrendMetric::ReadyDuration, 1500.0);

    let response = create_router(metrics)
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert!(text.contains("devworkspace_create_count 2"));
    assert!(text.contains("devworkspace_ready_duration_count 1"));
    assert!(text.contains("operator_cpu_violations 0"));
}

#[tokio::test]
async fn test_registries_are_per_run() {
    let first = LoadTestMetrics::new();
    let second = LoadTestMetrics::new();
    first.inc(CounterMetric::ReadyFailed);

    let response = create_router(second)
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("devworkspace_ready_failed 0"));
}

#[tokio::test]
async fn test_healthz() {
    let response = create_router(LoadTestMetrics::new())
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let response = create_router(LoadTestMetrics::new())
        .oneshot(
            Request::builder()
                .uri("/readyz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
