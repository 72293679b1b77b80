use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use marker_gateway::probe::{HealthProbe, ProbeOptions, ProbeOutcome, UnhealthyPolicy, probe};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const HOST: &str = "http://127.0.0.1";

async fn spawn_server(app: Router) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    port
}

/// A port nothing listens on
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

fn fast_options(max_attempts: u32) -> ProbeOptions {
    ProbeOptions {
        request_timeout: Duration::from_secs(2),
        max_attempts,
        retry_delay: Duration::from_millis(10),
        unhealthy_policy: UnhealthyPolicy::Retry,
    }
}

async fn healthy() -> impl IntoResponse {
    Json(json!({"status": "ok", "service": "marker-api"}))
}

/// Answers 503 until `ready_after` requests have been seen
async fn warming_up(State(hits): State<(Arc<AtomicUsize>, usize)>) -> impl IntoResponse {
    let (counter, ready_after) = hits;
    let seen = counter.fetch_add(1, Ordering::SeqCst);
    if seen < ready_after {
        (StatusCode::SERVICE_UNAVAILABLE, "loading models").into_response()
    } else {
        Json(json!({"status": "ok"})).into_response()
    }
}

#[tokio::test]
async fn test_healthy_service_first_attempt() {
    let port = spawn_server(Router::new().route("/health", get(healthy))).await;

    let report = HealthProbe::new(HOST, port, fast_options(5))
        .unwrap()
        .run()
        .await;

    assert!(report.healthy);
    assert_eq!(report.attempts, 1);
    match report.last_outcome {
        Some(ProbeOutcome::Healthy(body)) => assert_eq!(body["service"], "marker-api"),
        other => panic!("unexpected outcome: {:?}", other),
    }
}

#[tokio::test]
async fn test_probe_fn_reports_healthy() {
    let port = spawn_server(Router::new().route("/health", get(healthy))).await;

    assert!(probe(HOST, port, Duration::from_secs(2), 3).await);
}

#[tokio::test]
async fn test_refused_uses_whole_budget() {
    let port = closed_port().await;

    let report = HealthProbe::new(HOST, port, fast_options(3))
        .unwrap()
        .run()
        .await;

    assert!(!report.healthy);
    assert_eq!(report.attempts, 3);
    assert!(matches!(report.last_outcome, Some(ProbeOutcome::Refused(_))));
}

#[tokio::test]
async fn test_unhealthy_then_ready_with_retry_policy() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/health", get(warming_up))
        .with_state((counter.clone(), 2));
    let port = spawn_server(app).await;

    let report = HealthProbe::new(HOST, port, fast_options(5))
        .unwrap()
        .run()
        .await;

    assert!(report.healthy);
    assert_eq!(report.attempts, 3);
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_unhealthy_stops_with_fail_fast_policy() {
    let counter = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/health", get(warming_up))
        .with_state((counter.clone(), 2));
    let port = spawn_server(app).await;

    let options = ProbeOptions {
        unhealthy_policy: UnhealthyPolicy::FailFast,
        ..fast_options(5)
    };
    let report = HealthProbe::new(HOST, port, options).unwrap().run().await;

    assert!(!report.healthy);
    assert_eq!(report.attempts, 1);
    assert_eq!(report.last_outcome, Some(ProbeOutcome::Unhealthy(503)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_slow_service_times_out_per_attempt() {
    let app = Router::new().route(
        "/health",
        get(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"status": "ok"}))
        }),
    );
    let port = spawn_server(app).await;

    let options = ProbeOptions {
        request_timeout: Duration::from_millis(100),
        ..fast_options(2)
    };
    let report = HealthProbe::new(HOST, port, options).unwrap().run().await;

    assert!(!report.healthy);
    assert_eq!(report.attempts, 2);
    assert!(matches!(report.last_outcome, Some(ProbeOutcome::Error(_))));
}

#[tokio::test]
async fn test_non_json_success_is_not_healthy() {
    let app = Router::new().route("/health", get(|| async { "fine" }));
    let port = spawn_server(app).await;

    let report = HealthProbe::new(HOST, port, fast_options(2))
        .unwrap()
        .run()
        .await;

    assert!(!report.healthy);
    assert_eq!(report.attempts, 2);
    assert!(matches!(report.last_outcome, Some(ProbeOutcome::Error(_))));
}
