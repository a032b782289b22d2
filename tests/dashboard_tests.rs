mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use common::{assert_eventually, cancellable_task, sleeping_task};
use media_jobs::config::{LibraryConfig, LibraryPath, ManagerConfig, ShutdownMode};
use media_jobs::dashboard::{router, DashboardState};
use media_jobs::library::{FsScanner, LibraryTasks};
use media_jobs::scheduler::{JobId, JobManager, JobStatus};
use media_jobs::subscription::Broadcaster;

const WAIT: Duration = Duration::from_secs(5);

fn test_library(config: LibraryConfig) -> LibraryTasks {
    let manager = JobManager::new(ManagerConfig::default());
    let scanner = Arc::new(FsScanner::new(&config));
    LibraryTasks::new(manager, Broadcaster::new(), config).with_scanner(scanner)
}

fn test_app(library: &LibraryTasks) -> Router {
    router(DashboardState::new(library.clone()))
}

async fn send(app: Router, method: &str, uri: &str, body: Body) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header("content-type", "application/json")
                .body(body)
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_list_jobs_empty() {
    let library = test_library(LibraryConfig::default());

    let (status, json) = send(test_app(&library), "GET", "/api/jobs", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, Value::Array(vec![]));
}

#[tokio::test]
async fn test_list_jobs_with_data() {
    let library = test_library(LibraryConfig::default());
    let manager = library.manager().clone();
    let first = manager.submit("first", sleeping_task(Duration::ZERO)).unwrap();
    manager.wait(first).await.unwrap();
    manager.submit("second", cancellable_task()).unwrap();

    let (status, json) = send(test_app(&library), "GET", "/api/jobs", Body::empty()).await;

    assert_eq!(status, StatusCode::OK);
    let jobs = json.as_array().unwrap();
    assert_eq!(jobs.len(), 2);
    assert_eq!(jobs[0]["id"], 1);
    assert_eq!(jobs[0]["description"], "first");
    assert_eq!(jobs[0]["status"], "finished");
    assert!(jobs[0]["ended_at"].is_string());
    assert_eq!(jobs[1]["id"], 2);

    manager.shutdown(ShutdownMode::Cancel).await;
}

#[tokio::test]
async fn test_get_job_and_not_found() {
    let library = test_library(LibraryConfig::default());
    let id = library
        .manager()
        .submit("quick", sleeping_task(Duration::ZERO))
        .unwrap();
    library.manager().wait(id).await.unwrap();

    let (status, json) = send(test_app(&library), "GET", "/api/jobs/1", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "finished");
    assert_eq!(json["progress"]["processed"], 0);

    let (status, json) = send(test_app(&library), "GET", "/api/jobs/42", Body::empty()).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("42"));
}

#[tokio::test]
async fn test_cancel_endpoint() {
    let library = test_library(LibraryConfig::default());
    let manager = library.manager().clone();
    let id = manager.submit("waits", cancellable_task()).unwrap();
    assert_eventually(
        || async { manager.get(id).unwrap().status == JobStatus::Running },
        WAIT,
        "job should start",
    )
    .await;

    let (status, json) = send(
        test_app(&library),
        "POST",
        "/api/jobs/1/cancel",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], true);
    assert_eq!(manager.wait(id).await.unwrap().status, JobStatus::Cancelled);

    // Already terminal
    let (status, json) = send(
        test_app(&library),
        "POST",
        "/api/jobs/1/cancel",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["cancelled"], false);

    let (status, _) = send(
        test_app(&library),
        "POST",
        "/api/jobs/7/cancel",
        Body::empty(),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_submit_scan() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("clip.mp4"), b"").unwrap();
    let config = LibraryConfig::default().with_library_path(LibraryPath::new(dir.path()));
    let library = test_library(config);

    let (status, json) = send(test_app(&library), "POST", "/api/scan", Body::empty()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["job_id"], 1);

    let record = library.manager().wait(JobId(1)).await.unwrap();
    assert_eq!(record.description, "Scanning...");
    assert_eq!(record.status, JobStatus::Finished);

    let body = Body::from(format!(
        r#"{{"paths": ["{}"]}}"#,
        dir.path().display()
    ));
    let (status, json) = send(test_app(&library), "POST", "/api/scan", body).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["job_id"], 2);
}

#[tokio::test]
async fn test_submit_scan_rejects_bad_body() {
    let library = test_library(LibraryConfig::default());

    let (status, json) = send(
        test_app(&library),
        "POST",
        "/api/scan",
        Body::from("{not json"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("invalid scan input"));
    assert!(library.manager().list().is_empty());
}

#[tokio::test]
async fn test_submit_scan_after_shutdown() {
    let library = test_library(LibraryConfig::default());
    library.manager().shutdown(ShutdownMode::Drain).await;

    let (status, _) = send(test_app(&library), "POST", "/api/scan", Body::empty()).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_scan_events_stream() {
    let config = LibraryConfig::default();
    let scan_events = Broadcaster::new();
    let scanner = Arc::new(FsScanner::new(&config));
    let library = LibraryTasks::new(
        JobManager::new(ManagerConfig::default()),
        scan_events.clone(),
        config,
    )
    .with_scanner(scanner);

    let response = test_app(&library)
        .oneshot(
            Request::builder()
                .uri("/api/scan/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );
    assert_eq!(scan_events.subscriber_count(), 1);

    let id = library.scan(Default::default()).unwrap();
    library.manager().wait(id).await.unwrap();

    let mut body = response.into_body();
    let frame = tokio::time::timeout(WAIT, body.frame())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    let text = String::from_utf8(frame.into_data().unwrap().to_vec()).unwrap();
    assert!(text.contains("event: scan-complete"), "got: {}", text);

    // Subscription goes away with the client.
    drop(body);
    assert_eventually(
        || async { scan_events.subscriber_count() == 0 },
        WAIT,
        "subscriber should be removed after disconnect",
    )
    .await;
}

#[tokio::test]
async fn test_scan_events_stream_ends_on_shutdown() {
    let config = LibraryConfig::default();
    let scan_events = Broadcaster::new();
    let scanner = Arc::new(FsScanner::new(&config));
    let library = LibraryTasks::new(
        JobManager::new(ManagerConfig::default()),
        scan_events.clone(),
        config,
    )
    .with_scanner(scanner);
    let shutdown = CancellationToken::new();
    let app = router(DashboardState::new(library).with_shutdown(shutdown.clone()));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/scan/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(scan_events.subscriber_count(), 1);

    shutdown.cancel();

    // The body completes instead of waiting for the client to leave.
    tokio::time::timeout(WAIT, response.into_body().collect())
        .await
        .expect("event stream should end once shutdown starts")
        .unwrap();
    assert_eventually(
        || async { scan_events.subscriber_count() == 0 },
        WAIT,
        "subscriber should be removed on shutdown",
    )
    .await;
}
