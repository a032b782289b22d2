mod common;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use common::{assert_eventually, cancellable_task};
use media_jobs::app::App;
use media_jobs::config::{AppConfig, DashboardConfig, ShutdownMode};
use media_jobs::scheduler::JobStatus;

const WAIT: Duration = Duration::from_secs(5);

fn free_addr() -> SocketAddr {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap()
}

async fn connect(addr: SocketAddr) -> TcpStream {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => return stream,
            Err(_) if tokio::time::Instant::now() < deadline => {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
            Err(e) => panic!("dashboard never came up on {}: {}", addr, e),
        }
    }
}

/// Open a scan-event stream and wait for the response head.
async fn open_event_stream(addr: SocketAddr) -> TcpStream {
    let mut stream = connect(addr).await;
    stream
        .write_all(b"GET /api/scan/events HTTP/1.1\r\nHost: localhost\r\n\r\n")
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut buf = [0u8; 512];
    while !String::from_utf8_lossy(&head).contains("\r\n\r\n") {
        let n = tokio::time::timeout(WAIT, stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert!(n > 0, "connection closed before response head");
        head.extend_from_slice(&buf[..n]);
    }
    assert!(String::from_utf8_lossy(&head).starts_with("HTTP/1.1 200"));
    stream
}

#[tokio::test]
async fn test_run_returns_with_event_stream_open() {
    let addr = free_addr();
    let app = App::new(AppConfig {
        dashboard: Some(DashboardConfig::new(addr)),
        ..AppConfig::default()
    });
    let scan_events = app.scan_events.clone();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(app.run(shutdown.clone()));

    let _client = open_event_stream(addr).await;
    assert_eq!(scan_events.subscriber_count(), 1);

    shutdown.cancel();

    tokio::time::timeout(WAIT, running)
        .await
        .expect("run should return while a client is still connected")
        .unwrap();
    assert_eventually(
        || async { scan_events.subscriber_count() == 0 },
        WAIT,
        "subscriber should be removed on shutdown",
    )
    .await;
}

#[tokio::test]
async fn test_run_applies_configured_shutdown_mode() {
    let mut config = AppConfig::default();
    config.manager = config.manager.with_shutdown_mode(ShutdownMode::Cancel);
    let app = App::new(config);
    let manager = app.manager.clone();
    let id = manager.submit("waits", cancellable_task()).unwrap();
    let shutdown = CancellationToken::new();
    let running = tokio::spawn(app.run(shutdown.clone()));

    shutdown.cancel();
    tokio::time::timeout(WAIT, running).await.unwrap().unwrap();

    assert_eq!(manager.get(id).unwrap().status, JobStatus::Cancelled);
    assert!(!manager.is_accepting());
}
