//! Process-level lifecycle through `infrastructure::run`: startup gating,
//! serving, and releasing the scanner exactly once.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fingerprint_agent::application::{DeviceSession, InitializeError};
use fingerprint_agent::domain::AgentConfig;
use fingerprint_agent::infrastructure::{run, AgentError};
use mockall::Sequence;
use scanner_sdk::{DeviceHandle, MockScannerSdk, SdkError, SimulatedScanner};
use futures_util::SinkExt;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;

/// A loopback address that was free a moment ago.
async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn config_on(addr: SocketAddr) -> AgentConfig {
    AgentConfig {
        listen_addr: addr,
        shutdown_grace: Duration::from_secs(1),
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn test_zero_devices_never_binds_and_reports_startup_failure() {
    // Arrange
    let addr = free_addr().await;
    let scanner = SimulatedScanner::new(0);
    let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));

    // Act
    let result = run(config_on(addr), device, Arc::new(AtomicBool::new(true))).await;

    // Assert
    match result {
        Err(AgentError::Startup(InitializeError::NoDevices)) => {}
        other => panic!("expected a startup failure, got {other:?}"),
    }
    assert!(TcpStream::connect(addr).await.is_err(), "nothing may listen");
    assert_eq!(scanner.calls().open_device, 0);
    assert!(!scanner.is_initialized());
}

#[tokio::test]
async fn test_sdk_init_failure_is_startup_failure() {
    let scanner = SimulatedScanner::new(1).failing_init(SdkError::InitFailed(-1));
    let device = Arc::new(DeviceSession::new(Box::new(scanner)));

    let result = run(config_on(free_addr().await), device, Arc::new(AtomicBool::new(true))).await;

    assert!(matches!(
        result,
        Err(AgentError::Startup(InitializeError::Sdk(SdkError::InitFailed(-1))))
    ));
}

#[tokio::test]
async fn test_serves_until_flag_cleared_then_releases_once() {
    // Arrange
    let addr = free_addr().await;
    let scanner = SimulatedScanner::demo();
    let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
    let running = Arc::new(AtomicBool::new(true));
    let agent = tokio::spawn(run(config_on(addr), Arc::clone(&device), Arc::clone(&running)));

    // Act: wait until the listener is up, then stop
    let mut listening = false;
    for _ in 0..50 {
        if TcpStream::connect(addr).await.is_ok() {
            listening = true;
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    running.store(false, Ordering::Relaxed);
    let result = timeout(Duration::from_secs(5), agent).await.unwrap().unwrap();

    // A second release, as a signal path and normal exit would both do
    device.shutdown();

    // Assert
    assert!(listening, "agent never started listening");
    assert!(result.is_ok());
    assert!(!device.is_ready());
    assert_eq!(scanner.calls().close_device, 1);
    assert_eq!(scanner.calls().terminate, 1);
}

#[tokio::test]
async fn test_startup_and_release_call_sequence() {
    // Arrange: the exact vendor call order for one run
    let mut sdk = MockScannerSdk::new();
    let mut seq = Sequence::new();
    sdk.expect_name().return_const("mock");
    sdk.expect_init().times(1).in_sequence(&mut seq).returning(|| Ok(()));
    sdk.expect_device_count()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(1));
    sdk.expect_open_device()
        .withf(|index| *index == 0)
        .times(1)
        .in_sequence(&mut seq)
        .returning(|index| Ok(DeviceHandle::new(index)));
    sdk.expect_close_device()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(()));
    sdk.expect_terminate()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|| Ok(()));
    sdk.expect_acquire().never();
    let device = Arc::new(DeviceSession::new(Box::new(sdk)));

    // Act: already stopped, so the server exits right after binding
    let result = run(
        config_on(free_addr().await),
        device,
        Arc::new(AtomicBool::new(false)),
    )
    .await;

    // Assert (expectations are verified when the mock is dropped)
    assert!(result.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_during_capture_returns_within_grace() {
    // Arrange: a capture that outlasts the shutdown grace by far
    let addr = free_addr().await;
    let scanner = SimulatedScanner::demo().with_acquire_delay(Duration::from_secs(3));
    let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
    let running = Arc::new(AtomicBool::new(true));
    let config = AgentConfig {
        listen_addr: addr,
        shutdown_grace: Duration::from_millis(200),
        ..AgentConfig::default()
    };
    let agent = tokio::spawn(run(config, Arc::clone(&device), Arc::clone(&running)));

    let mut ws = None;
    for _ in 0..50 {
        let mut request = format!("ws://{addr}/").into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Origin", HeaderValue::from_static("http://localhost:4200"));
        if let Ok((client, _)) = connect_async(request).await {
            ws = Some(client);
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    let mut ws = ws.expect("agent never started listening");
    ws.send(Message::Text(r#"{"command":"CAPTURE_FINGERPRINT"}"#.to_string()))
        .await
        .unwrap();
    for _ in 0..100 {
        if scanner.calls().acquire > 0 {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(scanner.calls().acquire, 1, "capture never started");

    // Act
    running.store(false, Ordering::Relaxed);
    let stopped_at = Instant::now();
    let result = timeout(Duration::from_secs(5), agent).await.unwrap().unwrap();
    let elapsed = stopped_at.elapsed();

    // Assert: bounded by the poll interval plus two grace periods, not the capture
    assert!(result.is_ok());
    assert!(
        elapsed < Duration::from_millis(1500),
        "run() took {elapsed:?} to return"
    );

    // The release still happens once the capture ends
    drop(ws);
    for _ in 0..100 {
        if scanner.calls().terminate == 1 {
            break;
        }
        sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(scanner.calls().terminate, 1);
    assert!(!device.is_ready());
}
