//! Agent process lifecycle: initialise the scanner, serve, release.

use std::sync::{atomic::AtomicBool, Arc};
use std::time::Duration;

use anyhow::Context;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::application::{DeviceSession, InitializeError};
use crate::domain::config::AgentConfig;
use crate::infrastructure::ws_server;

/// Why [`run`] ended with a failure.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The scanner could not be brought up; no listener was bound.
    #[error("scanner startup failed: {0}")]
    Startup(#[from] InitializeError),

    /// Binding or serving failed after the scanner was ready.
    #[error(transparent)]
    Server(#[from] anyhow::Error),
}

/// Runs the agent until `running` is cleared.
///
/// 1. Initialise the scanner.  On failure, log and return
///    [`AgentError::Startup`] without binding a socket.
/// 2. Bind `config.listen_addr` and serve browser connections.
/// 3. Release the scanner, on every path, exactly once.  The wait for the
///    release is bounded by `config.shutdown_grace`: a capture still running
///    on a blocking thread holds the device, and the release then completes
///    in the background once that capture returns.
///
/// # Errors
///
/// See [`AgentError`].
pub async fn run(
    config: AgentConfig,
    device: Arc<DeviceSession>,
    running: Arc<AtomicBool>,
) -> Result<(), AgentError> {
    let grace = config.shutdown_grace;
    let result = start_and_serve(config, &device, running).await;
    release(&device, grace).await;
    result
}

async fn start_and_serve(
    config: AgentConfig,
    device: &Arc<DeviceSession>,
    running: Arc<AtomicBool>,
) -> Result<(), AgentError> {
    if config.allowed_origins.is_empty() {
        warn!("no allowed origins configured; every connection will be refused");
    }

    let init_device = Arc::clone(device);
    let initialized = tokio::task::spawn_blocking(move || init_device.try_initialize())
        .await
        .context("scanner initialization task failed")?;
    if let Err(e) = initialized {
        error!("fatal: {e}; the agent will not accept connections");
        return Err(AgentError::Startup(e));
    }
    info!("scanner ready");

    let listener = ws_server::bind(config.listen_addr).await?;
    ws_server::serve(
        listener,
        config.allowed_origins,
        Arc::clone(device),
        running,
        config.shutdown_grace,
    )
    .await?;
    Ok(())
}

async fn release(device: &Arc<DeviceSession>, grace: Duration) {
    let device = Arc::clone(device);
    match timeout(grace, tokio::task::spawn_blocking(move || device.shutdown())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("scanner release task failed: {e}"),
        Err(_) => warn!(
            "scanner still busy after {grace:?}; release continues when the current capture ends"
        ),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_sdk::SimulatedScanner;
    use std::net::SocketAddr;

    fn config() -> AgentConfig {
        AgentConfig {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..AgentConfig::default()
        }
    }

    #[tokio::test]
    async fn test_zero_devices_is_startup_error() {
        // Arrange
        let scanner = SimulatedScanner::new(0);
        let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
        let running = Arc::new(AtomicBool::new(true));

        // Act
        let result = run(config(), device, running).await;

        // Assert
        assert!(matches!(
            result,
            Err(AgentError::Startup(InitializeError::NoDevices))
        ));
        assert!(!scanner.is_initialized());
    }

    #[tokio::test]
    async fn test_clean_stop_releases_scanner_once() {
        // Arrange: the flag is already cleared so the server stops at once
        let scanner = SimulatedScanner::new(1);
        let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
        let running = Arc::new(AtomicBool::new(false));

        // Act
        let result = run(config(), Arc::clone(&device), running).await;
        device.shutdown();

        // Assert
        assert!(result.is_ok());
        assert_eq!(scanner.calls().open_device, 1);
        assert_eq!(scanner.calls().close_device, 1);
        assert_eq!(scanner.calls().terminate, 1);
    }

    #[tokio::test]
    async fn test_bind_failure_still_releases_scanner() {
        // Arrange: occupy a port first
        let blocker = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = blocker.local_addr().unwrap();
        let scanner = SimulatedScanner::new(1);
        let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
        let cfg = AgentConfig {
            listen_addr: taken,
            ..AgentConfig::default()
        };

        // Act
        let result = run(cfg, device, Arc::new(AtomicBool::new(true))).await;

        // Assert
        assert!(matches!(result, Err(AgentError::Server(_))));
        assert_eq!(scanner.calls().terminate, 1);
    }
}
