//! Per-message request handling.
//!
//! [`handle_payload`] turns one inbound frame payload into exactly one
//! [`Response`].  It never fails: decode errors, unknown commands and failed
//! captures all become error responses, so a bad message can never end the
//! connection that carried it.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::application::device_session::{CaptureError, DeviceSession};
use crate::domain::messages::{
    decode_command, Command, Response, INTERNAL_ERROR_MESSAGE, UNRECOGNIZED_COMMAND_MESSAGE,
};

/// Handles one inbound message and returns the response to send back.
///
/// The capture itself runs on Tokio's blocking thread pool so a finger-wait
/// never stalls the runtime threads serving other connections.
pub async fn handle_payload(
    payload: &[u8],
    device: &Arc<DeviceSession>,
    session_id: &str,
) -> Response {
    let command = match decode_command(payload) {
        Ok(command) => command,
        Err(e) => {
            warn!("session {session_id}: malformed message ({} bytes): {e}", payload.len());
            return Response::error(INTERNAL_ERROR_MESSAGE);
        }
    };

    debug!("session {session_id}: received {}", command.name());

    match command {
        Command::CaptureFingerprint => capture(device, session_id).await,
        Command::Unrecognized => {
            warn!("session {session_id}: unrecognized command");
            Response::error(UNRECOGNIZED_COMMAND_MESSAGE)
        }
    }
}

async fn capture(device: &Arc<DeviceSession>, session_id: &str) -> Response {
    let device = Arc::clone(device);
    match tokio::task::spawn_blocking(move || device.capture()).await {
        Ok(Ok(template)) => {
            info!("session {session_id}: fingerprint captured");
            Response::success(template)
        }
        Ok(Err(e)) => {
            match &e {
                CaptureError::NoCapture => warn!("session {session_id}: {e}"),
                CaptureError::NotInitialized | CaptureError::Sdk(_) => {
                    error!("session {session_id}: {e}")
                }
            }
            Response::error(e.to_string())
        }
        Err(join_err) => {
            error!("session {session_id}: capture worker failed: {join_err}");
            Response::error(INTERNAL_ERROR_MESSAGE)
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use scanner_sdk::{Capture, SdkError, SimulatedScanner};

    const CAPTURE: &[u8] = br#"{"command":"CAPTURE_FINGERPRINT"}"#;

    fn ready_device(scanner: &SimulatedScanner) -> Arc<DeviceSession> {
        let device = Arc::new(DeviceSession::new(Box::new(scanner.clone())));
        assert!(device.initialize());
        device
    }

    fn capture_of(template: &[u8]) -> Capture {
        Capture {
            template: template.to_vec(),
            image: vec![0xAB; 8],
        }
    }

    #[tokio::test]
    async fn test_capture_success_carries_base64_template() {
        // Arrange
        let scanner = SimulatedScanner::new(1).with_captures([Ok(Some(capture_of(&[1, 2, 3])))]);
        let device = ready_device(&scanner);

        // Act
        let response = handle_payload(CAPTURE, &device, "t").await;

        // Assert
        let Response::Success { template } = response else {
            panic!("expected success, got {response:?}");
        };
        assert_eq!(STANDARD.decode(template).unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_capture_when_not_initialized_reports_readiness() {
        let device = Arc::new(DeviceSession::new(Box::new(SimulatedScanner::demo())));

        let response = handle_payload(CAPTURE, &device, "t").await;

        assert_eq!(response, Response::error("scanner is not initialized"));
    }

    #[tokio::test]
    async fn test_capture_timeout_then_success() {
        // Arrange
        let scanner = SimulatedScanner::new(1)
            .with_captures([Ok(None), Ok(Some(capture_of(b"second")))]);
        let device = ready_device(&scanner);

        // Act
        let first = handle_payload(CAPTURE, &device, "t").await;
        let second = handle_payload(CAPTURE, &device, "t").await;

        // Assert
        match first {
            Response::Error { message } => assert!(!message.is_empty()),
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(second, Response::success(STANDARD.encode(b"second")));
    }

    #[tokio::test]
    async fn test_sdk_error_is_forwarded_as_message() {
        let scanner = SimulatedScanner::new(1).with_captures([Err(SdkError::AcquireFailed(-17))]);
        let device = ready_device(&scanner);

        let response = handle_payload(CAPTURE, &device, "t").await;

        match response {
            Response::Error { message } => assert!(message.contains("-17")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_payload_is_internal_error() {
        let scanner = SimulatedScanner::demo();
        let device = ready_device(&scanner);

        let payloads: [&[u8]; 4] = [b"not json", b"[1,2]", b"\"CAPTURE_FINGERPRINT\"", &[0xFF, 0x00]];
        for payload in payloads {
            let response = handle_payload(payload, &device, "t").await;
            assert_eq!(response, Response::error(INTERNAL_ERROR_MESSAGE));
        }

        // Nothing reached the scanner
        assert_eq!(scanner.calls().acquire, 0);
    }

    #[tokio::test]
    async fn test_unrecognized_and_missing_commands() {
        let scanner = SimulatedScanner::demo();
        let device = ready_device(&scanner);

        let payloads: [&[u8]; 3] = [br#"{"command":"DELETE_ALL"}"#, b"{}", br#"{"command":7}"#];
        for payload in payloads {
            let response = handle_payload(payload, &device, "t").await;
            assert_eq!(response, Response::error(UNRECOGNIZED_COMMAND_MESSAGE));
        }
        assert_eq!(scanner.calls().acquire, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_captures_are_serialized() {
        // Arrange: each acquire holds the device for a while
        let scanner = SimulatedScanner::demo().with_acquire_delay(std::time::Duration::from_millis(100));
        let device = ready_device(&scanner);

        // Act
        let (a, b) = tokio::join!(
            handle_payload(CAPTURE, &device, "a"),
            handle_payload(CAPTURE, &device, "b"),
        );

        // Assert: both served, one after the other on the single handle
        assert!(a.is_success());
        assert!(b.is_success());
        assert_eq!(scanner.calls().acquire, 2);
        assert_eq!(scanner.peak_concurrent_acquires(), 1);
    }
}
