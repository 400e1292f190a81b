//! Construction of the scanner SDK backend selected in the configuration.

use std::time::Duration;

use scanner_sdk::{ScannerSdk, SimulatedScanner};
use thiserror::Error;

use crate::domain::config::ScannerBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error(
        "the {0} backend is not compiled into this build; \
         rebuild with `--features zkfinger` or run with `--backend simulated`"
    )]
    NotCompiled(ScannerBackend),
}

/// Builds the [`ScannerSdk`] for `backend`.
///
/// `capture_timeout` bounds one hardware acquire; the simulated scanner
/// answers immediately and ignores it.
///
/// # Errors
///
/// [`BackendError::NotCompiled`] when the ZKFinger backend is requested from a
/// build without the `zkfinger` feature.
pub fn build_backend(
    backend: ScannerBackend,
    capture_timeout: Duration,
) -> Result<Box<dyn ScannerSdk>, BackendError> {
    match backend {
        ScannerBackend::Simulated => Ok(Box::new(SimulatedScanner::demo())),
        ScannerBackend::Zkfinger => zkfinger(capture_timeout),
    }
}

#[cfg(feature = "zkfinger")]
fn zkfinger(capture_timeout: Duration) -> Result<Box<dyn ScannerSdk>, BackendError> {
    Ok(Box::new(scanner_sdk::ZkFingerSdk::new(capture_timeout)))
}

#[cfg(not(feature = "zkfinger"))]
fn zkfinger(_capture_timeout: Duration) -> Result<Box<dyn ScannerSdk>, BackendError> {
    Err(BackendError::NotCompiled(ScannerBackend::Zkfinger))
}
