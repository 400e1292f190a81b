//! Device session: the scanner lifecycle state machine.
//!
//! ```text
//!   Uninitialized ──initialize()──► Ready(handle) ──shutdown()──► Released
//!         │                                                          ▲
//!         └──────────────────────shutdown()──────────────────────────┘
//! ```
//!
//! The session owns the boxed [`ScannerSdk`] and the one open
//! [`DeviceHandle`].  Every operation takes the same `std::sync::Mutex`, so
//! initialisation, captures from different connections, and shutdown never
//! overlap.  All methods are synchronous and may block (a capture waits for a
//! finger); async callers run them through `tokio::task::spawn_blocking`.

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use scanner_sdk::{DeviceHandle, ScannerSdk, SdkError};
use thiserror::Error;
use tracing::{error, info, warn};

/// Index of the scanner the session opens.  Multi-device selection is not
/// supported; the first enumerated device is always used.
pub const DEVICE_INDEX: usize = 0;

// ── Error types ───────────────────────────────────────────────────────────────

/// Why [`DeviceSession::try_initialize`] did not reach the ready state.
#[derive(Debug, Error)]
pub enum InitializeError {
    /// The SDK initialised but reported zero attached scanners.
    #[error("no fingerprint scanner detected")]
    NoDevices,

    /// The session was already shut down and cannot be reopened.
    #[error("device session has been released")]
    Released,

    /// A vendor call failed.
    #[error("scanner SDK error: {0}")]
    Sdk(#[from] SdkError),
}

/// Why a capture produced no template.
///
/// The `Display` text of each variant is what the browser receives in the
/// error response's `message` field.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// No device is open (never initialised, or already shut down).
    #[error("scanner is not initialized")]
    NotInitialized,

    /// The acquire call returned without a capture.
    #[error("fingerprint capture failed (timeout or no finger detected)")]
    NoCapture,

    /// The vendor SDK reported a hard failure.
    #[error("fingerprint capture failed: {0}")]
    Sdk(#[from] SdkError),
}

// ── DeviceSession ─────────────────────────────────────────────────────────────

enum SessionState {
    Uninitialized,
    Ready(DeviceHandle),
    Released,
}

struct Inner {
    sdk: Box<dyn ScannerSdk>,
    state: SessionState,
}

/// Owns the scanner SDK and its open device for the whole process lifetime.
///
/// Shared between connections as `Arc<DeviceSession>`.
pub struct DeviceSession {
    inner: Mutex<Inner>,
}

impl DeviceSession {
    /// Wraps an SDK backend.  No vendor call is made until
    /// [`initialize`](Self::initialize).
    pub fn new(sdk: Box<dyn ScannerSdk>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                sdk,
                state: SessionState::Uninitialized,
            }),
        }
    }

    /// Brings the scanner up: `init`, `device_count`, `open_device(0)`.
    ///
    /// On any failure after `init` succeeded the library is terminated again,
    /// so a failed attempt leaves nothing acquired.
    ///
    /// # Errors
    ///
    /// [`InitializeError::NoDevices`] when no scanner is attached,
    /// [`InitializeError::Released`] after [`shutdown`](Self::shutdown), and
    /// [`InitializeError::Sdk`] for vendor failures.
    pub fn try_initialize(&self) -> Result<(), InitializeError> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Ready(_) => return Ok(()),
            SessionState::Released => return Err(InitializeError::Released),
            SessionState::Uninitialized => {}
        }

        let backend = inner.sdk.name();
        inner.sdk.init()?;

        match open_first_device(&mut *inner.sdk) {
            Ok(handle) => {
                info!("scanner {} opened ({backend} backend)", handle.index());
                inner.state = SessionState::Ready(handle);
                Ok(())
            }
            Err(e) => {
                if let Err(te) = inner.sdk.terminate() {
                    warn!("failed to terminate scanner SDK after aborted startup: {te}");
                }
                Err(e)
            }
        }
    }

    /// [`try_initialize`](Self::try_initialize) with the failure logged and
    /// collapsed to `false`.
    pub fn initialize(&self) -> bool {
        match self.try_initialize() {
            Ok(()) => true,
            Err(e) => {
                error!("scanner initialization failed: {e}");
                false
            }
        }
    }

    /// Takes one fingerprint and returns its template as standard base64.
    ///
    /// Blocks for up to the backend's capture timeout.  A failed capture
    /// leaves the session ready for the next one.  A capture with an empty
    /// template counts as no capture.
    ///
    /// # Errors
    ///
    /// See [`CaptureError`].
    pub fn capture(&self) -> Result<String, CaptureError> {
        let mut inner = self.lock();
        let Inner { sdk, state } = &mut *inner;
        let SessionState::Ready(handle) = state else {
            return Err(CaptureError::NotInitialized);
        };

        match sdk.acquire(handle)? {
            Some(capture) if !capture.template.is_empty() => Ok(STANDARD.encode(&capture.template)),
            Some(_) | None => Err(CaptureError::NoCapture),
        }
    }

    /// Closes the device and terminates the SDK if the session is ready.
    ///
    /// Idempotent: later calls, and calls on a session that never became
    /// ready, do nothing.  Release failures are logged and swallowed.
    pub fn shutdown(&self) {
        let mut inner = self.lock();
        let previous = std::mem::replace(&mut inner.state, SessionState::Released);
        let SessionState::Ready(handle) = previous else {
            return;
        };

        let index = handle.index();
        if let Err(e) = inner.sdk.close_device(handle) {
            warn!("failed to close scanner {index}: {e}");
        }
        match inner.sdk.terminate() {
            Ok(()) => info!("scanner {index} released"),
            Err(e) => warn!("failed to terminate scanner SDK: {e}"),
        }
    }

    /// `true` while a device is open.
    pub fn is_ready(&self) -> bool {
        matches!(self.lock().state, SessionState::Ready(_))
    }

    // A panic while holding the lock (for example inside a vendor callback)
    // must not wedge every later request, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn open_first_device(sdk: &mut dyn ScannerSdk) -> Result<DeviceHandle, InitializeError> {
    let count = sdk.device_count()?;
    info!("{} scanner SDK reports {count} device(s)", sdk.name());
    if count == 0 {
        return Err(InitializeError::NoDevices);
    }
    Ok(sdk.open_device(DEVICE_INDEX)?)
}

impl Drop for DeviceSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// Never waits for the lock: a capture may hold it for the whole finger-wait.
impl std::fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = match self.inner.try_lock() {
            Ok(inner) => Some(matches!(inner.state, SessionState::Ready(_))),
            Err(TryLockError::Poisoned(poisoned)) => {
                Some(matches!(poisoned.into_inner().state, SessionState::Ready(_)))
            }
            Err(TryLockError::WouldBlock) => None,
        };

        let mut out = f.debug_struct("DeviceSession");
        match ready {
            Some(ready) => out.field("ready", &ready),
            None => out.field("busy", &true),
        };
        out.finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
