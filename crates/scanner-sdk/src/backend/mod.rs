//! The vendor SDK contract consumed by the agent's device session.
//!
//! A fingerprint scanner SDK exposes a small, stateful C-style API:
//! initialise the library, count the attached devices, open one, acquire
//! captures from it, and tear everything down again.  [`ScannerSdk`] is the
//! Rust shape of that API.  Every call returns a `Result` so vendor failures
//! become ordinary control flow for the caller instead of crashes.
//!
//! # Implementations
//!
//! - [`simulated::SimulatedScanner`]: in-memory scanner with scripted
//!   captures.  Used by the test suites and by hardware-less runs.
//! - `zkfinger::ZkFingerSdk` (feature `zkfinger`): FFI binding to the
//!   ZKTeco ZKFinger library.
//!
//! # Threading
//!
//! Implementations must be `Send` so a session can move them onto a blocking
//! worker thread, but they are never shared: the caller serialises every call
//! behind its own lock.

use std::fmt;

pub mod simulated;

#[cfg(feature = "zkfinger")]
pub mod zkfinger;

/// Opaque token for an opened scanner device.
///
/// The backend keeps the real vendor resource; the handle only identifies
/// it.  Handles are deliberately not `Clone`: [`ScannerSdk::close_device`]
/// consumes the one and only handle, so a closed device cannot be used again.
#[derive(Debug, PartialEq, Eq)]
pub struct DeviceHandle {
    index: usize,
}

impl DeviceHandle {
    /// Creates a handle for the device at `index`.
    pub fn new(index: usize) -> Self {
        Self { index }
    }

    /// Enumeration index the device was opened with.
    pub fn index(&self) -> usize {
        self.index
    }
}

/// One successful fingerprint acquisition.
#[derive(Clone, PartialEq, Eq)]
pub struct Capture {
    /// Vendor-specific biometric template.  Opaque to this crate.
    pub template: Vec<u8>,
    /// Raw grey-scale image of the finger.
    pub image: Vec<u8>,
}

// Biometric payloads must never end up in logs, so `Debug` reports sizes only.
impl fmt::Debug for Capture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("template_len", &self.template.len())
            .field("image_len", &self.image.len())
            .finish()
    }
}

/// Errors reported by a scanner SDK backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SdkError {
    /// A call was made before `init` (or after `terminate`).
    #[error("scanner SDK library is not initialized")]
    NotInitialized,

    /// The vendor library refused to initialise.
    #[error("scanner SDK initialization failed (code {0})")]
    InitFailed(i32),

    /// `open_device` was given an index past the end of the device list.
    #[error("no scanner at index {index} ({count} attached)")]
    DeviceIndexOutOfRange { index: usize, count: usize },

    /// A device is already open; only one handle may exist at a time.
    #[error("scanner {0} is already open")]
    DeviceAlreadyOpen(usize),

    /// The vendor library failed to open the device.
    #[error("failed to open scanner {index} (code {code})")]
    OpenFailed { index: usize, code: i32 },

    /// The handle does not refer to the currently open device.
    #[error("scanner handle is not open")]
    DeviceNotOpen,

    /// The device reported a hard failure while acquiring.
    #[error("fingerprint acquisition failed (code {0})")]
    AcquireFailed(i32),

    /// The device could not be closed cleanly.
    #[error("failed to close scanner (code {0})")]
    CloseFailed(i32),

    /// The library could not be terminated cleanly.
    #[error("scanner SDK termination failed (code {0})")]
    TerminateFailed(i32),
}

/// The operations a fingerprint scanner SDK provides.
///
/// Call order is `init` → `device_count` → `open_device` → `acquire`* →
/// `close_device` → `terminate`.  Backends report out-of-order calls as
/// errors rather than panicking.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
pub trait ScannerSdk: Send {
    /// Short backend name for log lines.
    fn name(&self) -> &'static str;

    /// Initialises the vendor library.  Calling it twice is harmless.
    fn init(&mut self) -> Result<(), SdkError>;

    /// Returns the number of attached scanners.
    fn device_count(&mut self) -> Result<usize, SdkError>;

    /// Opens the scanner at `index`.
    ///
    /// Fails if `index` is out of range or a device is already open.
    fn open_device(&mut self, index: usize) -> Result<DeviceHandle, SdkError>;

    /// Blocks until a finger is read or the backend's internal timeout
    /// expires.
    ///
    /// Returns `Ok(None)` when no capture was taken (timeout, no finger).
    /// That is an expected outcome, not an error.
    fn acquire(&mut self, handle: &DeviceHandle) -> Result<Option<Capture>, SdkError>;

    /// Releases an open device.
    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), SdkError>;

    /// Releases every library resource.  Only valid after `init`.
    fn terminate(&mut self) -> Result<(), SdkError>;
}
