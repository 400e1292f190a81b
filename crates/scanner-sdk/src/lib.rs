//! # scanner-sdk
//!
//! The boundary between the fingerprint agent and the vendor scanner SDK.
//!
//! The agent never talks to scanner hardware directly.  It drives a
//! [`ScannerSdk`] implementation, which wraps whatever the vendor ships
//! (driver, template extraction, device enumeration) behind six fallible
//! calls.  Everything the vendor owns stays opaque here: templates are plain
//! byte vectors and device handles are tokens.
//!
//! # Backends
//!
//! - [`SimulatedScanner`]: scripted, in-memory; always available.
//! - `ZkFingerSdk`: the ZKTeco ZKFinger library, behind the `zkfinger`
//!   cargo feature because it links a vendor DLL/shared object.
//! - `MockScannerSdk`: a `mockall` mock, behind the `mock` feature, for
//!   tests that assert exact call sequences.

pub mod backend;

pub use backend::simulated::{CallCounts, SimulatedScanner, DEMO_TEMPLATE};
pub use backend::{Capture, DeviceHandle, ScannerSdk, SdkError};

#[cfg(feature = "zkfinger")]
pub use backend::zkfinger::ZkFingerSdk;

#[cfg(any(test, feature = "mock"))]
pub use backend::MockScannerSdk;
