//! In-memory scanner for tests and hardware-less runs.
//!
//! [`SimulatedScanner`] follows the same call-order rules as a real vendor
//! SDK (no `open_device` before `init`, one open device at a time, no
//! `terminate` without `init`) and lets tests script exactly what each
//! `acquire` returns.
//!
//! Clones share state, so a test can keep one clone as an observer while the
//! other is moved into a device session:
//!
//! ```rust
//! use scanner_sdk::{Capture, ScannerSdk, SimulatedScanner};
//!
//! let observer = SimulatedScanner::new(1).with_captures([Ok(Some(Capture {
//!     template: vec![1, 2, 3],
//!     image: vec![0; 4],
//! }))]);
//! let mut sdk = observer.clone();
//!
//! sdk.init().unwrap();
//! let handle = sdk.open_device(0).unwrap();
//! assert!(sdk.acquire(&handle).unwrap().is_some());
//! assert_eq!(observer.calls().acquire, 1);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use super::{Capture, DeviceHandle, ScannerSdk, SdkError};

/// Template bytes returned by [`SimulatedScanner::demo`].
pub const DEMO_TEMPLATE: &[u8] = b"SIMULATED-FINGERPRINT-TEMPLATE";

/// Side length of the square demo image.
const DEMO_IMAGE_SIDE: usize = 16;

/// How many times each SDK operation has been called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub init: u32,
    pub device_count: u32,
    pub open_device: u32,
    pub acquire: u32,
    pub close_device: u32,
    pub terminate: u32,
}

#[derive(Debug)]
struct State {
    device_count: usize,
    init_error: Option<SdkError>,
    count_error: Option<SdkError>,
    script: VecDeque<Result<Option<Capture>, SdkError>>,
    fallback: Option<Capture>,
    acquire_delay: Duration,
    initialized: bool,
    open: Option<usize>,
    calls: CallCounts,
    acquiring: u32,
    peak_acquiring: u32,
}

/// A scripted, in-memory [`ScannerSdk`].
#[derive(Debug, Clone)]
pub struct SimulatedScanner {
    state: Arc<Mutex<State>>,
}

impl SimulatedScanner {
    /// Creates a scanner that reports `device_count` attached devices and
    /// times out on every capture until a script or fallback is set.
    pub fn new(device_count: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                device_count,
                init_error: None,
                count_error: None,
                script: VecDeque::new(),
                fallback: None,
                acquire_delay: Duration::ZERO,
                initialized: false,
                open: None,
                calls: CallCounts::default(),
                acquiring: 0,
                peak_acquiring: 0,
            })),
        }
    }

    /// One device that returns [`DEMO_TEMPLATE`] on every capture.
    pub fn demo() -> Self {
        Self::new(1).with_fallback(Capture {
            template: DEMO_TEMPLATE.to_vec(),
            image: vec![0x80; DEMO_IMAGE_SIDE * DEMO_IMAGE_SIDE],
        })
    }

    /// Queues acquisition outcomes, consumed one per `acquire` call in order.
    pub fn with_captures<I>(self, outcomes: I) -> Self
    where
        I: IntoIterator<Item = Result<Option<Capture>, SdkError>>,
    {
        self.state().script.extend(outcomes);
        self
    }

    /// Capture returned once the script is exhausted.
    pub fn with_fallback(self, capture: Capture) -> Self {
        self.state().fallback = Some(capture);
        self
    }

    /// Makes `init` fail with `error`.
    pub fn failing_init(self, error: SdkError) -> Self {
        self.state().init_error = Some(error);
        self
    }

    /// Makes `device_count` fail with `error`.
    pub fn failing_device_count(self, error: SdkError) -> Self {
        self.state().count_error = Some(error);
        self
    }

    /// Makes every `acquire` block for `delay`, like a finger-wait on real
    /// hardware.
    pub fn with_acquire_delay(self, delay: Duration) -> Self {
        self.state().acquire_delay = delay;
        self
    }

    /// Appends one more acquisition outcome to the script.
    pub fn push_capture(&self, outcome: Result<Option<Capture>, SdkError>) {
        self.state().script.push_back(outcome);
    }

    /// Snapshot of the call counters.
    pub fn calls(&self) -> CallCounts {
        self.state().calls
    }

    /// `true` between a successful `init` and `terminate`.
    pub fn is_initialized(&self) -> bool {
        self.state().initialized
    }

    /// Largest number of `acquire` calls that were in progress at once,
    /// across all clones.
    pub fn peak_concurrent_acquires(&self) -> u32 {
        self.state().peak_acquiring
    }

    /// Index of the currently open device, if any.
    pub fn open_device_index(&self) -> Option<usize> {
        self.state().open
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScannerSdk for SimulatedScanner {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn init(&mut self) -> Result<(), SdkError> {
        let mut state = self.state();
        state.calls.init += 1;
        if let Some(err) = state.init_error.clone() {
            return Err(err);
        }
        state.initialized = true;
        Ok(())
    }

    fn device_count(&mut self) -> Result<usize, SdkError> {
        let mut state = self.state();
        state.calls.device_count += 1;
        if !state.initialized {
            return Err(SdkError::NotInitialized);
        }
        if let Some(err) = state.count_error.clone() {
            return Err(err);
        }
        Ok(state.device_count)
    }

    fn open_device(&mut self, index: usize) -> Result<DeviceHandle, SdkError> {
        let mut state = self.state();
        state.calls.open_device += 1;
        if !state.initialized {
            return Err(SdkError::NotInitialized);
        }
        if let Some(open) = state.open {
            return Err(SdkError::DeviceAlreadyOpen(open));
        }
        if index >= state.device_count {
            return Err(SdkError::DeviceIndexOutOfRange {
                index,
                count: state.device_count,
            });
        }
        state.open = Some(index);
        Ok(DeviceHandle::new(index))
    }

    fn acquire(&mut self, handle: &DeviceHandle) -> Result<Option<Capture>, SdkError> {
        let delay = {
            let mut state = self.state();
            state.calls.acquire += 1;
            if state.open != Some(handle.index()) {
                return Err(SdkError::DeviceNotOpen);
            }
            state.acquiring += 1;
            state.peak_acquiring = state.peak_acquiring.max(state.acquiring);
            state.acquire_delay
        };

        // Sleep without holding the lock so observers stay responsive.
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let mut state = self.state();
        state.acquiring -= 1;
        match state.script.pop_front() {
            Some(outcome) => outcome,
            None => Ok(state.fallback.clone()),
        }
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), SdkError> {
        let mut state = self.state();
        state.calls.close_device += 1;
        if state.open != Some(handle.index()) {
            return Err(SdkError::DeviceNotOpen);
        }
        state.open = None;
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SdkError> {
        let mut state = self.state();
        state.calls.terminate += 1;
        if !state.initialized {
            return Err(SdkError::NotInitialized);
        }
        state.initialized = false;
        state.open = None;
        Ok(())
    }
}
