//! ZKTeco ZKFinger SDK binding (`libzkfp`).
//!
//! Maps [`ScannerSdk`] onto the vendor's C API:
//!
//! | Trait method   | Vendor call                               |
//! |----------------|-------------------------------------------|
//! | `init`         | `ZKFPM_Init`                              |
//! | `device_count` | `ZKFPM_GetDeviceCount`                    |
//! | `open_device`  | `ZKFPM_OpenDevice` + `ZKFPM_GetParameters`|
//! | `acquire`      | `ZKFPM_AcquireFingerprint` (polled)       |
//! | `close_device` | `ZKFPM_CloseDevice`                       |
//! | `terminate`    | `ZKFPM_Terminate`                         |
//!
//! `ZKFPM_AcquireFingerprint` returns immediately with a capture error while
//! no finger is on the sensor, so `acquire` polls it until a template is read
//! or the capture timeout passes.
//!
//! # Safety
//!
//! This module uses `unsafe` exclusively for the vendor FFI calls.  All
//! `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(feature = "zkfinger")]

use std::ffi::c_void;
use std::os::raw::{c_int, c_uchar, c_uint};
use std::ptr;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::{Capture, DeviceHandle, ScannerSdk, SdkError};

type ZkHandle = *mut c_void;

const ZKFP_ERR_OK: c_int = 0;
const ZKFP_ERR_ALREADY_INIT: c_int = 1;
const ZKFP_ERR_INVALID_HANDLE: c_int = -7;
const ZKFP_ERR_CAPTURE: c_int = -8;
const ZKFP_ERR_EXTRACT_FP: c_int = -9;
const ZKFP_ERR_BUSY: c_int = -12;

const PARAM_IMAGE_WIDTH: c_int = 1;
const PARAM_IMAGE_HEIGHT: c_int = 2;

/// Upper bound the vendor documents for a ZKFinger template.
const MAX_TEMPLATE_SIZE: usize = 2048;

/// Image buffer used when the device does not report its dimensions.
const FALLBACK_IMAGE_SIZE: usize = 300 * 400;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[cfg_attr(target_os = "windows", link(name = "libzkfp"))]
#[cfg_attr(not(target_os = "windows"), link(name = "zkfp"))]
extern "system" {
    fn ZKFPM_Init() -> c_int;
    fn ZKFPM_Terminate() -> c_int;
    fn ZKFPM_GetDeviceCount() -> c_int;
    fn ZKFPM_OpenDevice(index: c_int) -> ZkHandle;
    fn ZKFPM_CloseDevice(handle: ZkHandle) -> c_int;
    fn ZKFPM_GetParameters(
        handle: ZkHandle,
        param_code: c_int,
        param_value: *mut c_uchar,
        cb_param_value: *mut c_uint,
    ) -> c_int;
    fn ZKFPM_AcquireFingerprint(
        handle: ZkHandle,
        fp_image: *mut c_uchar,
        cb_fp_image: c_uint,
        fp_template: *mut c_uchar,
        cb_template: *mut c_uint,
    ) -> c_int;
}

struct OpenDevice {
    index: usize,
    raw: ZkHandle,
    image_size: usize,
}

/// [`ScannerSdk`] backed by the ZKFinger library.
pub struct ZkFingerSdk {
    capture_timeout: Duration,
    initialized: bool,
    device: Option<OpenDevice>,
}

// SAFETY: the raw device handle is an opaque token owned by the vendor
// library.  `ZkFingerSdk` is only ever used by one thread at a time (the
// device session serialises all calls behind a mutex), which is the access
// pattern libzkfp supports.
unsafe impl Send for ZkFingerSdk {}

impl ZkFingerSdk {
    /// Creates an unopened binding whose `acquire` waits at most
    /// `capture_timeout` for a finger.
    pub fn new(capture_timeout: Duration) -> Self {
        Self {
            capture_timeout,
            initialized: false,
            device: None,
        }
    }

    fn open(&self, handle: &DeviceHandle) -> Result<&OpenDevice, SdkError> {
        match &self.device {
            Some(device) if device.index == handle.index() => Ok(device),
            _ => Err(SdkError::DeviceNotOpen),
        }
    }
}

impl ScannerSdk for ZkFingerSdk {
    fn name(&self) -> &'static str {
        "zkfinger"
    }

    fn init(&mut self) -> Result<(), SdkError> {
        // SAFETY: ZKFPM_Init takes no arguments and may be called repeatedly.
        let code = unsafe { ZKFPM_Init() };
        if code != ZKFP_ERR_OK && code != ZKFP_ERR_ALREADY_INIT {
            return Err(SdkError::InitFailed(code));
        }
        self.initialized = true;
        Ok(())
    }

    fn device_count(&mut self) -> Result<usize, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        // SAFETY: the library is initialised (checked above).
        let count = unsafe { ZKFPM_GetDeviceCount() };
        // Negative values are vendor error codes; no device is reachable.
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn open_device(&mut self, index: usize) -> Result<DeviceHandle, SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        if let Some(device) = &self.device {
            return Err(SdkError::DeviceAlreadyOpen(device.index));
        }
        let count = self.device_count()?;
        if index >= count {
            return Err(SdkError::DeviceIndexOutOfRange { index, count });
        }
        let raw_index = c_int::try_from(index)
            .map_err(|_| SdkError::DeviceIndexOutOfRange { index, count })?;

        // SAFETY: the library is initialised and `raw_index` is in range.
        let raw = unsafe { ZKFPM_OpenDevice(raw_index) };
        if raw.is_null() {
            return Err(SdkError::OpenFailed {
                index,
                code: ZKFP_ERR_INVALID_HANDLE,
            });
        }

        let image_size = match (
            read_parameter(raw, PARAM_IMAGE_WIDTH),
            read_parameter(raw, PARAM_IMAGE_HEIGHT),
        ) {
            (Some(width), Some(height)) if width > 0 && height > 0 => width * height,
            _ => {
                warn!("scanner {index} did not report its image size; using a fallback buffer");
                FALLBACK_IMAGE_SIZE
            }
        };
        debug!("scanner {index} opened (image buffer {image_size} bytes)");

        self.device = Some(OpenDevice {
            index,
            raw,
            image_size,
        });
        Ok(DeviceHandle::new(index))
    }

    fn acquire(&mut self, handle: &DeviceHandle) -> Result<Option<Capture>, SdkError> {
        let device = self.open(handle)?;
        let raw = device.raw;
        let mut image = vec![0u8; device.image_size];
        let image_len = c_uint::try_from(image.len()).unwrap_or(c_uint::MAX);
        let deadline = Instant::now() + self.capture_timeout;

        loop {
            let mut template = vec![0u8; MAX_TEMPLATE_SIZE];
            let mut template_len = MAX_TEMPLATE_SIZE as c_uint;

            // SAFETY: `raw` is a live handle from ZKFPM_OpenDevice; both
            // buffers are valid for the lengths passed alongside them.
            let code = unsafe {
                ZKFPM_AcquireFingerprint(
                    raw,
                    image.as_mut_ptr(),
                    image_len,
                    template.as_mut_ptr(),
                    &mut template_len,
                )
            };

            match code {
                ZKFP_ERR_OK => {
                    template.truncate(template_len as usize);
                    return Ok(Some(Capture { template, image }));
                }
                ZKFP_ERR_CAPTURE | ZKFP_ERR_EXTRACT_FP | ZKFP_ERR_BUSY => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                other => return Err(SdkError::AcquireFailed(other)),
            }
        }
    }

    fn close_device(&mut self, handle: DeviceHandle) -> Result<(), SdkError> {
        let raw = self.open(&handle)?.raw;
        self.device = None;
        // SAFETY: `raw` came from ZKFPM_OpenDevice and has not been closed.
        let code = unsafe { ZKFPM_CloseDevice(raw) };
        if code != ZKFP_ERR_OK {
            return Err(SdkError::CloseFailed(code));
        }
        Ok(())
    }

    fn terminate(&mut self) -> Result<(), SdkError> {
        if !self.initialized {
            return Err(SdkError::NotInitialized);
        }
        self.initialized = false;
        self.device = None;
        // SAFETY: the library was initialised by `init`.
        let code = unsafe { ZKFPM_Terminate() };
        if code != ZKFP_ERR_OK {
            return Err(SdkError::TerminateFailed(code));
        }
        Ok(())
    }
}

/// Reads an integer device parameter; `None` when the device refuses.
fn read_parameter(raw: ZkHandle, code: c_int) -> Option<usize> {
    let mut value: c_int = 0;
    let mut size = std::mem::size_of::<c_int>() as c_uint;
    // SAFETY: `value` is a live c_int and `size` holds its byte length.
    let ret = unsafe {
        ZKFPM_GetParameters(
            raw,
            code,
            ptr::addr_of_mut!(value).cast::<c_uchar>(),
            &mut size,
        )
    };
    if ret != ZKFP_ERR_OK {
        return None;
    }
    usize::try_from(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calls_before_init_are_rejected_without_touching_the_library() {
        let mut sdk = ZkFingerSdk::new(Duration::from_secs(1));
        assert_eq!(sdk.device_count(), Err(SdkError::NotInitialized));
        assert_eq!(sdk.open_device(0), Err(SdkError::NotInitialized));
        assert_eq!(sdk.terminate(), Err(SdkError::NotInitialized));
    }

    #[test]
    fn test_acquire_with_unknown_handle_is_rejected() {
        let mut sdk = ZkFingerSdk::new(Duration::from_secs(1));
        assert_eq!(
            sdk.acquire(&DeviceHandle::new(0)),
            Err(SdkError::DeviceNotOpen)
        );
    }
}
