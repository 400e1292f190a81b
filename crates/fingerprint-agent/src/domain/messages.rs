//! JSON message types for the browser-facing WebSocket protocol.
//!
//! # Message flow
//!
//! ```text
//! Browser → Agent:  {"command":"CAPTURE_FINGERPRINT"}
//! Agent → Browser:  {"status":"success","template":"AQID"}
//!                   {"status":"error","message":"unrecognized command"}
//! ```
//!
//! Requests are decoded leniently: any JSON object is accepted, unknown
//! fields are ignored, and only the string field `command` is inspected.
//! That keeps older agents compatible with pages that send extra fields.
//! Anything that is not a JSON object is a decode failure.
//!
//! Responses carry a `"status"` discriminant; serde's
//! `#[serde(tag = "status")]` produces the flat object the browser expects.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Wire name of the capture command.
pub const CAPTURE_FINGERPRINT: &str = "CAPTURE_FINGERPRINT";

/// Error message for payloads that cannot be decoded at all.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal agent error";

/// Error message for decoded payloads with an unknown or missing command.
pub const UNRECOGNIZED_COMMAND_MESSAGE: &str = "unrecognized command";

// ── Browser → Agent ───────────────────────────────────────────────────────────

/// A decoded request from the browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Take one fingerprint and return its template.
    CaptureFingerprint,
    /// The `command` field was missing, not a string, or not a known name.
    ///
    /// Carries no copy of the received value, so client payloads never reach
    /// the logs.
    Unrecognized,
}

impl Command {
    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CaptureFingerprint => CAPTURE_FINGERPRINT,
            Self::Unrecognized => "<unrecognized>",
        }
    }
}

/// Why an inbound payload could not be decoded.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// A binary frame that is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Text that is not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// Valid JSON, but not an object.
    #[error("payload is JSON but not an object")]
    NotAnObject,
}

/// Decodes one inbound frame payload.
///
/// # Errors
///
/// Returns [`DecodeError`] if the payload is not UTF-8, not JSON, or not a
/// JSON object.  An object without a usable `command` is *not* an error; it
/// decodes to [`Command::Unrecognized`].
pub fn decode_command(payload: &[u8]) -> Result<Command, DecodeError> {
    let text = std::str::from_utf8(payload)?;
    let value: Value = serde_json::from_str(text)?;
    let Value::Object(fields) = value else {
        return Err(DecodeError::NotAnObject);
    };

    Ok(match fields.get("command").and_then(Value::as_str) {
        Some(CAPTURE_FINGERPRINT) => Command::CaptureFingerprint,
        _ => Command::Unrecognized,
    })
}

// ── Agent → Browser ───────────────────────────────────────────────────────────

/// The one reply sent for every inbound message.
///
/// # Serde representation
///
/// ```json
/// {"status":"success","template":"AQID"}
/// {"status":"error","message":"scanner is not initialized"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Response {
    /// A capture succeeded.
    Success {
        /// Standard base64 (RFC 4648, padded) of the template bytes.
        template: String,
    },
    /// The message could not be served.
    Error {
        /// Human-readable reason.
        message: String,
    },
}

impl Response {
    pub fn success(template: impl Into<String>) -> Self {
        Self::Success {
            template: template.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// `true` for [`Response::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
