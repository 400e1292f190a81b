//! Application layer for fingerprint-agent.
//!
//! The application layer knows *what* to do with the scanner and with each
//! browser message, but not how bytes reach it.
//!
//! # Responsibilities
//!
//! - Owning the scanner lifecycle (`DeviceSession`)
//! - Turning one decoded message into one response (`handle_payload`)
//!
//! # What does NOT belong here?
//!
//! - Sockets, handshakes and WebSocket framing (infrastructure)
//! - Signal handling and configuration loading (`main.rs`)

pub mod device_session;
pub mod protocol_handler;

pub use device_session::{CaptureError, DeviceSession, InitializeError};
pub use protocol_handler::handle_payload;
