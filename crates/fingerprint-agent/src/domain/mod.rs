//! Domain layer for fingerprint-agent.
//!
//! Pure types with no I/O, no async runtime and no vendor SDK calls:
//!
//! - the JSON "language" spoken with the browser
//! - the origin allow-list that gates connections
//! - the resolved runtime configuration

pub mod config;
pub mod messages;
pub mod origin;

pub use config::{AgentConfig, ScannerBackend};
pub use messages::{decode_command, Command, DecodeError, Response};
pub use origin::AllowedOrigins;
