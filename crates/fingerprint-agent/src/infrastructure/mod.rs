//! Infrastructure layer for fingerprint-agent.
//!
//! The infrastructure layer handles all I/O and process wiring.
//!
//! # Responsibilities
//!
//! - Binding the WebSocket listener and gating handshakes by origin
//! - Spawning per-connection Tokio tasks and draining them on shutdown
//! - Reading the optional TOML config file
//! - Choosing the scanner SDK backend
//! - Sequencing startup, serving and release (`agent::run`)
//!
//! # What does NOT belong here?
//!
//! - Message decoding and the capture state machine (application layer)
//! - Message type definitions (domain layer)
//! - Command-line parsing and signal handling (`main.rs`)

pub mod agent;
pub mod backend;
pub mod config_file;
pub mod ws_server;

pub use agent::{run, AgentError};
pub use backend::{build_backend, BackendError};
pub use config_file::{load_config_file, ConfigError, FileConfig};
