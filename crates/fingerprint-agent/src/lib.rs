//! fingerprint-agent library crate.
//!
//! A local WebSocket agent that lets a web application running in the
//! browser capture fingerprints from a scanner attached to the same machine.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Browser page (JSON over WebSocket, ws://127.0.0.1:9876)
//!         ↕
//! [fingerprint-agent]
//!   ├── domain/           Pure types: messages, origin allow-list, AgentConfig
//!   ├── application/      DeviceSession state machine, per-message handling
//!   └── infrastructure/
//!         ├── ws_server/  Accept loop, origin gate, connection tasks
//!         ├── agent/      Startup → serve → release sequencing
//!         ├── config_file/ Optional TOML configuration
//!         └── backend/    ScannerSdk backend selection
//!         ↕
//! scanner-sdk (ScannerSdk trait: simulated scanner or ZKFinger library)
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async runtime.
//! - `application` depends on `domain` and `scanner-sdk`; its only async code
//!   hands blocking captures to Tokio's blocking pool.
//! - `infrastructure` depends on all other layers plus `tokio` and
//!   `tokio-tungstenite`.

/// Domain layer: pure types (no I/O).
pub mod domain;

/// Application layer: scanner lifecycle and message handling.
pub mod application;

/// Infrastructure layer: WebSocket server, config file, process lifecycle.
pub mod infrastructure;
