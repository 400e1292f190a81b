//! Agent configuration types.
//!
//! [`AgentConfig`] is the single source of truth for all runtime settings.
//! It is resolved once at startup (CLI, environment, optional TOML file,
//! built-in defaults) and never changes afterwards.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! variable reads inside the domain) makes the agent easy to embed in tests.
//! `main.rs` and the infrastructure layer populate it.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::origin::AllowedOrigins;

/// Port browser pages connect to (`ws://127.0.0.1:9876`).
pub const DEFAULT_PORT: u16 = 9876;

/// Loopback only: the agent serves pages running on the same machine.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Origin of the web application during local development.
pub const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:4200";

pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Which [`scanner_sdk::ScannerSdk`] implementation the agent drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerBackend {
    /// ZKTeco ZKFinger hardware through `libzkfp`.
    Zkfinger,
    /// In-memory scanner that returns a fixed demo template.
    Simulated,
}

impl fmt::Display for ScannerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zkfinger => f.write_str("zkfinger"),
            Self::Simulated => f.write_str("simulated"),
        }
    }
}

impl FromStr for ScannerBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zkfinger" => Ok(Self::Zkfinger),
            "simulated" => Ok(Self::Simulated),
            other => Err(format!(
                "unknown scanner backend '{other}' (expected 'zkfinger' or 'simulated')"
            )),
        }
    }
}

/// All runtime configuration for the agent.
///
/// # Example
///
/// ```rust
/// use fingerprint_agent::domain::AgentConfig;
///
/// let cfg = AgentConfig::default();
/// assert_eq!(cfg.listen_addr.port(), 9876);
/// assert!(cfg.allowed_origins.authorize(Some("http://localhost:4200")));
/// ```
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Address the WebSocket server binds to.
    pub listen_addr: SocketAddr,

    /// Origins whose pages may open a connection.
    pub allowed_origins: AllowedOrigins,

    /// Longest time one capture waits for a finger on the sensor.
    ///
    /// Enforced inside the SDK backend; the protocol layer has no timeout
    /// of its own.
    pub capture_timeout: Duration,

    /// How long shutdown waits for live connections (and their in-flight
    /// captures) before aborting them.
    pub shutdown_grace: Duration,

    /// Scanner backend to drive.
    pub backend: ScannerBackend,
}

impl Default for AgentConfig {
    /// | Field           | Default                     |
    /// |-----------------|-----------------------------|
    /// | listen_addr     | `127.0.0.1:9876`            |
    /// | allowed_origins | `http://localhost:4200`     |
    /// | capture_timeout | 10 seconds                  |
    /// | shutdown_grace  | 5 seconds                   |
    /// | backend         | `zkfinger`                  |
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)),
            allowed_origins: AllowedOrigins::new([DEFAULT_ALLOWED_ORIGIN]),
            capture_timeout: DEFAULT_CAPTURE_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            backend: ScannerBackend::Zkfinger,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_listen_addr_is_loopback_9876() {
        // Arrange / Act
        let cfg = AgentConfig::default();
        // Assert
        assert_eq!(cfg.listen_addr.to_string(), "127.0.0.1:9876");
        assert_eq!(cfg.listen_addr.ip().to_string(), DEFAULT_HOST);
    }

    #[test]
    fn test_default_allows_only_local_dev_origin() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.allowed_origins.len(), 1);
        assert!(cfg.allowed_origins.authorize(Some(DEFAULT_ALLOWED_ORIGIN)));
    }

    #[test]
    fn test_default_timeouts() {
        let cfg = AgentConfig::default();
        assert_eq!(cfg.capture_timeout, Duration::from_secs(10));
        assert_eq!(cfg.shutdown_grace, Duration::from_secs(5));
    }

    #[test]
    fn test_default_backend_is_real_hardware() {
        assert_eq!(AgentConfig::default().backend, ScannerBackend::Zkfinger);
    }

    #[test]
    fn test_backend_parses_case_insensitively() {
        assert_eq!("Simulated".parse::<ScannerBackend>(), Ok(ScannerBackend::Simulated));
        assert_eq!(" zkfinger ".parse::<ScannerBackend>(), Ok(ScannerBackend::Zkfinger));
    }

    #[test]
    fn test_backend_parse_rejects_unknown_names() {
        let err = "usb".parse::<ScannerBackend>().unwrap_err();
        assert!(err.contains("usb"));
    }

    #[test]
    fn test_backend_display_matches_parse_input() {
        for backend in [ScannerBackend::Zkfinger, ScannerBackend::Simulated] {
            assert_eq!(backend.to_string().parse::<ScannerBackend>(), Ok(backend));
        }
    }

    #[test]
    fn test_backend_deserializes_from_lowercase_toml_value() {
        #[derive(Deserialize)]
        struct Wrapper {
            backend: ScannerBackend,
        }
        let parsed: Wrapper = toml::from_str(r#"backend = "simulated""#).unwrap();
        assert_eq!(parsed.backend, ScannerBackend::Simulated);
    }
}
