//! Optional TOML configuration file.
//!
//! Every key is optional.  A value given on the command line (or through the
//! matching environment variable) wins over the file; a key missing from both
//! falls back to the built-in default in [`crate::domain::config`].
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 9876
//! shutdown_grace_secs = 5
//!
//! [access]
//! allowed_origins = ["http://localhost:4200", "https://app.example.com"]
//!
//! [scanner]
//! backend = "zkfinger"
//! capture_timeout_ms = 10000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::config::ScannerBackend;

/// Error type for configuration file loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level layout of the config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub access: AccessSection,
    #[serde(default)]
    pub scanner: ScannerSection,
}

/// `[server]`: where to listen and how long to drain on shutdown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSection {
    /// IP address to bind.
    pub host: Option<String>,
    pub port: Option<u16>,
    pub shutdown_grace_secs: Option<u64>,
}

/// `[access]`: the origin allow-list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessSection {
    /// Replaces the default list entirely when present.
    pub allowed_origins: Option<Vec<String>>,
}

/// `[scanner]`: backend selection and capture timing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScannerSection {
    pub backend: Option<ScannerBackend>,
    pub capture_timeout_ms: Option<u64>,
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Reads and parses the config file at `path`.
///
/// Unlike the defaults-only path taken when no `--config` is given, an
/// explicitly named file must exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if the TOML is malformed or has a value of the
/// wrong type.
pub fn load_config_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

/// Parses config file content.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<FileConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
