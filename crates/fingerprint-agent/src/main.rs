//! Fingerprint agent: entry point.
//!
//! This binary runs on the machine the fingerprint scanner is plugged into.
//! Web pages served from an allowed origin open a WebSocket to it, send
//! `{"command":"CAPTURE_FINGERPRINT"}`, and receive the captured template as
//! base64.
//!
//! # Usage
//!
//! ```text
//! fingerprint-agent [OPTIONS]
//!
//! Options:
//!   --host <IP>                   Address to bind [default: 127.0.0.1]
//!   --port <PORT>                 WebSocket port [default: 9876]
//!   --allowed-origin <ORIGIN>     Allowed page origin (repeatable)
//!                                 [default: http://localhost:4200]
//!   --capture-timeout-ms <MS>     Longest wait for a finger [default: 10000]
//!   --shutdown-grace-secs <SECS>  Drain time on shutdown [default: 5]
//!   --backend <zkfinger|simulated> Scanner backend [default: zkfinger]
//!   --config <PATH>               Optional TOML config file
//! ```
//!
//! # Environment variable overrides
//!
//! Every option can also be set through the environment.  A command-line
//! argument wins over its variable; both win over the config file; the file
//! wins over the built-in defaults.
//!
//! | Variable                       | Option                  |
//! |--------------------------------|-------------------------|
//! | `FP_AGENT_HOST`                | `--host`                |
//! | `FP_AGENT_PORT`                | `--port`                |
//! | `FP_AGENT_ALLOWED_ORIGINS`     | `--allowed-origin` (comma-separated) |
//! | `FP_AGENT_CAPTURE_TIMEOUT_MS`  | `--capture-timeout-ms`  |
//! | `FP_AGENT_SHUTDOWN_GRACE_SECS` | `--shutdown-grace-secs` |
//! | `FP_AGENT_BACKEND`             | `--backend`             |
//! | `FP_AGENT_CONFIG`              | `--config`              |
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use fingerprint_agent::application::DeviceSession;
use fingerprint_agent::domain::config::{
    AgentConfig, ScannerBackend, DEFAULT_CAPTURE_TIMEOUT, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_SHUTDOWN_GRACE,
};
use fingerprint_agent::domain::AllowedOrigins;
use fingerprint_agent::infrastructure::{build_backend, load_config_file, run, FileConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Local WebSocket agent for browser-driven fingerprint capture.
///
/// Options left unset fall back to the config file, then to built-in
/// defaults, so every field here is optional.
#[derive(Debug, Parser)]
#[command(
    name = "fingerprint-agent",
    about = "Local WebSocket agent that captures fingerprints for allowed web pages",
    version
)]
struct Cli {
    /// IP address to bind the WebSocket server to.
    ///
    /// Keep the default `127.0.0.1` unless pages on other machines must
    /// reach this scanner.
    #[arg(long, env = "FP_AGENT_HOST")]
    host: Option<String>,

    /// TCP port for the WebSocket server.
    #[arg(long, env = "FP_AGENT_PORT")]
    port: Option<u16>,

    /// Page origin allowed to connect, e.g. `https://app.example.com`.
    ///
    /// Repeat the flag (or comma-separate the variable) for several origins.
    /// Matching is exact.
    #[arg(
        long = "allowed-origin",
        env = "FP_AGENT_ALLOWED_ORIGINS",
        value_delimiter = ','
    )]
    allowed_origins: Vec<String>,

    /// Longest time one capture waits for a finger, in milliseconds.
    #[arg(long, env = "FP_AGENT_CAPTURE_TIMEOUT_MS")]
    capture_timeout_ms: Option<u64>,

    /// Seconds to wait for open connections on shutdown before aborting them.
    #[arg(long, env = "FP_AGENT_SHUTDOWN_GRACE_SECS")]
    shutdown_grace_secs: Option<u64>,

    /// Scanner backend: `zkfinger` (hardware) or `simulated`.
    #[arg(long, env = "FP_AGENT_BACKEND")]
    backend: Option<ScannerBackend>,

    /// Path to a TOML config file.
    #[arg(long, env = "FP_AGENT_CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    /// Loads the config file (if any) and merges it with the CLI arguments
    /// into an [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be read or parsed, or if
    /// the host is not a valid IP address.
    fn into_agent_config(self) -> anyhow::Result<AgentConfig> {
        let file = match &self.config {
            Some(path) => load_config_file(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    /// Applies the precedence CLI/env > file > defaults.
    fn merge(self, file: FileConfig) -> anyhow::Result<AgentConfig> {
        let host = self
            .host
            .or(file.server.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = self.port.or(file.server.port).unwrap_or(DEFAULT_PORT);
        let ip: IpAddr = host
            .trim()
            .parse()
            .with_context(|| format!("invalid bind address: '{host}'"))?;

        let cli_origins: Vec<String> = self
            .allowed_origins
            .iter()
            .map(|origin| origin.trim())
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect();
        let allowed_origins = if !cli_origins.is_empty() {
            AllowedOrigins::new(cli_origins)
        } else if let Some(origins) = file.access.allowed_origins {
            AllowedOrigins::new(origins)
        } else {
            AgentConfig::default().allowed_origins
        };

        let capture_timeout = self
            .capture_timeout_ms
            .or(file.scanner.capture_timeout_ms)
            .map_or(DEFAULT_CAPTURE_TIMEOUT, Duration::from_millis);
        let shutdown_grace = self
            .shutdown_grace_secs
            .or(file.server.shutdown_grace_secs)
            .map_or(DEFAULT_SHUTDOWN_GRACE, Duration::from_secs);
        let backend = self
            .backend
            .or(file.scanner.backend)
            .unwrap_or(ScannerBackend::Zkfinger);

        Ok(AgentConfig {
            listen_addr: SocketAddr::new(ip, port),
            allowed_origins,
            capture_timeout,
            shutdown_grace,
            backend,
        })
    }
}

// ── Shutdown signals ──────────────────────────────────────────────────────────

/// Clears `running` on Ctrl+C, and on SIGTERM where it exists.
///
/// The accept loop checks the flag every 200 ms.
fn install_shutdown_handlers(running: Arc<AtomicBool>) {
    let on_ctrl_c = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; initiating graceful shutdown");
                on_ctrl_c.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::spawn(async move {
                    if sigterm.recv().await.is_some() {
                        info!("received SIGTERM; initiating graceful shutdown");
                        running.store(false, Ordering::Relaxed);
                    }
                });
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
            }
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Cli::parse().into_agent_config()?;
    let grace = config.shutdown_grace;

    let runtime = tokio::runtime::Runtime::new().context("failed to start the Tokio runtime")?;
    let result = runtime.block_on(run_agent(config));

    // A capture blocked inside the vendor SDK must not keep the process alive.
    runtime.shutdown_timeout(grace);
    result
}

async fn run_agent(config: AgentConfig) -> anyhow::Result<()> {
    info!(
        "fingerprint agent starting: listen={}, backend={}, capture_timeout={:?}",
        config.listen_addr, config.backend, config.capture_timeout
    );
    info!(
        "allowed origins: [{}]",
        config.allowed_origins.iter().collect::<Vec<_>>().join(", ")
    );

    let sdk = build_backend(config.backend, config.capture_timeout)?;
    let device = Arc::new(DeviceSession::new(sdk));

    let running = Arc::new(AtomicBool::new(true));
    install_shutdown_handlers(Arc::clone(&running));

    run(config, device, running).await?;

    info!("fingerprint agent stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
