//! WebSocket server: accept loop, origin gate and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections from browsers.
//! 3. Checking the `Origin` header during the WebSocket upgrade and refusing
//!    the upgrade (HTTP 403, empty body) for origins not on the allow-list.
//! 4. Running one request/response loop per accepted connection: every text
//!    or binary frame gets exactly one JSON response, in arrival order.
//! 5. Stopping when the shared `running` flag is cleared, then giving live
//!    connections a bounded grace period to finish in-flight captures.
//!
//! # Connection state
//!
//! A connection is either serving (after the gate) or closed.  A malformed
//! message or a failed capture is answered with an error response and the
//! connection keeps serving; only transport-level failures end it, and they
//! end only that connection.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_hdr_async,
    tungstenite::{
        handshake::server::{ErrorResponse, Request, Response as HandshakeResponse},
        http::{header::ORIGIN, StatusCode},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::{handle_payload, DeviceSession};
use crate::domain::origin::AllowedOrigins;

/// How often the accept loop re-checks the `running` flag while idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

/// Longest time a new TCP connection may take to complete the WebSocket
/// upgrade before it is dropped.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the WebSocket TCP listener.
///
/// # Errors
///
/// Returns an error if the address cannot be bound (port in use, missing
/// permission).
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {addr}"))
}

/// Runs the accept loop on `listener` until `running` is set to `false`.
///
/// Each accepted connection is handled by its own Tokio task.  On shutdown
/// the loop stops accepting, asks every live connection to close once its
/// current message is answered, and waits up to `grace` for them before
/// aborting the rest.
///
/// # Errors
///
/// Currently always returns `Ok`: accept errors are logged and the loop
/// continues.
pub async fn serve(
    listener: TcpListener,
    origins: AllowedOrigins,
    device: Arc<DeviceSession>,
    running: Arc<AtomicBool>,
    grace: Duration,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("fingerprint agent listening on ws://{addr}");
    }

    let ctx = Arc::new(ServerContext {
        origins,
        device,
        handshake_timeout: HANDSHAKE_TIMEOUT,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sessions = JoinSet::new();

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Reap finished sessions so the set does not grow without bound.
        while sessions.try_join_next().is_some() {}

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("new TCP connection from {peer_addr}");
                let ctx = Arc::clone(&ctx);
                let shutdown = shutdown_rx.clone();
                sessions.spawn(async move {
                    handle_connection(stream, peer_addr, ctx, shutdown).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {
                // No connection in the last poll interval.
            }
        }
    }

    drop(listener);
    drain(&mut sessions, &shutdown_tx, grace).await;
    Ok(())
}

// ── Shutdown drain ────────────────────────────────────────────────────────────

async fn drain(sessions: &mut JoinSet<()>, shutdown_tx: &watch::Sender<bool>, grace: Duration) {
    if sessions.is_empty() {
        return;
    }

    info!(
        "waiting up to {:?} for {} open connection(s) to finish",
        grace,
        sessions.len()
    );
    // Receivers may already be gone if every session ended on its own.
    let _ = shutdown_tx.send(true);

    let finished = timeout(grace, async {
        while sessions.join_next().await.is_some() {}
    })
    .await;

    if finished.is_err() {
        warn!(
            "{} connection(s) still busy after {:?}; aborting them",
            sessions.len(),
            grace
        );
        sessions.abort_all();
        while sessions.join_next().await.is_some() {}
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

struct ServerContext {
    origins: AllowedOrigins,
    device: Arc<DeviceSession>,
    handshake_timeout: Duration,
}

/// How a connection ended when it did not fail.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    /// The origin gate refused the upgrade.
    Rejected,
    /// The peer closed, or the agent closed it for shutdown.
    Closed,
}

/// Entry point for each per-connection task.
///
/// Wraps [`run_session`] and logs the outcome.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    ctx: Arc<ServerContext>,
    shutdown: watch::Receiver<bool>,
) {
    let session_id = Uuid::new_v4().to_string();
    match run_session(stream, peer_addr, &session_id, &ctx, shutdown).await {
        Ok(SessionEnd::Rejected) => {}
        Ok(SessionEnd::Closed) => info!("session {session_id} ({peer_addr}) closed"),
        Err(e) => warn!("session {session_id} ({peer_addr}) closed with error: {e:#}"),
    }
}

/// Runs the complete lifecycle of one connection: handshake, origin gate,
/// then one response per inbound message until the transport closes.
///
/// # Errors
///
/// Returns an error if the WebSocket handshake times out or fails for a
/// reason other than the origin gate, or if a frame cannot be read or
/// written.
async fn run_session(
    stream: TcpStream,
    peer_addr: SocketAddr,
    session_id: &str,
    ctx: &ServerContext,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<SessionEnd> {
    // ── Handshake and origin gate ─────────────────────────────────────────────
    let mut declared_origin: Option<String> = None;
    let handshake = timeout(
        ctx.handshake_timeout,
        accept_hdr_async(stream, |req: &Request, resp: HandshakeResponse| {
            declared_origin = origin_header(req);
            if ctx.origins.authorize(declared_origin.as_deref()) {
                Ok(resp)
            } else {
                Err(forbidden())
            }
        }),
    )
    .await;
    let Ok(handshake) = handshake else {
        anyhow::bail!(
            "WebSocket handshake with {peer_addr} timed out after {:?}",
            ctx.handshake_timeout
        );
    };

    let origin = declared_origin.as_deref().unwrap_or("<none>");
    let mut ws = match handshake {
        Ok(ws) => ws,
        Err(WsError::Http(resp)) if resp.status() == StatusCode::FORBIDDEN => {
            warn!("session {session_id}: rejected connection from {peer_addr}: origin {origin} is not allowed");
            return Ok(SessionEnd::Rejected);
        }
        Err(e) => {
            return Err(e).with_context(|| format!("WebSocket handshake failed with {peer_addr}"));
        }
    };

    info!("session {session_id}: connected from {peer_addr} (origin {origin})");

    // ── Request / response loop ───────────────────────────────────────────────
    loop {
        let frame = tokio::select! {
            frame = ws.next() => frame,
            _ = shutdown.changed() => {
                debug!("session {session_id}: closing for shutdown");
                // The peer may already be gone; the session ends either way.
                let _ = ws.close(None).await;
                return Ok(SessionEnd::Closed);
            }
        };

        let payload = match frame {
            Some(Ok(WsMessage::Text(text))) => text.into_bytes(),
            Some(Ok(WsMessage::Binary(bytes))) => bytes,
            Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_))) => {
                debug!("session {session_id}: control frame");
                continue;
            }
            Some(Ok(WsMessage::Close(_))) => {
                debug!("session {session_id}: close frame received");
                return Ok(SessionEnd::Closed);
            }
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => {
                debug!("session {session_id}: stream ended");
                return Ok(SessionEnd::Closed);
            }
            Some(Err(e)) => {
                return Err(e).context("failed to read WebSocket frame");
            }
        };

        let response = handle_payload(&payload, &ctx.device, session_id).await;
        let json = serde_json::to_string(&response).context("failed to serialize response")?;
        ws.send(WsMessage::Text(json))
            .await
            .context("failed to send response")?;
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// The declared `Origin` of a handshake request, if present and valid UTF-8.
fn origin_header(req: &Request) -> Option<String> {
    req.headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
}

/// HTTP 403 with an empty body: the upgrade is refused and no WebSocket
/// frame is ever sent.
fn forbidden() -> ErrorResponse {
    let mut resp = ErrorResponse::new(None);
    *resp.status_mut() = StatusCode::FORBIDDEN;
    resp
}

// ── Tests ─────────────────────────────────────────────────────────────────────
