//! [`RelayServer`] – WebSocket transport in front of the arbitration engine.
//!
//! Listens on `0.0.0.0:<port>` (default 3000).
//!
//! * WebSocket upgrades on the configured path → one connection task per
//!   peer, registered in the [`ConnectionRegistry`][nexus_middleware::ConnectionRegistry].
//! * Any other HTTP request → `200 OK` with a short plain-text status.
//!
//! Each connection task does three things: drains its outbound queue into
//! the socket, hands decoded text frames to the engine (or records a role
//! declaration), and relays binary frames from camera peers.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nexus_middleware::{Audience, FanOut};
use nexus_runtime::EngineHandle;
use nexus_types::wire::is_sensor_frame;
use nexus_types::{ConnectionId, ConnectionRole, Inbound, RelayError};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use crate::settings::RelaySettings;

// ---------------------------------------------------------------------------
// RelayServer
// ---------------------------------------------------------------------------

/// WebSocket relay.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use nexus_middleware::{ConnectionRegistry, FanOut};
/// use nexus_relay::{RelayServer, RelaySettings};
///
/// #[tokio::main]
/// async fn main() {
///     let fanout = FanOut::new(Arc::new(ConnectionRegistry::new()));
///     let (engine, _task) = nexus_runtime::spawn_engine(Box::new(fanout.clone()));
///     RelayServer::new(RelaySettings::new().with_port(8080), fanout, engine)
///         .run()
///         .await
///         .expect("relay failed");
/// }
/// ```
pub struct RelayServer {
    settings: RelaySettings,
    fanout: FanOut,
    engine: EngineHandle,
}

impl RelayServer {
    pub fn new(settings: RelaySettings, fanout: FanOut, engine: EngineHandle) -> Self {
        Self {
            settings,
            fanout,
            engine,
        }
    }

    /// Bind `0.0.0.0:<port>` and serve forever.
    ///
    /// # Errors
    ///
    /// [`RelayError::Transport`] if the listener cannot bind.
    pub async fn run(self) -> Result<(), RelayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.settings.port()));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Transport(format!("bind error on {addr}: {e}")))?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener.
    ///
    /// # Errors
    ///
    /// [`RelayError::Transport`] if the listener address cannot be read.
    pub async fn serve(self, listener: TcpListener) -> Result<(), RelayError> {
        let local = listener
            .local_addr()
            .map_err(|e| RelayError::Transport(format!("listener address: {e}")))?;
        info!(
            addr = %local,
            path = self.settings.ws_path(),
            token_required = self.settings.requires_token(),
            "relay listening"
        );

        let server = Arc::new(self);
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    let server = Arc::clone(&server);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, peer, server).await {
                            debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "accept error"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-connection handler
// ---------------------------------------------------------------------------

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    server: Arc<RelayServer>,
) -> Result<(), RelayError> {
    // `peek` leaves the request in the socket for the handshaker.
    let mut buf = [0u8; 1024];
    let n = stream
        .peek(&mut buf)
        .await
        .map_err(|e| RelayError::Transport(format!("peek error from {peer}: {e}")))?;

    let head = String::from_utf8_lossy(&buf[..n]);
    let is_ws_upgrade = head.lines().any(|line| {
        let line = line.to_ascii_lowercase();
        line.starts_with("upgrade:") && line.contains("websocket")
    });

    if is_ws_upgrade {
        handle_ws(stream, peer, &server).await
    } else {
        serve_status(stream, &server).await
    }
}

async fn serve_status(mut stream: TcpStream, server: &RelayServer) -> Result<(), RelayError> {
    let body = format!(
        "nexus relay ok\nendpoint: {}\nconnections: {}\n",
        server.settings.ws_path(),
        server.fanout.registry().len()
    );
    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/plain; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {}",
        body.len(),
        body
    );
    stream
        .write_all(response.as_bytes())
        .await
        .map_err(|e| RelayError::Transport(format!("HTTP write error: {e}")))
}

async fn handle_ws(
    stream: TcpStream,
    peer: SocketAddr,
    server: &RelayServer,
) -> Result<(), RelayError> {
    let settings = &server.settings;
    let ws_stream = accept_hdr_async(stream, |req: &Request, resp: Response| {
        match settings.authorize(req.uri().path(), req.uri().query()) {
            Ok(()) => Ok(resp),
            Err(e) => {
                warn!(%peer, path = req.uri().path(), error = %e, "upgrade refused");
                Err(refusal(&e))
            }
        }
    })
    .await
    .map_err(|e| RelayError::Transport(format!("handshake from {peer}: {e}")))?;

    let id = ConnectionId::new();
    let registry = server.fanout.registry();
    let mut outbound = registry.add(id, peer, settings.outbound_capacity());
    let limiter: Option<DefaultDirectRateLimiter> =
        settings.rate_limit().map(|n| RateLimiter::direct(Quota::per_second(n)));
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    loop {
        tokio::select! {
            // ── Downstream: outbound queue → peer ──────────────────────────
            queued = outbound.recv() => {
                match queued {
                    Some(msg) => {
                        if ws_tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            // ── Upstream: peer → engine ────────────────────────────────────
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let routed = route_text(
                            text.as_str(),
                            id,
                            &server.fanout,
                            &server.engine,
                            limiter.as_ref(),
                        );
                        if let Err(e) = routed {
                            match e {
                                RelayError::Transport(_) => {
                                    warn!(conn = %id, error = %e, "engine unavailable; closing");
                                    break;
                                }
                                other => warn!(conn = %id, error = %other, "inbound frame ignored"),
                            }
                        }
                    }
                    Some(Ok(frame @ Message::Binary(_))) => {
                        relay_binary(&server.fanout, id, frame);
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!(conn = %id, error = %e, "websocket read error");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    registry.remove(id);
    Ok(())
}

fn refusal(err: &RelayError) -> ErrorResponse {
    let status = match err {
        RelayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::NOT_FOUND,
    };
    let mut resp = ErrorResponse::new(Some(err.to_string()));
    *resp.status_mut() = status;
    resp
}

// ---------------------------------------------------------------------------
// Frame routing
// ---------------------------------------------------------------------------

/// Decode one inbound text frame.  Role declarations are recorded in the
/// registry; everything else is queued for the engine.
///
/// `limiter` throttles every frame except sensor frames, which always go
/// through so no radar reading is lost.  Throttled frames are dropped.
///
/// # Errors
///
/// [`RelayError::Malformed`] for invalid JSON, [`RelayError::Transport`]
/// once the engine has stopped.
pub(crate) fn route_text(
    text: &str,
    origin: ConnectionId,
    fanout: &FanOut,
    engine: &EngineHandle,
    limiter: Option<&DefaultDirectRateLimiter>,
) -> Result<(), RelayError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| RelayError::Malformed(format!("invalid JSON: {e}")))?;

    if !is_sensor_frame(&value) && limiter.is_some_and(|l| l.check().is_err()) {
        debug!(conn = %origin, "rate limit exceeded; frame dropped");
        return Ok(());
    }

    if let Some(role) = Inbound::registration(&value) {
        fanout.registry().set_role(origin, role);
        return Ok(());
    }
    engine.submit(Some(origin), value)
}

/// Relay a binary frame to every other open connection when the sender
/// declared the camera role; drop it otherwise.  Returns the number of
/// connections it was queued for.
pub(crate) fn relay_binary(fanout: &FanOut, origin: ConnectionId, frame: Message) -> usize {
    if fanout.registry().role_of(origin) != Some(ConnectionRole::CameraNode) {
        debug!(conn = %origin, "binary frame from non-camera peer dropped");
        return 0;
    }
    fanout.deliver(Audience::AllExcept(origin), frame)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
