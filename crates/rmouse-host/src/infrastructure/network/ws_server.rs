//! WebSocket control channel: accept loop and per-session tasks.
//!
//! Responsibilities:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Asking the [`SessionManager`] for a slot before the WebSocket upgrade.
//!    When the cap is reached the client gets one `error` frame and the
//!    connection is closed; nothing is queued.
//! 3. Running one Tokio task per session.  That task alone reads the
//!    session's frames, so messages from one client are handled strictly in
//!    arrival order while different clients proceed in parallel.
//! 4. Enforcing the authentication timeout (first message) and the idle
//!    timeout (any inbound frame, including WebSocket pongs).
//! 5. Sending WebSocket ping frames on a fixed interval from a keepalive task
//!    that shares the write half with the reader.
//! 6. Stopping the accept loop when the `running` flag is cleared.
//!
//! The registry entry of a session is released when its task ends, whether it
//! ends normally, with an error, or by panicking.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use rmouse_core::protocol::{
    codec::encode_message,
    messages::{ControlMessage, DEFAULT_CONTROL_PORT, ERR_AUTH_TIMEOUT},
};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, timeout_at, Instant, MissedTickBehavior};
use tokio_tungstenite::{
    accept_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    WebSocketStream,
};
use tracing::{debug, error, info, warn};

use crate::application::session_manager::{CapacityError, Session, SessionId, SessionManager};

type WsSink = SplitSink<WebSocketStream<TcpStream>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;
type SharedSink = Arc<Mutex<WsSink>>;

/// How long a refused client gets to complete the handshake and read the
/// capacity error.
const REJECT_GRACE: Duration = Duration::from_secs(2);

/// Socket and timing settings for the control channel.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Interval between WebSocket ping frames.
    pub ping_interval: Duration,
    /// A session with no inbound frame for this long is closed.
    pub ping_timeout: Duration,
    /// Deadline for the first message, measured from accept.
    pub auth_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_CONTROL_PORT)),
            ping_interval: Duration::from_secs(10),
            ping_timeout: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(5),
        }
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and runs the accept loop until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(
    config: ServerConfig,
    manager: Arc<SessionManager>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind control channel on {}", config.bind_addr))?;

    serve(listener, config, manager, running).await
}

/// Runs the accept loop on an already bound listener.
///
/// Tests bind port 0 themselves and read the chosen port before calling this.
///
/// # Errors
///
/// Currently infallible once the listener exists; accept errors are logged
/// and the loop continues.
pub async fn serve(
    listener: TcpListener,
    config: ServerConfig,
    manager: Arc<SessionManager>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("control channel listening on ws://{addr}");
    }
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short timeout so the shutdown flag is re-checked while idle.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("TCP connection from {peer_addr}");
                let manager = Arc::clone(&manager);
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, manager, config).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handling ───────────────────────────────────────────────────

/// Entry point of each spawned connection task.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    manager: Arc<SessionManager>,
    config: Arc<ServerConfig>,
) {
    let session = match manager.accept(peer_addr) {
        Ok(session) => session,
        Err(e) => {
            warn!("refusing {peer_addr}: {e}");
            reject(stream, peer_addr, e).await;
            return;
        }
    };

    let id = session.id();
    match run_session(stream, session, &manager, &config).await {
        Ok(()) => debug!(session = %id, "session task finished"),
        Err(e) => warn!(session = %id, "session ended with error: {e:#}"),
    }
    manager.on_disconnect(id);
}

/// Completes the handshake only to tell the client why it is being dropped.
async fn reject(stream: TcpStream, peer_addr: SocketAddr, err: CapacityError) {
    let result = timeout(REJECT_GRACE, async {
        let mut ws = accept_async(stream).await?;
        let text = encode_message(&ControlMessage::error(err.to_string()))?;
        ws.send(WsMessage::Text(text)).await?;
        ws.close(None).await?;
        anyhow::Ok(())
    })
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("rejecting {peer_addr}: {e:#}"),
        Err(_) => debug!("rejecting {peer_addr}: handshake timed out"),
    }
}

/// Runs one session from WebSocket handshake to close.
async fn run_session(
    stream: TcpStream,
    mut session: Session,
    manager: &SessionManager,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let peer_addr = session.remote_addr();
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (ws_tx, mut ws_rx) = ws_stream.split();
    let ws_tx: SharedSink = Arc::new(Mutex::new(ws_tx));

    let id = session.id();
    let mut keepalive_task = tokio::spawn(keepalive(Arc::clone(&ws_tx), config.ping_interval, id));

    let result = tokio::select! {
        r = read_frames(&mut ws_rx, &ws_tx, &mut session, manager, config) => r,
        _ = &mut keepalive_task => {
            debug!(session = %id, "keepalive task ended");
            Ok(())
        }
    };
    keepalive_task.abort();

    // Best effort: the peer may already be gone.
    let _ = ws_tx.lock().await.close().await;
    result
}

/// Reads and handles frames until the session should end.
async fn read_frames(
    ws_rx: &mut WsSource,
    ws_tx: &SharedSink,
    session: &mut Session,
    manager: &SessionManager,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let id = session.id();
    let auth_deadline = Instant::now() + config.auth_timeout;

    loop {
        let next = if session.is_authenticated() {
            match timeout(config.ping_timeout, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => {
                    info!(session = %id, "no traffic for {:?}; closing", config.ping_timeout);
                    return Ok(());
                }
            }
        } else {
            match timeout_at(auth_deadline, ws_rx.next()).await {
                Ok(next) => next,
                Err(_) => {
                    warn!(session = %id, "authentication timed out");
                    send_message(ws_tx, &ControlMessage::error(ERR_AUTH_TIMEOUT)).await?;
                    return Ok(());
                }
            }
        };

        let frame = match next {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) => {
                debug!(session = %id, "WebSocket closed");
                return Ok(());
            }
            Some(Err(e)) => return Err(e).context("WebSocket read failed"),
            None => {
                debug!(session = %id, "stream ended");
                return Ok(());
            }
        };

        match frame {
            WsMessage::Text(text) => {
                let outcome = manager.on_frame(session, &text);
                if let Some(reply) = &outcome.reply {
                    send_message(ws_tx, reply).await?;
                }
                if outcome.close {
                    return Ok(());
                }
            }
            WsMessage::Binary(_) => {
                manager.touch(id);
                warn!(session = %id, "binary frame rejected");
                send_message(ws_tx, &ControlMessage::error("binary frames are not supported"))
                    .await?;
                if !session.is_authenticated() {
                    return Ok(());
                }
            }
            // tungstenite queues the pong reply itself.
            WsMessage::Ping(_) | WsMessage::Pong(_) => manager.touch(id),
            WsMessage::Close(_) => {
                debug!(session = %id, "close frame received");
                return Ok(());
            }
            WsMessage::Frame(_) => {}
        }
    }
}

/// Sends a WebSocket ping every `period` until a send fails.
async fn keepalive(ws_tx: SharedSink, period: Duration, id: SessionId) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if ws_tx.lock().await.send(WsMessage::Ping(Vec::new())).await.is_err() {
            debug!(session = %id, "keepalive ping failed");
            break;
        }
    }
}

async fn send_message(ws_tx: &SharedSink, msg: &ControlMessage) -> anyhow::Result<()> {
    let text = encode_message(msg)?;
    ws_tx
        .lock()
        .await
        .send(WsMessage::Text(text))
        .await
        .with_context(|| format!("failed to send {} message", msg.tag()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
