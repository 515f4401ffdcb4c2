//! Network infrastructure for the client application.
//!
//! [`RemoteClient`] is the facade the UI layer talks to.  It owns the
//! [`ConnectionMachine`] and drives it from one background task per host:
//!
//! ```text
//! connect(host, pin)
//!   └─ drive task ─┬─ connect_async ── opened ── 100 ms settle ── hello ── ok ──► pump
//!                  │         (all of this under the 10 s connect timeout)
//!                  └─ on failure: machine.failed() ── sleep(backoff) ── retry_due() ── loop
//! ```
//!
//! The UI never sees the task.  It observes:
//! - [`ClientStatus`] snapshots on a `watch` channel ([`RemoteClient::status`]),
//! - every state entered, in order, on a `broadcast` channel
//!   ([`RemoteClient::transitions`]),
//! - the discovered host list on a second `watch` channel
//!   ([`RemoteClient::hosts`]).
//!
//! Only one attempt is ever in flight: `connect`, `retry` and `disconnect`
//! abort the previous task and advance the machine's epoch, so a late report
//! from an aborted attempt is ignored.
//!
//! All methods must be called from within a Tokio runtime.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rmouse_core::{
    discovery::{HostList, HostRecord},
    keymap::MouseButton,
    protocol::{decode_message, encode_message, ControlMessage, ProtocolError},
};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, warn};

use crate::application::connection_state::{
    AfterFailure, ConnectionMachine, ConnectionState, Epoch,
};
use crate::infrastructure::discovery::{spawn_discovery, DiscoveryConfig};
use crate::infrastructure::host_store::HostListStore;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors surfaced by the client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Socket or WebSocket failure.
    #[error("transport error: {0}")]
    Transport(#[from] WsError),
    /// The host closed the channel.
    #[error("connection closed by host")]
    Closed,
    /// The host refused the `hello`.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// No `ok` within the connect timeout.
    #[error("no response from host within {0:?}")]
    Timeout(Duration),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// An input was sent while not `Active`.
    #[error("not connected")]
    NotConnected,
    /// `retry` was called before any host was chosen.
    #[error("no host selected")]
    NoHost,
    /// A newer attempt replaced this one.
    #[error("attempt superseded")]
    Superseded,
}

/// Timing of connection attempts.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Limit for connect + authenticate.
    pub connect_timeout: Duration,
    /// Pause between the socket opening and sending `hello`.
    pub settle_delay: Duration,
    /// One backoff step; the delay before retry `n` is `min(n, 5)` steps.
    pub backoff_unit: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_millis(100),
            backoff_unit: Duration::from_secs(1),
        }
    }
}

/// Snapshot published to the UI after every state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStatus {
    pub state: ConnectionState,
    pub retry_count: u32,
    /// Cause of the last disconnect, cleared on success.
    pub last_error: Option<String>,
    pub host: Option<SocketAddr>,
}

impl Default for ClientStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            retry_count: 0,
            last_error: None,
            host: None,
        }
    }
}

#[derive(Debug, Clone)]
struct Target {
    addr: SocketAddr,
    pin: String,
}

/// Mutable state, guarded by one short-lived lock.
struct Driver {
    machine: ConnectionMachine,
    target: Option<Target>,
    outbound: Option<mpsc::UnboundedSender<String>>,
    task: Option<JoinHandle<()>>,
    discovery: Option<JoinHandle<()>>,
}

struct Shared {
    config: ClientConfig,
    driver: Mutex<Driver>,
    status: watch::Sender<ClientStatus>,
    transitions: broadcast::Sender<ConnectionState>,
    hosts: Arc<watch::Sender<HostList>>,
    store: Option<HostListStore>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Driver> {
        self.driver.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `f` under the lock, then publishes whatever it changed.
    fn update<R>(&self, f: impl FnOnce(&mut Driver) -> R) -> R {
        let mut driver = self.lock();
        let result = f(&mut driver);

        for state in driver.machine.take_transitions() {
            debug!(%state, "connection state");
            // No subscribers is fine.
            let _ = self.transitions.send(state);
        }
        let attempt = driver.machine.attempt();
        self.status.send_replace(ClientStatus {
            state: driver.machine.state(),
            retry_count: attempt.retry_count,
            last_error: attempt.last_error.clone(),
            host: driver.target.as_ref().map(|t| t.addr),
        });
        result
    }
}

/// The client-side protocol engine.
pub struct RemoteClient {
    shared: Arc<Shared>,
}

impl RemoteClient {
    pub fn new(config: ClientConfig) -> Self {
        Self::build(config, HostList::new(), None)
    }

    /// Like [`RemoteClient::new`], seeding the host list from `store` and
    /// saving it there after every discovery run.
    pub fn with_host_store(config: ClientConfig, store: HostListStore) -> Self {
        let initial = store.load().unwrap_or_else(|e| {
            warn!("ignoring saved host list: {e}");
            HostList::new()
        });
        Self::build(config, initial, Some(store))
    }

    fn build(config: ClientConfig, hosts: HostList, store: Option<HostListStore>) -> Self {
        let machine = ConnectionMachine::with_backoff_unit(config.backoff_unit);
        let (status, _) = watch::channel(ClientStatus::default());
        let (transitions, _) = broadcast::channel(32);
        let (hosts, _) = watch::channel(hosts);
        Self {
            shared: Arc::new(Shared {
                config,
                driver: Mutex::new(Driver {
                    machine,
                    target: None,
                    outbound: None,
                    task: None,
                    discovery: None,
                }),
                status,
                transitions,
                hosts: Arc::new(hosts),
                store,
            }),
        }
    }

    // ── Observation ───────────────────────────────────────────────────────────

    pub fn status(&self) -> watch::Receiver<ClientStatus> {
        self.shared.status.subscribe()
    }

    pub fn current_status(&self) -> ClientStatus {
        self.shared.status.borrow().clone()
    }

    /// Every state entered from now on, in order.
    pub fn transitions(&self) -> broadcast::Receiver<ConnectionState> {
        self.shared.transitions.subscribe()
    }

    pub fn hosts(&self) -> watch::Receiver<HostList> {
        self.shared.hosts.subscribe()
    }

    // ── Connection control ────────────────────────────────────────────────────

    /// Connects to `addr`, replacing any current connection or attempt.
    pub fn connect(&self, addr: SocketAddr, pin: impl Into<String>) {
        let target = Target {
            addr,
            pin: pin.into(),
        };
        info!("connecting to {addr}");
        self.shared.update(|d| {
            d.target = Some(target);
            restart(&self.shared, d);
        });
    }

    /// Connects to a discovered host.
    pub fn connect_host(&self, host: &HostRecord, pin: impl Into<String>) {
        self.connect(SocketAddr::new(host.address, host.port), pin);
    }

    /// User-initiated retry: resets the counter and reconnects.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoHost`] if `connect` was never called.
    pub fn retry(&self) -> Result<(), ClientError> {
        self.shared.update(|d| {
            if d.target.is_none() {
                return Err(ClientError::NoHost);
            }
            restart(&self.shared, d);
            Ok(())
        })
    }

    /// Closes the channel, cancels any pending reconnect, and returns to `Idle`.
    pub fn disconnect(&self) {
        self.shared.update(|d| {
            if let Some(task) = d.task.take() {
                task.abort();
            }
            d.outbound = None;
            d.machine.reset();
        });
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    /// Starts periodic discovery, replacing a running one.
    pub fn start_discovery(&self, config: DiscoveryConfig) {
        let task = spawn_discovery(
            config,
            Arc::clone(&self.shared.hosts),
            self.shared.store.clone(),
        );
        if let Some(old) = self.shared.lock().discovery.replace(task) {
            old.abort();
        }
    }

    pub fn stop_discovery(&self) {
        if let Some(task) = self.shared.lock().discovery.take() {
            task.abort();
            info!("discovery stopped");
        }
    }

    // ── Input ─────────────────────────────────────────────────────────────────

    /// Queues `msg` on the active channel.
    ///
    /// # Errors
    ///
    /// [`ClientError::Protocol`] if the message cannot be encoded and
    /// [`ClientError::NotConnected`] unless the state is `Active`.
    pub fn send(&self, msg: ControlMessage) -> Result<(), ClientError> {
        let text = encode_message(&msg)?;
        let driver = self.shared.lock();
        match (&driver.outbound, driver.machine.state()) {
            (Some(tx), ConnectionState::Active) => {
                tx.send(text).map_err(|_| ClientError::NotConnected)
            }
            _ => Err(ClientError::NotConnected),
        }
    }

    pub fn send_move(&self, dx: f64, dy: f64) -> Result<(), ClientError> {
        self.send(ControlMessage::Move { dx, dy })
    }

    pub fn send_click(&self, button: MouseButton, down: Option<bool>) -> Result<(), ClientError> {
        self.send(ControlMessage::Click {
            btn: button.name().to_string(),
            down,
        })
    }

    pub fn send_key(&self, text: impl Into<String>) -> Result<(), ClientError> {
        self.send(ControlMessage::Key { text: text.into() })
    }

    pub fn send_hotkey<S: AsRef<str>>(&self, keys: &[S]) -> Result<(), ClientError> {
        self.send(ControlMessage::Hotkey {
            keys: keys.iter().map(|k| k.as_ref().to_string()).collect(),
        })
    }

    pub fn send_scroll(&self, dx: i32, dy: i32) -> Result<(), ClientError> {
        self.send(ControlMessage::Scroll { dx, dy })
    }

    pub fn send_ping(&self) -> Result<(), ClientError> {
        self.send(ControlMessage::Ping)
    }
}

impl Drop for RemoteClient {
    fn drop(&mut self) {
        let mut driver = self.shared.lock();
        if let Some(task) = driver.task.take() {
            task.abort();
        }
        if let Some(task) = driver.discovery.take() {
            task.abort();
        }
    }
}

// ── Attempt driver ────────────────────────────────────────────────────────────

/// Cancels the current attempt and starts a fresh one.  Caller holds the lock.
fn restart(shared: &Arc<Shared>, driver: &mut Driver) {
    if let Some(task) = driver.task.take() {
        task.abort();
    }
    driver.outbound = None;
    let Some(target) = driver.target.clone() else {
        return;
    };
    let epoch = driver.machine.begin();
    driver.task = Some(tokio::spawn(drive(Arc::clone(shared), target, epoch)));
}

/// Runs attempts for one host until success ends in user action or retries
/// are exhausted.
async fn drive(shared: Arc<Shared>, target: Target, mut epoch: Epoch) {
    loop {
        let cause = run_attempt(&shared, &target, epoch).await;
        info!("connection to {} ended: {cause}", target.addr);

        let next = shared.update(|d| {
            let next = d.machine.failed(epoch, cause.to_string());
            if next != AfterFailure::Ignored {
                d.outbound = None;
            }
            next
        });

        match next {
            AfterFailure::RetryAfter(delay) => {
                debug!("reconnecting in {delay:?}");
                sleep(delay).await;
                match shared.update(|d| d.machine.retry_due(epoch)) {
                    Some(next_epoch) => epoch = next_epoch,
                    None => return,
                }
            }
            AfterFailure::GaveUp => {
                warn!("giving up on {} after repeated failures", target.addr);
                return;
            }
            AfterFailure::Ignored => return,
        }
    }
}

/// One attempt from socket open to channel loss.  Always ends in an error.
async fn run_attempt(shared: &Shared, target: &Target, epoch: Epoch) -> ClientError {
    let limit = shared.config.connect_timeout;
    let (ws, outbound) = match timeout(limit, handshake(shared, target, epoch)).await {
        Ok(Ok(established)) => established,
        Ok(Err(e)) => return e,
        Err(_) => return ClientError::Timeout(limit),
    };
    info!("connected to {}", target.addr);
    pump(ws, outbound).await
}

/// Opens the socket and authenticates.
async fn handshake(
    shared: &Shared,
    target: &Target,
    epoch: Epoch,
) -> Result<(WsStream, mpsc::UnboundedReceiver<String>), ClientError> {
    let (mut ws, _) = connect_async(format!("ws://{}", target.addr)).await?;
    if !shared.update(|d| d.machine.opened(epoch)) {
        return Err(ClientError::Superseded);
    }

    sleep(shared.config.settle_delay).await;
    let hello = encode_message(&ControlMessage::Hello {
        pin: target.pin.clone(),
    })?;
    ws.send(WsMessage::Text(hello)).await?;

    loop {
        match ws.next().await {
            Some(Ok(WsMessage::Text(text))) => match decode_message(&text)? {
                ControlMessage::Ok { server, .. } => {
                    if let Some(name) = server {
                        debug!("host identifies as '{name}'");
                    }
                    break;
                }
                ControlMessage::Error { message } => return Err(ClientError::Auth(message)),
                other => debug!(tag = other.tag(), "ignoring message before ok"),
            },
            Some(Ok(WsMessage::Close(_))) | None => return Err(ClientError::Closed),
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(e.into()),
        }
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let active = shared.update(|d| {
        if d.machine.authenticated(epoch) {
            d.outbound = Some(tx);
            true
        } else {
            false
        }
    });
    if !active {
        return Err(ClientError::Superseded);
    }
    Ok((ws, rx))
}

/// Forwards queued inputs and reads host replies until the channel ends.
async fn pump(ws: WsStream, mut outbound: mpsc::UnboundedReceiver<String>) -> ClientError {
    let (mut ws_tx, mut ws_rx) = ws.split();

    loop {
        tokio::select! {
            queued = outbound.recv() => match queued {
                Some(text) => {
                    if let Err(e) = ws_tx.send(WsMessage::Text(text)).await {
                        return e.into();
                    }
                }
                None => {
                    let _ = ws_tx.close().await;
                    return ClientError::Closed;
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => match decode_message(&text) {
                    Ok(ControlMessage::Error { message }) => warn!("host reported: {message}"),
                    Ok(ControlMessage::Pong) => debug!("pong"),
                    Ok(other) => debug!(tag = other.tag(), "ignoring message"),
                    Err(e) => warn!("undecodable frame from host: {e}"),
                },
                Some(Ok(WsMessage::Close(_))) | None => return ClientError::Closed,
                // tungstenite answers pings on the next read.
                Some(Ok(_)) => {}
                Some(Err(e)) => return e.into(),
            },
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_documented_timings() {
        // Arrange / Act
        let cfg = ClientConfig::default();

        // Assert
        assert_eq!(cfg.connect_timeout, Duration::from_secs(10));
        assert_eq!(cfg.settle_delay, Duration::from_millis(100));
        assert_eq!(cfg.backoff_unit, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_new_client_is_idle() {
        let client = RemoteClient::new(ClientConfig::default());
        assert_eq!(client.current_status(), ClientStatus::default());
    }

    #[tokio::test]
    async fn test_send_while_idle_is_not_connected() {
        let client = RemoteClient::new(ClientConfig::default());

        let result = client.send_move(1.0, 2.0);

        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_non_finite_move_is_a_protocol_error() {
        let client = RemoteClient::new(ClientConfig::default());

        let result = client.send_move(f64::NAN, 0.0);

        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn test_retry_without_host_fails() {
        let client = RemoteClient::new(ClientConfig::default());
        assert!(matches!(client.retry(), Err(ClientError::NoHost)));
    }

    #[tokio::test]
    async fn test_refused_connection_schedules_reconnect() {
        // Arrange: grab a free port, then close it so connecting is refused.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = RemoteClient::new(ClientConfig {
            backoff_unit: Duration::from_secs(60),
            ..ClientConfig::default()
        });
        let mut status = client.status();

        // Act
        client.connect(SocketAddr::from(([127, 0, 0, 1], port)), "123456");
        let reached = timeout(
            Duration::from_secs(5),
            status.wait_for(|s| s.state == ConnectionState::Reconnecting(1)),
        )
        .await
        .is_ok();

        // Assert
        assert!(reached, "never reached Reconnecting(1)");
        let s = client.current_status();
        assert_eq!(s.retry_count, 1);
        assert!(s.last_error.unwrap().starts_with("transport error"));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        // Arrange
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = RemoteClient::new(ClientConfig {
            backoff_unit: Duration::from_millis(50),
            ..ClientConfig::default()
        });
        let mut status = client.status();
        client.connect(SocketAddr::from(([127, 0, 0, 1], port)), "");
        timeout(
            Duration::from_secs(5),
            status.wait_for(|s| matches!(s.state, ConnectionState::Reconnecting(_))),
        )
        .await
        .unwrap()
        .unwrap();

        // Act
        client.disconnect();
        sleep(Duration::from_millis(200)).await;

        // Assert: the timer fired into a reset machine and did nothing.
        assert_eq!(client.current_status().state, ConnectionState::Idle);
    }

    #[test]
    fn test_error_strings_are_status_friendly() {
        assert_eq!(
            ClientError::Auth("invalid pin".into()).to_string(),
            "authentication failed: invalid pin"
        );
        assert_eq!(
            ClientError::Timeout(Duration::from_secs(10)).to_string(),
            "no response from host within 10s"
        );
    }
}
