//! UDP discovery requester.
//!
//! One discovery run ("window"):
//!
//! 1. Bind an ephemeral UDP socket with `SO_BROADCAST`.
//! 2. Send `remotemouse:discover` to the broadcast address on the discovery
//!    port (default `255.255.255.255:9876`).
//! 3. Collect JSON replies for the window (default 3 s), keyed by the
//!    datagram's source address so a host that answers twice appears once.
//! 4. Close the socket.
//!
//! [`spawn_discovery`] starts a run every interval (default 5 s), measured
//! from the start of the previous run, on its own Tokio task and merges each result into a `watch` channel.  Merging only
//! replaces entries with the same address, so repeated runs refresh the list
//! rather than growing it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use rmouse_core::discovery::{
    DiscoveryReply, HostList, HostRecord, DEFAULT_DISCOVERY_PORT, DISCOVERY_REQUEST,
};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::infrastructure::host_store::HostListStore;

/// Pause after a transient receive error, so a failing socket cannot spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for discovery operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound or configured.
    #[error("failed to open discovery socket: {0}")]
    Socket(#[source] std::io::Error),
    /// The broadcast request could not be sent.
    #[error("failed to send discovery request to {addr}: {source}")]
    Send {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

/// Discovery timing and addressing.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where the request is sent.  Normally a broadcast address.
    pub target: IpAddr,
    pub port: u16,
    /// How long replies are collected per run.
    pub window: Duration,
    /// Pause between runs of the periodic service.
    pub interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            target: IpAddr::V4(Ipv4Addr::BROADCAST),
            port: DEFAULT_DISCOVERY_PORT,
            window: Duration::from_secs(3),
            interval: Duration::from_secs(5),
        }
    }
}

/// Runs one discovery window and returns the hosts that answered.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the socket cannot be opened or the request
/// cannot be sent.  Malformed replies are skipped, not reported.
pub async fn discover_once(config: &DiscoveryConfig) -> Result<HostList, DiscoveryError> {
    let bind_addr: SocketAddr = match config.target {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (std::net::Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = UdpSocket::bind(bind_addr)
        .await
        .map_err(DiscoveryError::Socket)?;
    socket.set_broadcast(true).map_err(DiscoveryError::Socket)?;

    let target = SocketAddr::new(config.target, config.port);
    socket
        .send_to(DISCOVERY_REQUEST.as_bytes(), target)
        .await
        .map_err(|source| DiscoveryError::Send {
            addr: target,
            source,
        })?;
    debug!("discovery request sent to {target}");

    let deadline = Instant::now() + config.window;
    let mut hosts = HostList::new();
    let mut buf = [0u8; 2048];

    loop {
        let (len, src) = match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Err(_) => break,
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) if is_transient(&e) => {
                // e.g. ICMP port-unreachable on some platforms.
                debug!("discovery recv error: {e}");
                sleep(RECV_ERROR_BACKOFF).await;
                continue;
            }
            Ok(Err(e)) => {
                warn!("discovery window cut short: {e}");
                break;
            }
        };

        match DiscoveryReply::from_datagram(&buf[..len]) {
            Ok(reply) => {
                if hosts.upsert(HostRecord::from_reply(reply, src.ip())) {
                    debug!("host found at {src}");
                }
            }
            Err(e) => debug!("ignoring datagram from {src}: {e}"),
        }
    }

    Ok(hosts)
}

/// Receive errors worth waiting out for the rest of the window.
fn is_transient(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
    )
}

/// Runs [`discover_once`] every `config.interval` until the task is aborted.
///
/// A run longer than the interval delays the next one instead of bunching
/// runs up.
///
/// Each result is merged into `hosts`.  When `store` is set, the merged list
/// is saved after every run that found something.
pub fn spawn_discovery(
    config: DiscoveryConfig,
    hosts: Arc<watch::Sender<HostList>>,
    store: Option<HostListStore>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            "discovery started ({}:{}, every {:?})",
            config.target, config.port, config.interval
        );
        let mut ticker = interval(config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match discover_once(&config).await {
                Ok(found) if !found.is_empty() => {
                    hosts.send_modify(|list| list.merge(found));
                    if let Some(store) = &store {
                        if let Err(e) = store.save(&hosts.borrow()) {
                            warn!("failed to save host list: {e}");
                        }
                    }
                }
                Ok(_) => debug!("no hosts answered"),
                Err(e) => warn!("discovery run failed: {e}"),
            }
        }
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
