//! UDP discovery responder.
//!
//! The host binds a UDP socket on the discovery port (default 9876) and waits
//! for the literal request token `remotemouse:discover`.  Each request is
//! answered with a unicast JSON [`DiscoveryReply`] sent back to the datagram's
//! source address.  Anything else arriving on the port is logged at `debug`
//! and ignored.
//!
//! The responder runs on a dedicated OS thread with a blocking socket so it
//! never competes with session tasks on the Tokio runtime.  The socket has a
//! 500 ms read timeout; on each timeout the loop re-checks the `running` flag
//! and exits cleanly once the host is shutting down.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use rmouse_core::discovery::{is_discovery_request, DiscoveryReply};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for discovery responder operations.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The UDP socket could not be bound.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    /// The responder thread could not be started.
    #[error("failed to spawn discovery thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Handle to a running responder.
#[derive(Debug)]
pub struct DiscoveryResponder {
    local_addr: SocketAddr,
    thread: JoinHandle<()>,
}

impl DiscoveryResponder {
    /// Address the responder is bound to (useful when binding port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the thread to exit after `running` has been cleared.
    pub fn join(self) {
        if self.thread.join().is_err() {
            warn!("discovery thread panicked");
        }
    }
}

/// Binds `bind_addr` and spawns the responder thread.
///
/// `reply` is sent verbatim to every requester.
///
/// # Errors
///
/// Returns [`DiscoveryError::BindFailed`] if the socket cannot be bound and
/// [`DiscoveryError::Spawn`] if the thread cannot be created.
pub fn start_discovery_responder(
    bind_addr: SocketAddr,
    reply: DiscoveryReply,
    running: Arc<AtomicBool>,
) -> Result<DiscoveryResponder, DiscoveryError> {
    let socket = UdpSocket::bind(bind_addr).map_err(|source| DiscoveryError::BindFailed {
        addr: bind_addr,
        source,
    })?;
    socket
        .set_read_timeout(Some(Duration::from_millis(500)))
        .ok();
    let local_addr = socket.local_addr().unwrap_or(bind_addr);
    let payload = reply.to_datagram();

    let thread = std::thread::Builder::new()
        .name("rmouse-discovery".to_string())
        .spawn(move || discovery_loop(socket, payload, running))
        .map_err(DiscoveryError::Spawn)?;

    info!(
        "discovery responder listening on UDP {local_addr} as '{}'",
        reply.name
    );
    Ok(DiscoveryResponder { local_addr, thread })
}

/// The main receive loop executed on the discovery thread.
fn discovery_loop(socket: UdpSocket, payload: Vec<u8>, running: Arc<AtomicBool>) {
    let mut buf = [0u8; 512];

    while running.load(Ordering::Relaxed) {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                // e.g. ICMP port-unreachable surfacing on some platforms.
                debug!("discovery recv error: {e}");
                continue;
            }
        };

        if !is_discovery_request(&buf[..len]) {
            debug!("ignoring {len}-byte datagram from {src}");
            continue;
        }

        debug!("discovery request from {src}");
        if let Err(e) = socket.send_to(&payload, src) {
            warn!("failed to send discovery reply to {src}: {e}");
        }
    }

    info!("discovery responder stopped");
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

/// Best guess at the LAN address other devices can reach this host on.
///
/// Connecting a UDP socket sends nothing; it only asks the OS which interface
/// would route to a public address.  Falls back to loopback when offline.
pub fn local_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|s| {
            s.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
            s.local_addr()
        })
        .map(|addr| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
