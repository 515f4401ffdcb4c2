//! Discovery vocabulary shared by the host responder and the client requester.
//!
//! A client broadcasts the literal ASCII token [`DISCOVERY_REQUEST`] to UDP
//! port [`DEFAULT_DISCOVERY_PORT`].  Every host on the LAN answers with a
//! unicast JSON [`DiscoveryReply`] sent back to the requester's address:
//!
//! ```json
//! {"name":"Desk","ip":"192.168.1.20","port":8765,"pin_required":true,
//!  "version":"2.0","capabilities":["mouse","keyboard","hotkeys","scroll"]}
//! ```
//!
//! The client turns each reply into a [`HostRecord`] keyed by the datagram's
//! source address and merges it into a [`HostList`].

use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// UDP port the host listens on for discovery requests.
pub const DEFAULT_DISCOVERY_PORT: u16 = 9876;

/// Literal request token.
pub const DISCOVERY_REQUEST: &str = "remotemouse:discover";

/// Capabilities every host advertises.
pub const DEFAULT_CAPABILITIES: &[&str] = &["mouse", "keyboard", "hotkeys", "scroll"];

/// Error returned when a datagram is not a usable discovery reply.
#[derive(Debug, Error, PartialEq)]
pub enum DiscoveryReplyError {
    #[error("discovery reply is not UTF-8")]
    NotUtf8,
    #[error("discovery reply is not valid JSON: {0}")]
    Json(String),
}

/// JSON payload a host sends back to a discovery request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryReply {
    pub name: String,
    /// Address the host believes it is reachable on.
    pub ip: String,
    /// Control-channel port.
    pub port: u16,
    pub pin_required: bool,
    pub version: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl DiscoveryReply {
    /// Parses a reply datagram.
    ///
    /// # Errors
    ///
    /// Returns [`DiscoveryReplyError`] for non-UTF-8 or non-matching JSON.
    pub fn from_datagram(datagram: &[u8]) -> Result<Self, DiscoveryReplyError> {
        let text = std::str::from_utf8(datagram).map_err(|_| DiscoveryReplyError::NotUtf8)?;
        serde_json::from_str(text.trim()).map_err(|e| DiscoveryReplyError::Json(e.to_string()))
    }

    /// Serializes the reply for sending.
    pub fn to_datagram(&self) -> Vec<u8> {
        // Plain struct of strings, bools and integers; cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Returns `true` when `datagram` is a discovery request.
///
/// Surrounding whitespace is tolerated; anything else is not a request.
pub fn is_discovery_request(datagram: &[u8]) -> bool {
    std::str::from_utf8(datagram)
        .map(|s| s.trim() == DISCOVERY_REQUEST)
        .unwrap_or(false)
}

/// A discovered (or manually entered) host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub name: String,
    pub address: IpAddr,
    pub port: u16,
    pub version: String,
    pub pin_required: bool,
    /// Informational; order preserved from the reply.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

impl HostRecord {
    /// Builds a record from a reply, keyed by the datagram's source address.
    pub fn from_reply(reply: DiscoveryReply, source: IpAddr) -> Self {
        Self {
            name: reply.name,
            address: source,
            port: reply.port,
            version: reply.version,
            pin_required: reply.pin_required,
            capabilities: reply.capabilities,
        }
    }

    /// WebSocket URL of this host's control channel.
    pub fn control_url(&self) -> String {
        match self.address {
            IpAddr::V4(ip) => format!("ws://{ip}:{}", self.port),
            IpAddr::V6(ip) => format!("ws://[{ip}]:{}", self.port),
        }
    }
}

/// Insertion-ordered host list, unique by address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostList {
    hosts: Vec<HostRecord>,
}

impl HostList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `record`, or replaces the entry with the same address in place.
    ///
    /// Returns `true` when the record was new.
    pub fn upsert(&mut self, record: HostRecord) -> bool {
        match self.hosts.iter_mut().find(|h| h.address == record.address) {
            Some(existing) => {
                *existing = record;
                false
            }
            None => {
                self.hosts.push(record);
                true
            }
        }
    }

    /// Merges every record of `other` into `self`.
    pub fn merge(&mut self, other: HostList) {
        for record in other.hosts {
            self.upsert(record);
        }
    }

    /// Removes the host at `address`, returning it if present.
    pub fn remove(&mut self, address: IpAddr) -> Option<HostRecord> {
        let idx = self.hosts.iter().position(|h| h.address == address)?;
        Some(self.hosts.remove(idx))
    }

    pub fn get(&self, address: IpAddr) -> Option<&HostRecord> {
        self.hosts.iter().find(|h| h.address == address)
    }

    pub fn as_slice(&self) -> &[HostRecord] {
        &self.hosts
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

impl From<Vec<HostRecord>> for HostList {
    fn from(records: Vec<HostRecord>) -> Self {
        let mut list = HostList::new();
        for record in records {
            list.upsert(record);
        }
        list
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
