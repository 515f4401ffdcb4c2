//! # rmouse-core
//!
//! Shared library for RemoteMouse containing the control-channel message
//! codec, the discovery vocabulary, and key translation tables.
//!
//! This crate is used by both the host and client applications.
//! It has zero dependencies on OS APIs or network sockets.
//!
//! # Architecture overview
//!
//! RemoteMouse lets a phone or laptop (the "client") drive the pointer and
//! keyboard of another computer (the "host") over the local network.  The
//! client finds hosts with a UDP broadcast, opens a WebSocket, authenticates
//! with a PIN, and then streams small JSON input messages.
//!
//! - **`protocol`** – The JSON messages exchanged on the control channel and
//!   the codec that turns them into text frames and back.
//!
//! - **`discovery`** – The broadcast request token, the host's JSON reply,
//!   and the deduplicated host list the client maintains.
//!
//! - **`keymap`** – Logical key names (`"cmd"`, `"enter"`, `"c"`) resolved to
//!   concrete keys per platform, plus native code tables for Windows VK codes,
//!   X11 KeySyms, and macOS CGKeyCodes.

pub mod discovery;
pub mod keymap;
pub mod protocol;

pub use discovery::{DiscoveryReply, HostList, HostRecord};
pub use keymap::{Key, MouseButton, Platform};
pub use protocol::codec::{decode_message, encode_message, ProtocolError};
pub use protocol::messages::ControlMessage;
