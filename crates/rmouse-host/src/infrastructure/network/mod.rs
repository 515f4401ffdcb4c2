//! Network adapters of the host.
//!
//! - **`ws_server`** – WebSocket control channel.  Accepts connections, hands
//!   each to the Session Manager, and runs one ordered reader task per session.
//! - **`discovery`** – UDP responder that answers `remotemouse:discover`
//!   requests with a JSON description of this host.
//!
//! The two run independently: the responder on its own OS thread, the
//! acceptor on the Tokio runtime.  They share only the read-mostly settings.

pub mod discovery;
pub mod ws_server;
