//! rmouse-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! The client finds hosts on the LAN, keeps one authenticated control
//! channel open to the chosen host, and turns user gestures into protocol
//! messages.  Gesture capture itself belongs to the UI; this crate starts at
//! "send a move of (dx, dy)".

/// Application layer: the connection state machine.
pub mod application;

/// Infrastructure layer: discovery, persistence, and the WebSocket driver.
pub mod infrastructure;
