//! Application layer use cases for the host application.
//!
//! Nothing in here touches a socket or an OS input API.  The transport hands
//! decoded frames to the [`session_manager`], and the [`translate_input`] use
//! case drives whatever [`translate_input::InputSink`] the infrastructure
//! layer selected at startup.
//!
//! # Sub-modules
//!
//! - **`session_manager`** – Session registry, PIN authentication, connection
//!   cap, and per-message dispatch.
//!
//! - **`translate_input`** – Maps authenticated input messages onto the
//!   `InputSink` capability trait, resolving logical key names for the
//!   running OS.

pub mod session_manager;
pub mod translate_input;
