//! Infrastructure layer for the client application.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rmouse_core`, but MUST NOT be imported by the `application` layer.
//!
//! # Sub-modules
//!
//! - **`discovery`** – UDP broadcast requester and the periodic discovery
//!   task that keeps the host list fresh.
//!
//! - **`host_store`** – Persists the host list through an opaque key-value
//!   store.
//!
//! - **`network`** – The WebSocket driver and the [`network::RemoteClient`]
//!   facade the UI talks to.

pub mod discovery;
pub mod host_store;
pub mod network;
