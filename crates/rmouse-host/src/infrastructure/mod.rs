//! Infrastructure layer of the host.
//!
//! Contains OS-facing adapters: input injection, network sockets, and
//! configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `rmouse_core`, but MUST NOT be imported by the `application` layer.

pub mod input_emulation;
pub mod network;
pub mod storage;
