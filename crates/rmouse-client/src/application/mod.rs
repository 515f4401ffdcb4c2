//! Application layer of the client.
//!
//! - **`connection_state`** – The connection lifecycle as a pure state
//!   machine: states, retry accounting, backoff delays, and the epoch that
//!   makes reports from cancelled attempts harmless.  It performs no I/O;
//!   `infrastructure::network` drives it.

pub mod connection_state;
