//! Protocol module containing message types and the JSON codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_message, decode_message_bounded, encode_message, ProtocolError};
pub use messages::*;
