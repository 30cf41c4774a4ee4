//! Protocol module containing message types, the binary codec, and the
//! event serial counter.

pub mod codec;
pub mod messages;
pub mod serial;

pub use codec::{decode_message, encode_message, frame_length, ProtocolError};
pub use messages::*;
pub use serial::SerialCounter;
