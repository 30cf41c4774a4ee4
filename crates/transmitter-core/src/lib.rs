//! # transmitter-core
//!
//! Shared library for the remote-compositing transmitter containing the wire
//! protocol codec and the domain types both ends of a connection agree on.
//!
//! It has zero dependencies on OS APIs, sockets, or event loops.
//!
//! # Architecture overview
//!
//! The transmitter streams surfaces from a local compositing host to a remote
//! display server.  A client connects, discovers which capabilities the
//! server offers, binds the ones it needs, and then pushes per-surface
//! state (buffer, damage, commit) for every composited frame.
//!
//! - **`protocol`** – How bytes travel over the network.  Messages are
//!   addressed to protocol objects and encoded into a compact binary format
//!   (12-byte header + payload).
//!
//! - **`domain`** – Capability kinds, connection/stream status, the fixed
//!   reconnection periods, and descriptors of the synthetic output and seat
//!   each remote contributes to the host.

pub mod domain;
pub mod protocol;

pub use domain::capability::CapabilityKind;
pub use domain::endpoint::Endpoint;
pub use domain::output::{OutputInfo, OutputMode, SeatCapabilities, SeatInfo};
pub use domain::status::{ConnectionStatus, StreamStatus};
pub use protocol::codec::{decode_message, encode_message, frame_length, ProtocolError};
pub use protocol::messages::{ObjectId, WireMessage};
