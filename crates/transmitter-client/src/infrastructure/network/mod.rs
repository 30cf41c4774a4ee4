//! [`Transport`](crate::application::transport::Transport) implementations.
//!
//! - **`tcp`** – Non-blocking TCP with a bounded connect and negotiation
//!   roundtrip.
//! - **`mock`** – In-memory transport driven by a scriptable server, for
//!   tests.

pub mod mock;
pub mod tcp;

pub use mock::{MockServer, MockTransport, MockWire};
pub use tcp::{TcpTransport, TcpWire};
