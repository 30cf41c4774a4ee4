//! Network layer of the receiver.
//!
//! - **`server`** – TCP accept loop and one Tokio task per client
//!   connection, each driving its own [`Session`](crate::application::session::Session).

pub mod server;

pub use server::{bind, run_server, NetworkError, ServerConfig};
