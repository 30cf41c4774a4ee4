//! Domain types for the remote-compositing transmitter.
//!
//! Pure data and rules with no sockets, timers, or OS handles:
//!
//! - **`capability`** – the closed set of server capabilities a connection
//!   must bind before it may carry surface traffic.
//! - **`status`** – connection and per-surface stream status enums plus the
//!   fixed reconnection periods.
//! - **`output`** – descriptors of the synthetic output and seat a remote
//!   contributes to the host compositor.
//! - **`endpoint`** – the network address of one remote.

pub mod capability;
pub mod endpoint;
pub mod output;
pub mod status;
