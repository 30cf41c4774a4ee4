//! Application layer of the transmitter client.
//!
//! # What lives here?
//!
//! - **`transmitter`** – The root object: owns remotes and surface proxies,
//!   reports status to observers, and shuts everything down.
//!
//! - **`remote`** – The connection manager state machine driven by the
//!   establish and retry timers.
//!
//! - **`dispatch`** – Routes loop events to handlers and applies decoded
//!   protocol events (registry, buffer release, seat, shell configure).
//!
//! - **`surface`** – Surface proxy lifecycle: push, configure, gather,
//!   zombify, destroy.
//!
//! - **`registry`** / **`connection`** – Per-connection capability bindings
//!   and protocol objects.
//!
//! - **`event_loop`**, **`transport`**, **`host`** – The seams to the host
//!   event loop, the network, and the compositing host.  Implementations
//!   live in the infrastructure layer.

pub mod connection;
pub mod dispatch;
pub mod event_loop;
pub mod host;
pub mod registry;
pub mod remote;
pub mod surface;
pub mod transmitter;
pub mod transport;
