//! Infrastructure layer for the transmitter client.
//!
//! Contains the adapters behind the application-layer seams: event loops,
//! transports, the placeholder frame source, and configuration storage.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `transmitter_core`, but MUST NOT be imported by the `application` layer
//! outside of its tests.
//!
//! # Sub-modules
//!
//! - **`event_loop`** – `poll(2)`-based host loop for the binary and a
//!   virtual-clock loop for tests.
//!
//! - **`network`** – TCP transport and the in-memory mock transport.
//!
//! - **`frames`** – Frame source that transmits a blank pixel per surface.
//!
//! - **`storage`** – TOML configuration of the transmitter and its remotes.

pub mod event_loop;
pub mod frames;
pub mod network;
pub mod storage;
