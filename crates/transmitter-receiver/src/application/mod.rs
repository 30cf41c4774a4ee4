//! Application layer of the receiver.
//!
//! - **`session`** – Protocol state of one client connection: object table,
//!   capability advertisement, sync answers, buffer completion.

pub mod session;
