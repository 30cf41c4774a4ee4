//! Infrastructure layer of the receiver: sockets and tasks.

pub mod network;
