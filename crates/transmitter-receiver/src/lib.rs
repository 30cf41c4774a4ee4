//! transmitter-receiver library entry point.
//!
//! A minimal remote display server for manual end-to-end runs of the
//! transmitter.  It speaks the full wire protocol but composites nothing:
//! buffers are acknowledged and dropped.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.

pub mod application;
pub mod infrastructure;
