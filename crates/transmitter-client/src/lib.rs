//! transmitter-client library entry point.
//!
//! Re-exports all public modules so that integration tests in `tests/`
//! and the binary entry point in `main.rs` share the same module tree.
//!
//! # What does the transmitter do? (for beginners)
//!
//! A compositing host (the local display server) wants some of its surfaces
//! shown on other machines.  The transmitter keeps one protocol connection
//! per configured *remote* and mirrors host surfaces onto it:
//!
//! 1. For each remote, it connects in the background and negotiates four
//!    capabilities: surface compositing, buffer upload, input seat, and
//!    shell placement (ivi).
//! 2. When the host pushes a surface to a ready remote, it creates the
//!    remote-side surface and places it by its ivi id.
//! 3. Every frame, the host gathers the surface's state: the transmitter
//!    uploads a buffer, attaches it, damages, and commits.
//! 4. When a remote goes away, the transmitter reports it, drops the
//!    remote-side objects, and keeps retrying in the background.  The host
//!    pushes its surfaces again once the remote is ready.
//!
//! Everything is single-threaded and driven by the host's event loop.

/// Application layer: the transmitter, its state machine, and its seams.
pub mod application;

/// Infrastructure layer: event loops, transports, frames, and configuration.
pub mod infrastructure;

pub use application::event_loop::{EventLoop, LoopEvent, Readiness, TimerKind, TimerToken};
pub use application::host::{FrameSource, HostOutputId, HostSurface, HostSurfaceId, SurfaceEvent};
pub use application::remote::{RemoteDescriptor, RemoteId};
pub use application::surface::SurfaceHandle;
pub use application::transmitter::{
    Transmitter, TransmitterError, TransmitterEvent, TransmitterOptions,
};
pub use application::transport::{Transport, WireConnection};
