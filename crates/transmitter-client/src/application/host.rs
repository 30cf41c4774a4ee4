//! Types exchanged with the compositing host.
//!
//! The host owns the real surfaces and outputs; the transmitter only keeps
//! their identities and asks a [`FrameSource`] for pixels when a surface's
//! state is gathered.

use transmitter_core::StreamStatus;

/// Identity of a surface owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostSurfaceId(pub u64);

/// Identity of an output owned by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostOutputId(pub u64);

/// A host surface as handed to [`Transmitter::push_to_remote`].
///
/// [`Transmitter::push_to_remote`]: crate::application::transmitter::Transmitter::push_to_remote
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostSurface {
    pub id: HostSurfaceId,
    /// Shell-level surface id used to place the surface on the remote.
    /// Surfaces without one are transmitted but never positioned.
    pub ivi_id: Option<u32>,
}

/// One frame's worth of pixel data, opaque to the transmitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePayload {
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    pub format: u32,
    pub data: Vec<u8>,
}

/// Produces the payload uploaded for a surface on every gather.
pub trait FrameSource {
    /// Returns `None` when the surface has nothing to show; the gather is
    /// then skipped.
    fn capture(&mut self, surface: HostSurfaceId) -> Option<FramePayload>;
}

/// Notifications delivered to a surface's observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    StreamStatus(StreamStatus),
    /// A queued frame callback was satisfied by a gather.
    FrameDone(u32),
    /// A queued presentation feedback was satisfied by a gather.
    Presented(u32),
    /// A queued presentation feedback will never be presented.
    FeedbackDiscarded(u32),
    /// The proxy became a zombie; no further events follow.
    Destroyed,
}

/// Called with the size the remote shell asks a surface to take.
pub type ResizeHandler = Box<dyn FnMut(i32, i32)>;
