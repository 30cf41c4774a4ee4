//! The host event loop seam.
//!
//! The transmitter never blocks on its own.  It registers one file-descriptor
//! watch per connected remote and two one-shot timers per remote (establish
//! and retry) with whatever event loop the host runs, then reacts to the
//! [`LoopEvent`]s the host hands back through
//! [`Transmitter::dispatch`](crate::application::transmitter::Transmitter::dispatch).
//!
//! Every registration is keyed by a [`RemoteId`], so an event that arrives
//! after its remote (or its connection) is gone is recognised as stale and
//! dropped instead of touching freed state.

use std::os::fd::RawFd;
use std::time::Duration;

use thiserror::Error;

use crate::application::remote::RemoteId;

// ── Readiness ─────────────────────────────────────────────────────────────────

/// Bit set of readiness conditions on a watched descriptor.
///
/// Used both as the *interest* registered with the loop and as the
/// *readiness* the loop reports back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Readiness(pub u8);

impl Readiness {
    pub const READABLE: Readiness = Readiness(0x01);
    pub const WRITABLE: Readiness = Readiness(0x02);
    pub const ERROR: Readiness = Readiness(0x04);
    pub const HANGUP: Readiness = Readiness(0x08);

    /// Returns `true` if every bit of `other` is set in `self`.
    pub fn contains(self, other: Readiness) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `self` with the bits of `other` set or cleared.
    pub fn with(self, other: Readiness, enabled: bool) -> Readiness {
        if enabled {
            Readiness(self.0 | other.0)
        } else {
            Readiness(self.0 & !other.0)
        }
    }
}

impl std::ops::BitOr for Readiness {
    type Output = Readiness;

    fn bitor(self, rhs: Readiness) -> Readiness {
        Readiness(self.0 | rhs.0)
    }
}

// ── Timers ────────────────────────────────────────────────────────────────────

/// Which of a remote's two timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// Drives connection attempts.
    Establish,
    /// Monitors an established connection and triggers reconnection.
    Retry,
}

/// Identifies one one-shot timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken {
    pub remote: RemoteId,
    pub kind: TimerKind,
}

impl TimerToken {
    pub fn establish(remote: RemoteId) -> Self {
        Self { remote, kind: TimerKind::Establish }
    }

    pub fn retry(remote: RemoteId) -> Self {
        Self { remote, kind: TimerKind::Retry }
    }
}

// ── Events ────────────────────────────────────────────────────────────────────

/// One occurrence reported by [`EventLoop::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEvent {
    Timer(TimerToken),
    Watch { remote: RemoteId, readiness: Readiness },
}

/// Errors reported by an [`EventLoop`] implementation.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("event loop I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot watch descriptor {fd}: {reason}")]
    Registration { fd: RawFd, reason: String },
}

// ── Trait ─────────────────────────────────────────────────────────────────────

/// Host event loop facilities used by the transmitter.
///
/// Timers are one-shot: arming an armed timer replaces its deadline, and a
/// timer that fired stays disarmed until armed again.  At most one watch is
/// registered per remote; adding a second one replaces the first.
pub trait EventLoop {
    /// Watches `fd`, which must be open for the duration of the call.
    /// Implementations that poll real descriptors keep their own duplicate.
    fn add_watch(&mut self, remote: RemoteId, fd: RawFd, interest: Readiness)
        -> Result<(), LoopError>;

    /// Changes the interest of an existing watch.  Unknown remotes are ignored.
    fn update_watch(&mut self, remote: RemoteId, interest: Readiness);

    fn remove_watch(&mut self, remote: RemoteId);

    fn arm_timer(&mut self, token: TimerToken, delay: Duration);

    fn disarm_timer(&mut self, token: TimerToken);

    /// Blocks until at least one watch is ready, a timer expires, or
    /// `timeout` elapses (`None` waits indefinitely).
    ///
    /// May return an empty list (timeout, signal interruption).
    fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<LoopEvent>, LoopError>;
}
