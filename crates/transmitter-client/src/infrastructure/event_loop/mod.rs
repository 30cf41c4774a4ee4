//! [`EventLoop`](crate::application::event_loop::EventLoop) implementations.
//!
//! - **`poll`** – `poll(2)` over the registered descriptors plus a deadline
//!   map; used by the `transmitter` binary.
//! - **`mock`** – Virtual-clock loop with injectable readiness; used by tests.

use std::time::Duration;

use nix::poll::PollTimeout;

pub mod mock;
pub mod poll;

pub use mock::ManualEventLoop;
pub use poll::PollEventLoop;

/// Converts a wait duration to a `poll(2)` timeout, rounding up to whole
/// milliseconds so a sub-millisecond wait does not spin.
pub(crate) fn poll_timeout(timeout: Duration) -> PollTimeout {
    let millis = timeout.as_micros().div_ceil(1000);
    u16::try_from(millis).map_or(PollTimeout::MAX, PollTimeout::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_timeout_rounds_up_partial_milliseconds() {
        assert_eq!(poll_timeout(Duration::from_micros(1)), PollTimeout::from(1u16));
        assert_eq!(poll_timeout(Duration::from_millis(20)), PollTimeout::from(20u16));
    }

    #[test]
    fn test_poll_timeout_saturates_long_waits() {
        assert_eq!(poll_timeout(Duration::from_secs(3600)), PollTimeout::MAX);
    }
}
