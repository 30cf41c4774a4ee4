//! `poll(2)` event loop for the standalone binary.
//!
//! Watches are polled with the interest they were registered with; timers
//! are a deadline map consulted to bound the poll timeout.  Readiness is
//! reported before timers within one `wait`, each in a stable order.
//!
//! Each watch holds its own duplicate of the registered descriptor, so the
//! loop never polls a descriptor that its connection has already closed.

use std::collections::BTreeMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use crate::application::event_loop::{EventLoop, LoopError, LoopEvent, Readiness, TimerToken};
use crate::application::remote::RemoteId;
use crate::infrastructure::event_loop::poll_timeout;

#[derive(Debug, Default)]
pub struct PollEventLoop {
    timers: BTreeMap<TimerToken, Instant>,
    watches: BTreeMap<RemoteId, (OwnedFd, Readiness)>,
}

impl PollEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_due_timers(&mut self, events: &mut Vec<LoopEvent>) {
        let now = Instant::now();
        let mut due: Vec<(Instant, TimerToken)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(token, deadline)| (*deadline, *token))
            .collect();
        due.sort();
        for (_, token) in due {
            self.timers.remove(&token);
            events.push(LoopEvent::Timer(token));
        }
    }
}

fn to_poll_flags(interest: Readiness) -> PollFlags {
    let mut flags = PollFlags::empty();
    if interest.contains(Readiness::READABLE) {
        flags |= PollFlags::POLLIN;
    }
    if interest.contains(Readiness::WRITABLE) {
        flags |= PollFlags::POLLOUT;
    }
    flags
}

fn from_poll_flags(flags: PollFlags) -> Readiness {
    let mut readiness = Readiness::default();
    if flags.intersects(PollFlags::POLLIN | PollFlags::POLLPRI) {
        readiness = readiness | Readiness::READABLE;
    }
    if flags.contains(PollFlags::POLLOUT) {
        readiness = readiness | Readiness::WRITABLE;
    }
    if flags.intersects(PollFlags::POLLERR | PollFlags::POLLNVAL) {
        readiness = readiness | Readiness::ERROR;
    }
    if flags.contains(PollFlags::POLLHUP) {
        readiness = readiness | Readiness::HANGUP;
    }
    readiness
}

impl EventLoop for PollEventLoop {
    fn add_watch(
        &mut self,
        remote: RemoteId,
        fd: RawFd,
        interest: Readiness,
    ) -> Result<(), LoopError> {
        if fd < 0 {
            return Err(LoopError::Registration {
                fd,
                reason: "negative descriptor".to_string(),
            });
        }
        // SAFETY: the caller registers the descriptor of a live connection;
        // it stays open for the duration of this call.
        let owned = unsafe { BorrowedFd::borrow_raw(fd) }
            .try_clone_to_owned()
            .map_err(|e| LoopError::Registration { fd, reason: e.to_string() })?;
        self.watches.insert(remote, (owned, interest));
        Ok(())
    }

    fn update_watch(&mut self, remote: RemoteId, interest: Readiness) {
        if let Some(watch) = self.watches.get_mut(&remote) {
            watch.1 = interest;
        }
    }

    fn remove_watch(&mut self, remote: RemoteId) {
        self.watches.remove(&remote);
    }

    fn arm_timer(&mut self, token: TimerToken, delay: Duration) {
        self.timers.insert(token, Instant::now() + delay);
    }

    fn disarm_timer(&mut self, token: TimerToken) {
        self.timers.remove(&token);
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<LoopEvent>, LoopError> {
        let now = Instant::now();
        let until_timer = self
            .timers
            .values()
            .min()
            .map(|deadline| deadline.saturating_duration_since(now));
        let wait_for = match (timeout, until_timer) {
            (Some(t), Some(d)) => Some(t.min(d)),
            (t, d) => t.or(d),
        };

        let mut events = Vec::new();
        if self.watches.is_empty() {
            match wait_for {
                Some(duration) => std::thread::sleep(duration),
                None => return Ok(events),
            }
        } else {
            let remotes: Vec<RemoteId> = self.watches.keys().copied().collect();
            let mut fds: Vec<PollFd> = self
                .watches
                .values()
                .map(|(fd, interest)| PollFd::new(fd.as_fd(), to_poll_flags(*interest)))
                .collect();
            let timeout = wait_for.map_or(PollTimeout::NONE, poll_timeout);
            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => return Ok(events),
                Err(e) => return Err(LoopError::Io(e.into())),
            }
            for (fd, remote) in fds.iter().zip(remotes) {
                let readiness = fd.revents().map(from_poll_flags).unwrap_or_default();
                if !readiness.is_empty() {
                    events.push(LoopEvent::Watch { remote, readiness });
                }
            }
        }

        self.take_due_timers(&mut events);
        Ok(events)
    }
}
