//! Event loop with a virtual clock, for tests.
//!
//! Nothing ever blocks: [`ManualEventLoop::wait`] jumps the clock straight
//! to the earliest timer deadline (bounded by the timeout) and reports every
//! timer due at that instant.  Readiness never happens on its own; tests
//! [`inject`](ManualEventLoop::inject) it, and injected events are reported
//! by the next `wait` without moving the clock.

use std::collections::{BTreeMap, VecDeque};
use std::os::fd::RawFd;
use std::time::Duration;

use crate::application::event_loop::{EventLoop, LoopError, LoopEvent, Readiness, TimerToken};
use crate::application::remote::RemoteId;

#[derive(Debug, Default)]
pub struct ManualEventLoop {
    now: Duration,
    timers: BTreeMap<TimerToken, Duration>,
    watches: BTreeMap<RemoteId, (RawFd, Readiness)>,
    injected: VecDeque<LoopEvent>,
    /// Every `arm_timer` call with the delay it asked for.
    pub armed: Vec<(TimerToken, Duration)>,
    /// Every `remove_watch` call.
    pub removed_watches: Vec<RemoteId>,
    /// Fail the next `add_watch`.
    pub refuse_watch: bool,
}

impl ManualEventLoop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed since creation.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.timers.contains_key(&token)
    }

    /// Time left until `token` fires.
    pub fn remaining(&self, token: TimerToken) -> Option<Duration> {
        self.timers
            .get(&token)
            .map(|deadline| deadline.saturating_sub(self.now))
    }

    /// Registered descriptor and interest of a remote's watch.
    pub fn watch(&self, remote: RemoteId) -> Option<(RawFd, Readiness)> {
        self.watches.get(&remote).copied()
    }

    /// Queues a readiness notification for the next `wait`.  Delivered even
    /// if no watch is registered, to mimic a notification that raced the
    /// watch's removal.
    pub fn inject(&mut self, remote: RemoteId, readiness: Readiness) {
        self.injected.push_back(LoopEvent::Watch { remote, readiness });
    }

    fn take_due(&mut self) -> Vec<LoopEvent> {
        let now = self.now;
        let mut due: Vec<(Duration, TimerToken)> = self
            .timers
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(token, deadline)| (*deadline, *token))
            .collect();
        due.sort();
        due.into_iter()
            .map(|(_, token)| {
                self.timers.remove(&token);
                LoopEvent::Timer(token)
            })
            .collect()
    }
}

impl EventLoop for ManualEventLoop {
    fn add_watch(
        &mut self,
        remote: RemoteId,
        fd: RawFd,
        interest: Readiness,
    ) -> Result<(), LoopError> {
        if std::mem::take(&mut self.refuse_watch) {
            return Err(LoopError::Registration {
                fd,
                reason: "refused by test".to_string(),
            });
        }
        self.watches.insert(remote, (fd, interest));
        Ok(())
    }

    fn update_watch(&mut self, remote: RemoteId, interest: Readiness) {
        if let Some(watch) = self.watches.get_mut(&remote) {
            watch.1 = interest;
        }
    }

    fn remove_watch(&mut self, remote: RemoteId) {
        self.watches.remove(&remote);
        self.removed_watches.push(remote);
    }

    fn arm_timer(&mut self, token: TimerToken, delay: Duration) {
        self.timers.insert(token, self.now + delay);
        self.armed.push((token, delay));
    }

    fn disarm_timer(&mut self, token: TimerToken) {
        self.timers.remove(&token);
    }

    fn wait(&mut self, timeout: Option<Duration>) -> Result<Vec<LoopEvent>, LoopError> {
        if !self.injected.is_empty() {
            return Ok(self.injected.drain(..).collect());
        }
        let next_deadline = self.timers.values().min().copied();
        let target = match (next_deadline, timeout) {
            (Some(deadline), Some(t)) => deadline.min(self.now + t),
            (Some(deadline), None) => deadline,
            (None, Some(t)) => self.now + t,
            (None, None) => return Ok(Vec::new()),
        };
        self.now = self.now.max(target);
        Ok(self.take_due())
    }
}
