//! I/O dispatch: loop events in, protocol events out.
//!
//! A readiness notification is handled in two passes.  The first pass does
//! all socket work (flush on writable, read on readable) and reacts to error
//! and hang-up conditions.  Only then are the decoded events dispatched, so
//! an event handler never runs in the middle of a read.

use std::time::Duration;

use tracing::{debug, error, trace, warn};
use transmitter_core::protocol::messages::DISPLAY_OBJECT;
use transmitter_core::{CapabilityKind, WireMessage};

use crate::application::event_loop::{EventLoop, LoopError, LoopEvent, Readiness, TimerKind};
use crate::application::registry::Advertisement;
use crate::application::remote::RemoteId;
use crate::application::surface::SurfaceHandle;
use crate::application::transmitter::{Transmitter, TransmitterEvent};
use crate::application::transport::{Flush, Incoming, Transport, WireConnection};

impl<L: EventLoop, T: Transport> Transmitter<L, T> {
    /// Routes one loop event to its handler.  Events for remotes that no
    /// longer exist are dropped.
    pub fn dispatch(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Timer(token) => match token.kind {
                TimerKind::Establish => self.on_establish_timer(token.remote),
                TimerKind::Retry => self.on_retry_timer(token.remote),
            },
            LoopEvent::Watch { remote, readiness } => self.on_watch(remote, readiness),
        }
    }

    /// Waits on the event loop once and dispatches everything it reports.
    /// Returns the number of events handled.
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<usize, LoopError> {
        let events = self.event_loop.wait(timeout)?;
        let count = events.len();
        for event in events {
            self.dispatch(event);
        }
        Ok(count)
    }

    fn on_watch(&mut self, id: RemoteId, readiness: Readiness) {
        let Some(connection) = self
            .remotes
            .get_mut(&id)
            .and_then(|remote| remote.connection.as_mut())
        else {
            trace!(remote = %id, "readiness for a closed connection ignored");
            return;
        };
        if !connection.is_running() {
            self.disconnect(id);
            return;
        }

        if readiness.contains(Readiness::ERROR) {
            warn!(remote = %id, "socket error");
            self.disconnect(id);
            return;
        }

        if readiness.contains(Readiness::WRITABLE) {
            match connection.wire.flush() {
                Ok(Flush::Complete) => {
                    if let Some(watch) = connection.watch.as_mut() {
                        watch.interest = watch.interest.with(Readiness::WRITABLE, false);
                        self.event_loop.update_watch(id, watch.interest);
                    }
                }
                Ok(Flush::Pending) => {}
                Err(e) => {
                    warn!(remote = %id, error = %e, "flush failed");
                    self.disconnect(id);
                    return;
                }
            }
        }

        if readiness.contains(Readiness::READABLE) {
            if let Err(e) = connection.wire.read() {
                warn!(remote = %id, error = %e, "read failed");
                self.disconnect(id);
                return;
            }
        }

        if readiness.contains(Readiness::HANGUP) {
            warn!(remote = %id, "remote hung up");
            self.disconnect(id);
            return;
        }

        self.dispatch_pending(id);
    }

    /// Second pass of a readiness notification: handle queued events, then
    /// push out whatever the handlers queued.
    fn dispatch_pending(&mut self, id: RemoteId) {
        let Some(connection) = self
            .remotes
            .get_mut(&id)
            .and_then(|remote| remote.connection.as_mut())
        else {
            return;
        };
        let events = connection.wire.dispatch();
        self.handle_incoming(id, events);

        if !self.remotes.get(&id).is_some_and(|remote| remote.is_running()) {
            self.disconnect(id);
            return;
        }
        self.flush_connection(id);
    }

    /// Applies decoded protocol events to the remote's state.
    pub(crate) fn handle_incoming(&mut self, id: RemoteId, events: Vec<Incoming>) {
        let mut resizes: Vec<(SurfaceHandle, i32, i32)> = Vec::new();
        let mut notices: Vec<TransmitterEvent> = Vec::new();

        {
            let Some(remote) = self.remotes.get_mut(&id) else {
                return;
            };
            let Some(connection) = remote.connection.as_mut() else {
                return;
            };

            for Incoming { object, message } in events {
                match message {
                    WireMessage::Global { name, interface, version }
                        if object == connection.registry =>
                    {
                        let registry = connection.registry;
                        match connection.globals.bind(
                            &mut connection.wire,
                            registry,
                            name,
                            &interface,
                            version,
                        ) {
                            Ok(Advertisement::Bound(kind, _)) => {
                                debug!(remote = %id, %kind, "capability available");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                warn!(remote = %id, error = %e, "bind request failed");
                                connection.running = false;
                            }
                        }
                    }
                    WireMessage::GlobalRemove { name } if object == connection.registry => {
                        match connection.globals.kind_of_name(name) {
                            Some(kind) => {
                                warn!(remote = %id, %kind, "bound capability withdrawn; resetting connection");
                                connection.running = false;
                            }
                            None => debug!(remote = %id, name, "unbound global removed"),
                        }
                    }
                    WireMessage::Error(err) if object == DISPLAY_OBJECT => {
                        error!(
                            remote = %id,
                            object = %err.object,
                            code = err.code,
                            message = %err.message,
                            "server reported a protocol error"
                        );
                        connection.running = false;
                    }
                    WireMessage::DeleteId { id: deleted } => {
                        trace!(remote = %id, object = %deleted, "object id released");
                    }
                    WireMessage::Done { serial } => {
                        trace!(remote = %id, %object, serial, "callback done");
                    }
                    WireMessage::BufferComplete { serial } => {
                        match connection.release_buffer(object) {
                            Ok(true) => trace!(remote = %id, buffer = %object, serial, "buffer released"),
                            Ok(false) => debug!(remote = %id, buffer = %object, "completion for unknown buffer"),
                            Err(e) => {
                                warn!(remote = %id, error = %e, "buffer release failed");
                                connection.running = false;
                            }
                        }
                    }
                    WireMessage::SeatCapabilities { capabilities }
                        if connection.globals.get(CapabilityKind::Seat) == Some(object) =>
                    {
                        match connection.apply_seat_capabilities(capabilities) {
                            Ok(caps) => {
                                for seat in remote.seats.iter_mut() {
                                    seat.capabilities = caps;
                                }
                                notices.push(TransmitterEvent::SeatCapabilitiesChanged {
                                    remote: id,
                                    capabilities: caps,
                                });
                            }
                            Err(e) => {
                                warn!(remote = %id, error = %e, "input device request failed");
                                connection.running = false;
                            }
                        }
                    }
                    WireMessage::IviConfigure { width, height } => {
                        let target = remote.surfaces.iter().copied().find(|handle| {
                            self.surfaces
                                .get(handle)
                                .is_some_and(|proxy| proxy.remote_shell_surface == Some(object))
                        });
                        match target {
                            Some(handle) => resizes.push((handle, width, height)),
                            None => debug!(remote = %id, %object, "configure for unknown shell surface"),
                        }
                    }
                    other => {
                        debug!(remote = %id, %object, message = ?other.message_type(), "unexpected event");
                    }
                }
            }
        }

        for notice in notices {
            self.emit(notice);
        }
        for (handle, width, height) in resizes {
            self.deliver_resize(handle, width, height);
        }
    }
}
