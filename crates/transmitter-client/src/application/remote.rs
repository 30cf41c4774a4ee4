//! Remote records and the connection manager state machine.
//!
//! # Lifecycle (for beginners)
//!
//! ```text
//!  connect_remotes            establish timer              negotiation ok
//! ─────────────► Initializing ───────────────► Establishing ─────────────► Ready
//!                                  ▲    │ connect failed:                    │
//!                                  │    └─ re-arm establish (2 s)            │ hang-up, I/O error,
//!                                  │                                         │ lost capability
//!                      retry timer │                                         ▼
//!                   re-arm establish└──────────────────────────────── Disconnected
//! ```
//!
//! Two one-shot timers drive everything.  The *establish* timer makes one
//! connection attempt per expiry.  The *retry* timer is armed on disconnect,
//! tears down whatever is left of the old connection, and hands control back
//! to the establish timer.  While the connection is healthy the retry timer
//! keeps re-arming itself at the slower retry period.
//!
//! Observers see a [`TransmitterEvent::StatusChanged`] only for real
//! transitions; re-entering the current state is silent.

use tracing::{debug, error, info, warn};
use transmitter_core::domain::status::IMMEDIATE;
use transmitter_core::{ConnectionStatus, Endpoint, OutputInfo, SeatInfo, StreamStatus};

use crate::application::connection::{Connection, Watch};
use crate::application::event_loop::{EventLoop, LoopError, Readiness, TimerToken};
use crate::application::surface::SurfaceHandle;
use crate::application::transmitter::{Transmitter, TransmitterEvent};
use crate::application::transport::{Flush, Transport, TransportError, WireConnection};

/// Identifies one configured remote for the life of the transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RemoteId(pub u32);

impl std::fmt::Display for RemoteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "remote#{}", self.0)
    }
}

/// Static configuration of one remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteDescriptor {
    /// Display model name; also names the remote's output and seat.
    pub model: String,
    pub endpoint: Endpoint,
    /// Configured geometry; zero means "use the default mode".
    pub width: i32,
    pub height: i32,
}

/// One remote display server and everything the transmitter tracks for it.
pub struct Remote<W> {
    pub(crate) id: RemoteId,
    pub(crate) descriptor: RemoteDescriptor,
    pub(crate) status: ConnectionStatus,
    pub(crate) connection: Option<Connection<W>>,
    /// Live (non-zombie) proxies bound to this remote.
    pub(crate) surfaces: Vec<SurfaceHandle>,
    pub(crate) outputs: Vec<OutputInfo>,
    pub(crate) seats: Vec<SeatInfo>,
    pub(crate) establish_requested: bool,
}

impl<W: WireConnection> Remote<W> {
    pub(crate) fn new(id: RemoteId, descriptor: RemoteDescriptor) -> Self {
        Self {
            id,
            descriptor,
            status: ConnectionStatus::Initializing,
            connection: None,
            surfaces: Vec::new(),
            outputs: Vec::new(),
            seats: Vec::new(),
            establish_requested: false,
        }
    }

    pub fn id(&self) -> RemoteId {
        self.id
    }

    pub fn descriptor(&self) -> &RemoteDescriptor {
        &self.descriptor
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// `true` while a connection exists and has not been marked for teardown.
    pub fn is_running(&self) -> bool {
        self.connection.as_ref().is_some_and(Connection::is_running)
    }
}

/// Why an establish attempt was abandoned after the socket connected.
#[derive(Debug, thiserror::Error)]
pub(crate) enum NegotiationError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Loop(#[from] LoopError),
    #[error("server does not offer {0}")]
    MissingCapabilities(String),
    #[error("server rejected the connection during negotiation")]
    Rejected,
    #[error("remote vanished during negotiation")]
    Gone,
}

// ── State machine ─────────────────────────────────────────────────────────────

impl<L: EventLoop, T: Transport> Transmitter<L, T> {
    /// Records a status transition and notifies observers when it changed.
    pub(crate) fn set_status(&mut self, id: RemoteId, status: ConnectionStatus) {
        let Some(remote) = self.remotes.get_mut(&id) else {
            return;
        };
        if remote.status == status {
            return;
        }
        remote.status = status;
        info!(remote = %id, model = %remote.descriptor.model, %status, "connection status changed");
        self.emit(TransmitterEvent::StatusChanged { remote: id, status });
    }

    /// Establish timer expiry: makes one connection attempt.
    pub(crate) fn on_establish_timer(&mut self, id: RemoteId) {
        let Some(remote) = self.remotes.get(&id) else {
            debug!(remote = %id, "establish timer for unknown remote");
            return;
        };
        if remote.status == ConnectionStatus::Ready && remote.is_running() {
            debug!(remote = %id, "establish timer fired on a ready remote; ignoring");
            return;
        }
        let endpoint = remote.descriptor.endpoint.clone();

        // Each attempt starts from a fresh connection.
        self.drop_connection(id);
        self.set_status(id, ConnectionStatus::Establishing);

        let wire = match self.transport.connect(&endpoint) {
            Ok(wire) => wire,
            Err(e) => {
                warn!(
                    remote = %id,
                    %endpoint,
                    error = %e,
                    "connection attempt failed; retrying in {:?}",
                    self.options.establish_period
                );
                self.event_loop
                    .arm_timer(TimerToken::establish(id), self.options.establish_period);
                return;
            }
        };

        match self.negotiate(id, wire) {
            Ok(()) => {
                info!(remote = %id, %endpoint, "connected");
                self.set_status(id, ConnectionStatus::Ready);
                self.flush_connection(id);
            }
            Err(NegotiationError::Gone) => {}
            Err(e) => {
                error!(remote = %id, %endpoint, error = %e, "capability negotiation failed");
                self.disconnect(id);
            }
        }
    }

    /// Stores the connection, registers its watch, and binds the server's
    /// capabilities in one blocking roundtrip.
    fn negotiate(&mut self, id: RemoteId, wire: T::Wire) -> Result<(), NegotiationError> {
        let fd = wire.raw_fd();
        let mut connection = Connection::open(wire)?;
        let remote = self.remotes.get_mut(&id).ok_or(NegotiationError::Gone)?;

        self.event_loop.add_watch(id, fd, Readiness::READABLE)?;
        connection.watch = Some(Watch { fd, interest: Readiness::READABLE });
        let connection = remote.connection.insert(connection);

        let events = connection.wire.roundtrip()?;
        self.handle_incoming(id, events);

        let connection = self
            .remotes
            .get(&id)
            .and_then(|remote| remote.connection.as_ref())
            .ok_or(NegotiationError::Gone)?;
        if !connection.is_running() {
            return Err(NegotiationError::Rejected);
        }
        let missing = connection.globals.missing();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|kind| kind.interface()).collect();
            return Err(NegotiationError::MissingCapabilities(names.join(", ")));
        }
        Ok(())
    }

    /// Moves a remote to `Disconnected`, releases its connection, and arms
    /// the retry timer.  A remote that is already disconnected is left alone.
    pub(crate) fn disconnect(&mut self, id: RemoteId) {
        match self.remotes.get(&id) {
            Some(remote) if remote.status != ConnectionStatus::Disconnected => {}
            _ => return,
        }
        self.set_status(id, ConnectionStatus::Disconnected);
        self.reset_remote_surfaces(id);
        self.drop_connection(id);
        self.event_loop.arm_timer(TimerToken::retry(id), IMMEDIATE);
    }

    /// Retry timer expiry: keeps monitoring a healthy connection, otherwise
    /// cleans up and schedules the next establish attempt.
    pub(crate) fn on_retry_timer(&mut self, id: RemoteId) {
        let Some(remote) = self.remotes.get(&id) else {
            debug!(remote = %id, "retry timer for unknown remote");
            return;
        };
        if remote.is_running() {
            self.event_loop
                .arm_timer(TimerToken::retry(id), self.options.retry_period);
            return;
        }

        self.reset_remote_surfaces(id);
        self.drop_connection(id);
        self.set_status(id, ConnectionStatus::Establishing);
        debug!(remote = %id, "reconnecting in {:?}", self.options.establish_period);
        self.event_loop
            .arm_timer(TimerToken::establish(id), self.options.establish_period);
    }

    /// Removes the loop watch and then closes the connection, if any.
    pub(crate) fn drop_connection(&mut self, id: RemoteId) {
        let Some(connection) = self
            .remotes
            .get_mut(&id)
            .and_then(|remote| remote.connection.take())
        else {
            return;
        };
        if connection.watch.is_some() {
            self.event_loop.remove_watch(id);
        }
        drop(connection);
    }

    /// Forgets every remote-side object of the remote's proxies.  Their
    /// stream status drops to `Error` if it was anything else.
    pub(crate) fn reset_remote_surfaces(&mut self, id: RemoteId) {
        let Some(remote) = self.remotes.get(&id) else {
            return;
        };
        for handle in &remote.surfaces {
            if let Some(proxy) = self.surfaces.get_mut(handle) {
                proxy.remote_surface = None;
                proxy.remote_shell_surface = None;
                proxy.set_stream_status(StreamStatus::Error);
            }
        }
    }

    /// Flushes a connection and adjusts the watch's writable interest.
    /// A flush error disconnects the remote; returns whether it is still up.
    pub(crate) fn flush_connection(&mut self, id: RemoteId) -> bool {
        let Some(connection) = self
            .remotes
            .get_mut(&id)
            .and_then(|remote| remote.connection.as_mut())
        else {
            return false;
        };
        match connection.wire.flush() {
            Ok(flush) => {
                let backlog = flush == Flush::Pending;
                if let Some(watch) = connection.watch.as_mut() {
                    let interest = watch.interest.with(Readiness::WRITABLE, backlog);
                    if interest != watch.interest {
                        watch.interest = interest;
                        self.event_loop.update_watch(id, interest);
                    }
                }
                true
            }
            Err(e) => {
                warn!(remote = %id, error = %e, "flush failed");
                self.disconnect(id);
                false
            }
        }
    }
}
