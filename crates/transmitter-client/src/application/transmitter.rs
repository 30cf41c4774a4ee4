//! The transmitter root: owns every remote and surface proxy.
//!
//! A [`Transmitter`] is driven entirely by the host: the host registers
//! remotes, calls [`Transmitter::connect_remotes`] once, and from then on
//! feeds loop events through [`Transmitter::dispatch`] (or lets
//! [`Transmitter::run_once`] wait for them).  Status changes and the
//! synthetic outputs/seats of each remote are reported to observers over
//! `std::sync::mpsc` channels.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use transmitter_core::domain::status::{ESTABLISH_PERIOD, IMMEDIATE, RETRY_PERIOD};
use transmitter_core::{ConnectionStatus, OutputInfo, SeatCapabilities, SeatInfo};

use crate::application::event_loop::{EventLoop, TimerToken};
use crate::application::host::FrameSource;
use crate::application::remote::{Remote, RemoteDescriptor, RemoteId};
use crate::application::surface::{SurfaceHandle, SurfaceProxy};
use crate::application::transport::{Transport, WireConnection};

/// Reconnection pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransmitterOptions {
    /// Delay between failed connection attempts.
    pub establish_period: Duration,
    /// Period at which a healthy connection is re-checked.
    pub retry_period: Duration,
}

impl Default for TransmitterOptions {
    fn default() -> Self {
        Self {
            establish_period: ESTABLISH_PERIOD,
            retry_period: RETRY_PERIOD,
        }
    }
}

/// Notifications delivered to connection observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmitterEvent {
    /// A connection attempt has been scheduled for a remote.
    EstablishRequested { remote: RemoteId },
    StatusChanged { remote: RemoteId, status: ConnectionStatus },
    /// The host should create an output for the remote.
    OutputCreated { remote: RemoteId, output: OutputInfo },
    /// The host should create a seat for the remote.
    SeatCreated { remote: RemoteId, seat: SeatInfo },
    /// The host should release an output announced by `OutputCreated`.
    OutputDestroyed { remote: RemoteId, output: OutputInfo },
    /// The host should release a seat announced by `SeatCreated`.
    SeatDestroyed { remote: RemoteId, seat: SeatInfo },
    SeatCapabilitiesChanged { remote: RemoteId, capabilities: SeatCapabilities },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransmitterError {
    #[error("unknown remote {0}")]
    UnknownRemote(RemoteId),
    #[error("{remote} is {status}, not ready")]
    NotReady { remote: RemoteId, status: ConnectionStatus },
    #[error("unknown or destroyed surface {0}")]
    UnknownSurface(SurfaceHandle),
}

pub struct Transmitter<L: EventLoop, T: Transport> {
    pub(crate) event_loop: L,
    pub(crate) transport: T,
    pub(crate) frames: Box<dyn FrameSource>,
    pub(crate) options: TransmitterOptions,
    pub(crate) remotes: BTreeMap<RemoteId, Remote<T::Wire>>,
    pub(crate) surfaces: BTreeMap<SurfaceHandle, SurfaceProxy>,
    observers: Vec<Sender<TransmitterEvent>>,
    next_remote: u32,
    pub(crate) next_surface: u64,
    shut_down: bool,
}

impl<L: EventLoop, T: Transport> Transmitter<L, T> {
    pub fn new(event_loop: L, transport: T, frames: Box<dyn FrameSource>) -> Self {
        Self::with_options(event_loop, transport, frames, TransmitterOptions::default())
    }

    pub fn with_options(
        event_loop: L,
        transport: T,
        frames: Box<dyn FrameSource>,
        options: TransmitterOptions,
    ) -> Self {
        Self {
            event_loop,
            transport,
            frames,
            options,
            remotes: BTreeMap::new(),
            surfaces: BTreeMap::new(),
            observers: Vec::new(),
            next_remote: 1,
            next_surface: 1,
            shut_down: false,
        }
    }

    pub fn event_loop(&self) -> &L {
        &self.event_loop
    }

    pub fn event_loop_mut(&mut self) -> &mut L {
        &mut self.event_loop
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn set_frame_source(&mut self, frames: Box<dyn FrameSource>) {
        self.frames = frames;
    }

    /// Subscribes to connection-level notifications.  Observers whose
    /// receiver was dropped are pruned on the next notification.
    pub fn register_connection_observer(&mut self, observer: Sender<TransmitterEvent>) {
        self.observers.push(observer);
    }

    pub(crate) fn emit(&mut self, event: TransmitterEvent) {
        self.observers.retain(|observer| observer.send(event.clone()).is_ok());
    }

    /// Registers a remote in `Initializing` state.  No connection is attempted
    /// until [`connect_remotes`](Self::connect_remotes).
    pub fn add_remote(&mut self, descriptor: RemoteDescriptor) -> RemoteId {
        let id = RemoteId(self.next_remote);
        self.next_remote += 1;
        info!(remote = %id, model = %descriptor.model, endpoint = %descriptor.endpoint, "remote configured");
        self.remotes.insert(id, Remote::new(id, descriptor));
        id
    }

    pub fn remote_ids(&self) -> Vec<RemoteId> {
        self.remotes.keys().copied().collect()
    }

    pub fn remote(&self, id: RemoteId) -> Option<&Remote<T::Wire>> {
        self.remotes.get(&id)
    }

    pub fn status(&self, id: RemoteId) -> Option<ConnectionStatus> {
        self.remotes.get(&id).map(|remote| remote.status)
    }

    pub fn outputs(&self, id: RemoteId) -> &[OutputInfo] {
        self.remotes.get(&id).map_or(&[], |remote| &remote.outputs)
    }

    pub fn seats(&self, id: RemoteId) -> &[SeatInfo] {
        self.remotes.get(&id).map_or(&[], |remote| &remote.seats)
    }

    /// Live proxies bound to a remote.
    pub fn surfaces_of(&self, id: RemoteId) -> &[SurfaceHandle] {
        self.remotes.get(&id).map_or(&[], |remote| &remote.surfaces)
    }

    /// Schedules the first connection attempt of every remote that has not
    /// been started yet and announces its output and seat.  Returns the
    /// number of remotes started.
    pub fn connect_remotes(&mut self) -> usize {
        let pending: Vec<RemoteId> = self
            .remotes
            .values()
            .filter(|remote| !remote.establish_requested)
            .map(|remote| remote.id)
            .collect();

        for id in &pending {
            let Some(remote) = self.remotes.get_mut(id) else {
                continue;
            };
            remote.establish_requested = true;
            let descriptor = &remote.descriptor;
            let output = OutputInfo::for_remote(&descriptor.model, descriptor.width, descriptor.height);
            let seat = SeatInfo::for_remote(&descriptor.model);
            remote.outputs.push(output.clone());
            remote.seats.push(seat.clone());

            self.event_loop.arm_timer(TimerToken::establish(*id), IMMEDIATE);
            self.emit(TransmitterEvent::EstablishRequested { remote: *id });
            self.emit(TransmitterEvent::OutputCreated { remote: *id, output });
            self.emit(TransmitterEvent::SeatCreated { remote: *id, seat });
        }
        pending.len()
    }

    /// Removes a remote.  Its proxies become zombies (their handles stay
    /// valid until destroyed); timers and the watch are released.  Observers
    /// get no status notification, only the release of the remote's seat
    /// and output.
    pub fn destroy_remote(&mut self, id: RemoteId) -> Result<(), TransmitterError> {
        let remote = self
            .remotes
            .get(&id)
            .ok_or(TransmitterError::UnknownRemote(id))?;
        let surfaces = remote.surfaces.clone();
        if !surfaces.is_empty() {
            warn!(remote = %id, count = surfaces.len(), "destroying remote with live surfaces");
        }
        for handle in surfaces {
            self.zombify(handle);
        }
        self.release_remote(id);
        if let Some(remote) = self.remotes.remove(&id) {
            for seat in remote.seats {
                self.emit(TransmitterEvent::SeatDestroyed { remote: id, seat });
            }
            for output in remote.outputs {
                self.emit(TransmitterEvent::OutputDestroyed { remote: id, output });
            }
        }
        debug!(remote = %id, "remote destroyed");
        Ok(())
    }

    fn release_remote(&mut self, id: RemoteId) {
        self.event_loop.disarm_timer(TimerToken::establish(id));
        self.event_loop.disarm_timer(TimerToken::retry(id));
        self.drop_connection(id);
    }

    /// Tears everything down: every proxy becomes a zombie (with a final
    /// best-effort flush of the destroy requests), then every remote is
    /// released.  Proxy handles remain valid for
    /// [`destroy_surface`](Self::destroy_surface).  Idempotent; also run on
    /// drop.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let handles: Vec<SurfaceHandle> = self
            .remotes
            .values()
            .flat_map(|remote| remote.surfaces.iter().copied())
            .collect();
        for handle in handles {
            self.zombify(handle);
        }
        for remote in self.remotes.values_mut() {
            if let Some(connection) = remote.connection.as_mut().filter(|c| c.is_running()) {
                if let Err(e) = connection.wire.flush() {
                    debug!(remote = %remote.id, error = %e, "final flush failed");
                }
            }
        }

        let ids = self.remote_ids();
        for id in ids {
            self.release_remote(id);
        }
        self.remotes.clear();
        self.observers.clear();
        info!("transmitter shut down");
    }
}

impl<L: EventLoop, T: Transport> Drop for Transmitter<L, T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
