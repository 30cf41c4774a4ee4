//! Surface proxies: the transmitter's view of one host surface on one remote.
//!
//! A proxy is created by [`Transmitter::push_to_remote`] and lives in an
//! arena owned by the transmitter, addressed by a stable [`SurfaceHandle`].
//! When the host surface goes away the proxy becomes a *zombie*: it keeps
//! its handle (the host may still hold it) but is detached from its remote,
//! has no observers, and ignores every further request except
//! [`Transmitter::destroy_surface`].
//!
//! Remote-side objects (surface, shell surface) exist only while the remote
//! is `Ready`.  A disconnect clears them and drops the stream status to
//! `Error`; pushing the same host surface again after reconnection reuses the
//! proxy and recreates them.

use std::sync::mpsc::Sender;

use tracing::{debug, info, warn};
use transmitter_core::{CapabilityKind, ConnectionStatus, ObjectId, StreamStatus, WireMessage};

use crate::application::connection::Connection;
use crate::application::event_loop::EventLoop;
use crate::application::host::{
    HostOutputId, HostSurface, HostSurfaceId, ResizeHandler, SurfaceEvent,
};
use crate::application::remote::RemoteId;
use crate::application::transmitter::{Transmitter, TransmitterError};
use crate::application::transport::{Transport, TransportError, WireConnection};

/// Stable identity of a surface proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceHandle(pub u64);

impl std::fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "surface#{}", self.0)
    }
}

pub struct SurfaceProxy {
    pub(crate) remote: Option<RemoteId>,
    /// `None` once the proxy is a zombie.
    pub(crate) host: Option<HostSurface>,
    pub(crate) sync_output: Option<HostOutputId>,
    pub(crate) attach_dx: i32,
    pub(crate) attach_dy: i32,
    pub(crate) status: StreamStatus,
    pub(crate) remote_surface: Option<ObjectId>,
    pub(crate) remote_shell_surface: Option<ObjectId>,
    pub(crate) observers: Vec<Sender<SurfaceEvent>>,
    pub(crate) resize: Option<ResizeHandler>,
    pub(crate) frame_callbacks: Vec<u32>,
    /// Presentation-feedback ids waiting for the next successful gather.
    pub(crate) feedback: Vec<u32>,
}

impl SurfaceProxy {
    fn new(host: HostSurface, remote: RemoteId) -> Self {
        Self {
            remote: Some(remote),
            host: Some(host),
            sync_output: None,
            attach_dx: 0,
            attach_dy: 0,
            status: StreamStatus::Initializing,
            remote_surface: None,
            remote_shell_surface: None,
            observers: Vec::new(),
            resize: None,
            frame_callbacks: Vec::new(),
            feedback: Vec::new(),
        }
    }

    pub fn is_zombie(&self) -> bool {
        self.host.is_none()
    }

    fn notify(&mut self, event: SurfaceEvent) {
        self.observers.retain(|observer| observer.send(event).is_ok());
    }

    pub(crate) fn set_stream_status(&mut self, status: StreamStatus) {
        if self.status != status {
            self.status = status;
            self.notify(SurfaceEvent::StreamStatus(status));
        }
    }
}

impl<L: EventLoop, T: Transport> Transmitter<L, T> {
    /// Starts (or resumes) transmitting `surface` to `remote`.
    ///
    /// Returns the existing proxy when the host surface is already bound to
    /// that remote, otherwise creates one.  `observer` is subscribed only
    /// when a proxy is created.  Missing remote-side objects are (re)created.
    ///
    /// # Errors
    ///
    /// Fails without side effects when the remote is unknown or not `Ready`.
    pub fn push_to_remote(
        &mut self,
        surface: HostSurface,
        remote: RemoteId,
        observer: Option<Sender<SurfaceEvent>>,
    ) -> Result<SurfaceHandle, TransmitterError> {
        let target = self
            .remotes
            .get(&remote)
            .ok_or(TransmitterError::UnknownRemote(remote))?;
        if target.status != ConnectionStatus::Ready {
            return Err(TransmitterError::NotReady { remote, status: target.status });
        }

        let existing = target.surfaces.iter().copied().find(|handle| {
            self.surfaces
                .get(handle)
                .and_then(|proxy| proxy.host)
                .is_some_and(|host| host.id == surface.id)
        });
        let handle = match existing {
            Some(handle) => handle,
            None => {
                let handle = SurfaceHandle(self.next_surface);
                self.next_surface += 1;
                let mut proxy = SurfaceProxy::new(surface, remote);
                proxy.observers.extend(observer);
                proxy.notify(SurfaceEvent::StreamStatus(StreamStatus::Initializing));
                self.surfaces.insert(handle, proxy);
                if let Some(target) = self.remotes.get_mut(&remote) {
                    target.surfaces.push(handle);
                }
                debug!(%remote, %handle, host = surface.id.0, "surface proxy created");
                handle
            }
        };

        self.ensure_remote_surface(handle, remote);
        Ok(handle)
    }

    /// Creates the remote-side surface (and shell surface) of a proxy that
    /// has none, then marks the stream `Ready`.  A failed request
    /// disconnects the remote.
    fn ensure_remote_surface(&mut self, handle: SurfaceHandle, remote: RemoteId) {
        let Some(proxy) = self.surfaces.get_mut(&handle) else {
            return;
        };
        if proxy.remote_surface.is_some() {
            return;
        }
        let Some(connection) = self
            .remotes
            .get_mut(&remote)
            .and_then(|remote| remote.connection.as_mut())
        else {
            return;
        };
        let Some(compositor) = connection.globals.get(CapabilityKind::Compositor) else {
            return;
        };

        let created = request_remote_surface(connection, proxy, compositor, handle, remote);
        if let Err(e) = created {
            warn!(%remote, %handle, error = %e, "remote surface creation failed; disconnecting");
            self.disconnect(remote);
            return;
        }
        proxy.set_stream_status(StreamStatus::Ready);
        self.flush_connection(remote);
    }

    /// Accumulates an attach offset applied by the next gather.
    pub fn configure(&mut self, handle: SurfaceHandle, dx: i32, dy: i32) {
        let Some(proxy) = self.surfaces.get_mut(&handle) else {
            warn!(%handle, "configure on unknown surface");
            return;
        };
        debug_assert!(!proxy.is_zombie(), "configure on zombie {handle}");
        if proxy.is_zombie() {
            warn!(%handle, "configure on zombie surface ignored");
            return;
        }
        proxy.attach_dx += dx;
        proxy.attach_dy += dy;
    }

    /// Pushes the current frame of a surface to its remote: upload, attach
    /// at the accumulated offset, damage, commit, flush.
    ///
    /// Does nothing for zombies, streams that are not `Ready`, and proxies
    /// without remote-side objects.  A connection found marked for teardown
    /// is disconnected here.
    pub fn gather_surface_state(&mut self, handle: SurfaceHandle) {
        let Some(proxy) = self.surfaces.get_mut(&handle) else {
            return;
        };
        let (Some(host), Some(remote), Some(remote_surface)) =
            (proxy.host, proxy.remote, proxy.remote_surface)
        else {
            return;
        };
        if proxy.status != StreamStatus::Ready {
            return;
        }
        let Some(target) = self.remotes.get_mut(&remote) else {
            return;
        };
        if target.status != ConnectionStatus::Ready {
            return;
        }
        if !target.is_running() {
            warn!(%remote, %handle, "connection lost; disconnecting");
            self.disconnect(remote);
            return;
        }
        let Some(connection) = target.connection.as_mut() else {
            return;
        };

        let Some(payload) = self.frames.capture(host.id) else {
            debug!(%handle, "no frame to transmit");
            return;
        };
        let (width, height) = (payload.width, payload.height);
        let (dx, dy) = (proxy.attach_dx, proxy.attach_dy);

        let queued = connection.upload(payload).and_then(|buffer| {
            let Some(buffer) = buffer else {
                return Ok(());
            };
            connection
                .wire
                .send(remote_surface, WireMessage::Attach { buffer, x: dx, y: dy })?;
            connection.wire.send(
                remote_surface,
                WireMessage::Damage { x: dx, y: dy, width, height },
            )?;
            connection.wire.send(remote_surface, WireMessage::Commit)
        });
        if let Err(e) = queued {
            warn!(%remote, %handle, error = %e, "frame submission failed; disconnecting");
            self.disconnect(remote);
            return;
        }
        if !self.flush_connection(remote) {
            return;
        }

        if let Some(proxy) = self.surfaces.get_mut(&handle) {
            proxy.attach_dx = 0;
            proxy.attach_dy = 0;
            for callback in std::mem::take(&mut proxy.frame_callbacks) {
                proxy.notify(SurfaceEvent::FrameDone(callback));
            }
            for feedback in std::mem::take(&mut proxy.feedback) {
                proxy.notify(SurfaceEvent::Presented(feedback));
            }
        }
    }

    /// Turns a proxy into a zombie.  Idempotent.
    ///
    /// Destroy requests for the remote-side objects are queued but not
    /// flushed; returns the remote they were queued on.
    pub(crate) fn zombify(&mut self, handle: SurfaceHandle) -> Option<RemoteId> {
        let proxy = self.surfaces.get_mut(&handle)?;
        proxy.host.take()?;
        for feedback in std::mem::take(&mut proxy.feedback) {
            proxy.notify(SurfaceEvent::FeedbackDiscarded(feedback));
        }
        proxy.notify(SurfaceEvent::Destroyed);
        proxy.observers.clear();
        proxy.sync_output = None;
        proxy.resize = None;
        proxy.frame_callbacks.clear();

        let shell = proxy.remote_shell_surface.take();
        let surface = proxy.remote_surface.take();
        let remote = proxy.remote.take()?;
        let target = self.remotes.get_mut(&remote)?;
        target.surfaces.retain(|other| *other != handle);
        if let Some(connection) = target.connection.as_mut().filter(|c| c.is_running()) {
            for object in shell.into_iter().chain(surface) {
                if let Err(e) = connection.wire.send(object, WireMessage::Destroy) {
                    warn!(%remote, %handle, error = %e, "remote surface teardown failed");
                    connection.running = false;
                    break;
                }
            }
        }
        debug!(%remote, %handle, "surface proxy is now a zombie");
        Some(remote)
    }

    /// The host surface behind `host_id` was destroyed; every proxy of it
    /// becomes a zombie.
    pub fn host_surface_destroyed(&mut self, host_id: HostSurfaceId) {
        let handles: Vec<SurfaceHandle> = self
            .surfaces
            .iter()
            .filter(|(_, proxy)| proxy.host.is_some_and(|host| host.id == host_id))
            .map(|(handle, _)| *handle)
            .collect();
        for handle in handles {
            if let Some(remote) = self.zombify(handle) {
                self.flush_connection(remote);
            }
        }
    }

    /// Releases a proxy for good.  Safe on zombies and after shutdown.
    pub fn destroy_surface(&mut self, handle: SurfaceHandle) {
        if let Some(remote) = self.zombify(handle) {
            self.flush_connection(remote);
        }
        if self.surfaces.remove(&handle).is_none() {
            debug!(%handle, "destroy of unknown surface");
        }
    }

    /// Subscribes to a proxy's notifications.  Subscribing to a zombie
    /// immediately reports [`SurfaceEvent::Destroyed`].
    pub fn subscribe_surface(
        &mut self,
        handle: SurfaceHandle,
        observer: Sender<SurfaceEvent>,
    ) -> Result<(), TransmitterError> {
        let proxy = self
            .surfaces
            .get_mut(&handle)
            .ok_or(TransmitterError::UnknownSurface(handle))?;
        if proxy.is_zombie() {
            let _ = observer.send(SurfaceEvent::Destroyed);
        } else {
            proxy.observers.push(observer);
        }
        Ok(())
    }

    /// Installs the callback that receives resize requests from the remote
    /// shell, replacing any previous one.
    pub fn set_resize_handler(
        &mut self,
        handle: SurfaceHandle,
        handler: impl FnMut(i32, i32) + 'static,
    ) -> Result<(), TransmitterError> {
        let proxy = self
            .surfaces
            .get_mut(&handle)
            .filter(|proxy| !proxy.is_zombie())
            .ok_or(TransmitterError::UnknownSurface(handle))?;
        proxy.resize = Some(Box::new(handler));
        Ok(())
    }

    pub(crate) fn deliver_resize(&mut self, handle: SurfaceHandle, width: i32, height: i32) {
        let Some(proxy) = self.surfaces.get_mut(&handle) else {
            return;
        };
        if proxy.is_zombie() {
            return;
        }
        if let Some(resize) = proxy.resize.as_mut() {
            debug!(%handle, width, height, "remote requested resize");
            resize(width, height);
        }
    }

    /// Associates the proxy with the host output whose repaint drives it.
    pub fn set_sync_output(&mut self, handle: SurfaceHandle, output: Option<HostOutputId>) {
        if let Some(proxy) = self.surfaces.get_mut(&handle).filter(|p| !p.is_zombie()) {
            proxy.sync_output = output;
        }
    }

    pub fn sync_output(&self, handle: SurfaceHandle) -> Option<HostOutputId> {
        self.surfaces.get(&handle).and_then(|proxy| proxy.sync_output)
    }

    /// A host output went away; proxies synchronised to it lose the link.
    pub fn host_output_destroyed(&mut self, output: HostOutputId) {
        for proxy in self.surfaces.values_mut() {
            if proxy.sync_output == Some(output) {
                proxy.sync_output = None;
            }
        }
    }

    /// Queues a frame callback, reported as [`SurfaceEvent::FrameDone`]
    /// after the next successful gather.
    pub fn queue_frame_callback(&mut self, handle: SurfaceHandle, callback: u32) {
        if let Some(proxy) = self.surfaces.get_mut(&handle).filter(|p| !p.is_zombie()) {
            proxy.frame_callbacks.push(callback);
        }
    }

    /// Queues a presentation-feedback request.  It is reported as
    /// [`SurfaceEvent::Presented`] after the next successful gather, or as
    /// [`SurfaceEvent::FeedbackDiscarded`] if the proxy becomes a zombie first.
    pub fn queue_presentation_feedback(&mut self, handle: SurfaceHandle, feedback: u32) {
        if let Some(proxy) = self.surfaces.get_mut(&handle).filter(|p| !p.is_zombie()) {
            proxy.feedback.push(feedback);
        }
    }

    pub fn stream_status(&self, handle: SurfaceHandle) -> Option<StreamStatus> {
        self.surfaces.get(&handle).map(|proxy| proxy.status)
    }

    /// Host surface behind a proxy; `None` for zombies and unknown handles.
    pub fn host_surface(&self, handle: SurfaceHandle) -> Option<HostSurfaceId> {
        self.surfaces
            .get(&handle)
            .and_then(|proxy| proxy.host)
            .map(|host| host.id)
    }

    /// Remote a proxy is bound to; `None` for zombies.
    pub fn surface_remote(&self, handle: SurfaceHandle) -> Option<RemoteId> {
        self.surfaces.get(&handle).and_then(|proxy| proxy.remote)
    }

    /// Remote-side surface object; present only while the stream is up.
    pub fn remote_surface(&self, handle: SurfaceHandle) -> Option<ObjectId> {
        self.surfaces.get(&handle).and_then(|proxy| proxy.remote_surface)
    }

    pub fn remote_shell_surface(&self, handle: SurfaceHandle) -> Option<ObjectId> {
        self.surfaces
            .get(&handle)
            .and_then(|proxy| proxy.remote_shell_surface)
    }
}

/// Queues the remote surface and, when the host surface has an ivi id, its
/// shell surface.  Ids are recorded on the proxy as soon as each request is
/// queued.
fn request_remote_surface<W: WireConnection>(
    connection: &mut Connection<W>,
    proxy: &mut SurfaceProxy,
    compositor: ObjectId,
    handle: SurfaceHandle,
    remote: RemoteId,
) -> Result<(), TransportError> {
    let surface_id = connection.wire.new_id();
    connection
        .wire
        .send(compositor, WireMessage::CreateSurface { id: surface_id })?;
    proxy.remote_surface = Some(surface_id);

    let ivi_id = proxy.host.and_then(|host| host.ivi_id);
    match (ivi_id, connection.globals.get(CapabilityKind::IviApplication)) {
        (Some(ivi_id), Some(ivi_application)) => {
            let shell_id = connection.wire.new_id();
            let request = WireMessage::CreateIviSurface {
                ivi_id,
                surface: surface_id,
                id: shell_id,
            };
            connection.wire.send(ivi_application, request)?;
            proxy.remote_shell_surface = Some(shell_id);
            info!(%remote, %handle, ivi_id, "surface placed on remote shell");
        }
        (None, _) => {
            info!(%remote, %handle, "surface has no ivi id; transmitting without placement");
        }
        (Some(_), None) => {}
    }
    Ok(())
}
