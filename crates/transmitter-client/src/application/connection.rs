//! Per-attempt connection record.
//!
//! A [`Connection`] is created for every establish attempt and dropped when
//! the attempt fails or the connection is torn down; it is never reused.
//! Dropping it closes the wire, so the owner must remove the loop watch on
//! its descriptor first.

use std::collections::BTreeSet;
use std::os::fd::RawFd;

use transmitter_core::protocol::messages::{seat_capabilities, DISPLAY_OBJECT};
use transmitter_core::protocol::CreateBufferMessage;
use transmitter_core::{CapabilityKind, ObjectId, SeatCapabilities, WireMessage};

use crate::application::event_loop::Readiness;
use crate::application::host::FramePayload;
use crate::application::registry::BoundGlobals;
use crate::application::transport::{TransportError, WireConnection};

/// The loop registration of a connection's descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watch {
    pub fd: RawFd,
    pub interest: Readiness,
}

/// Input device objects obtained from the remote seat.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct InputDevices {
    pub pointer: Option<ObjectId>,
    pub keyboard: Option<ObjectId>,
    pub touch: Option<ObjectId>,
}

pub struct Connection<W> {
    pub(crate) wire: W,
    pub(crate) registry: ObjectId,
    pub(crate) globals: BoundGlobals,
    pub(crate) input: InputDevices,
    /// Buffers uploaded but not yet released by the server.
    pub(crate) pending_buffers: BTreeSet<ObjectId>,
    /// Cleared when the connection must be torn down at the next
    /// opportunity (server error, loss of a bound capability).
    pub(crate) running: bool,
    pub(crate) watch: Option<Watch>,
}

impl<W: WireConnection> Connection<W> {
    /// Wraps a freshly opened wire and queues the registry request.
    pub fn open(mut wire: W) -> Result<Self, TransportError> {
        let registry = wire.new_id();
        wire.send(DISPLAY_OBJECT, WireMessage::GetRegistry { registry })?;
        Ok(Self {
            wire,
            registry,
            globals: BoundGlobals::default(),
            input: InputDevices::default(),
            pending_buffers: BTreeSet::new(),
            running: true,
            watch: None,
        })
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Brings the input device objects in line with the seat's advertised
    /// capability mask.
    pub fn apply_seat_capabilities(
        &mut self,
        mask: u32,
    ) -> Result<SeatCapabilities, TransportError> {
        let Some(seat) = self.globals.get(CapabilityKind::Seat) else {
            return Ok(SeatCapabilities::default());
        };
        let wire = &mut self.wire;
        sync_device(wire, seat, &mut self.input.pointer, mask & seat_capabilities::POINTER != 0, |id| {
            WireMessage::GetPointer { id }
        })?;
        sync_device(wire, seat, &mut self.input.keyboard, mask & seat_capabilities::KEYBOARD != 0, |id| {
            WireMessage::GetKeyboard { id }
        })?;
        sync_device(wire, seat, &mut self.input.touch, mask & seat_capabilities::TOUCH != 0, |id| {
            WireMessage::GetTouch { id }
        })?;
        Ok(SeatCapabilities {
            pointer: self.input.pointer.is_some(),
            keyboard: self.input.keyboard.is_some(),
            touch: self.input.touch.is_some(),
        })
    }

    /// Uploads a frame payload through the blob factory and returns the new
    /// buffer, which stays pending until the server releases it.
    pub fn upload(&mut self, payload: FramePayload) -> Result<Option<ObjectId>, TransportError> {
        let Some(factory) = self.globals.get(CapabilityKind::BlobFactory) else {
            return Ok(None);
        };
        let id = self.wire.new_id();
        self.wire.send(
            factory,
            WireMessage::CreateBuffer(CreateBufferMessage {
                id,
                width: payload.width,
                height: payload.height,
                stride: payload.stride,
                format: payload.format,
                data: payload.data,
            }),
        )?;
        self.pending_buffers.insert(id);
        Ok(Some(id))
    }

    /// Destroys a buffer the server reported complete.  Returns `false` for
    /// buffers this connection is not tracking.
    pub fn release_buffer(&mut self, buffer: ObjectId) -> Result<bool, TransportError> {
        if !self.pending_buffers.remove(&buffer) {
            return Ok(false);
        }
        self.wire.send(buffer, WireMessage::Destroy)?;
        Ok(true)
    }
}

fn sync_device<W: WireConnection>(
    wire: &mut W,
    seat: ObjectId,
    slot: &mut Option<ObjectId>,
    wanted: bool,
    request: impl FnOnce(ObjectId) -> WireMessage,
) -> Result<(), TransportError> {
    match (wanted, *slot) {
        (true, None) => {
            let id = wire.new_id();
            wire.send(seat, request(id))?;
            *slot = Some(id);
        }
        (false, Some(id)) => {
            wire.send(id, WireMessage::Destroy)?;
            *slot = None;
        }
        _ => {}
    }
    Ok(())
}
