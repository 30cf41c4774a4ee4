//! Per-connection protocol state of the receiver.
//!
//! A [`Session`] owns the object table of one client connection and turns
//! each decoded request into the events the server answers with.  It does
//! no I/O, so the network layer can drive it from a socket task and tests
//! can drive it directly.
//!
//! # Object lifecycle (for beginners)
//!
//! ```text
//! @1 display ── GetRegistry ──► registry ── Bind ──► compositor ── CreateSurface ──► surface
//!                                                ├─► blob factory ── CreateBuffer ──► buffer
//!                                                ├─► seat ── GetPointer/GetKeyboard/GetTouch
//!                                                └─► ivi application ── CreateIviSurface ──► ivi surface
//! ```
//!
//! Any object other than the display may be destroyed; the server confirms
//! with `DeleteId` so the client may reuse the id.  A request to an unknown
//! object, or one the object does not understand, is answered with a fatal
//! `Error` on the display and ends the session.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};
use transmitter_core::protocol::messages::{seat_capabilities, ErrorMessage, DISPLAY_OBJECT};
use transmitter_core::protocol::SerialCounter;
use transmitter_core::{CapabilityKind, ObjectId, WireMessage};

/// Error code: the request addressed an object that does not exist.
pub const INVALID_OBJECT: u32 = 0;
/// Error code: the object does not accept this request.
pub const INVALID_METHOD: u32 = 1;

/// Order in which capabilities are advertised; global names start at 1.
pub const ADVERTISED: [CapabilityKind; 4] = CapabilityKind::ALL;

/// Behaviour knobs shared by every session of one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Bitmask announced to every bound seat.
    pub seat_capabilities: u32,
    /// Size requested from each new ivi surface, if any.
    pub ivi_configure: Option<(i32, i32)>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            seat_capabilities: seat_capabilities::POINTER | seat_capabilities::KEYBOARD,
            ivi_configure: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Object {
    Display,
    Registry,
    Global(CapabilityKind),
    Surface,
    Buffer,
    IviSurface,
    InputDevice,
}

#[derive(Debug, Default)]
struct PendingState {
    buffer: Option<ObjectId>,
    damaged: bool,
}

/// Counters reported when a session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub surfaces: usize,
    pub buffers: usize,
    pub commits: usize,
}

pub struct Session {
    config: SessionConfig,
    serials: Arc<SerialCounter>,
    objects: HashMap<ObjectId, Object>,
    pending: HashMap<ObjectId, PendingState>,
    stats: SessionStats,
    terminated: bool,
}

impl Session {
    pub fn new(config: SessionConfig, serials: Arc<SerialCounter>) -> Self {
        let mut objects = HashMap::new();
        objects.insert(DISPLAY_OBJECT, Object::Display);
        Self {
            config,
            serials,
            objects,
            pending: HashMap::new(),
            stats: SessionStats::default(),
            terminated: false,
        }
    }

    /// `true` once a fatal error was sent; the connection should be closed
    /// after the pending events are written.
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Number of live objects, the display included.
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Handles one request and returns the events to send, in order.
    pub fn handle(&mut self, object: ObjectId, message: WireMessage) -> Vec<(ObjectId, WireMessage)> {
        if self.terminated {
            return Vec::new();
        }
        let Some(&target) = self.objects.get(&object) else {
            return self.fail(object, INVALID_OBJECT, format!("unknown object {object}"));
        };

        let mut out = Vec::new();
        match (target, message) {
            (Object::Display, WireMessage::GetRegistry { registry }) => {
                self.create(registry, Object::Registry);
                for (index, kind) in ADVERTISED.iter().enumerate() {
                    out.push((
                        registry,
                        WireMessage::Global {
                            name: index as u32 + 1,
                            interface: kind.interface().to_string(),
                            version: 1,
                        },
                    ));
                }
            }
            (Object::Display, WireMessage::Sync { callback }) => {
                let serial = self.serials.next();
                out.push((callback, WireMessage::Done { serial }));
                out.push((DISPLAY_OBJECT, WireMessage::DeleteId { id: callback }));
            }
            (Object::Registry, WireMessage::Bind { name, interface, id, .. }) => {
                let advertised = (name as usize)
                    .checked_sub(1)
                    .and_then(|index| ADVERTISED.get(index))
                    .copied()
                    .filter(|kind| kind.interface() == interface);
                let Some(kind) = advertised else {
                    return self.fail(
                        object,
                        INVALID_OBJECT,
                        format!("no global {name} with interface {interface}"),
                    );
                };
                self.create(id, Object::Global(kind));
                info!(%id, %kind, "capability bound");
                if kind == CapabilityKind::Seat {
                    out.push((
                        id,
                        WireMessage::SeatCapabilities {
                            capabilities: self.config.seat_capabilities,
                        },
                    ));
                }
            }
            (Object::Global(CapabilityKind::Compositor), WireMessage::CreateSurface { id }) => {
                self.create(id, Object::Surface);
                self.pending.insert(id, PendingState::default());
                self.stats.surfaces += 1;
                info!(surface = %id, "surface created");
            }
            (Object::Global(CapabilityKind::BlobFactory), WireMessage::CreateBuffer(buffer)) => {
                debug!(
                    buffer = %buffer.id,
                    width = buffer.width,
                    height = buffer.height,
                    bytes = buffer.data.len(),
                    "buffer received"
                );
                self.create(buffer.id, Object::Buffer);
                self.stats.buffers += 1;
            }
            (
                Object::Global(CapabilityKind::IviApplication),
                WireMessage::CreateIviSurface { ivi_id, surface, id },
            ) => {
                if self.objects.get(&surface) != Some(&Object::Surface) {
                    return self.fail(surface, INVALID_OBJECT, format!("{surface} is not a surface"));
                }
                self.create(id, Object::IviSurface);
                info!(%surface, ivi_id, "surface placed");
                if let Some((width, height)) = self.config.ivi_configure {
                    out.push((id, WireMessage::IviConfigure { width, height }));
                }
            }
            (
                Object::Global(CapabilityKind::Seat),
                WireMessage::GetPointer { id } | WireMessage::GetKeyboard { id } | WireMessage::GetTouch { id },
            ) => {
                self.create(id, Object::InputDevice);
            }
            (Object::Surface, WireMessage::Attach { buffer, x, y }) => {
                if self.objects.get(&buffer) != Some(&Object::Buffer) {
                    return self.fail(buffer, INVALID_OBJECT, format!("{buffer} is not a buffer"));
                }
                debug!(surface = %object, %buffer, x, y, "attach");
                self.pending.entry(object).or_default().buffer = Some(buffer);
            }
            (Object::Surface, WireMessage::Damage { .. }) => {
                self.pending.entry(object).or_default().damaged = true;
            }
            (Object::Surface, WireMessage::Commit) => {
                let state = std::mem::take(self.pending.entry(object).or_default());
                self.stats.commits += 1;
                debug!(surface = %object, damaged = state.damaged, "commit");
                if let Some(buffer) = state.buffer.filter(|b| self.objects.contains_key(b)) {
                    let serial = self.serials.next();
                    out.push((buffer, WireMessage::BufferComplete { serial }));
                }
            }
            (Object::Display, WireMessage::Destroy) => {
                return self.fail(object, INVALID_METHOD, "the display cannot be destroyed".to_string());
            }
            (_, WireMessage::Destroy) => {
                self.objects.remove(&object);
                self.pending.remove(&object);
                out.push((DISPLAY_OBJECT, WireMessage::DeleteId { id: object }));
            }
            (target, message) => {
                return self.fail(
                    object,
                    INVALID_METHOD,
                    format!("{target:?} does not accept {:?}", message.message_type()),
                );
            }
        }
        out
    }

    fn create(&mut self, id: ObjectId, object: Object) {
        if self.objects.insert(id, object).is_some() {
            warn!(%id, "object id reused while still alive");
        }
    }

    fn fail(&mut self, object: ObjectId, code: u32, message: String) -> Vec<(ObjectId, WireMessage)> {
        warn!(%object, code, %message, "protocol error; closing session");
        self.terminated = true;
        vec![(
            DISPLAY_OBJECT,
            WireMessage::Error(ErrorMessage { object, code, message }),
        )]
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use transmitter_core::protocol::messages::CreateBufferMessage;

    fn session(config: SessionConfig) -> Session {
        Session::new(config, Arc::new(SerialCounter::new()))
    }

    /// Runs the usual client handshake: registry at @2, bind every global
    /// at @3..=@6.
    fn bound_session(config: SessionConfig) -> Session {
        let mut s = session(config);
        s.handle(DISPLAY_OBJECT, WireMessage::GetRegistry { registry: ObjectId(2) });
        for (index, kind) in ADVERTISED.iter().enumerate() {
            s.handle(
                ObjectId(2),
                WireMessage::Bind {
                    name: index as u32 + 1,
                    interface: kind.interface().to_string(),
                    version: 1,
                    id: ObjectId(index as u32 + 3),
                },
            );
        }
        assert!(!s.is_terminated());
        s
    }

    const COMPOSITOR: ObjectId = ObjectId(3);
    const BLOB_FACTORY: ObjectId = ObjectId(4);
    const SEAT: ObjectId = ObjectId(5);
    const IVI_APPLICATION: ObjectId = ObjectId(6);

    fn buffer(id: u32) -> WireMessage {
        WireMessage::CreateBuffer(CreateBufferMessage {
            id: ObjectId(id),
            width: 1,
            height: 1,
            stride: 4,
            format: 0,
            data: vec![0; 4],
        })
    }

    #[test]
    fn test_get_registry_advertises_all_four_capabilities() {
        // Arrange
        let mut s = session(SessionConfig::default());

        // Act
        let out = s.handle(DISPLAY_OBJECT, WireMessage::GetRegistry { registry: ObjectId(2) });

        // Assert
        let interfaces: Vec<(u32, String)> = out
            .into_iter()
            .map(|(object, message)| {
                assert_eq!(object, ObjectId(2));
                match message {
                    WireMessage::Global { name, interface, .. } => (name, interface),
                    other => panic!("unexpected {other:?}"),
                }
            })
            .collect();
        assert_eq!(
            interfaces,
            vec![
                (1, "wthp_compositor".to_string()),
                (2, "wthp_blob_factory".to_string()),
                (3, "wthp_seat".to_string()),
                (4, "wthp_ivi_application".to_string()),
            ]
        );
    }

    #[test]
    fn test_sync_answers_done_then_releases_callback() {
        let mut s = session(SessionConfig::default());

        let out = s.handle(DISPLAY_OBJECT, WireMessage::Sync { callback: ObjectId(9) });

        assert_eq!(
            out,
            vec![
                (ObjectId(9), WireMessage::Done { serial: 1 }),
                (DISPLAY_OBJECT, WireMessage::DeleteId { id: ObjectId(9) }),
            ]
        );
    }

    #[test]
    fn test_binding_seat_announces_configured_capabilities() {
        // Arrange
        let mut s = session(SessionConfig {
            seat_capabilities: seat_capabilities::TOUCH,
            ivi_configure: None,
        });
        s.handle(DISPLAY_OBJECT, WireMessage::GetRegistry { registry: ObjectId(2) });

        // Act
        let out = s.handle(
            ObjectId(2),
            WireMessage::Bind {
                name: 3,
                interface: "wthp_seat".to_string(),
                version: 1,
                id: ObjectId(3),
            },
        );

        // Assert
        assert_eq!(
            out,
            vec![(ObjectId(3), WireMessage::SeatCapabilities { capabilities: seat_capabilities::TOUCH })]
        );
    }

    #[test]
    fn test_bind_with_mismatched_interface_is_fatal() {
        let mut s = session(SessionConfig::default());
        s.handle(DISPLAY_OBJECT, WireMessage::GetRegistry { registry: ObjectId(2) });

        let out = s.handle(
            ObjectId(2),
            WireMessage::Bind {
                name: 1,
                interface: "wthp_seat".to_string(),
                version: 1,
                id: ObjectId(3),
            },
        );

        assert!(s.is_terminated());
        assert!(matches!(
            &out[..],
            [(DISPLAY_OBJECT, WireMessage::Error(ErrorMessage { code: INVALID_OBJECT, .. }))]
        ));
    }

    #[test]
    fn test_commit_completes_attached_buffer() {
        // Arrange
        let mut s = bound_session(SessionConfig::default());
        s.handle(COMPOSITOR, WireMessage::CreateSurface { id: ObjectId(7) });
        s.handle(BLOB_FACTORY, buffer(8));
        s.handle(ObjectId(7), WireMessage::Attach { buffer: ObjectId(8), x: 0, y: 0 });
        s.handle(ObjectId(7), WireMessage::Damage { x: 0, y: 0, width: 1, height: 1 });

        // Act
        let out = s.handle(ObjectId(7), WireMessage::Commit);

        // Assert
        assert!(matches!(&out[..], [(ObjectId(8), WireMessage::BufferComplete { .. })]));
        assert_eq!(s.stats(), SessionStats { surfaces: 1, buffers: 1, commits: 1 });
    }

    #[test]
    fn test_commit_without_attach_completes_nothing() {
        let mut s = bound_session(SessionConfig::default());
        s.handle(COMPOSITOR, WireMessage::CreateSurface { id: ObjectId(7) });

        let out = s.handle(ObjectId(7), WireMessage::Commit);

        assert!(out.is_empty());
        assert_eq!(s.stats().commits, 1);
    }

    #[test]
    fn test_ivi_surface_receives_configured_size() {
        // Arrange
        let mut s = bound_session(SessionConfig {
            ivi_configure: Some((1920, 720)),
            ..SessionConfig::default()
        });
        s.handle(COMPOSITOR, WireMessage::CreateSurface { id: ObjectId(7) });

        // Act
        let out = s.handle(
            IVI_APPLICATION,
            WireMessage::CreateIviSurface { ivi_id: 42, surface: ObjectId(7), id: ObjectId(8) },
        );

        // Assert
        assert_eq!(out, vec![(ObjectId(8), WireMessage::IviConfigure { width: 1920, height: 720 })]);
    }

    #[test]
    fn test_destroy_releases_id_and_object() {
        // Arrange
        let mut s = bound_session(SessionConfig::default());
        s.handle(COMPOSITOR, WireMessage::CreateSurface { id: ObjectId(7) });
        let before = s.object_count();

        // Act
        let out = s.handle(ObjectId(7), WireMessage::Destroy);

        // Assert
        assert_eq!(out, vec![(DISPLAY_OBJECT, WireMessage::DeleteId { id: ObjectId(7) })]);
        assert_eq!(s.object_count(), before - 1);
    }

    #[test]
    fn test_request_to_unknown_object_ends_session() {
        // Arrange
        let mut s = bound_session(SessionConfig::default());

        // Act
        let out = s.handle(ObjectId(77), WireMessage::Commit);
        let after = s.handle(SEAT, WireMessage::GetPointer { id: ObjectId(8) });

        // Assert
        assert!(matches!(
            &out[..],
            [(DISPLAY_OBJECT, WireMessage::Error(ErrorMessage { object: ObjectId(77), .. }))]
        ));
        assert!(s.is_terminated());
        assert!(after.is_empty());
    }

    #[test]
    fn test_wrong_request_for_object_is_invalid_method() {
        let mut s = bound_session(SessionConfig::default());

        let out = s.handle(SEAT, WireMessage::Commit);

        assert!(matches!(
            &out[..],
            [(DISPLAY_OBJECT, WireMessage::Error(ErrorMessage { code: INVALID_METHOD, .. }))]
        ));
    }

    #[test]
    fn test_serials_are_shared_between_sessions() {
        let serials = Arc::new(SerialCounter::new());
        let mut a = Session::new(SessionConfig::default(), Arc::clone(&serials));
        let mut b = Session::new(SessionConfig::default(), Arc::clone(&serials));

        a.handle(DISPLAY_OBJECT, WireMessage::Sync { callback: ObjectId(2) });
        let out = b.handle(DISPLAY_OBJECT, WireMessage::Sync { callback: ObjectId(2) });

        assert_eq!(out[0], (ObjectId(2), WireMessage::Done { serial: 2 }));
    }
}
