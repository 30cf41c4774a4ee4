//! All transmitter wire-protocol message types.
//!
//! The protocol is object-oriented: every message is addressed to an object
//! id.  Object id [`DISPLAY_OBJECT`] is the root object that exists for the
//! whole life of a connection; every other object is created by the client
//! through a request carrying a fresh id (`new id` in the tables below).
//!
//! Requests travel client → server and use type codes `0x01..=0x3F`.
//! Events travel server → client and use type codes `0x40..=0x7F`.

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the common message header in bytes.
pub const HEADER_SIZE: usize = 12;

/// The root object of every connection.
pub const DISPLAY_OBJECT: ObjectId = ObjectId(1);

/// First id the client may allocate for objects it creates.
pub const FIRST_CLIENT_OBJECT: u32 = 2;

// ── Object ids ────────────────────────────────────────────────────────────────

/// Identifies one protocol object on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u32);

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

// ── Seat capability bits ──────────────────────────────────────────────────────

/// Bitmask carried by [`WireMessage::SeatCapabilities`].
pub mod seat_capabilities {
    pub const POINTER: u32 = 1 << 0;
    pub const KEYBOARD: u32 = 1 << 1;
    pub const TOUCH: u32 = 1 << 2;
}

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes defined by the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    // Requests (0x01–0x3F)
    GetRegistry = 0x01,
    Sync = 0x02,
    Bind = 0x03,
    CreateSurface = 0x04,
    CreateBuffer = 0x05,
    Attach = 0x06,
    Damage = 0x07,
    Commit = 0x08,
    CreateIviSurface = 0x09,
    GetPointer = 0x0A,
    GetKeyboard = 0x0B,
    GetTouch = 0x0C,
    Destroy = 0x0D,
    // Events (0x40–0x7F)
    Error = 0x40,
    DeleteId = 0x41,
    Done = 0x42,
    Global = 0x43,
    GlobalRemove = 0x44,
    BufferComplete = 0x45,
    SeatCapabilities = 0x46,
    IviConfigure = 0x47,
}

impl MessageType {
    /// Returns `true` for server → client codes.
    pub fn is_event(self) -> bool {
        (self as u8) >= 0x40
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::GetRegistry),
            0x02 => Ok(MessageType::Sync),
            0x03 => Ok(MessageType::Bind),
            0x04 => Ok(MessageType::CreateSurface),
            0x05 => Ok(MessageType::CreateBuffer),
            0x06 => Ok(MessageType::Attach),
            0x07 => Ok(MessageType::Damage),
            0x08 => Ok(MessageType::Commit),
            0x09 => Ok(MessageType::CreateIviSurface),
            0x0A => Ok(MessageType::GetPointer),
            0x0B => Ok(MessageType::GetKeyboard),
            0x0C => Ok(MessageType::GetTouch),
            0x0D => Ok(MessageType::Destroy),
            0x40 => Ok(MessageType::Error),
            0x41 => Ok(MessageType::DeleteId),
            0x42 => Ok(MessageType::Done),
            0x43 => Ok(MessageType::Global),
            0x44 => Ok(MessageType::GlobalRemove),
            0x45 => Ok(MessageType::BufferComplete),
            0x46 => Ok(MessageType::SeatCapabilities),
            0x47 => Ok(MessageType::IviConfigure),
            _ => Err(()),
        }
    }
}

// ── Common message header ─────────────────────────────────────────────────────

/// 12-byte header prepended to every message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    /// Protocol version; always [`PROTOCOL_VERSION`].
    pub version: u8,
    /// Identifies the payload type.
    pub message_type: MessageType,
    /// Length of the payload in bytes (not including this header).
    pub payload_length: u32,
    /// Object the message is addressed to (requests) or sent from (events).
    pub object: ObjectId,
}

// ── Payload structs ───────────────────────────────────────────────────────────

/// CREATE_BUFFER (0x05): uploads one opaque frame payload to the blob factory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBufferMessage {
    /// New buffer object id.
    pub id: ObjectId,
    pub width: i32,
    pub height: i32,
    pub stride: i32,
    /// Pixel format code chosen by the payload producer; opaque to the core.
    pub format: u32,
    pub data: Vec<u8>,
}

/// ERROR (0x40): fatal protocol error reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    /// Object the error refers to.
    pub object: ObjectId,
    /// Interface-specific error code.
    pub code: u32,
    /// Human-readable description.
    pub message: String,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// A decoded protocol message (request or event).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireMessage {
    // Requests
    GetRegistry { registry: ObjectId },
    Sync { callback: ObjectId },
    Bind { name: u32, interface: String, version: u32, id: ObjectId },
    CreateSurface { id: ObjectId },
    CreateBuffer(CreateBufferMessage),
    Attach { buffer: ObjectId, x: i32, y: i32 },
    Damage { x: i32, y: i32, width: i32, height: i32 },
    Commit,
    CreateIviSurface { ivi_id: u32, surface: ObjectId, id: ObjectId },
    GetPointer { id: ObjectId },
    GetKeyboard { id: ObjectId },
    GetTouch { id: ObjectId },
    Destroy,
    // Events
    Error(ErrorMessage),
    DeleteId { id: ObjectId },
    Done { serial: u32 },
    Global { name: u32, interface: String, version: u32 },
    GlobalRemove { name: u32 },
    BufferComplete { serial: u32 },
    SeatCapabilities { capabilities: u32 },
    IviConfigure { width: i32, height: i32 },
}

impl WireMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            WireMessage::GetRegistry { .. } => MessageType::GetRegistry,
            WireMessage::Sync { .. } => MessageType::Sync,
            WireMessage::Bind { .. } => MessageType::Bind,
            WireMessage::CreateSurface { .. } => MessageType::CreateSurface,
            WireMessage::CreateBuffer(_) => MessageType::CreateBuffer,
            WireMessage::Attach { .. } => MessageType::Attach,
            WireMessage::Damage { .. } => MessageType::Damage,
            WireMessage::Commit => MessageType::Commit,
            WireMessage::CreateIviSurface { .. } => MessageType::CreateIviSurface,
            WireMessage::GetPointer { .. } => MessageType::GetPointer,
            WireMessage::GetKeyboard { .. } => MessageType::GetKeyboard,
            WireMessage::GetTouch { .. } => MessageType::GetTouch,
            WireMessage::Destroy => MessageType::Destroy,
            WireMessage::Error(_) => MessageType::Error,
            WireMessage::DeleteId { .. } => MessageType::DeleteId,
            WireMessage::Done { .. } => MessageType::Done,
            WireMessage::Global { .. } => MessageType::Global,
            WireMessage::GlobalRemove { .. } => MessageType::GlobalRemove,
            WireMessage::BufferComplete { .. } => MessageType::BufferComplete,
            WireMessage::SeatCapabilities { .. } => MessageType::SeatCapabilities,
            WireMessage::IviConfigure { .. } => MessageType::IviConfigure,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_try_from_accepts_every_known_code() {
        let codes = [
            0x01u8, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D,
            0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47,
        ];
        for code in codes {
            let ty = MessageType::try_from(code).expect("known code");
            assert_eq!(ty as u8, code);
        }
    }

    #[test]
    fn test_message_type_try_from_rejects_gap_codes() {
        assert!(MessageType::try_from(0x00).is_err());
        assert!(MessageType::try_from(0x0E).is_err());
        assert!(MessageType::try_from(0x48).is_err());
        assert!(MessageType::try_from(0xFF).is_err());
    }

    #[test]
    fn test_requests_and_events_are_split_at_0x40() {
        assert!(!MessageType::Commit.is_event());
        assert!(!MessageType::Destroy.is_event());
        assert!(MessageType::Global.is_event());
        assert!(MessageType::IviConfigure.is_event());
    }

    #[test]
    fn test_object_id_display_uses_at_prefix() {
        assert_eq!(ObjectId(7).to_string(), "@7");
        assert_eq!(DISPLAY_OBJECT.to_string(), "@1");
    }

    #[test]
    fn test_message_type_matches_variant() {
        let msg = WireMessage::Bind {
            name: 3,
            interface: "wthp_seat".to_string(),
            version: 1,
            id: ObjectId(9),
        };
        assert_eq!(msg.message_type(), MessageType::Bind);
        assert_eq!(WireMessage::Commit.message_type(), MessageType::Commit);
    }
}
