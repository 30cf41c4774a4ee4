//! Binary codec for encoding and decoding transmitter protocol messages.
//!
//! Wire format:
//! ```text
//! [version:1][msg_type:1][reserved:2][payload_len:4][object_id:4][payload:N]
//! ```
//! Total header size: 12 bytes. All multi-byte integers are big-endian.
//! Strings are a 2-byte length prefix followed by UTF-8 bytes; byte blobs
//! use a 4-byte length prefix.

use crate::protocol::messages::{
    CreateBufferMessage, ErrorMessage, MessageType, ObjectId, WireMessage, HEADER_SIZE,
    PROTOCOL_VERSION,
};
use thiserror::Error;

/// Largest payload the decoder accepts; protects the reassembly buffer.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type byte in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `msg`, addressed to `object`, into a byte vector including the
/// 12-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::MalformedPayload`] if a field cannot be
/// represented on the wire (string or blob too long).
///
/// # Examples
///
/// ```rust
/// use transmitter_core::protocol::{decode_message, encode_message};
/// use transmitter_core::protocol::messages::{ObjectId, WireMessage};
///
/// let msg = WireMessage::Done { serial: 42 };
/// let bytes = encode_message(ObjectId(5), &msg).unwrap();
/// let (object, decoded, consumed) = decode_message(&bytes).unwrap();
/// assert_eq!(object, ObjectId(5));
/// assert_eq!(decoded, msg);
/// assert_eq!(consumed, bytes.len());
/// ```
pub fn encode_message(object: ObjectId, msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;
    let payload_len = u32::try_from(payload.len()).map_err(|_| {
        ProtocolError::MalformedPayload(format!("payload of {} bytes is too large", payload.len()))
    })?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());

    // Header: version (1) + msg_type (1) + reserved (2) + payload_len (4) +
    //         object (4) = 12 bytes
    buf.push(PROTOCOL_VERSION);
    buf.push(msg.message_type() as u8);
    buf.push(0x00); // reserved
    buf.push(0x00); // reserved
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&object.0.to_be_bytes());

    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes one message from the beginning of `bytes`.
///
/// Returns the addressed object, the decoded message, and the total number
/// of bytes consumed (header + payload), so the caller can advance their
/// read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed or incomplete.
pub fn decode_message(bytes: &[u8]) -> Result<(ObjectId, WireMessage, usize), ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let msg_type_byte = bytes[1];
    let msg_type = MessageType::try_from(msg_type_byte)
        .map_err(|_| ProtocolError::UnknownMessageType(msg_type_byte))?;

    // bytes[2..4] are reserved – ignored on decode

    let payload_len = read_u32(bytes, 4)? as usize;
    if payload_len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::MalformedPayload(format!(
            "payload length {payload_len} exceeds limit {MAX_PAYLOAD_SIZE}"
        )));
    }
    let object = ObjectId(read_u32(bytes, 8)?);

    let total_needed = HEADER_SIZE + payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    let msg = decode_payload(msg_type, payload)?;
    Ok((object, msg, total_needed))
}

/// Returns the total length of the first frame in `bytes` once its header
/// and full payload are buffered, or `None` if more bytes are needed.
///
/// Used by stream readers to split a byte stream into frames before decoding.
pub fn frame_length(bytes: &[u8]) -> Option<usize> {
    if bytes.len() < HEADER_SIZE {
        return None;
    }
    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let total = HEADER_SIZE + payload_len;
    (bytes.len() >= total).then_some(total)
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &WireMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        WireMessage::GetRegistry { registry } => write_id(&mut buf, *registry),
        WireMessage::Sync { callback } => write_id(&mut buf, *callback),
        WireMessage::Bind { name, interface, version, id } => {
            buf.extend_from_slice(&name.to_be_bytes());
            write_length_prefixed_string(&mut buf, interface)?;
            buf.extend_from_slice(&version.to_be_bytes());
            write_id(&mut buf, *id);
        }
        WireMessage::CreateSurface { id } => write_id(&mut buf, *id),
        WireMessage::CreateBuffer(m) => encode_create_buffer(&mut buf, m)?,
        WireMessage::Attach { buffer, x, y } => {
            write_id(&mut buf, *buffer);
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
        WireMessage::Damage { x, y, width, height } => {
            for v in [x, y, width, height] {
                buf.extend_from_slice(&v.to_be_bytes());
            }
        }
        WireMessage::Commit | WireMessage::Destroy => {} // empty payload
        WireMessage::CreateIviSurface { ivi_id, surface, id } => {
            buf.extend_from_slice(&ivi_id.to_be_bytes());
            write_id(&mut buf, *surface);
            write_id(&mut buf, *id);
        }
        WireMessage::GetPointer { id }
        | WireMessage::GetKeyboard { id }
        | WireMessage::GetTouch { id } => write_id(&mut buf, *id),
        WireMessage::Error(m) => {
            write_id(&mut buf, m.object);
            buf.extend_from_slice(&m.code.to_be_bytes());
            write_length_prefixed_string(&mut buf, &m.message)?;
        }
        WireMessage::DeleteId { id } => write_id(&mut buf, *id),
        WireMessage::Done { serial } | WireMessage::BufferComplete { serial } => {
            buf.extend_from_slice(&serial.to_be_bytes());
        }
        WireMessage::Global { name, interface, version } => {
            buf.extend_from_slice(&name.to_be_bytes());
            write_length_prefixed_string(&mut buf, interface)?;
            buf.extend_from_slice(&version.to_be_bytes());
        }
        WireMessage::GlobalRemove { name } => buf.extend_from_slice(&name.to_be_bytes()),
        WireMessage::SeatCapabilities { capabilities } => {
            buf.extend_from_slice(&capabilities.to_be_bytes());
        }
        WireMessage::IviConfigure { width, height } => {
            buf.extend_from_slice(&width.to_be_bytes());
            buf.extend_from_slice(&height.to_be_bytes());
        }
    }
    Ok(buf)
}

fn encode_create_buffer(buf: &mut Vec<u8>, m: &CreateBufferMessage) -> Result<(), ProtocolError> {
    write_id(buf, m.id);
    buf.extend_from_slice(&m.width.to_be_bytes());
    buf.extend_from_slice(&m.height.to_be_bytes());
    buf.extend_from_slice(&m.stride.to_be_bytes());
    buf.extend_from_slice(&m.format.to_be_bytes());
    let len = u32::try_from(m.data.len()).map_err(|_| {
        ProtocolError::MalformedPayload(format!("buffer of {} bytes is too large", m.data.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(&m.data);
    Ok(())
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, p: &[u8]) -> Result<WireMessage, ProtocolError> {
    let msg = match msg_type {
        MessageType::GetRegistry => WireMessage::GetRegistry { registry: read_id(p, 0)? },
        MessageType::Sync => WireMessage::Sync { callback: read_id(p, 0)? },
        MessageType::Bind => {
            let name = read_u32(p, 0)?;
            let (interface, end) = read_length_prefixed_string(p, 4)?;
            WireMessage::Bind {
                name,
                interface,
                version: read_u32(p, end)?,
                id: read_id(p, end + 4)?,
            }
        }
        MessageType::CreateSurface => WireMessage::CreateSurface { id: read_id(p, 0)? },
        MessageType::CreateBuffer => WireMessage::CreateBuffer(decode_create_buffer(p)?),
        MessageType::Attach => WireMessage::Attach {
            buffer: read_id(p, 0)?,
            x: read_i32(p, 4)?,
            y: read_i32(p, 8)?,
        },
        MessageType::Damage => WireMessage::Damage {
            x: read_i32(p, 0)?,
            y: read_i32(p, 4)?,
            width: read_i32(p, 8)?,
            height: read_i32(p, 12)?,
        },
        MessageType::Commit => WireMessage::Commit,
        MessageType::CreateIviSurface => WireMessage::CreateIviSurface {
            ivi_id: read_u32(p, 0)?,
            surface: read_id(p, 4)?,
            id: read_id(p, 8)?,
        },
        MessageType::GetPointer => WireMessage::GetPointer { id: read_id(p, 0)? },
        MessageType::GetKeyboard => WireMessage::GetKeyboard { id: read_id(p, 0)? },
        MessageType::GetTouch => WireMessage::GetTouch { id: read_id(p, 0)? },
        MessageType::Destroy => WireMessage::Destroy,
        MessageType::Error => {
            let object = read_id(p, 0)?;
            let code = read_u32(p, 4)?;
            let (message, _) = read_length_prefixed_string(p, 8)?;
            WireMessage::Error(ErrorMessage { object, code, message })
        }
        MessageType::DeleteId => WireMessage::DeleteId { id: read_id(p, 0)? },
        MessageType::Done => WireMessage::Done { serial: read_u32(p, 0)? },
        MessageType::Global => {
            let name = read_u32(p, 0)?;
            let (interface, end) = read_length_prefixed_string(p, 4)?;
            WireMessage::Global { name, interface, version: read_u32(p, end)? }
        }
        MessageType::GlobalRemove => WireMessage::GlobalRemove { name: read_u32(p, 0)? },
        MessageType::BufferComplete => WireMessage::BufferComplete { serial: read_u32(p, 0)? },
        MessageType::SeatCapabilities => {
            WireMessage::SeatCapabilities { capabilities: read_u32(p, 0)? }
        }
        MessageType::IviConfigure => WireMessage::IviConfigure {
            width: read_i32(p, 0)?,
            height: read_i32(p, 4)?,
        },
    };
    Ok(msg)
}

fn decode_create_buffer(p: &[u8]) -> Result<CreateBufferMessage, ProtocolError> {
    // 4 (id) + 4*3 (geometry) + 4 (format) + 4 (data_len) = 24
    require_len(p, 24, "CreateBuffer")?;
    let data_len = read_u32(p, 20)? as usize;
    require_len(p, 24 + data_len, "CreateBuffer.data")?;
    Ok(CreateBufferMessage {
        id: read_id(p, 0)?,
        width: read_i32(p, 4)?,
        height: read_i32(p, 8)?,
        stride: read_i32(p, 12)?,
        format: read_u32(p, 16)?,
        data: p[24..24 + data_len].to_vec(),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, ProtocolError> {
    if buf.len() < offset + 4 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 4,
            available: buf.len(),
        });
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

fn read_i32(buf: &[u8], offset: usize) -> Result<i32, ProtocolError> {
    read_u32(buf, offset).map(|v| v as i32)
}

fn read_id(buf: &[u8], offset: usize) -> Result<ObjectId, ProtocolError> {
    read_u32(buf, offset).map(ObjectId)
}

fn write_id(buf: &mut Vec<u8>, id: ObjectId) {
    buf.extend_from_slice(&id.0.to_be_bytes());
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    let len = u16::try_from(s.len()).map_err(|_| {
        ProtocolError::MalformedPayload(format!("string of {} bytes is too long", s.len()))
    })?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(buf: &[u8], offset: usize) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::DISPLAY_OBJECT;

    fn round_trip(object: ObjectId, msg: &WireMessage) -> (ObjectId, WireMessage) {
        let encoded = encode_message(object, msg).expect("encode failed");
        let (obj, decoded, consumed) = decode_message(&encoded).expect("decode failed");
        assert_eq!(consumed, encoded.len(), "consumed bytes should equal total encoded size");
        (obj, decoded)
    }

    // ── Registry handshake ───────────────────────────────────────────────────

    #[test]
    fn test_bind_round_trip_preserves_interface_name() {
        let msg = WireMessage::Bind {
            name: 4,
            interface: "wthp_ivi_application".to_string(),
            version: 1,
            id: ObjectId(12),
        };
        let (obj, decoded) = round_trip(ObjectId(2), &msg);
        assert_eq!(obj, ObjectId(2));
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_global_with_empty_interface_round_trips() {
        let msg = WireMessage::Global { name: 1, interface: String::new(), version: 3 };
        assert_eq!(round_trip(ObjectId(2), &msg).1, msg);
    }

    #[test]
    fn test_error_event_round_trip() {
        let msg = WireMessage::Error(ErrorMessage {
            object: ObjectId(9),
            code: 2,
            message: "invalid buffer".to_string(),
        });
        let (obj, decoded) = round_trip(DISPLAY_OBJECT, &msg);
        assert_eq!(obj, DISPLAY_OBJECT);
        assert_eq!(decoded, msg);
    }

    // ── Surface traffic ──────────────────────────────────────────────────────

    #[test]
    fn test_create_buffer_round_trip_keeps_payload_bytes() {
        let msg = WireMessage::CreateBuffer(CreateBufferMessage {
            id: ObjectId(30),
            width: 640,
            height: 480,
            stride: 2560,
            format: 32,
            data: vec![0xAB; 2560],
        });
        assert_eq!(round_trip(ObjectId(4), &msg).1, msg);
    }

    #[test]
    fn test_attach_with_negative_offsets_round_trips() {
        let msg = WireMessage::Attach { buffer: ObjectId(30), x: -12, y: -7 };
        assert_eq!(round_trip(ObjectId(5), &msg).1, msg);
    }

    #[test]
    fn test_commit_has_empty_payload() {
        let encoded = encode_message(ObjectId(5), &WireMessage::Commit).unwrap();
        assert_eq!(encoded.len(), HEADER_SIZE);
    }

    // ── Header layout ────────────────────────────────────────────────────────

    #[test]
    fn test_header_has_version_type_and_object() {
        let encoded = encode_message(ObjectId(0x0102_0304), &WireMessage::Commit).unwrap();
        assert_eq!(encoded[0], PROTOCOL_VERSION);
        assert_eq!(encoded[1], MessageType::Commit as u8);
        assert_eq!(&encoded[2..4], &[0, 0]);
        assert_eq!(&encoded[8..12], &[0x01, 0x02, 0x03, 0x04]);
    }

    // ── Error paths ──────────────────────────────────────────────────────────

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        let result = decode_message(&[]);
        assert_eq!(
            result,
            Err(ProtocolError::InsufficientData { needed: HEADER_SIZE, available: 0 })
        );
    }

    #[test]
    fn test_decode_unknown_message_type_returns_error() {
        let mut bytes = encode_message(ObjectId(1), &WireMessage::Commit).unwrap();
        bytes[1] = 0x3F;
        assert_eq!(decode_message(&bytes), Err(ProtocolError::UnknownMessageType(0x3F)));
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = encode_message(ObjectId(1), &WireMessage::Commit).unwrap();
        bytes[0] = 0x09;
        assert_eq!(decode_message(&bytes), Err(ProtocolError::UnsupportedVersion(0x09)));
    }

    #[test]
    fn test_decode_truncated_payload_returns_length_mismatch() {
        let bytes = encode_message(ObjectId(3), &WireMessage::Done { serial: 1 }).unwrap();
        let result = decode_message(&bytes[..bytes.len() - 1]);
        assert_eq!(
            result,
            Err(ProtocolError::PayloadLengthMismatch { declared: 4, available: 3 })
        );
    }

    #[test]
    fn test_decode_short_payload_for_type_is_rejected() {
        // Header claims a 2-byte Damage payload; Damage needs 16 bytes.
        let mut bytes = vec![PROTOCOL_VERSION, MessageType::Damage as u8, 0, 0];
        bytes.extend_from_slice(&2u32.to_be_bytes());
        bytes.extend_from_slice(&5u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0]);
        assert!(decode_message(&bytes).is_err());
    }

    // ── frame_length ─────────────────────────────────────────────────────────

    #[test]
    fn test_frame_length_none_until_payload_complete() {
        let bytes = encode_message(ObjectId(3), &WireMessage::Done { serial: 1 }).unwrap();
        assert_eq!(frame_length(&bytes[..HEADER_SIZE - 1]), None);
        assert_eq!(frame_length(&bytes[..bytes.len() - 1]), None);
        assert_eq!(frame_length(&bytes), Some(bytes.len()));
    }

    #[test]
    fn test_frame_length_ignores_trailing_frames() {
        let mut bytes = encode_message(ObjectId(3), &WireMessage::Commit).unwrap();
        let first = bytes.len();
        bytes.extend(encode_message(ObjectId(3), &WireMessage::Done { serial: 7 }).unwrap());
        assert_eq!(frame_length(&bytes), Some(first));
    }
}
