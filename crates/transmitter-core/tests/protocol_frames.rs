//! Integration tests for the transmitter-core codec used as a stream framer.
//!
//! A TCP stream delivers bytes in arbitrary chunks.  These tests feed encoded
//! frames through [`frame_length`] + [`decode_message`] the way the transport
//! reader does, checking that a registry handshake and a frame's worth of
//! surface requests survive being split at every possible byte boundary.

use transmitter_core::{
    decode_message, encode_message, frame_length,
    protocol::messages::{CreateBufferMessage, DISPLAY_OBJECT, HEADER_SIZE},
    CapabilityKind, ObjectId, ProtocolError, WireMessage,
};

/// Splits `stream` into complete frames, returning the decoded messages and
/// the number of unconsumed trailing bytes.
fn drain_frames(stream: &[u8]) -> (Vec<(ObjectId, WireMessage)>, usize) {
    let mut out = Vec::new();
    let mut offset = 0;
    while let Some(len) = frame_length(&stream[offset..]) {
        let (object, msg, consumed) =
            decode_message(&stream[offset..offset + len]).expect("complete frame must decode");
        assert_eq!(consumed, len);
        out.push((object, msg));
        offset += len;
    }
    (out, stream.len() - offset)
}

fn handshake_events(registry: ObjectId) -> Vec<(ObjectId, WireMessage)> {
    let mut events: Vec<(ObjectId, WireMessage)> = CapabilityKind::ALL
        .iter()
        .enumerate()
        .map(|(i, kind)| {
            (
                registry,
                WireMessage::Global {
                    name: i as u32 + 1,
                    interface: kind.interface().to_string(),
                    version: 1,
                },
            )
        })
        .collect();
    events.push((ObjectId(3), WireMessage::Done { serial: 1 }));
    events
}

fn encode_all(messages: &[(ObjectId, WireMessage)]) -> Vec<u8> {
    messages
        .iter()
        .flat_map(|(object, msg)| encode_message(*object, msg).expect("encode"))
        .collect()
}

#[test]
fn test_handshake_stream_decodes_in_order() {
    // Arrange
    let events = handshake_events(ObjectId(2));
    let stream = encode_all(&events);

    // Act
    let (decoded, leftover) = drain_frames(&stream);

    // Assert
    assert_eq!(leftover, 0);
    assert_eq!(decoded, events);
}

#[test]
fn test_stream_split_at_every_boundary_reassembles() {
    // Arrange
    let events = handshake_events(ObjectId(2));
    let stream = encode_all(&events);

    for split in 0..=stream.len() {
        // Act – first chunk arrives, then the rest is appended
        let mut buffer = stream[..split].to_vec();
        let (mut decoded, leftover) = drain_frames(&buffer);
        buffer.drain(..buffer.len() - leftover);
        buffer.extend_from_slice(&stream[split..]);
        let (rest, leftover) = drain_frames(&buffer);
        decoded.extend(rest);

        // Assert
        assert_eq!(leftover, 0, "split at {split}");
        assert_eq!(decoded, events, "split at {split}");
    }
}

#[test]
fn test_surface_frame_sequence_decodes_with_buffer_payload() {
    // Arrange
    let surface = ObjectId(7);
    let buffer = ObjectId(9);
    let frame = vec![
        (
            ObjectId(4),
            WireMessage::CreateBuffer(CreateBufferMessage {
                id: buffer,
                width: 64,
                height: 32,
                stride: 256,
                format: 32,
                data: vec![1, 2, 3, 4],
            }),
        ),
        (surface, WireMessage::Attach { buffer, x: 3, y: -2 }),
        (surface, WireMessage::Damage { x: 3, y: -2, width: 64, height: 32 }),
        (surface, WireMessage::Commit),
    ];

    // Act
    let (decoded, leftover) = drain_frames(&encode_all(&frame));

    // Assert
    assert_eq!(leftover, 0);
    assert_eq!(decoded, frame);
}

#[test]
fn test_garbage_after_valid_frame_is_reported_not_skipped() {
    // Arrange
    let mut stream = encode_message(DISPLAY_OBJECT, &WireMessage::Sync { callback: ObjectId(3) })
        .expect("encode");
    let first = stream.len();
    stream.extend_from_slice(&[0x07; HEADER_SIZE]);

    // Act
    let len = frame_length(&stream).expect("first frame complete");
    let second = decode_message(&stream[len..]);

    // Assert
    assert_eq!(len, first);
    assert_eq!(second, Err(ProtocolError::UnsupportedVersion(0x07)));
}
