//! Byte-stream framing used between the client and a CAN-bus bridge.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::FrameError;
use crate::raw::RawCanFrame;

/// Header: magic (2) + arbiter id (4) + length (1) = 7 bytes.
pub const WIRE_HEADER_SIZE: usize = 7;

/// Magic bytes: "CB" (0x43 0x42).
pub const WIRE_MAGIC: [u8; 2] = [0x43, 0x42];

/// Largest payload a classic CAN frame carries.
pub const MAX_CAN_PAYLOAD: usize = 8;

/// Encode a raw CAN frame into the bridge wire format.
///
/// ```text
/// ┌──────────────┬──────────────┬──────────┬────────────────┐
/// │ Magic (2B)   │ Arbiter ID   │ Length   │ Payload        │
/// │ 0x43 0x42    │ (4B LE)      │ (1B)     │ (Length bytes) │
/// └──────────────┴──────────────┴──────────┴────────────────┘
/// ```
pub fn encode_wire_frame(
    frame: &RawCanFrame,
    max_payload: usize,
    dst: &mut BytesMut,
) -> Result<(), FrameError> {
    let max = max_payload.min(u8::MAX as usize);
    if frame.data.len() > max {
        return Err(FrameError::PayloadTooLarge {
            size: frame.data.len(),
            max,
        });
    }
    dst.reserve(WIRE_HEADER_SIZE + frame.data.len());
    dst.put_slice(&WIRE_MAGIC);
    dst.put_u32_le(frame.id);
    dst.put_u8(frame.data.len() as u8);
    dst.put_slice(&frame.data);
    Ok(())
}

/// Decode a raw CAN frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes and stamps the frame with the
/// current time (its arrival).
pub fn decode_wire_frame(
    src: &mut BytesMut,
    max_payload: usize,
) -> Result<Option<RawCanFrame>, FrameError> {
    if src.len() < WIRE_HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != WIRE_MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let id = u32::from_le_bytes([src[2], src[3], src[4], src[5]]);
    let payload_len = src[6] as usize;

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    let total = WIRE_HEADER_SIZE + payload_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(WIRE_HEADER_SIZE);
    let data = src.split_to(payload_len).freeze();

    Ok(Some(RawCanFrame::new(id, data)))
}
