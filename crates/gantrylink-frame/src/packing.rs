use bytes::{Buf, BufMut};

use crate::error::{DecodeError, EncodeError};
use crate::state::ControlState;

/// Payload size for both frame kinds (the classic CAN maximum).
pub const PAYLOAD_SIZE: usize = 8;

/// Largest value `pto_bits` can carry in the upper six bits of byte 7.
pub const PTO_BITS_MAX: u8 = 0x3F;

const FLAG_RELATIVE: u8 = 0b0000_0001;
const FLAG_JOG: u8 = 0b0000_0010;
const PTO_SHIFT: u8 = 2;

/// Field set shared by command and telemetry frames.
///
/// Both frame kinds pack through this type so the layout lives in one place:
///
/// ```text
/// ┌───────┬───────────┬───────────┬───────────┬─────────────────────────────┐
/// │ 0     │ 1-2       │ 3-4       │ 5-6       │ 7                           │
/// │ state │ feed i16  │ x i16     │ y i16     │ b0 relative, b1 jog,        │
/// │ u8    │ LE        │ LE        │ LE        │ b2..b7 pto_bits             │
/// └───────┴───────────┴───────────┴───────────┴─────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSet {
    pub state: ControlState,
    pub feed: i16,
    pub x: i16,
    pub y: i16,
    pub relative: bool,
    pub jog: bool,
    pub pto_bits: u8,
}

impl FieldSet {
    /// Pack into the fixed 8-byte payload.
    pub fn pack(&self) -> Result<[u8; PAYLOAD_SIZE], EncodeError> {
        if self.pto_bits > PTO_BITS_MAX {
            return Err(EncodeError::OutOfRange {
                field: "pto_bits",
                value: i64::from(self.pto_bits),
                min: 0,
                max: i64::from(PTO_BITS_MAX),
            });
        }

        let mut flags = self.pto_bits << PTO_SHIFT;
        if self.relative {
            flags |= FLAG_RELATIVE;
        }
        if self.jog {
            flags |= FLAG_JOG;
        }

        let mut out = [0u8; PAYLOAD_SIZE];
        let mut dst = &mut out[..];
        dst.put_u8(self.state.as_u8());
        dst.put_i16_le(self.feed);
        dst.put_i16_le(self.x);
        dst.put_i16_le(self.y);
        dst.put_u8(flags);
        Ok(out)
    }

    /// Unpack a payload. The length must be exactly [`PAYLOAD_SIZE`].
    pub fn unpack(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != PAYLOAD_SIZE {
            return Err(DecodeError::LengthMismatch {
                expected: PAYLOAD_SIZE,
                actual: data.len(),
            });
        }

        let mut src = data;
        let raw_state = src.get_u8();
        let state = ControlState::from_u8(raw_state).ok_or(DecodeError::Malformed {
            field: "state",
            value: raw_state,
        })?;
        let feed = src.get_i16_le();
        let x = src.get_i16_le();
        let y = src.get_i16_le();
        let flags = src.get_u8();

        Ok(Self {
            state,
            feed,
            x,
            y,
            relative: flags & FLAG_RELATIVE != 0,
            jog: flags & FLAG_JOG != 0,
            pto_bits: flags >> PTO_SHIFT,
        })
    }
}

/// Every state, flag pair, and `pto_bits` value, each crossed with i16 extremes.
#[cfg(test)]
pub(crate) fn every_field_set() -> impl Iterator<Item = FieldSet> {
    const EXTREMES: [i16; 5] = [i16::MIN, -1, 0, 1, i16::MAX];

    ControlState::ALL.into_iter().flat_map(|state| {
        [(false, false), (true, false), (false, true), (true, true)]
            .into_iter()
            .flat_map(move |(relative, jog)| {
                (0..=PTO_BITS_MAX).flat_map(move |pto_bits| {
                    (0..EXTREMES.len()).map(move |i| FieldSet {
                        state,
                        feed: EXTREMES[i],
                        x: EXTREMES[(i + 1) % EXTREMES.len()],
                        y: EXTREMES[(i + 2) % EXTREMES.len()],
                        relative,
                        jog,
                        pto_bits,
                    })
                })
            })
    })
}
