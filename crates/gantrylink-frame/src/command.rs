use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use crate::arbiter::FrameKind;
use crate::error::{DecodeError, EncodeError};
use crate::packing::{FieldSet, PAYLOAD_SIZE, PTO_BITS_MAX};
use crate::raw::RawCanFrame;
use crate::state::ControlState;

/// Device-bound command (RPDO1): requested state, feed, and target position.
///
/// Equality ignores `timestamp`, which is not part of the wire payload.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame {
    pub state_request: ControlState,
    /// Commanded speed in mm/s.
    pub feed: i16,
    pub x: i16,
    pub y: i16,
    /// Relative (true) or absolute (false) positioning.
    pub relative: bool,
    /// Jog (`$J=`) rather than programmed move (`G01`).
    pub jog: bool,
    /// Auxiliary actuator bitmask, `0..=0x3F`.
    pub pto_bits: u8,
    #[serde(skip)]
    pub timestamp: Instant,
}

impl CommandFrame {
    pub fn new(
        state_request: ControlState,
        feed: i16,
        x: i16,
        y: i16,
        relative: bool,
        jog: bool,
    ) -> Self {
        Self {
            state_request,
            feed,
            x,
            y,
            relative,
            jog,
            pto_bits: 0,
            timestamp: Instant::now(),
        }
    }

    /// Set the auxiliary actuator bitmask.
    pub fn with_pto_bits(mut self, pto_bits: u8) -> Self {
        self.pto_bits = pto_bits;
        self
    }

    /// Build from wide application values, rejecting anything that does not fit.
    pub fn checked(
        state_request: ControlState,
        feed: i32,
        x: i32,
        y: i32,
        relative: bool,
        jog: bool,
        pto_bits: u8,
    ) -> Result<Self, EncodeError> {
        if pto_bits > PTO_BITS_MAX {
            return Err(EncodeError::OutOfRange {
                field: "pto_bits",
                value: i64::from(pto_bits),
                min: 0,
                max: i64::from(PTO_BITS_MAX),
            });
        }
        Ok(Self::new(
            state_request,
            checked_i16("feed", feed)?,
            checked_i16("x", x)?,
            checked_i16("y", y)?,
            relative,
            jog,
        )
        .with_pto_bits(pto_bits))
    }

    /// Build from wide application values, clamping each field to its wire range.
    ///
    /// `feed`, `x`, `y` saturate at `i16::MIN`/`i16::MAX`; `pto_bits` saturates
    /// at [`PTO_BITS_MAX`]. This is the policy the command publisher uses.
    pub fn saturating(
        state_request: ControlState,
        feed: i32,
        x: i32,
        y: i32,
        relative: bool,
        jog: bool,
        pto_bits: u8,
    ) -> Self {
        Self::new(
            state_request,
            clamp_i16(feed),
            clamp_i16(x),
            clamp_i16(y),
            relative,
            jog,
        )
        .with_pto_bits(pto_bits.min(PTO_BITS_MAX))
    }

    fn fields(&self) -> FieldSet {
        FieldSet {
            state: self.state_request,
            feed: self.feed,
            x: self.x,
            y: self.y,
            relative: self.relative,
            jog: self.jog,
            pto_bits: self.pto_bits,
        }
    }

    /// Encode into the fixed 8-byte payload.
    pub fn encode(&self) -> Result<[u8; PAYLOAD_SIZE], EncodeError> {
        self.fields().pack()
    }

    /// Decode an 8-byte payload. The timestamp is the decode time.
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let fields = FieldSet::unpack(data)?;
        Ok(Self {
            state_request: fields.state,
            feed: fields.feed,
            x: fields.x,
            y: fields.y,
            relative: fields.relative,
            jog: fields.jog,
            pto_bits: fields.pto_bits,
            timestamp: Instant::now(),
        })
    }

    /// Build the outbound raw frame addressed to the gantry.
    pub fn to_raw(&self) -> Result<RawCanFrame, EncodeError> {
        let payload = self.encode()?;
        Ok(RawCanFrame::with_stamp(
            FrameKind::Command.arbiter_id(),
            Bytes::copy_from_slice(&payload),
            self.timestamp,
        ))
    }

    /// Decode a raw frame, checking the arbiter ID first.
    pub fn from_raw(raw: &RawCanFrame) -> Result<Self, DecodeError> {
        let expected = FrameKind::Command.arbiter_id();
        if raw.id != expected {
            return Err(DecodeError::IdMismatch {
                expected,
                actual: raw.id,
            });
        }
        let mut frame = Self::decode(&raw.data)?;
        frame.timestamp = raw.stamp;
        Ok(frame)
    }
}

impl Default for CommandFrame {
    fn default() -> Self {
        Self::new(ControlState::Estopped, 0, 0, 0, true, true)
    }
}

impl PartialEq for CommandFrame {
    fn eq(&self, other: &Self) -> bool {
        self.fields() == other.fields()
    }
}

impl Eq for CommandFrame {}

impl fmt::Display for CommandFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command state={} feed={} x={} y={} relative={} jog={} pto={:#04x}",
            self.state_request, self.feed, self.x, self.y, self.relative, self.jog, self.pto_bits
        )
    }
}

/// Clamp a wide value into the signed 16-bit wire range.
pub fn clamp_i16(value: i32) -> i16 {
    value.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16
}

fn checked_i16(field: &'static str, value: i32) -> Result<i16, EncodeError> {
    i16::try_from(value).map_err(|_| EncodeError::OutOfRange {
        field,
        value: i64::from(value),
        min: i64::from(i16::MIN),
        max: i64::from(i16::MAX),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packing::every_field_set;

    #[test]
    fn every_command_round_trips() {
        for fields in every_field_set() {
            let frame = CommandFrame::new(
                fields.state,
                fields.feed,
                fields.x,
                fields.y,
                fields.relative,
                fields.jog,
            )
            .with_pto_bits(fields.pto_bits);
            let raw = frame.to_raw().unwrap();
            assert_eq!(CommandFrame::from_raw(&raw).unwrap(), frame);
        }
    }

    #[test]
    fn scenario_auto_active_roundtrip() {
        let frame = CommandFrame::new(ControlState::AutoActive, 1000, 50, -50, true, true);
        let payload = frame.encode().unwrap();
        assert_eq!(payload.len(), PAYLOAD_SIZE);

        let decoded = CommandFrame::decode(&payload).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.state_request, ControlState::AutoActive);
        assert_eq!(decoded.feed, 1000);
        assert_eq!(decoded.x, 50);
        assert_eq!(decoded.y, -50);
        assert!(decoded.relative);
        assert!(decoded.jog);
        assert_eq!(decoded.pto_bits, 0);
    }

    #[test]
    fn roundtrip_every_state() {
        for state in ControlState::ALL {
            let frame = CommandFrame::new(state, -7, i16::MIN, i16::MAX, false, true)
                .with_pto_bits(0x15);
            assert_eq!(CommandFrame::decode(&frame.encode().unwrap()).unwrap(), frame);
        }
    }

    #[test]
    fn encode_is_deterministic() {
        let frame = CommandFrame::new(ControlState::ManualActive, 12, 34, 56, false, false);
        assert_eq!(frame.encode().unwrap(), frame.clone().encode().unwrap());
    }

    #[test]
    fn saturating_policy_clamps_feed() {
        for _ in 0..3 {
            let frame =
                CommandFrame::saturating(ControlState::AutoActive, 40_000, -40_000, 5, true, false, 0);
            assert_eq!(frame.feed, i16::MAX);
            assert_eq!(frame.x, i16::MIN);
            assert_eq!(frame.y, 5);
        }
        let frame = CommandFrame::saturating(ControlState::AutoActive, 0, 0, 0, true, false, 0xFF);
        assert_eq!(frame.pto_bits, PTO_BITS_MAX);
    }

    #[test]
    fn checked_policy_rejects_feed() {
        let err = CommandFrame::checked(ControlState::AutoActive, 40_000, 0, 0, true, false, 0)
            .unwrap_err();
        assert_eq!(
            err,
            EncodeError::OutOfRange {
                field: "feed",
                value: 40_000,
                min: -32_768,
                max: 32_767
            }
        );
        assert!(CommandFrame::checked(ControlState::AutoActive, 0, 0, 0, true, false, 0x40).is_err());
        assert!(CommandFrame::checked(ControlState::AutoActive, -32_768, 32_767, 0, true, false, 0x3F).is_ok());
    }

    #[test]
    fn to_raw_uses_command_arbiter_id() {
        let frame = CommandFrame::default();
        let raw = frame.to_raw().unwrap();
        assert_eq!(raw.id, 0x212);
        assert_eq!(raw.data.len(), PAYLOAD_SIZE);
        assert_eq!(CommandFrame::from_raw(&raw).unwrap(), frame);
    }

    #[test]
    fn from_raw_rejects_other_ids() {
        let raw = RawCanFrame::new(0x192, vec![4, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            CommandFrame::from_raw(&raw),
            Err(DecodeError::IdMismatch { expected: 0x212, actual: 0x192 })
        ));
    }

    #[test]
    fn defaults_match_dashboard() {
        let frame = CommandFrame::default();
        assert_eq!(frame.state_request, ControlState::Estopped);
        assert!(frame.relative);
        assert!(frame.jog);
        assert_eq!((frame.feed, frame.x, frame.y, frame.pto_bits), (0, 0, 0, 0));
    }
}
