use std::fmt;
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use crate::arbiter::{identify, FrameKind};
use crate::error::{DecodeError, EncodeError};
use crate::packing::{FieldSet, PAYLOAD_SIZE};
use crate::raw::RawCanFrame;
use crate::state::ControlState;

/// Device-originated measurement (TPDO1), mirroring [`CommandFrame`](crate::CommandFrame).
///
/// Equality ignores `stamp`.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryFrame {
    pub state: ControlState,
    /// Measured speed in mm/s.
    pub meas_feed: i16,
    pub meas_x: i16,
    pub meas_y: i16,
    pub relative: bool,
    pub jog: bool,
    pub pto_bits: u8,
    /// Arrival time of the raw frame this was decoded from.
    #[serde(skip)]
    pub stamp: Instant,
}

impl TelemetryFrame {
    pub fn new(
        state: ControlState,
        meas_feed: i16,
        meas_x: i16,
        meas_y: i16,
        relative: bool,
        jog: bool,
    ) -> Self {
        Self {
            state,
            meas_feed,
            meas_x,
            meas_y,
            relative,
            jog,
            pto_bits: 0,
            stamp: Instant::now(),
        }
    }

    pub fn with_pto_bits(mut self, pto_bits: u8) -> Self {
        self.pto_bits = pto_bits;
        self
    }

    fn fields(&self) -> FieldSet {
        FieldSet {
            state: self.state,
            feed: self.meas_feed,
            x: self.meas_x,
            y: self.meas_y,
            relative: self.relative,
            jog: self.jog,
            pto_bits: self.pto_bits,
        }
    }

    fn from_fields(fields: FieldSet, stamp: Instant) -> Self {
        Self {
            state: fields.state,
            meas_feed: fields.feed,
            meas_x: fields.x,
            meas_y: fields.y,
            relative: fields.relative,
            jog: fields.jog,
            pto_bits: fields.pto_bits,
            stamp,
        }
    }

    pub fn encode(&self) -> Result<[u8; PAYLOAD_SIZE], EncodeError> {
        self.fields().pack()
    }

    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self::from_fields(FieldSet::unpack(data)?, Instant::now()))
    }

    /// Build a raw frame as the gantry would put it on the bus.
    pub fn to_raw(&self) -> Result<RawCanFrame, EncodeError> {
        let payload = self.encode()?;
        Ok(RawCanFrame::with_stamp(
            FrameKind::Telemetry.arbiter_id(),
            Bytes::copy_from_slice(&payload),
            self.stamp,
        ))
    }

    /// Decode a raw frame, checking the arbiter ID first. The stamp is copied
    /// from the raw frame.
    pub fn from_raw(raw: &RawCanFrame) -> Result<Self, DecodeError> {
        let expected = FrameKind::Telemetry.arbiter_id();
        if raw.id != expected {
            return Err(DecodeError::IdMismatch {
                expected,
                actual: raw.id,
            });
        }
        Ok(Self::from_fields(FieldSet::unpack(&raw.data)?, raw.stamp))
    }
}

impl Default for TelemetryFrame {
    fn default() -> Self {
        Self::new(ControlState::Estopped, 0, 0, 0, true, true)
    }
}

impl PartialEq for TelemetryFrame {
    fn eq(&self, other: &Self) -> bool {
        self.fields() == other.fields()
    }
}

impl Eq for TelemetryFrame {}

impl fmt::Display for TelemetryFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "telemetry state={} feed={} x={} y={} relative={} jog={} pto={:#04x}",
            self.state,
            self.meas_feed,
            self.meas_x,
            self.meas_y,
            self.relative,
            self.jog,
            self.pto_bits
        )
    }
}

/// Parse a raw frame if it is gantry telemetry.
///
/// Returns `Ok(None)` when the arbiter ID belongs to something else; that is
/// a filter miss, not an error.
pub fn parse_telemetry(raw: &RawCanFrame) -> Result<Option<TelemetryFrame>, DecodeError> {
    if !identify(raw.id, FrameKind::Telemetry) {
        return Ok(None);
    }
    TelemetryFrame::from_raw(raw).map(Some)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::packing::every_field_set;

    #[test]
    fn every_telemetry_round_trips() {
        for fields in every_field_set() {
            let frame = TelemetryFrame::new(
                fields.state,
                fields.feed,
                fields.x,
                fields.y,
                fields.relative,
                fields.jog,
            )
            .with_pto_bits(fields.pto_bits);
            let raw = frame.to_raw().unwrap();
            assert_eq!(TelemetryFrame::from_raw(&raw).unwrap(), frame);
        }
    }

    #[test]
    fn roundtrip_preserves_fields() {
        let frame = TelemetryFrame::new(ControlState::Alarm, -300, 1200, -4, false, true)
            .with_pto_bits(0x21);
        let decoded = TelemetryFrame::decode(&frame.encode().unwrap()).unwrap();
        assert_eq!(decoded, frame);
        assert_eq!(decoded.meas_y, -4);
    }

    #[test]
    fn decode_rejects_short_payload() {
        assert_eq!(
            TelemetryFrame::decode(&[4, 0, 0, 0, 0]),
            Err(DecodeError::LengthMismatch {
                expected: PAYLOAD_SIZE,
                actual: 5
            })
        );
    }

    #[test]
    fn parse_keeps_arrival_stamp() {
        let frame = TelemetryFrame::new(ControlState::AutoReady, 10, 20, 30, true, false);
        let arrival = Instant::now() + Duration::from_millis(5);
        let raw = RawCanFrame::with_stamp(
            FrameKind::Telemetry.arbiter_id(),
            frame.encode().unwrap().to_vec(),
            arrival,
        );

        let parsed = parse_telemetry(&raw).unwrap().expect("telemetry id should match");
        assert_eq!(parsed, frame);
        assert_eq!(parsed.stamp, arrival);
    }

    #[test]
    fn parse_skips_foreign_ids() {
        let payload = TelemetryFrame::default().encode().unwrap().to_vec();
        for id in [0x180, 0x18E, 0x212, 0x193] {
            let raw = RawCanFrame::new(id, payload.clone());
            assert!(parse_telemetry(&raw).unwrap().is_none());
        }
    }

    #[test]
    fn parse_reports_bad_payload_for_matching_id() {
        let raw = RawCanFrame::new(FrameKind::Telemetry.arbiter_id(), vec![9, 0, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            parse_telemetry(&raw),
            Err(DecodeError::Malformed { field: "state", value: 9 })
        ));
    }

    #[test]
    fn display_lists_measured_values() {
        let frame = TelemetryFrame::new(ControlState::AutoActive, 1, 2, 3, true, false);
        assert_eq!(
            frame.to_string(),
            "telemetry state=AUTO_ACTIVE feed=1 x=2 y=3 relative=true jog=false pto=0x00"
        );
    }
}
