//! Fixed-layout CAN frame codec for the gantry controller.
//!
//! This is the core value-add layer of gantrylink. Two frame kinds travel on
//! the bus, both as an 8-byte little-endian payload:
//! - [`CommandFrame`] (device-bound request, arbiter ID `0x200 + DEVICE_OFFSET`)
//! - [`TelemetryFrame`] (device-originated measurement, arbiter ID `0x180 + DEVICE_OFFSET`)
//!
//! Everything in this crate is pure: no I/O, no clocks beyond the capture
//! stamp assigned at construction.

pub mod arbiter;
pub mod command;
pub mod error;
pub mod packing;
pub mod raw;
pub mod state;
pub mod telemetry;
pub mod wire;

pub use arbiter::{identify, kind_name, FrameKind, DEVICE_OFFSET};
pub use command::{clamp_i16, CommandFrame};
pub use error::{DecodeError, EncodeError, FrameError, Result};
pub use packing::{FieldSet, PAYLOAD_SIZE, PTO_BITS_MAX};
pub use raw::RawCanFrame;
pub use state::ControlState;
pub use telemetry::{parse_telemetry, TelemetryFrame};
pub use wire::{decode_wire_frame, encode_wire_frame, MAX_CAN_PAYLOAD, WIRE_HEADER_SIZE};
