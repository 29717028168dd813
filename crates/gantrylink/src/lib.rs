//! CAN-bus command and telemetry client for a farm gantry robot.
//!
//! # Crate Structure
//!
//! - [`frame`]: Fixed-layout command/telemetry codec and control state
//! - [`transport`]: CAN-bus bridge abstraction (in-memory bus, TCP bridge)
//! - [`control`]: Fixed-rate command publisher and telemetry ingest loops

/// Re-export frame types.
pub mod frame {
    pub use gantrylink_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use gantrylink_transport::*;
}

/// Re-export control loop types.
pub mod control {
    pub use gantrylink_control::*;
}
