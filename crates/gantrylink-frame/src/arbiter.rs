//! Arbiter IDs for the two frame kinds.
//!
//! Each kind has a base ID; the deployed gantry adds a fixed device offset.
//! The offset is a deployment constant and is never negotiated on the bus.

/// Per-deployment node offset added to every base ID.
pub const DEVICE_OFFSET: u32 = 0x12;

/// The two frame kinds this codec understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameKind {
    /// Device-bound request (RPDO1).
    Command,
    /// Device-originated measurement (TPDO1).
    Telemetry,
}

impl FrameKind {
    /// Base arbiter ID before the device offset is applied.
    pub const fn base_id(self) -> u32 {
        match self {
            Self::Command => 0x200,
            Self::Telemetry => 0x180,
        }
    }

    /// Full arbiter ID on the bus.
    pub const fn arbiter_id(self) -> u32 {
        self.base_id() + DEVICE_OFFSET
    }
}

/// Returns true iff `arbiter_id` is exactly the ID of `kind`.
pub fn identify(arbiter_id: u32, kind: FrameKind) -> bool {
    arbiter_id == kind.arbiter_id()
}

/// Returns a human-readable name for an arbiter ID.
pub fn kind_name(arbiter_id: u32) -> &'static str {
    if identify(arbiter_id, FrameKind::Command) {
        "COMMAND"
    } else if identify(arbiter_id, FrameKind::Telemetry) {
        "TELEMETRY"
    } else {
        "OTHER"
    }
}
