use std::time::Instant;

use bytes::Bytes;

/// An opaque frame as the transport sees it: arbiter ID plus payload.
#[derive(Debug, Clone)]
pub struct RawCanFrame {
    /// Arbiter ID on the bus.
    pub id: u32,
    /// Frame payload (at most 8 bytes on a classic CAN bus).
    pub data: Bytes,
    /// Capture time: arrival for inbound frames, construction for outbound.
    pub stamp: Instant,
}

impl RawCanFrame {
    /// Create a frame stamped with the current monotonic time.
    pub fn new(id: u32, data: impl Into<Bytes>) -> Self {
        Self::with_stamp(id, data, Instant::now())
    }

    /// Create a frame with an explicit capture stamp.
    pub fn with_stamp(id: u32, data: impl Into<Bytes>, stamp: Instant) -> Self {
        Self {
            id,
            data: data.into(),
            stamp,
        }
    }

    /// Payload rendered as lowercase hex, e.g. `04e8033200ceff03`.
    pub fn hex(&self) -> String {
        hex::encode(&self.data)
    }
}
