/// Errors produced while decoding a CAN payload into a typed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The payload is not exactly the fixed frame size.
    #[error("payload length mismatch ({actual} bytes, expected {expected})")]
    LengthMismatch { expected: usize, actual: usize },

    /// A field holds a value the layout cannot represent.
    #[error("malformed {field} field: {value:#04x}")]
    Malformed { field: &'static str, value: u8 },

    /// The arbiter ID does not belong to the requested frame kind.
    #[error("arbiter id mismatch ({actual:#05x}, expected {expected:#05x})")]
    IdMismatch { expected: u32, actual: u32 },
}

/// Errors produced while building or encoding a typed frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// A field value does not fit its wire width.
    #[error("{field} out of range ({value}, allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

/// Errors from the bridge wire framing layer.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame header contains an invalid magic number.
    #[error("invalid bridge frame magic (expected 0x4342 \"CB\")")]
    InvalidMagic,

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
