use std::time::Duration;

use gantrylink_frame::FrameError;

use crate::state::ServiceState;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to connect to the bridge.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Connecting to the bridge took longer than the configured timeout.
    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    /// An I/O error occurred on an open handle.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The bridge sent bytes that are not a valid wire frame.
    #[error("bridge framing error: {0}")]
    Frame(#[from] FrameError),

    /// The service is not in a state that accepts the operation.
    #[error("canbus service unavailable (state {0})")]
    Unavailable(ServiceState),

    /// The bridge closed the connection partway through a frame.
    #[error("bridge closed the connection mid-frame")]
    Closed,
}

pub type Result<T> = std::result::Result<T, TransportError>;
