use std::time::Duration;

use crate::error::{ControlError, Result};

/// Default command period: 50 Hz.
pub const DEFAULT_PERIOD: Duration = Duration::from_millis(20);

/// Default wait after the transport is unavailable or a handle fails.
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(100);

/// Default upper bound on a single command send.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Timing shared by both control loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopConfig {
    /// Sleep after each command send attempt.
    pub period: Duration,
    /// Sleep after a transport failure or while the service is not ready.
    pub backoff: Duration,
    /// Longest a single send may take before the sender handle is dropped.
    pub send_timeout: Duration,
}

impl LoopConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(ControlError::InvalidConfig(
                "period must be greater than zero".to_string(),
            ));
        }
        if self.backoff.is_zero() {
            return Err(ControlError::InvalidConfig(
                "backoff must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout.is_zero() {
            return Err(ControlError::InvalidConfig(
                "send timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_PERIOD,
            backoff: DEFAULT_BACKOFF,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}
