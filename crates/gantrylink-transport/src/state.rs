use std::fmt;

use serde::Serialize;

/// State reported by the CAN-bus bridge service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceState {
    #[default]
    Unknown,
    Stopped,
    Idle,
    Running,
    Unavailable,
    Error,
}

impl ServiceState {
    /// The service is accepting outbound frames.
    pub fn is_running(self) -> bool {
        self == Self::Running
    }

    /// The service can hand out an inbound stream.
    pub fn is_ready(self) -> bool {
        matches!(self, Self::Idle | Self::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::Stopped => "STOPPED",
            Self::Idle => "IDLE",
            Self::Running => "RUNNING",
            Self::Unavailable => "UNAVAILABLE",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn readiness_classes() {
        assert!(ServiceState::Running.is_running());
        assert!(ServiceState::Running.is_ready());
        assert!(ServiceState::Idle.is_ready());
        assert!(!ServiceState::Idle.is_running());
        for state in [
            ServiceState::Unknown,
            ServiceState::Stopped,
            ServiceState::Unavailable,
            ServiceState::Error,
        ] {
            assert!(!state.is_ready(), "{state} should not be ready");
        }
    }
}
