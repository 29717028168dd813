use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// Machine state shared by command and telemetry frames.
///
/// The discriminants are wire constants and must not be reordered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ControlState {
    ManualReady = 1,
    ManualActive = 2,
    AutoReady = 3,
    AutoActive = 4,
    Alarm = 5,
    #[default]
    Estopped = 6,
}

impl ControlState {
    pub const ALL: [ControlState; 6] = [
        ControlState::ManualReady,
        ControlState::ManualActive,
        ControlState::AutoReady,
        ControlState::AutoActive,
        ControlState::Alarm,
        ControlState::Estopped,
    ];

    /// Wire value of this state.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a wire value. Returns `None` for anything outside `1..=6`.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ManualReady),
            2 => Some(Self::ManualActive),
            3 => Some(Self::AutoReady),
            4 => Some(Self::AutoActive),
            5 => Some(Self::Alarm),
            6 => Some(Self::Estopped),
            _ => None,
        }
    }

    /// Dashboard label, e.g. `AUTO_ACTIVE`.
    pub fn label(self) -> &'static str {
        match self {
            Self::ManualReady => "MANUAL_READY",
            Self::ManualActive => "MANUAL_ACTIVE",
            Self::AutoReady => "AUTO_READY",
            Self::AutoActive => "AUTO_ACTIVE",
            Self::Alarm => "ALARM",
            Self::Estopped => "ESTOPPED",
        }
    }
}

impl fmt::Display for ControlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ControlState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if let Ok(value) = trimmed.parse::<u8>() {
            return Self::from_u8(value).ok_or_else(|| format!("unknown control state: {value}"));
        }

        let normalized = trimmed.to_ascii_uppercase().replace('-', "_");
        let normalized = normalized.strip_prefix("STATE_").unwrap_or(&normalized);
        Self::ALL
            .into_iter()
            .find(|state| state.label() == normalized)
            .ok_or_else(|| format!("unknown control state: {trimmed}"))
    }
}

impl Serialize for ControlState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_values_are_stable() {
        let values: Vec<u8> = ControlState::ALL.iter().map(|s| s.as_u8()).collect();
        assert_eq!(values, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn from_u8_rejects_unknown_values() {
        assert_eq!(ControlState::from_u8(0), None);
        assert_eq!(ControlState::from_u8(7), None);
        assert_eq!(ControlState::from_u8(4), Some(ControlState::AutoActive));
    }

    #[test]
    fn parses_labels_and_integers() {
        assert_eq!("auto_active".parse::<ControlState>(), Ok(ControlState::AutoActive));
        assert_eq!("STATE_ESTOPPED".parse::<ControlState>(), Ok(ControlState::Estopped));
        assert_eq!("manual-ready".parse::<ControlState>(), Ok(ControlState::ManualReady));
        assert_eq!("5".parse::<ControlState>(), Ok(ControlState::Alarm));
        assert!("9".parse::<ControlState>().is_err());
        assert!("cruise".parse::<ControlState>().is_err());
    }

    #[test]
    fn display_uses_label() {
        assert_eq!(ControlState::AutoReady.to_string(), "AUTO_READY");
    }
}
