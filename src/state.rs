// src/state.rs - Device states as seen by control-system clients
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceState {
    /// Not connected (before init or after shutdown).
    Off,
    /// Connecting.
    Init,
    /// Ready, nothing moving.
    On,
    Moving,
    /// Usable, but needs attention (e.g. axis not referenced).
    Warn,
    /// Unusable until the next successful init.
    Fault,
}

impl DeviceState {
    /// Whether commands may be forwarded to hardware in this state.
    pub fn is_operational(self) -> bool {
        matches!(self, DeviceState::On | DeviceState::Moving | DeviceState::Warn)
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Off => "OFF",
            DeviceState::Init => "INIT",
            DeviceState::On => "ON",
            DeviceState::Moving => "MOVING",
            DeviceState::Warn => "WARN",
            DeviceState::Fault => "FAULT",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operational_states() {
        assert!(DeviceState::On.is_operational());
        assert!(DeviceState::Moving.is_operational());
        assert!(DeviceState::Warn.is_operational());
        assert!(!DeviceState::Fault.is_operational());
        assert!(!DeviceState::Off.is_operational());
        assert!(!DeviceState::Init.is_operational());
    }

    #[test]
    fn test_serialized_form_matches_display() {
        let json = serde_json::to_string(&DeviceState::Moving).unwrap();
        assert_eq!(json, "\"MOVING\"");
        assert_eq!(DeviceState::Fault.to_string(), "FAULT");
    }
}
