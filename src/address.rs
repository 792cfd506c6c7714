//! Device addresses on the control-system bus.
//!
//! A device is named `domain/family/member`, optionally prefixed with the
//! database host of a fully qualified name: `tango://host:10000/lab/hexapod/ctrl`.
//! Device names are case-insensitive and stored lowercase; the host part is
//! informational only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Invalid device address '{address}': {reason}")]
pub struct AddressError {
    pub address: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress {
    host: Option<String>,
    name: String,
}

impl DeviceAddress {
    /// Normalised `domain/family/member`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `host:port` of a fully qualified address, if one was given.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }
}

impl FromStr for DeviceAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| AddressError {
            address: s.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = s.trim();
        let (host, rest) = match trimmed.strip_prefix("tango://") {
            Some(fq) => {
                let (host, rest) = fq
                    .split_once('/')
                    .ok_or_else(|| invalid("missing device name after host"))?;
                if host.is_empty() {
                    return Err(invalid("empty host"));
                }
                (Some(host.to_lowercase()), rest)
            }
            None => (None, trimmed),
        };
        let parts: Vec<&str> = rest.split('/').collect();
        if parts.len() != 3 {
            return Err(invalid("expected domain/family/member"));
        }
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty name part"));
        }
        if parts.iter().any(|p| p.chars().any(char::is_whitespace)) {
            return Err(invalid("whitespace in name"));
        }
        Ok(Self {
            host,
            name: parts.join("/").to_lowercase(),
        })
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(host) => write!(f, "tango://{}/{}", host, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl Serialize for DeviceAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for DeviceAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name_is_lowercased() {
        let addr: DeviceAddress = "Lab/Hexapod/CTRL".parse().unwrap();
        assert_eq!(addr.name(), "lab/hexapod/ctrl");
        assert_eq!(addr.host(), None);
        assert_eq!(addr.to_string(), "lab/hexapod/ctrl");
    }

    #[test]
    fn test_fully_qualified_name() {
        let addr: DeviceAddress = "tango://tango-host:10000/lab/hexapod/ctrl".parse().unwrap();
        assert_eq!(addr.name(), "lab/hexapod/ctrl");
        assert_eq!(addr.host(), Some("tango-host:10000"));
        assert_eq!(addr.to_string(), "tango://tango-host:10000/lab/hexapod/ctrl");
    }

    #[test]
    fn test_names_compare_case_insensitively() {
        let a: DeviceAddress = "lab/hexapod/ctrl".parse().unwrap();
        let b: DeviceAddress = "LAB/HEXAPOD/CTRL".parse().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "lab/hexapod", "lab//ctrl", "a/b/c/d", "tango:///a/b/c", "tango://host", "lab/hexa pod/x"] {
            assert!(bad.parse::<DeviceAddress>().is_err(), "{bad} should be rejected");
        }
    }
}
