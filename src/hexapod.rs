//! Dynamic attributes of a hexapod controller.
//!
//! A hexapod exposes its six axes directly on the controller device:
//! `x`, `y`, `z` (mm) and `u`, `v`, `w` (deg), plus `lim_<a>`, `mov_<a>`,
//! `velocity` and `pivot_x`/`pivot_y`/`pivot_z`. Names are case-insensitive.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::ControllerKind;
use crate::controller::ControllerDevice;
use crate::error::DeviceError;

pub const AXES: [&str; 6] = ["X", "Y", "Z", "U", "V", "W"];
const PIVOT: [&str; 3] = ["x", "y", "z"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HexapodAttribute {
    /// Position of one of the six axes (index into [`AXES`]).
    Position(usize),
    Limit(usize),
    Moving(usize),
    Velocity,
    /// Pivot coordinate R, S or T.
    Pivot(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Float(f64),
    Bool(bool),
}

impl HexapodAttribute {
    /// All attributes, in display order.
    pub fn all() -> Vec<HexapodAttribute> {
        let mut attrs: Vec<_> = (0..AXES.len()).map(HexapodAttribute::Position).collect();
        attrs.extend((0..AXES.len()).map(HexapodAttribute::Limit));
        attrs.extend((0..AXES.len()).map(HexapodAttribute::Moving));
        attrs.push(HexapodAttribute::Velocity);
        attrs.extend((0..PIVOT.len()).map(HexapodAttribute::Pivot));
        attrs
    }

    pub fn unit(&self) -> Option<&'static str> {
        match self {
            HexapodAttribute::Position(i) if *i < 3 => Some("mm"),
            HexapodAttribute::Position(_) => Some("deg"),
            HexapodAttribute::Velocity => Some("mm/s"),
            HexapodAttribute::Pivot(_) => Some("mm"),
            HexapodAttribute::Limit(_) | HexapodAttribute::Moving(_) => None,
        }
    }

    pub fn writable(&self) -> bool {
        matches!(self, HexapodAttribute::Position(_) | HexapodAttribute::Velocity)
    }

    /// Read the attribute from the controller snapshot.
    pub async fn read(&self, ctrl: &ControllerDevice) -> Result<AttributeValue, DeviceError> {
        require_hexapod(ctrl)?;
        let value = match *self {
            HexapodAttribute::Position(i) => {
                AttributeValue::Float(ctrl.query_axis_state(axis_at(i)?).await?.position)
            }
            HexapodAttribute::Limit(i) => {
                AttributeValue::Bool(ctrl.query_axis_state(axis_at(i)?).await?.limit)
            }
            HexapodAttribute::Moving(i) => {
                AttributeValue::Bool(ctrl.query_axis_state(axis_at(i)?).await?.moving)
            }
            HexapodAttribute::Velocity => AttributeValue::Float(ctrl.velocity().await?),
            HexapodAttribute::Pivot(i) => {
                if i >= PIVOT.len() {
                    return Err(out_of_range(*self));
                }
                AttributeValue::Float(ctrl.pivot_point().await?[i])
            }
        };
        Ok(value)
    }

    /// Write the attribute. Position writes return the controller error code.
    pub async fn write(&self, ctrl: &ControllerDevice, value: f64) -> Result<Option<i32>, DeviceError> {
        require_hexapod(ctrl)?;
        match *self {
            HexapodAttribute::Position(i) => Ok(Some(ctrl.set_position(axis_at(i)?, value).await?)),
            HexapodAttribute::Velocity => {
                ctrl.set_velocity(None, value).await?;
                Ok(None)
            }
            _ => Err(DeviceError::InvalidRequest(format!("attribute '{self}' is read-only"))),
        }
    }
}

fn require_hexapod(ctrl: &ControllerDevice) -> Result<(), DeviceError> {
    if ctrl.kind() == ControllerKind::Hexapod {
        Ok(())
    } else {
        Err(DeviceError::Unsupported {
            device: ctrl.address().to_string(),
            operation: "hexapod attributes".to_string(),
        })
    }
}

fn axis_at(i: usize) -> Result<&'static str, DeviceError> {
    AXES.get(i)
        .copied()
        .ok_or_else(|| DeviceError::InvalidRequest(format!("no hexapod axis with index {i}")))
}

fn out_of_range(attr: HexapodAttribute) -> DeviceError {
    DeviceError::InvalidRequest(format!("attribute index out of range: {attr:?}"))
}

fn axis_index(name: &str) -> Option<usize> {
    AXES.iter().position(|a| a.eq_ignore_ascii_case(name))
}

impl FromStr for HexapodAttribute {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let parsed = if name == "velocity" {
            Some(HexapodAttribute::Velocity)
        } else if let Some(axis) = name.strip_prefix("lim_") {
            axis_index(axis).map(HexapodAttribute::Limit)
        } else if let Some(axis) = name.strip_prefix("mov_") {
            axis_index(axis).map(HexapodAttribute::Moving)
        } else if let Some(coord) = name.strip_prefix("pivot_") {
            PIVOT.iter().position(|c| *c == coord).map(HexapodAttribute::Pivot)
        } else {
            axis_index(&name).map(HexapodAttribute::Position)
        };
        parsed.ok_or_else(|| DeviceError::InvalidRequest(format!("unknown attribute '{s}'")))
    }
}

impl fmt::Display for HexapodAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let axis = |i: usize| AXES.get(i).map_or("?".to_string(), |a| a.to_ascii_lowercase());
        match *self {
            HexapodAttribute::Position(i) => write!(f, "{}", axis(i)),
            HexapodAttribute::Limit(i) => write!(f, "lim_{}", axis(i)),
            HexapodAttribute::Moving(i) => write!(f, "mov_{}", axis(i)),
            HexapodAttribute::Velocity => f.write_str("velocity"),
            HexapodAttribute::Pivot(i) => write!(f, "pivot_{}", PIVOT.get(i).unwrap_or(&"?")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("X".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Position(0));
        assert_eq!("w".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Position(5));
        assert_eq!("LIM_Y".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Limit(1));
        assert_eq!("Mov_u".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Moving(3));
        assert_eq!("Velocity".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Velocity);
        assert_eq!("pivot_Z".parse::<HexapodAttribute>().unwrap(), HexapodAttribute::Pivot(2));
    }

    #[test]
    fn test_unknown_attributes() {
        for bad in ["", "a", "lim_q", "pivot_w", "mov_", "position"] {
            assert!(bad.parse::<HexapodAttribute>().is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_names_round_trip_through_display() {
        for attr in HexapodAttribute::all() {
            assert_eq!(attr.to_string().parse::<HexapodAttribute>().unwrap(), attr);
        }
        assert_eq!(HexapodAttribute::all().len(), 22);
    }

    #[tokio::test]
    async fn test_out_of_range_index_is_an_error() {
        let ctrl = ControllerDevice::new(
            "lab/hexapod/ctrl".parse().unwrap(),
            ControllerConfig {
                kind: ControllerKind::Hexapod,
                ..ControllerConfig::tcp("127.0.0.1", 1)
            },
        );
        for attr in [
            HexapodAttribute::Position(6),
            HexapodAttribute::Limit(9),
            HexapodAttribute::Moving(6),
            HexapodAttribute::Pivot(3),
        ] {
            assert!(matches!(attr.read(&ctrl).await, Err(DeviceError::InvalidRequest(_))));
        }
        assert!(matches!(
            HexapodAttribute::Position(6).write(&ctrl, 1.0).await,
            Err(DeviceError::InvalidRequest(_))
        ));
        assert_eq!(HexapodAttribute::Position(6).to_string(), "?");
    }

    #[test]
    fn test_units_and_access() {
        assert_eq!(HexapodAttribute::Position(2).unit(), Some("mm"));
        assert_eq!(HexapodAttribute::Position(3).unit(), Some("deg"));
        assert_eq!(HexapodAttribute::Limit(0).unit(), None);
        assert!(HexapodAttribute::Velocity.writable());
        assert!(!HexapodAttribute::Pivot(0).writable());
        assert!(!HexapodAttribute::Moving(0).writable());
    }
}
