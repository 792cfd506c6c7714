//! Contains the data models for API requests and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ControllerKind;
use crate::controller::{AxisState, ControllerSnapshot};
use crate::hexapod::AttributeValue;
use crate::state::DeviceState;

/// Entry of `GET /api/v1/controllers`.
#[derive(Serialize, Debug)]
pub struct ControllerSummary {
    pub address: String,
    pub name: Option<String>,
    pub kind: ControllerKind,
    pub state: DeviceState,
    pub status: String,
}

/// Full controller status.
#[derive(Serialize, Debug)]
pub struct ControllerStatusResponse {
    pub address: String,
    pub name: Option<String>,
    pub kind: ControllerKind,
    pub connection: String,
    pub state: DeviceState,
    pub status: String,
    pub idn: Option<String>,
    pub axes: Vec<String>,
    pub snapshot: Option<ControllerSnapshot>,
}

#[derive(Serialize, Debug)]
pub struct AxisNamesResponse {
    pub axes: Vec<String>,
}

/// State of one controller axis.
#[derive(Serialize, Debug)]
pub struct AxisStateResponse {
    pub axis: String,
    #[serde(flatten)]
    pub state: AxisState,
    /// `[position, limit, moving, referenced, velocity]`
    pub values: [f64; 5],
}

#[derive(Serialize, Debug)]
pub struct AxisLimitsResponse {
    pub axis: String,
    pub min: f64,
    pub max: f64,
}

#[derive(Serialize, Debug)]
pub struct AxisUnitResponse {
    pub axis: String,
    pub unit: String,
}

/// Move request: either `{"axis": "X", "target": 1.5}` or `{"request": "X=1.5"}`.
#[derive(Deserialize, Debug)]
#[serde(untagged)]
pub enum PositionCommandRequest {
    Target { axis: String, target: f64 },
    Request { request: String },
}

/// Controller error code returned by a move; 0 means motion started.
#[derive(Serialize, Debug)]
pub struct ErrorCodeResponse {
    pub error_code: i32,
}

#[derive(Deserialize, Debug)]
pub struct VelocityRequest {
    #[serde(default)]
    pub axis: Option<String>,
    pub value: f64,
}

/// Pivot point R, S, T.
#[derive(Serialize, Deserialize, Debug)]
pub struct PivotBody {
    pub pivot: Vec<f64>,
}

#[derive(Serialize, Debug)]
pub struct AttributeResponse {
    pub name: String,
    pub value: AttributeValue,
    pub unit: Option<&'static str>,
    pub writable: bool,
}

/// Body of attribute and axis writes.
#[derive(Deserialize, Debug)]
pub struct ValueRequest<T> {
    pub value: T,
}

#[derive(Serialize, Debug)]
pub struct WriteResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<i32>,
}

/// Entry of `GET /api/v1/axes`.
#[derive(Serialize, Debug)]
pub struct AxisSummary {
    pub address: String,
    pub controller: String,
    pub axis: String,
    pub state: DeviceState,
    pub status: String,
}

/// Attributes of an axis device. Hardware values are absent when they
/// cannot be read in the current state.
#[derive(Serialize, Debug)]
pub struct AxisStatusResponse {
    pub address: String,
    pub controller: String,
    pub axis: String,
    pub state: DeviceState,
    pub status: String,
    pub position: Option<f64>,
    pub velocity: Option<f64>,
    pub limit_switch: Option<bool>,
    pub referenced: Option<bool>,
    pub inverted: bool,
    pub unit: Option<String>,
    pub travel_range: Option<(f64, f64)>,
}

/// Payload of an axis `change` event.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AxisEvent {
    pub address: String,
    pub state: DeviceState,
    pub status: String,
    pub position: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl AxisEvent {
    /// Whether anything but the timestamp changed.
    pub fn differs_from(&self, other: &AxisEvent) -> bool {
        self.state != other.state || self.status != other.status || self.position != other.position
    }
}
