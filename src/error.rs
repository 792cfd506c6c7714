// src/error.rs - Errors raised by controller and axis devices
use thiserror::Error;

use crate::gcs::GcsError;
use crate::state::DeviceState;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("GCS error: {0}")]
    Gcs(#[from] GcsError),
    #[error("Axis '{axis}' is not available on {device}")]
    UnknownAxis { device: String, axis: String },
    #[error("{device} is {state}: {status}")]
    NotReady {
        device: String,
        state: DeviceState,
        status: String,
    },
    #[error("Target position cannot be reached: {axis}={target}")]
    Unreachable { axis: String, target: f64 },
    #[error("Value {value} outside of [{min}, {max}]")]
    OutOfRange { value: f64, min: f64, max: f64 },
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("{device} does not support {operation}")]
    Unsupported { device: String, operation: String },
    #[error("Memorized value error: {0}")]
    Memorized(String),
}
