//! Error types for the GCS2 call layer.

use std::fmt;
use thiserror::Error;

/// Result alias used throughout the GCS layer.
pub type GcsResult<T> = Result<T, GcsError>;

#[derive(Debug, Error)]
pub enum GcsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Timeout waiting for controller response")]
    Timeout,
    #[error("Connection closed by controller")]
    Disconnected,
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Controller error {code} after '{command}': {}", describe_code(.code, .error))]
    ControllerError {
        code: i32,
        error: Option<PiErrorCode>,
        command: String,
    },
}

impl GcsError {
    /// Build a controller error from a raw `ERR?` code.
    pub fn controller(code: i32, command: impl Into<String>) -> Self {
        GcsError::ControllerError {
            code,
            error: PiErrorCode::from_code(code),
            command: command.into(),
        }
    }

    /// True for errors that leave the session unusable until reconnect.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            GcsError::Io(_) | GcsError::Timeout | GcsError::Disconnected
        )
    }
}

fn describe_code(code: &i32, error: &Option<PiErrorCode>) -> String {
    match error {
        Some(e) => e.to_string(),
        None => format!("unknown error code {code}"),
    }
}

/// Controller error codes reported by `ERR?` that the server reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PiErrorCode {
    NoError,
    ParamSyntax,
    UnknownCommand,
    CommandTooLong,
    MoveWithoutRefOrNoServo,
    PosOutOfLimits,
    VelOutOfLimits,
    SetPivotNotPossible,
    ControllerStopped,
    InvalidAxisIdentifier,
    ParamOutOfRange,
}

impl PiErrorCode {
    pub fn from_code(code: i32) -> Option<Self> {
        let err = match code {
            0 => PiErrorCode::NoError,
            1 => PiErrorCode::ParamSyntax,
            2 => PiErrorCode::UnknownCommand,
            3 => PiErrorCode::CommandTooLong,
            5 => PiErrorCode::MoveWithoutRefOrNoServo,
            7 => PiErrorCode::PosOutOfLimits,
            8 => PiErrorCode::VelOutOfLimits,
            9 => PiErrorCode::SetPivotNotPossible,
            10 => PiErrorCode::ControllerStopped,
            15 => PiErrorCode::InvalidAxisIdentifier,
            17 => PiErrorCode::ParamOutOfRange,
            _ => return None,
        };
        Some(err)
    }

    pub fn code(self) -> i32 {
        match self {
            PiErrorCode::NoError => 0,
            PiErrorCode::ParamSyntax => 1,
            PiErrorCode::UnknownCommand => 2,
            PiErrorCode::CommandTooLong => 3,
            PiErrorCode::MoveWithoutRefOrNoServo => 5,
            PiErrorCode::PosOutOfLimits => 7,
            PiErrorCode::VelOutOfLimits => 8,
            PiErrorCode::SetPivotNotPossible => 9,
            PiErrorCode::ControllerStopped => 10,
            PiErrorCode::InvalidAxisIdentifier => 15,
            PiErrorCode::ParamOutOfRange => 17,
        }
    }
}

impl fmt::Display for PiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PiErrorCode::NoError => "No error",
            PiErrorCode::ParamSyntax => "Parameter syntax error",
            PiErrorCode::UnknownCommand => "Unknown command",
            PiErrorCode::CommandTooLong => "Command length out of limits",
            PiErrorCode::MoveWithoutRefOrNoServo => {
                "Unallowed move attempted on unreferenced axis, or move attempted with servo off"
            }
            PiErrorCode::PosOutOfLimits => "Position out of limits",
            PiErrorCode::VelOutOfLimits => "Velocity out of limits",
            PiErrorCode::SetPivotNotPossible => {
                "Attempt to set pivot point while U, V and W not all 0"
            }
            PiErrorCode::ControllerStopped => "Controller was stopped by command",
            PiErrorCode::InvalidAxisIdentifier => "Invalid axis identifier",
            PiErrorCode::ParamOutOfRange => "Parameter out of range",
        };
        f.write_str(text)
    }
}
