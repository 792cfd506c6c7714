//! Typed GCS2 command API over a [`GcsTransport`].
//!
//! One [`GcsDevice`] owns one session. Methods map one-to-one onto GCS
//! commands; anything that changes controller state is followed by `ERR?`
//! unless noted otherwise.

use std::collections::HashMap;
use std::time::Duration;

use tracing::{debug, info};

use super::errors::{GcsError, GcsResult, PiErrorCode};
use super::protocol;
use super::transport::{Connection, GcsTransport};

pub struct GcsDevice {
    transport: Box<dyn GcsTransport>,
}

impl GcsDevice {
    /// Open a session on the given connection.
    pub async fn connect(connection: Connection, timeout: Duration) -> GcsResult<Self> {
        info!("Connecting to GCS controller on {}", connection);
        let transport = connection.open(timeout).await?;
        Ok(Self { transport })
    }

    /// Wrap an already open transport.
    pub fn from_transport(transport: Box<dyn GcsTransport>) -> Self {
        Self { transport }
    }

    // ==================== Raw Access ====================

    /// Send a line without reading anything back.
    pub async fn send(&mut self, command: &str) -> GcsResult<()> {
        self.transport.write_line(command).await
    }

    /// Send a query and return its reply.
    pub async fn query(&mut self, command: &str) -> GcsResult<String> {
        self.transport.write_line(command).await?;
        self.transport.read_reply().await
    }

    /// Send a command and fail if the controller reports an error.
    pub async fn command(&mut self, command: &str) -> GcsResult<()> {
        self.command_allowing(command, &[]).await
    }

    /// Send a command, tolerating the listed controller error codes.
    pub async fn command_allowing(
        &mut self,
        command: &str,
        tolerated: &[PiErrorCode],
    ) -> GcsResult<()> {
        self.send(command).await?;
        self.check_error(command, tolerated).await
    }

    async fn check_error(&mut self, command: &str, tolerated: &[PiErrorCode]) -> GcsResult<()> {
        let code = self.last_error().await?;
        if code == 0 {
            return Ok(());
        }
        match PiErrorCode::from_code(code) {
            Some(err) if tolerated.contains(&err) => {
                debug!("Ignoring controller error {} ({}) after '{}'", code, err, command);
                Ok(())
            }
            _ => Err(GcsError::controller(code, command)),
        }
    }

    /// `ERR?`: read and clear the last error code (0 = no error).
    pub async fn last_error(&mut self) -> GcsResult<i32> {
        let reply = self.query("ERR?").await?;
        protocol::parse_error_code(&reply)
    }

    // ==================== Identification ====================

    /// `*IDN?`
    pub async fn idn(&mut self) -> GcsResult<String> {
        Ok(self.query("*IDN?").await?.trim().to_string())
    }

    /// `SAI?`: identifiers of all configured axes, in controller order.
    pub async fn axis_names(&mut self) -> GcsResult<Vec<String>> {
        let reply = self.query("SAI?").await?;
        Ok(protocol::parse_axis_list(&reply))
    }

    // ==================== Axis Queries ====================

    /// `POS?`: current positions of all axes.
    pub async fn positions(&mut self) -> GcsResult<HashMap<String, f64>> {
        let reply = self.query("POS?").await?;
        protocol::parse_axis_floats(&reply)
    }

    /// `LIM?`: whether each axis has limit switches.
    pub async fn limits(&mut self) -> GcsResult<HashMap<String, bool>> {
        let reply = self.query("LIM?").await?;
        protocol::parse_axis_bools(&reply)
    }

    /// `FRF?`: referencing state of all axes.
    pub async fn referenced(&mut self) -> GcsResult<HashMap<String, bool>> {
        let reply = self.query("FRF?").await?;
        protocol::parse_axis_bools(&reply)
    }

    /// `#5`: moving state of the given axes (in `SAI?` order).
    pub async fn moving(&mut self, axes: &[String]) -> GcsResult<HashMap<String, bool>> {
        self.transport.write_byte(protocol::MOTION_STATUS).await?;
        let reply = self.transport.read_reply().await?;
        protocol::parse_motion_mask(&reply, axes)
    }

    /// `TMN?`: lower soft limits.
    pub async fn travel_min(&mut self) -> GcsResult<HashMap<String, f64>> {
        let reply = self.query("TMN?").await?;
        protocol::parse_axis_floats(&reply)
    }

    /// `TMX?`: upper soft limits.
    pub async fn travel_max(&mut self) -> GcsResult<HashMap<String, f64>> {
        let reply = self.query("TMX?").await?;
        protocol::parse_axis_floats(&reply)
    }

    /// `PUN?`: position units.
    pub async fn units(&mut self) -> GcsResult<HashMap<String, String>> {
        let reply = self.query("PUN?").await?;
        protocol::parse_axis_strings(&reply)
    }

    /// `VEL?`: per-axis closed-loop velocities.
    pub async fn velocities(&mut self) -> GcsResult<HashMap<String, f64>> {
        let reply = self.query("VEL?").await?;
        protocol::parse_axis_floats(&reply)
    }

    // ==================== Motion ====================

    /// `MOV` without error check. Use [`last_error`](Self::last_error) to
    /// learn whether the move was accepted.
    pub async fn move_to_unchecked(&mut self, targets: &[(&str, f64)]) -> GcsResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        self.send(&format!("MOV {}", protocol::format_axis_args(targets)))
            .await
    }

    /// `MOV` followed by `ERR?`.
    pub async fn move_to(&mut self, targets: &[(&str, f64)]) -> GcsResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        self.command(&format!("MOV {}", protocol::format_axis_args(targets)))
            .await
    }

    /// `VMO?`: whether the targets could be reached from the current pose.
    pub async fn can_move_to(&mut self, targets: &[(&str, f64)]) -> GcsResult<bool> {
        let reply = self
            .query(&format!("VMO? {}", protocol::format_axis_args(targets)))
            .await?;
        protocol::parse_single_flag(&reply)
    }

    /// `FRF`: start reference moves on all axes.
    pub async fn find_reference(&mut self) -> GcsResult<()> {
        self.command("FRF").await
    }

    /// `HLT`: smooth stop of all axes. Does not stop reference moves.
    ///
    /// The controller flags every halt with error 10, which is not a failure.
    pub async fn halt(&mut self) -> GcsResult<()> {
        self.command_allowing("HLT", &[PiErrorCode::ControllerStopped])
            .await
    }

    /// `#24`: abrupt stop of all motion, including reference moves.
    pub async fn stop_all(&mut self) -> GcsResult<()> {
        self.transport.write_byte(protocol::STOP_ALL).await?;
        self.check_error("#24", &[PiErrorCode::ControllerStopped])
            .await
    }

    /// `VEL`: per-axis velocity.
    pub async fn set_velocity(&mut self, axis: &str, velocity: f64) -> GcsResult<()> {
        self.command(&format!("VEL {axis} {velocity}")).await
    }

    // ==================== Hexapod ====================

    /// `VLS?`: system velocity of a hexapod platform.
    pub async fn system_velocity(&mut self) -> GcsResult<f64> {
        let reply = self.query("VLS?").await?;
        protocol::parse_single_value(&reply)
    }

    /// `VLS`
    pub async fn set_system_velocity(&mut self, velocity: f64) -> GcsResult<()> {
        self.command(&format!("VLS {velocity}")).await
    }

    /// `SPI?`: pivot point coordinates (R, S, T).
    pub async fn pivot_point(&mut self) -> GcsResult<[f64; 3]> {
        let reply = self.query("SPI?").await?;
        let values = protocol::parse_axis_floats(&reply)?;
        let coord = |key: &str| {
            values
                .get(key)
                .copied()
                .ok_or_else(|| GcsError::InvalidResponse(format!("Missing pivot coordinate {key}")))
        };
        Ok([coord("R")?, coord("S")?, coord("T")?])
    }

    /// `SPI`: set pivot point coordinates (R, S, T).
    pub async fn set_pivot_point(&mut self, point: [f64; 3]) -> GcsResult<()> {
        let args = protocol::format_axis_args(&[("R", point[0]), ("S", point[1]), ("T", point[2])]);
        self.command(&format!("SPI {args}")).await
    }
}

impl std::fmt::Debug for GcsDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsDevice")
            .field("transport", &self.transport.describe())
            .finish()
    }
}
