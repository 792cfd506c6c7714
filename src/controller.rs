//! Controller device: one PI GCS2 controller on the bus.
//!
//! The device owns the single session to the controller. Every axis bound to
//! it goes through here, so commands from different clients are serialised
//! on the session mutex. Reads are served from a snapshot that is refreshed
//! at most once per poll interval.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard, RwLock};
use tracing::{debug, error, info, warn};

use crate::address::DeviceAddress;
use crate::config::{ControllerConfig, ControllerKind};
use crate::error::DeviceError;
use crate::gcs::{GcsDevice, GcsError, GcsResult};
use crate::state::DeviceState;

/// Cached result of one controller poll.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub positions: HashMap<String, f64>,
    pub limits: HashMap<String, bool>,
    pub moving: HashMap<String, bool>,
    pub referenced: HashMap<String, bool>,
    /// System velocity (hexapods only).
    pub velocity: Option<f64>,
    /// Per-axis velocities (generic controllers only).
    pub axis_velocities: HashMap<String, f64>,
    /// Pivot point R, S, T (hexapods only).
    pub pivot: Option<[f64; 3]>,
    pub updated_at: DateTime<Utc>,
}

impl ControllerSnapshot {
    pub fn any_moving(&self) -> bool {
        self.moving.values().any(|&m| m)
    }
}

/// State of one axis as returned by `query_axis_state`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AxisState {
    pub position: f64,
    pub limit: bool,
    pub moving: bool,
    pub referenced: bool,
    pub velocity: Option<f64>,
}

impl AxisState {
    /// Flat `[position, limit, moving, referenced, velocity]` form.
    pub fn to_values(&self) -> [f64; 5] {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        [
            self.position,
            flag(self.limit),
            flag(self.moving),
            flag(self.referenced),
            self.velocity.unwrap_or(f64::NAN),
        ]
    }
}

/// `<axis>=<position>` move request.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRequest {
    pub axis: String,
    pub target: f64,
}

impl FromStr for PositionRequest {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (axis, target) = s.split_once('=').ok_or_else(|| {
            DeviceError::InvalidRequest(format!("expected '<axis_name>=<position>', got '{s}'"))
        })?;
        let axis = axis.trim();
        if axis.is_empty() {
            return Err(DeviceError::InvalidRequest(format!("missing axis name in '{s}'")));
        }
        let target = target
            .trim()
            .parse::<f64>()
            .map_err(|_| DeviceError::InvalidRequest(format!("invalid position in '{s}'")))?;
        if !target.is_finite() {
            return Err(DeviceError::InvalidRequest(format!("position must be finite in '{s}'")));
        }
        Ok(Self {
            axis: axis.to_string(),
            target,
        })
    }
}

#[derive(Debug)]
struct ControllerInner {
    state: DeviceState,
    status: String,
    idn: Option<String>,
    axis_names: Vec<String>,
    snapshot: Option<ControllerSnapshot>,
    last_query: Option<Instant>,
}

#[derive(Debug)]
pub struct ControllerDevice {
    address: DeviceAddress,
    config: ControllerConfig,
    session: Mutex<Option<GcsDevice>>,
    inner: RwLock<ControllerInner>,
}

impl ControllerDevice {
    pub fn new(address: DeviceAddress, config: ControllerConfig) -> Self {
        Self {
            address,
            config,
            session: Mutex::new(None),
            inner: RwLock::new(ControllerInner {
                state: DeviceState::Off,
                status: "Not initialised".to_string(),
                idn: None,
                axis_names: Vec::new(),
                snapshot: None,
                last_query: None,
            }),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn kind(&self) -> ControllerKind {
        self.config.kind
    }

    // ==================== Lifecycle ====================

    /// Establish the connection to the controller.
    ///
    /// Calling this again drops the current session and reconnects.
    pub async fn init(&self) -> Result<(), DeviceError> {
        let mut session = self.session.lock().await;
        *session = None;
        {
            let mut inner = self.inner.write().await;
            inner.state = DeviceState::Init;
            inner.status = "Connecting".to_string();
            inner.idn = None;
            inner.axis_names.clear();
            inner.snapshot = None;
            inner.last_query = None;
        }

        let connection = match self.config.connection() {
            Ok(c) => c,
            Err(e) => {
                let err = DeviceError::InvalidRequest(e.to_string());
                self.fail(&format!("Error on initialization: {err}")).await;
                return Err(err);
            }
        };
        info!("{}: connecting to GCS controller on {}", self.address, connection);

        match Self::open(&self.config).await {
            Ok((device, idn, axes)) => {
                info!("{}: connection established on {}: {}", self.address, connection, idn);
                info!("{}: axes {:?}", self.address, axes);
                *session = Some(device);
                let mut inner = self.inner.write().await;
                inner.state = DeviceState::On;
                inner.status = format!("Connected to {connection}: {idn}");
                inner.idn = Some(idn);
                inner.axis_names = axes;
                Ok(())
            }
            Err(e) => {
                self.fail(&format!("Error on initialization: {e}")).await;
                Err(e.into())
            }
        }
    }

    async fn open(config: &ControllerConfig) -> GcsResult<(GcsDevice, String, Vec<String>)> {
        let connection = config
            .connection()
            .map_err(|e| GcsError::InvalidArgument(e.to_string()))?;
        let mut device = GcsDevice::connect(connection, config.timeout()).await?;
        let idn = device.idn().await?;
        let axes = device.axis_names().await?;
        Ok((device, idn, axes))
    }

    /// Close the session.
    pub async fn shutdown(&self) {
        let mut session = self.session.lock().await;
        if session.take().is_some() {
            info!("{}: closing controller session", self.address);
        }
        self.set_state(DeviceState::Off, "Shut down").await;
    }

    async fn set_state(&self, state: DeviceState, status: &str) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.status = status.to_string();
    }

    async fn fail(&self, status: &str) {
        error!("{}: {}", self.address, status);
        self.set_state(DeviceState::Fault, status).await;
    }

    // ==================== Plain Attributes ====================

    pub async fn state(&self) -> DeviceState {
        self.inner.read().await.state
    }

    pub async fn status(&self) -> String {
        self.inner.read().await.status.clone()
    }

    pub async fn idn(&self) -> Option<String> {
        self.inner.read().await.idn.clone()
    }

    /// Axis names reported by the controller at init.
    pub async fn get_axis_names(&self) -> Result<Vec<String>, DeviceError> {
        let inner = self.inner.read().await;
        if inner.idn.is_none() {
            return Err(self.not_ready(&inner));
        }
        Ok(inner.axis_names.clone())
    }

    pub async fn snapshot(&self) -> Option<ControllerSnapshot> {
        self.inner.read().await.snapshot.clone()
    }

    fn not_ready(&self, inner: &ControllerInner) -> DeviceError {
        DeviceError::NotReady {
            device: self.address.to_string(),
            state: inner.state,
            status: inner.status.clone(),
        }
    }

    async fn check_axis(&self, axis: &str) -> Result<(), DeviceError> {
        let inner = self.inner.read().await;
        if inner.axis_names.iter().any(|a| a == axis) {
            Ok(())
        } else {
            Err(DeviceError::UnknownAxis {
                device: self.address.to_string(),
                axis: axis.to_string(),
            })
        }
    }

    fn require_hexapod(&self, operation: &str) -> Result<(), DeviceError> {
        if self.config.kind == ControllerKind::Hexapod {
            Ok(())
        } else {
            Err(DeviceError::Unsupported {
                device: self.address.to_string(),
                operation: operation.to_string(),
            })
        }
    }

    // ==================== Session Handling ====================

    /// Lock the session of an operational controller.
    async fn lock_session(&self) -> Result<MappedMutexGuard<'_, GcsDevice>, DeviceError> {
        {
            let inner = self.inner.read().await;
            if !inner.state.is_operational() {
                return Err(self.not_ready(&inner));
            }
        }
        let guard = self.session.lock().await;
        match MutexGuard::try_map(guard, |s| s.as_mut()) {
            Ok(device) => Ok(device),
            Err(_) => {
                let inner = self.inner.read().await;
                Err(self.not_ready(&inner))
            }
        }
    }

    /// Turn a GCS result into a device result, faulting on lost sessions.
    async fn track<T>(&self, result: GcsResult<T>) -> Result<T, DeviceError> {
        match result {
            Ok(value) => Ok(value),
            Err(e) if e.is_connection_error() => {
                self.fail(&format!("Communication error: {e}")).await;
                Err(e.into())
            }
            Err(e) => {
                warn!("{}: {}", self.address, e);
                Err(e.into())
            }
        }
    }

    async fn invalidate(&self) {
        self.inner.write().await.last_query = None;
    }

    // ==================== Polling ====================

    /// Refresh the cached positions, limits, move and reference states.
    ///
    /// Runs before every read; only polls hardware when the snapshot is older
    /// than the poll interval. Skipped while the device is not operational.
    pub async fn refresh(&self) -> Result<(), DeviceError> {
        if !self.is_stale().await {
            return Ok(());
        }
        let mut session = self.session.lock().await;
        // Another task may have polled while we waited for the session.
        if !self.is_stale().await {
            return Ok(());
        }
        let Some(device) = session.as_mut() else {
            return Ok(());
        };
        let axes = self.inner.read().await.axis_names.clone();
        let result = Self::poll(device, &axes, self.config.kind).await;
        match result {
            Ok(snapshot) => {
                let mut inner = self.inner.write().await;
                inner.state = if snapshot.any_moving() {
                    DeviceState::Moving
                } else {
                    DeviceState::On
                };
                debug!("{}: polled, state {}", self.address, inner.state);
                inner.snapshot = Some(snapshot);
                inner.last_query = Some(Instant::now());
                Ok(())
            }
            Err(e) => {
                if e.is_connection_error() {
                    *session = None;
                }
                drop(session);
                self.track::<()>(Err(e)).await
            }
        }
    }

    async fn is_stale(&self) -> bool {
        let inner = self.inner.read().await;
        if !inner.state.is_operational() {
            return false;
        }
        match inner.last_query {
            Some(at) => at.elapsed() > self.config.poll_interval(),
            None => true,
        }
    }

    async fn poll(
        device: &mut GcsDevice,
        axes: &[String],
        kind: ControllerKind,
    ) -> GcsResult<ControllerSnapshot> {
        let positions = device.positions().await?;
        let limits = device.limits().await?;
        let moving = device.moving(axes).await?;
        let referenced = device.referenced().await?;
        let (velocity, axis_velocities, pivot) = match kind {
            ControllerKind::Hexapod => (
                Some(device.system_velocity().await?),
                HashMap::new(),
                Some(device.pivot_point().await?),
            ),
            ControllerKind::Generic => (None, device.velocities().await?, None),
        };
        Ok(ControllerSnapshot {
            positions,
            limits,
            moving,
            referenced,
            velocity,
            axis_velocities,
            pivot,
            updated_at: Utc::now(),
        })
    }

    async fn current_snapshot(&self) -> Result<ControllerSnapshot, DeviceError> {
        self.refresh().await?;
        let inner = self.inner.read().await;
        if !inner.state.is_operational() {
            return Err(self.not_ready(&inner));
        }
        inner.snapshot.clone().ok_or_else(|| self.not_ready(&inner))
    }

    // ==================== Commands ====================

    /// Return position, limit, moving, referenced and velocity for an axis.
    pub async fn query_axis_state(&self, axis: &str) -> Result<AxisState, DeviceError> {
        self.check_axis(axis).await?;
        let snapshot = self.current_snapshot().await?;
        let missing = |what: &str| {
            DeviceError::Gcs(GcsError::InvalidResponse(format!("no {what} reported for axis {axis}")))
        };
        let velocity = match self.config.kind {
            ControllerKind::Hexapod => snapshot.velocity,
            ControllerKind::Generic => snapshot.axis_velocities.get(axis).copied(),
        };
        Ok(AxisState {
            position: *snapshot.positions.get(axis).ok_or_else(|| missing("position"))?,
            limit: *snapshot.limits.get(axis).ok_or_else(|| missing("limit state"))?,
            moving: snapshot.moving.get(axis).copied().unwrap_or(false),
            referenced: *snapshot.referenced.get(axis).ok_or_else(|| missing("reference state"))?,
            velocity,
        })
    }

    /// Return the `(lower, upper)` travel range of an axis.
    pub async fn query_axis_limits(&self, axis: &str) -> Result<(f64, f64), DeviceError> {
        self.check_axis(axis).await?;
        let mut device = self.lock_session().await?;
        let lower = device.travel_min().await;
        let upper = match lower {
            Ok(_) => device.travel_max().await,
            Err(_) => Ok(HashMap::new()),
        };
        drop(device);
        let lower = self.track(lower).await?;
        let upper = self.track(upper).await?;
        match (lower.get(axis), upper.get(axis)) {
            (Some(&min), Some(&max)) => Ok((min, max)),
            _ => Err(GcsError::InvalidResponse(format!("no travel range reported for axis {axis}")).into()),
        }
    }

    /// Return the position unit of an axis.
    pub async fn query_axis_unit(&self, axis: &str) -> Result<String, DeviceError> {
        self.check_axis(axis).await?;
        let mut device = self.lock_session().await?;
        let units = device.units().await;
        drop(device);
        let mut units = self.track(units).await?;
        units
            .remove(axis)
            .ok_or_else(|| GcsError::InvalidResponse(format!("no unit reported for axis {axis}")).into())
    }

    /// Move one axis; returns the controller error code (0: moving).
    ///
    /// Hexapod targets are checked with `VMO?` first and rejected when the
    /// platform cannot reach them.
    pub async fn set_position(&self, axis: &str, target: f64) -> Result<i32, DeviceError> {
        self.check_axis(axis).await?;
        if !target.is_finite() {
            return Err(DeviceError::InvalidRequest(format!("position must be finite, got {target}")));
        }
        let mut device = self.lock_session().await?;
        if self.config.kind == ControllerKind::Hexapod {
            let reachable = device.can_move_to(&[(axis, target)]).await;
            let reachable = match reachable {
                Ok(r) => r,
                Err(e) => {
                    drop(device);
                    return self.track(Err(e)).await;
                }
            };
            if !reachable {
                warn!("{}: target {}={} cannot be reached", self.address, axis, target);
                return Err(DeviceError::Unreachable {
                    axis: axis.to_string(),
                    target,
                });
            }
        }
        let result = match device.move_to_unchecked(&[(axis, target)]).await {
            Ok(()) => device.last_error().await,
            Err(e) => Err(e),
        };
        drop(device);
        let code = self.track(result).await?;
        info!("{}: MOVE {} -> {} (code {})", self.address, axis, target, code);
        if code == 0 {
            let mut inner = self.inner.write().await;
            inner.state = DeviceState::Moving;
            inner.last_query = None;
        }
        Ok(code)
    }

    /// Move using the `<axis_name>=<position>` string form.
    pub async fn set_position_request(&self, request: &str) -> Result<i32, DeviceError> {
        let request: PositionRequest = request.parse()?;
        self.set_position(&request.axis, request.target).await
    }

    /// Set velocity: the platform velocity on hexapods, else the axis velocity.
    pub async fn set_velocity(&self, axis: Option<&str>, velocity: f64) -> Result<(), DeviceError> {
        if !velocity.is_finite() || velocity < 0.0 {
            return Err(DeviceError::InvalidRequest(format!(
                "velocity must be a non-negative number, got {velocity}"
            )));
        }
        let result = match self.config.kind {
            ControllerKind::Hexapod => {
                let mut device = self.lock_session().await?;
                device.set_system_velocity(velocity).await
            }
            ControllerKind::Generic => {
                let axis = axis.ok_or_else(|| {
                    DeviceError::InvalidRequest("axis required to set velocity".to_string())
                })?;
                self.check_axis(axis).await?;
                let mut device = self.lock_session().await?;
                device.set_velocity(axis, velocity).await
            }
        };
        self.track(result).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Platform velocity in physical units (hexapods only).
    pub async fn velocity(&self) -> Result<f64, DeviceError> {
        self.require_hexapod("velocity")?;
        let snapshot = self.current_snapshot().await?;
        snapshot
            .velocity
            .ok_or_else(|| GcsError::InvalidResponse("no system velocity reported".to_string()).into())
    }

    /// Pivot point R, S, T (hexapods only).
    pub async fn pivot_point(&self) -> Result<[f64; 3], DeviceError> {
        self.require_hexapod("pivot point")?;
        let snapshot = self.current_snapshot().await?;
        snapshot
            .pivot
            .ok_or_else(|| GcsError::InvalidResponse("no pivot point reported".to_string()).into())
    }

    /// Set the pivot point from X, Y, Z values; extra values are ignored.
    pub async fn set_pivot_point(&self, values: &[f64]) -> Result<(), DeviceError> {
        self.require_hexapod("pivot point")?;
        let point: [f64; 3] = match values {
            [x, y, z, ..] => [*x, *y, *z],
            _ => {
                return Err(DeviceError::InvalidRequest(format!(
                    "pivot point needs 3 values, got {}",
                    values.len()
                )));
            }
        };
        let mut device = self.lock_session().await?;
        let result = device.set_pivot_point(point).await;
        drop(device);
        self.track(result).await?;
        self.invalidate().await;
        Ok(())
    }

    /// Start reference moves on all axes.
    pub async fn find_references(&self) -> Result<(), DeviceError> {
        let mut device = self.lock_session().await?;
        let result = device.find_reference().await;
        drop(device);
        self.track(result).await?;
        info!("{}: reference move started", self.address);
        self.invalidate().await;
        Ok(())
    }

    /// Halt motion smoothly. Does not stop reference moves.
    pub async fn halt(&self) -> Result<(), DeviceError> {
        let mut device = self.lock_session().await?;
        let result = device.halt().await;
        drop(device);
        self.track(result).await?;
        info!("{}: halted", self.address);
        self.invalidate().await;
        Ok(())
    }

    /// Abruptly stop all motion, including reference moves.
    pub async fn stop(&self) -> Result<(), DeviceError> {
        let mut device = self.lock_session().await?;
        let result = device.stop_all().await;
        drop(device);
        self.track(result).await?;
        warn!("{}: all motion stopped", self.address);
        self.invalidate().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_request_parsing() {
        let req: PositionRequest = "X=1.5".parse().unwrap();
        assert_eq!(req, PositionRequest { axis: "X".into(), target: 1.5 });
        let req: PositionRequest = " U = -0.25 ".parse().unwrap();
        assert_eq!(req.axis, "U");
        assert_eq!(req.target, -0.25);
    }

    #[test]
    fn test_position_request_rejects_malformed_input() {
        for bad in ["X", "=1.0", "X=", "X=abc", "X=NaN", "X=inf"] {
            assert!(
                matches!(bad.parse::<PositionRequest>(), Err(DeviceError::InvalidRequest(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn test_axis_state_values() {
        let state = AxisState {
            position: 2.0,
            limit: true,
            moving: false,
            referenced: true,
            velocity: Some(5.0),
        };
        assert_eq!(state.to_values(), [2.0, 1.0, 0.0, 1.0, 5.0]);
    }

    #[tokio::test]
    async fn test_new_controller_is_off() {
        let addr: DeviceAddress = "lab/stage/ctrl".parse().unwrap();
        let ctrl = ControllerDevice::new(addr, ControllerConfig::tcp("127.0.0.1", 1));
        assert_eq!(ctrl.state().await, DeviceState::Off);
        assert!(matches!(ctrl.get_axis_names().await, Err(DeviceError::NotReady { .. })));
        assert!(matches!(ctrl.halt().await, Err(DeviceError::NotReady { .. })));
    }
}
