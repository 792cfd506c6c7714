//! Axis device: one named axis of a controller.
//!
//! All hardware access goes through the owning [`ControllerDevice`]. The
//! axis adds the user-facing view: sign inversion, the travel range check
//! and its own state (WARN while not referenced).

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::address::DeviceAddress;
use crate::config::ControllerKind;
use crate::controller::{AxisState, ControllerDevice};
use crate::error::DeviceError;
use crate::memorized::MemorizedStore;
use crate::state::DeviceState;

const INVERTED: &str = "inverted";

#[derive(Debug)]
struct AxisInner {
    state: DeviceState,
    status: String,
    inverted: bool,
    travel: Option<(f64, f64)>,
    unit: Option<String>,
}

#[derive(Debug)]
pub struct AxisDevice {
    address: DeviceAddress,
    axis: String,
    controller: Arc<ControllerDevice>,
    memorized: Arc<MemorizedStore>,
    default_inverted: bool,
    inner: RwLock<AxisInner>,
}

impl AxisDevice {
    pub fn new(
        address: DeviceAddress,
        axis: impl Into<String>,
        controller: Arc<ControllerDevice>,
        memorized: Arc<MemorizedStore>,
        default_inverted: bool,
    ) -> Self {
        Self {
            address,
            axis: axis.into(),
            controller,
            memorized,
            default_inverted,
            inner: RwLock::new(AxisInner {
                state: DeviceState::Off,
                status: "Not initialised".to_string(),
                inverted: default_inverted,
                travel: None,
                unit: None,
            }),
        }
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.address
    }

    /// Axis identifier on the controller.
    pub fn axis(&self) -> &str {
        &self.axis
    }

    pub fn controller(&self) -> &Arc<ControllerDevice> {
        &self.controller
    }

    pub async fn state(&self) -> DeviceState {
        self.inner.read().await.state
    }

    pub async fn status(&self) -> String {
        self.inner.read().await.status.clone()
    }

    /// Bind to the controller axis and load its static properties.
    pub async fn init(&self) -> Result<(), DeviceError> {
        self.set_state(DeviceState::Init, "Initialising").await;

        let names = match self.controller.get_axis_names().await {
            Ok(names) => names,
            Err(e) => {
                self.fail(format!("Controller {} not ready: {e}", self.controller.address()))
                    .await;
                return Err(e);
            }
        };
        if !names.iter().any(|n| n == &self.axis) {
            self.fail(format!("Axis {} not in {:?}", self.axis, names)).await;
            return Err(DeviceError::UnknownAxis {
                device: self.controller.address().to_string(),
                axis: self.axis.clone(),
            });
        }

        let inverted = self
            .memorized
            .get_bool(self.address.name(), INVERTED)
            .unwrap_or(self.default_inverted);

        let properties = async {
            let travel = self.controller.query_axis_limits(&self.axis).await?;
            let unit = self.controller.query_axis_unit(&self.axis).await?;
            Ok::<_, DeviceError>((travel, unit))
        };
        let (travel, unit) = match properties.await {
            Ok(p) => p,
            Err(e) => {
                self.fail(format!("Cannot read axis {} properties: {e}", self.axis)).await;
                return Err(e);
            }
        };

        {
            let mut inner = self.inner.write().await;
            inner.inverted = inverted;
            inner.travel = Some(travel);
            inner.unit = Some(unit);
            inner.state = DeviceState::On;
            inner.status = format!("Axis {} on {}", self.axis, self.controller.address());
        }
        info!(
            "{}: bound to axis {} of {} (inverted: {})",
            self.address,
            self.axis,
            self.controller.address(),
            inverted
        );
        self.refresh().await
    }

    async fn set_state(&self, state: DeviceState, status: &str) {
        let mut inner = self.inner.write().await;
        inner.state = state;
        inner.status = status.to_string();
    }

    async fn fail(&self, status: String) {
        error!("{}: {}", self.address, status);
        self.set_state(DeviceState::Fault, &status).await;
    }

    async fn require_operational(&self) -> Result<(), DeviceError> {
        let inner = self.inner.read().await;
        if inner.state.is_operational() {
            Ok(())
        } else {
            Err(DeviceError::NotReady {
                device: self.address.to_string(),
                state: inner.state,
                status: inner.status.clone(),
            })
        }
    }

    /// Update the axis state from the controller snapshot.
    pub async fn refresh(&self) -> Result<(), DeviceError> {
        self.read_state().await.map(|_| ())
    }

    async fn read_state(&self) -> Result<AxisState, DeviceError> {
        self.require_operational().await?;
        let axis_state = match self.controller.query_axis_state(&self.axis).await {
            Ok(s) => s,
            Err(e @ DeviceError::NotReady { .. }) => {
                self.fail(format!("Controller {} not ready: {e}", self.controller.address()))
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };
        let mut inner = self.inner.write().await;
        let (state, status) = if !axis_state.referenced {
            (DeviceState::Warn, format!("Axis {} is not referenced", self.axis))
        } else if axis_state.moving {
            (DeviceState::Moving, format!("Axis {} is moving", self.axis))
        } else {
            (DeviceState::On, format!("Axis {} on {}", self.axis, self.controller.address()))
        };
        if inner.state != state {
            info!("{}: {} -> {}", self.address, inner.state, state);
        }
        inner.state = state;
        inner.status = status;
        Ok(axis_state)
    }

    async fn sign(&self) -> f64 {
        if self.inner.read().await.inverted { -1.0 } else { 1.0 }
    }

    // ==================== Attributes ====================

    /// Raw `[position, limit, moving, referenced, velocity]` from the controller.
    pub async fn axis_state(&self) -> Result<AxisState, DeviceError> {
        self.read_state().await
    }

    /// User position; the sign is flipped when the axis is inverted.
    pub async fn position(&self) -> Result<f64, DeviceError> {
        let axis_state = self.read_state().await?;
        Ok(self.sign().await * axis_state.position)
    }

    /// Move to a user position; returns the controller error code.
    pub async fn set_position(&self, position: f64) -> Result<i32, DeviceError> {
        self.require_operational().await?;
        if !position.is_finite() {
            return Err(DeviceError::InvalidRequest(format!("position must be finite, got {position}")));
        }
        let raw = self.sign().await * position;
        if let Some((min, max)) = self.travel_range().await {
            if raw < min || raw > max {
                warn!("{}: target {} outside of [{}, {}]", self.address, raw, min, max);
                return Err(DeviceError::OutOfRange { value: raw, min, max });
            }
        }
        let code = self.controller.set_position(&self.axis, raw).await?;
        if code == 0 {
            self.set_state(DeviceState::Moving, &format!("Axis {} is moving", self.axis))
                .await;
        } else {
            warn!("{}: move to {} rejected with code {}", self.address, raw, code);
        }
        Ok(code)
    }

    /// Axis velocity; the platform velocity on hexapods.
    pub async fn velocity(&self) -> Result<f64, DeviceError> {
        let axis_state = self.read_state().await?;
        axis_state.velocity.ok_or_else(|| DeviceError::Unsupported {
            device: self.address.to_string(),
            operation: "velocity".to_string(),
        })
    }

    pub async fn set_velocity(&self, velocity: f64) -> Result<(), DeviceError> {
        self.require_operational().await?;
        let axis = match self.controller.kind() {
            ControllerKind::Hexapod => None,
            ControllerKind::Generic => Some(self.axis.as_str()),
        };
        self.controller.set_velocity(axis, velocity).await
    }

    /// Whether the axis has limit switches.
    pub async fn limit_switch(&self) -> Result<bool, DeviceError> {
        Ok(self.read_state().await?.limit)
    }

    pub async fn referenced(&self) -> Result<bool, DeviceError> {
        Ok(self.read_state().await?.referenced)
    }

    pub async fn inverted(&self) -> bool {
        self.inner.read().await.inverted
    }

    /// Flip the sign convention. The value is memorized across restarts.
    pub async fn set_inverted(&self, inverted: bool) -> Result<(), DeviceError> {
        self.memorized.set(self.address.name(), INVERTED, inverted)?;
        self.inner.write().await.inverted = inverted;
        info!("{}: inverted = {}", self.address, inverted);
        Ok(())
    }

    /// Raw travel range `(min, max)` read at init.
    pub async fn travel_range(&self) -> Option<(f64, f64)> {
        self.inner.read().await.travel
    }

    pub async fn unit(&self) -> Option<String> {
        self.inner.read().await.unit.clone()
    }

    // ==================== Commands ====================

    /// Smooth halt of the controller this axis belongs to.
    pub async fn halt(&self) -> Result<(), DeviceError> {
        self.require_operational().await?;
        self.controller.halt().await
    }

    /// Abrupt stop of the controller this axis belongs to.
    pub async fn stop(&self) -> Result<(), DeviceError> {
        self.require_operational().await?;
        self.controller.stop().await
    }

    /// Unbind from the controller.
    pub async fn shutdown(&self) {
        self.set_state(DeviceState::Off, "Shut down").await;
    }
}
