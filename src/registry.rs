// src/registry.rs - Device registry built from the configuration
use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::address::DeviceAddress;
use crate::axis::AxisDevice;
use crate::config::{Config, ConfigError};
use crate::controller::ControllerDevice;
use crate::error::DeviceError;
use crate::memorized::MemorizedStore;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown device '{0}'")]
    UnknownDevice(String),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Device(#[from] DeviceError),
}

/// All controller and axis devices served by this process, keyed by their
/// normalised device name.
#[derive(Debug)]
pub struct DeviceRegistry {
    controllers: BTreeMap<String, Arc<ControllerDevice>>,
    axes: BTreeMap<String, Arc<AxisDevice>>,
}

impl DeviceRegistry {
    pub fn from_config(config: &Config) -> Result<Self, RegistryError> {
        config.validate()?;
        let memorized = match &config.server.memorized_path {
            Some(path) => MemorizedStore::open(path)?,
            None => MemorizedStore::in_memory(),
        };
        Self::with_store(config, Arc::new(memorized))
    }

    /// Build the registry around an existing memorized store.
    fn with_store(config: &Config, memorized: Arc<MemorizedStore>) -> Result<Self, RegistryError> {
        config.validate()?;
        let mut controllers = BTreeMap::new();
        for (name, ctrl_config) in &config.controllers {
            let address = parse(name)?;
            let device = ControllerDevice::new(address.clone(), ctrl_config.clone());
            controllers.insert(address.name().to_string(), Arc::new(device));
        }

        let mut axes = BTreeMap::new();
        for (name, axis_config) in &config.axes {
            let address = parse(name)?;
            let target = parse(&axis_config.controller)?;
            let controller = controllers
                .get(target.name())
                .cloned()
                .ok_or_else(|| RegistryError::UnknownDevice(axis_config.controller.clone()))?;
            let device = AxisDevice::new(
                address.clone(),
                axis_config.axis.clone(),
                controller,
                memorized.clone(),
                axis_config.inverted,
            );
            axes.insert(address.name().to_string(), Arc::new(device));
        }

        info!(
            "Registered {} controller(s) and {} axis device(s)",
            controllers.len(),
            axes.len()
        );
        Ok(Self { controllers, axes })
    }

    pub fn controllers(&self) -> impl Iterator<Item = &Arc<ControllerDevice>> {
        self.controllers.values()
    }

    pub fn axes(&self) -> impl Iterator<Item = &Arc<AxisDevice>> {
        self.axes.values()
    }

    /// Look up a controller; the name may be fully qualified and in any case.
    pub fn controller(&self, name: &str) -> Result<Arc<ControllerDevice>, RegistryError> {
        let address: DeviceAddress = name
            .parse()
            .map_err(|_| RegistryError::UnknownDevice(name.to_string()))?;
        self.controllers
            .get(address.name())
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
    }

    pub fn axis(&self, name: &str) -> Result<Arc<AxisDevice>, RegistryError> {
        let address: DeviceAddress = name
            .parse()
            .map_err(|_| RegistryError::UnknownDevice(name.to_string()))?;
        self.axes
            .get(address.name())
            .cloned()
            .ok_or_else(|| RegistryError::UnknownDevice(name.to_string()))
    }

    /// Axis devices bound to the given controller.
    pub fn axes_of(&self, controller: &ControllerDevice) -> Vec<Arc<AxisDevice>> {
        self.axes
            .values()
            .filter(|a| a.controller().address().name() == controller.address().name())
            .cloned()
            .collect()
    }

    /// Initialise a controller, then every axis bound to it.
    pub async fn init_controller(&self, name: &str) -> Result<(), RegistryError> {
        let controller = self.controller(name)?;
        let result = controller.init().await;
        for axis in self.axes_of(&controller) {
            if let Err(e) = axis.init().await {
                warn!("{}: init failed: {}", axis.address(), e);
            }
        }
        result.map_err(RegistryError::from)
    }

    /// Initialise every device. Failures leave the device in FAULT and are
    /// logged; the remaining devices are still initialised.
    pub async fn init_all(&self) {
        for controller in self.controllers.values() {
            if let Err(e) = controller.init().await {
                warn!("{}: init failed: {}", controller.address(), e);
            }
        }
        for axis in self.axes.values() {
            if let Err(e) = axis.init().await {
                warn!("{}: init failed: {}", axis.address(), e);
            }
        }
    }

    pub async fn shutdown(&self) {
        for axis in self.axes.values() {
            axis.shutdown().await;
        }
        for controller in self.controllers.values() {
            controller.shutdown().await;
        }
        info!("All devices shut down");
    }
}

fn parse(name: &str) -> Result<DeviceAddress, RegistryError> {
    name.parse()
        .map_err(|e: crate::address::AddressError| RegistryError::Config(ConfigError::Invalid(e.to_string())))
}
