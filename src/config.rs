//! # Device Server Configuration
//!
//! One TOML file declares the server, the controllers and the axes bound to
//! them.
//!
//! ## Example: TOML Configuration
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0:3000"
//! memorized_path = "memorized.json"
//!
//! [controllers."lab/hexapod/ctrl"]
//! host = "192.168.0.100"
//! port = 50000
//! name = "C-887.52"
//! kind = "hexapod"
//!
//! [axes."lab/hexapod/x"]
//! controller = "tango://localhost:10000/lab/hexapod/ctrl"
//! axis = "X"
//! ```
//!
//! - Controllers are reached over TCP (`host`/`port`) or RS-232 (`serial`/`baud`).
//! - Axis names are case-sensitive and must match what the controller reports.
//!
//! ## Example: Rust Usage
//!
//! ```rust
//! use pigcs_rs::config::Config;
//! let toml_str = r#"
//! [controllers."lab/stage/ctrl"]
//! host = "10.0.0.5"
//!
//! [axes."lab/stage/a"]
//! controller = "lab/stage/ctrl"
//! axis = "A"
//! "#;
//! let config: Config = toml::from_str(toml_str).unwrap();
//! assert_eq!(config.controllers["lab/stage/ctrl"].port, 50000);
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::address::DeviceAddress;
use crate::gcs::{Connection, DEFAULT_BAUD, DEFAULT_PORT};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub controllers: BTreeMap<String, ControllerConfig>,
    #[serde(default)]
    pub axes: BTreeMap<String, AxisConfig>,
}

/// HTTP surface and persistence settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// File holding memorized attribute values; nothing is persisted if unset.
    #[serde(default)]
    pub memorized_path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            memorized_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControllerKind {
    /// Any GCS2 motor or piezo controller with independent axes.
    #[default]
    Generic,
    /// Hexapod controller (C-887 family): X Y Z U V W, system velocity, pivot point.
    Hexapod,
}

/// One physical GCS controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ControllerConfig {
    /// Controller IP address; required unless `serial` is set.
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// RS-232 device path, as an alternative to TCP.
    #[serde(default)]
    pub serial: Option<String>,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Human-readable model name, e.g. "C-887.52".
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub kind: ControllerKind,
    /// Minimum age of the cached state before the controller is polled again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_port(),
            serial: None,
            baud: default_baud(),
            name: None,
            kind: ControllerKind::default(),
            poll_interval_ms: default_poll_interval_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ControllerConfig {
    /// TCP controller at `host:port`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port,
            ..Self::default()
        }
    }

    pub fn connection(&self) -> Result<Connection, ConfigError> {
        match (&self.host, &self.serial) {
            (Some(host), None) if !host.trim().is_empty() => Ok(Connection::Tcp {
                host: host.trim().to_string(),
                port: self.port,
            }),
            (None, Some(path)) if !path.trim().is_empty() => Ok(Connection::Serial {
                path: path.trim().to_string(),
                baud: self.baud,
            }),
            (Some(_), Some(_)) => Err(ConfigError::Invalid(
                "controller must set either 'host' or 'serial', not both".to_string(),
            )),
            _ => Err(ConfigError::Invalid(
                "controller requires an IP address ('host') or a serial device ('serial')".to_string(),
            )),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// One axis bound to a controller.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AxisConfig {
    /// Address of the owning controller device.
    pub controller: String,
    /// Axis identifier on the controller (case-sensitive), e.g. X, Y, Z, U, V, W.
    pub axis: String,
    /// Initial value of the `inverted` attribute when nothing is memorized.
    #[serde(default)]
    pub inverted: bool,
}

impl Config {
    /// Check device names and axis→controller references.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen: HashMap<String, String> = HashMap::new();
        let mut controllers: HashMap<String, &str> = HashMap::new();

        for (name, controller) in &self.controllers {
            let addr = parse_address(name)?;
            register(&mut seen, &addr, name)?;
            controller
                .connection()
                .map_err(|e| ConfigError::Invalid(format!("controller '{name}': {e}")))?;
            if controller.poll_interval_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "controller '{name}': poll_interval_ms must be > 0"
                )));
            }
            if controller.timeout_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "controller '{name}': timeout_ms must be > 0"
                )));
            }
            controllers.insert(addr.name().to_string(), name.as_str());
        }

        for (name, axis) in &self.axes {
            let addr = parse_address(name)?;
            register(&mut seen, &addr, name)?;
            if axis.axis.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("axis '{name}': axis name is empty")));
            }
            if axis.axis.trim() != axis.axis {
                return Err(ConfigError::Invalid(format!(
                    "axis '{name}': axis name '{}' has surrounding whitespace",
                    axis.axis
                )));
            }
            let target = parse_address(&axis.controller)?;
            if !controllers.contains_key(target.name()) {
                return Err(ConfigError::Invalid(format!(
                    "axis '{name}': controller '{}' is not configured",
                    axis.controller
                )));
            }
        }
        Ok(())
    }
}

fn parse_address(raw: &str) -> Result<DeviceAddress, ConfigError> {
    raw.parse().map_err(|e| ConfigError::Invalid(format!("{e}")))
}

fn register(
    seen: &mut HashMap<String, String>,
    addr: &DeviceAddress,
    raw: &str,
) -> Result<(), ConfigError> {
    if let Some(previous) = seen.insert(addr.name().to_string(), raw.to_string()) {
        return Err(ConfigError::Invalid(format!(
            "duplicate device '{raw}' (already declared as '{previous}')"
        )));
    }
    Ok(())
}

fn default_bind() -> String { "0.0.0.0:3000".to_string() }
fn default_port() -> u16 { DEFAULT_PORT }
fn default_baud() -> u32 { DEFAULT_BAUD }
fn default_poll_interval_ms() -> u64 { 100 }
fn default_timeout_ms() -> u64 { 7000 }

/// Read, parse and validate a configuration file.
pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            tracing::error!("Failed to read config file '{}': {}", path, e);
            return Err(ConfigError::Io(e));
        }
    };
    let config: Config = match toml::from_str(&contents) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to parse config TOML: {}", e);
            return Err(ConfigError::Toml(e));
        }
    };
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    const HEXAPOD: &str = r#"
    [server]
    bind = "127.0.0.1:8080"

    [controllers."lab/hexapod/ctrl"]
    host = "192.168.0.100"
    name = "C-887.52"
    kind = "hexapod"

    [axes."lab/hexapod/x"]
    controller = "tango://tango-host:10000/Lab/Hexapod/Ctrl"
    axis = "X"
    inverted = true
    "#;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.server.bind, "0.0.0.0:3000");
        assert!(config.server.memorized_path.is_none());
        let ctrl = ControllerConfig::default();
        assert_eq!(ctrl.port, 50000);
        assert_eq!(ctrl.baud, 115200);
        assert_eq!(ctrl.kind, ControllerKind::Generic);
        assert_eq!(ctrl.poll_interval(), Duration::from_millis(100));
        assert_eq!(ctrl.timeout(), Duration::from_secs(7));
    }

    #[test]
    fn test_hexapod_config_parsing() {
        let config: Config = toml::from_str(HEXAPOD).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:8080");
        let ctrl = &config.controllers["lab/hexapod/ctrl"];
        assert_eq!(ctrl.kind, ControllerKind::Hexapod);
        assert_eq!(ctrl.name.as_deref(), Some("C-887.52"));
        assert_eq!(
            ctrl.connection().unwrap(),
            Connection::Tcp { host: "192.168.0.100".into(), port: 50000 }
        );
        assert!(config.axes["lab/hexapod/x"].inverted);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serial_connection() {
        let ctrl = ControllerConfig {
            serial: Some("/dev/ttyUSB0".into()),
            baud: 57600,
            ..ControllerConfig::default()
        };
        assert_eq!(
            ctrl.connection().unwrap(),
            Connection::Serial { path: "/dev/ttyUSB0".into(), baud: 57600 }
        );
    }

    #[test]
    fn test_controller_needs_exactly_one_transport() {
        assert!(ControllerConfig::default().connection().is_err());
        let both = ControllerConfig {
            host: Some("10.0.0.1".into()),
            serial: Some("/dev/ttyS0".into()),
            ..ControllerConfig::default()
        };
        assert!(both.connection().is_err());
    }

    #[test]
    fn test_dangling_axis_reference_is_rejected() {
        let mut config: Config = toml::from_str(HEXAPOD).unwrap();
        config.axes.get_mut("lab/hexapod/x").unwrap().controller = "lab/hexapod/other".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn test_duplicate_devices_differing_in_case() {
        let mut config: Config = toml::from_str(HEXAPOD).unwrap();
        config
            .controllers
            .insert("LAB/HEXAPOD/CTRL".into(), ControllerConfig::tcp("10.0.0.2", 50000));
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn test_empty_axis_name_is_rejected() {
        let mut config: Config = toml::from_str(HEXAPOD).unwrap();
        config.axes.get_mut("lab/hexapod/x").unwrap().axis = "".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_poll_interval_is_rejected() {
        let mut config: Config = toml::from_str(HEXAPOD).unwrap();
        config.controllers.get_mut("lab/hexapod/ctrl").unwrap().poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_success() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("server.toml");
        let mut file = File::create(&file_path).unwrap();
        write!(file, "{HEXAPOD}").unwrap();
        file.flush().unwrap();
        let config = load_config(file_path.to_str().unwrap()).unwrap();
        assert_eq!(config.controllers.len(), 1);
        assert_eq!(config.axes.len(), 1);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("nonexistent_file.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("bad.toml");
        let mut file = File::create(&file_path).unwrap();
        writeln!(file, "not a valid toml").unwrap();
        file.flush().unwrap();
        let result = load_config(file_path.to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }
}
