//! Shared fixtures: simulated controllers on localhost.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pigcs_rs::config::{AxisConfig, Config, ControllerConfig, ControllerKind};
use pigcs_rs::controller::ControllerDevice;
use pigcs_rs::simulator::{SimClock, SimServer, SimulatedController};

pub const HEXAPOD: &str = "test/hexapod/ctrl";
pub const STAGE: &str = "test/stage/ctrl";

pub async fn hexapod_sim(referenced: bool) -> SimServer {
    let mut sim = SimulatedController::hexapod();
    sim.set_referenced(referenced);
    SimServer::start("127.0.0.1:0", sim, SimClock::Manual)
        .await
        .unwrap()
}

pub async fn generic_sim(axes: &[&str], referenced: bool) -> SimServer {
    let mut sim = SimulatedController::generic(axes);
    sim.set_referenced(referenced);
    SimServer::start("127.0.0.1:0", sim, SimClock::Manual)
        .await
        .unwrap()
}

pub fn controller_config(server: &SimServer, kind: ControllerKind) -> ControllerConfig {
    ControllerConfig {
        kind,
        poll_interval_ms: 1,
        timeout_ms: 1000,
        ..ControllerConfig::tcp("127.0.0.1", server.port())
    }
}

pub async fn connected_controller(server: &SimServer, kind: ControllerKind) -> Arc<ControllerDevice> {
    let name = match kind {
        ControllerKind::Hexapod => HEXAPOD,
        ControllerKind::Generic => STAGE,
    };
    let ctrl = Arc::new(ControllerDevice::new(
        name.parse().unwrap(),
        controller_config(server, kind),
    ));
    ctrl.init().await.unwrap();
    ctrl
}

/// Hexapod controller with axis devices `test/hexapod/x` .. `test/hexapod/w`.
pub fn hexapod_config(server: &SimServer) -> Config {
    let mut config = Config::default();
    config
        .controllers
        .insert(HEXAPOD.to_string(), controller_config(server, ControllerKind::Hexapod));
    for axis in ["X", "Y", "Z", "U", "V", "W"] {
        config.axes.insert(
            format!("test/hexapod/{}", axis.to_lowercase()),
            AxisConfig {
                controller: format!("tango://localhost:10000/{HEXAPOD}"),
                axis: axis.to_string(),
                inverted: false,
            },
        );
    }
    config
}

/// Let the snapshot age past the poll interval.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(5)).await;
}
