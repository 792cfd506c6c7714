//! Simulated PI GCS2 controller.
//!
//! [`SimulatedController`] interprets GCS2 command lines the way a C-887
//! hexapod or a generic motor controller answers them, including the error
//! codes reported through `ERR?`. Motion advances on an explicit clock so
//! tests can step it deterministically. [`server::SimServer`] puts it on TCP.

pub mod server;

use std::time::Duration;

use tracing::debug;

use crate::config::ControllerKind;
use crate::gcs::PiErrorCode;

pub use server::{SimClock, SimServer};

/// One simulated axis.
#[derive(Debug, Clone)]
pub struct SimAxis {
    pub name: String,
    pub position: f64,
    pub target: f64,
    pub velocity: f64,
    pub min: f64,
    pub max: f64,
    pub unit: String,
    pub referenced: bool,
    pub has_limit_switch: bool,
    referencing: bool,
}

impl SimAxis {
    pub fn new(name: impl Into<String>, min: f64, max: f64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: 0.0,
            target: 0.0,
            velocity: 10.0,
            min,
            max,
            unit: unit.into(),
            referenced: false,
            has_limit_switch: true,
            referencing: false,
        }
    }

    pub fn is_moving(&self) -> bool {
        self.position != self.target
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedController {
    kind: ControllerKind,
    idn: String,
    axes: Vec<SimAxis>,
    last_error: i32,
    system_velocity: f64,
    pivot: [f64; 3],
    /// Radius of the reachable X/Y workspace of a hexapod (mm).
    workspace_radius: f64,
}

impl SimulatedController {
    /// C-887 style hexapod with axes X Y Z U V W.
    pub fn hexapod() -> Self {
        let axes = vec![
            SimAxis::new("X", -50.0, 50.0, "mm"),
            SimAxis::new("Y", -50.0, 50.0, "mm"),
            SimAxis::new("Z", -25.0, 25.0, "mm"),
            SimAxis::new("U", -15.0, 15.0, "deg"),
            SimAxis::new("V", -15.0, 15.0, "deg"),
            SimAxis::new("W", -30.0, 30.0, "deg"),
        ]
        .into_iter()
        .map(|mut a| {
            a.has_limit_switch = false;
            a
        })
        .collect();
        Self {
            kind: ControllerKind::Hexapod,
            idn: "(c)2024 Physik Instrumente (PI) GmbH & Co. KG, C-887.52, 0, 2.4.0.0".to_string(),
            axes,
            last_error: 0,
            system_velocity: 10.0,
            pivot: [0.0; 3],
            workspace_radius: 50.0,
        }
    }

    /// Generic controller with independent linear axes.
    pub fn generic<S: AsRef<str>>(axes: &[S]) -> Self {
        Self {
            kind: ControllerKind::Generic,
            idn: "(c)2024 Physik Instrumente (PI) GmbH & Co. KG, C-884.4DC, 0, 1.1.3".to_string(),
            axes: axes
                .iter()
                .map(|a| SimAxis::new(a.as_ref(), -100.0, 100.0, "mm"))
                .collect(),
            last_error: 0,
            system_velocity: 0.0,
            pivot: [0.0; 3],
            workspace_radius: f64::INFINITY,
        }
    }

    pub fn kind(&self) -> ControllerKind {
        self.kind
    }

    pub fn axes(&self) -> &[SimAxis] {
        &self.axes
    }

    pub fn axis(&self, name: &str) -> Option<&SimAxis> {
        self.axes.iter().find(|a| a.name == name)
    }

    pub fn axis_mut(&mut self, name: &str) -> Option<&mut SimAxis> {
        self.axes.iter_mut().find(|a| a.name == name)
    }

    /// Mark every axis as referenced.
    pub fn set_referenced(&mut self, referenced: bool) {
        for axis in &mut self.axes {
            axis.referenced = referenced;
        }
    }

    pub fn last_error(&self) -> i32 {
        self.last_error
    }

    pub fn any_moving(&self) -> bool {
        self.axes.iter().any(SimAxis::is_moving)
    }

    /// Advance motion by `dt`.
    pub fn advance(&mut self, dt: Duration) {
        let secs = dt.as_secs_f64();
        let system_velocity = self.system_velocity;
        let hexapod = self.kind == ControllerKind::Hexapod;
        for axis in &mut self.axes {
            if axis.is_moving() {
                let velocity = if hexapod { system_velocity } else { axis.velocity };
                let step = velocity * secs;
                let remaining = axis.target - axis.position;
                if remaining.abs() <= step {
                    axis.position = axis.target;
                } else {
                    axis.position += step.copysign(remaining);
                }
            }
            if axis.referencing && !axis.is_moving() {
                axis.referencing = false;
                axis.referenced = true;
            }
        }
    }

    // ==================== Command Interpreter ====================

    /// `#5`: hex mask of moving axes.
    pub fn motion_status(&self) -> String {
        let mask = self
            .axes
            .iter()
            .enumerate()
            .filter(|(_, a)| a.is_moving())
            .fold(0u64, |mask, (i, _)| mask | (1 << i));
        format!("{mask:X}\n")
    }

    /// `#24`: stop everything, including reference moves.
    pub fn stop_all(&mut self) {
        for axis in &mut self.axes {
            axis.target = axis.position;
            axis.referencing = false;
        }
        self.last_error = PiErrorCode::ControllerStopped.code();
    }

    /// Handle one command line. Returns the reply, if the command has one.
    pub fn handle_line(&mut self, line: &str) -> Option<String> {
        let mut tokens = line.split_whitespace();
        let command = tokens.next()?;
        let args: Vec<&str> = tokens.collect();
        debug!("sim <- {}", line.trim());
        let reply = match command {
            "*IDN?" => Some(vec![self.idn.clone()]),
            "ERR?" => {
                let code = std::mem::take(&mut self.last_error);
                Some(vec![code.to_string()])
            }
            "SAI?" => Some(self.axes.iter().map(|a| a.name.clone()).collect()),
            "POS?" => self.axis_query(&args, |a| format!("{:.6}", a.position)),
            "LIM?" => self.axis_query(&args, |a| flag(a.has_limit_switch)),
            "FRF?" => self.axis_query(&args, |a| flag(a.referenced)),
            "TMN?" => self.axis_query(&args, |a| format!("{:.6}", a.min)),
            "TMX?" => self.axis_query(&args, |a| format!("{:.6}", a.max)),
            "PUN?" => self.axis_query(&args, |a| a.unit.clone()),
            "VEL?" if self.kind == ControllerKind::Generic => {
                self.axis_query(&args, |a| format!("{:.6}", a.velocity))
            }
            "VEL" if self.kind == ControllerKind::Generic => {
                self.set_axis_velocities(&args);
                None
            }
            "VLS?" if self.kind == ControllerKind::Hexapod => {
                Some(vec![format!("{:.6}", self.system_velocity)])
            }
            "VLS" if self.kind == ControllerKind::Hexapod => {
                match args.first().and_then(|v| v.parse::<f64>().ok()) {
                    Some(v) if v > 0.0 => self.system_velocity = v,
                    Some(_) => self.fail(PiErrorCode::VelOutOfLimits),
                    None => self.fail(PiErrorCode::ParamSyntax),
                }
                None
            }
            "SPI?" if self.kind == ControllerKind::Hexapod => Some(
                ["R", "S", "T"]
                    .iter()
                    .zip(self.pivot)
                    .map(|(k, v)| format!("{k}={v:.6}"))
                    .collect(),
            ),
            "SPI" if self.kind == ControllerKind::Hexapod => {
                self.set_pivot(&args);
                None
            }
            "VMO?" if self.kind == ControllerKind::Hexapod => {
                let reachable = match self.parse_targets(&args) {
                    Ok(targets) => self.reachable(&targets),
                    Err(code) => {
                        self.fail(code);
                        false
                    }
                };
                Some(vec![flag(reachable)])
            }
            "MOV" => {
                self.start_move(&args);
                None
            }
            "FRF" => {
                self.start_reference(&args);
                None
            }
            "HLT" => {
                for axis in &mut self.axes {
                    if axis.is_moving() && !axis.referencing {
                        axis.target = axis.position;
                    }
                }
                self.fail(PiErrorCode::ControllerStopped);
                None
            }
            "STP" => {
                self.stop_all();
                None
            }
            _ => {
                self.fail(PiErrorCode::UnknownCommand);
                None
            }
        };
        reply.map(|lines| format_reply(&lines))
    }

    fn fail(&mut self, code: PiErrorCode) {
        self.last_error = code.code();
    }

    fn axis_query(&mut self, args: &[&str], value: impl Fn(&SimAxis) -> String) -> Option<Vec<String>> {
        let mut indices = Vec::new();
        for name in args {
            match self.axes.iter().position(|a| a.name == *name) {
                Some(i) => indices.push(i),
                None => {
                    self.fail(PiErrorCode::InvalidAxisIdentifier);
                    return None;
                }
            }
        }
        if indices.is_empty() {
            indices = (0..self.axes.len()).collect();
        }
        Some(
            indices
                .into_iter()
                .map(|i| format!("{}={}", self.axes[i].name, value(&self.axes[i])))
                .collect(),
        )
    }

    fn parse_targets(&self, args: &[&str]) -> Result<Vec<(usize, f64)>, PiErrorCode> {
        if args.is_empty() || args.len() % 2 != 0 {
            return Err(PiErrorCode::ParamSyntax);
        }
        args.chunks(2)
            .map(|pair| {
                let index = self
                    .axes
                    .iter()
                    .position(|a| a.name == pair[0])
                    .ok_or(PiErrorCode::InvalidAxisIdentifier)?;
                let value = pair[1].parse::<f64>().map_err(|_| PiErrorCode::ParamSyntax)?;
                Ok((index, value))
            })
            .collect()
    }

    fn reachable(&self, targets: &[(usize, f64)]) -> bool {
        let mut pose: Vec<f64> = self.axes.iter().map(|a| a.target).collect();
        for &(i, value) in targets {
            let axis = &self.axes[i];
            if value < axis.min || value > axis.max {
                return false;
            }
            pose[i] = value;
        }
        if self.kind == ControllerKind::Hexapod {
            let (x, y) = (pose[0], pose[1]);
            return x.hypot(y) <= self.workspace_radius;
        }
        true
    }

    fn start_move(&mut self, args: &[&str]) {
        let targets = match self.parse_targets(args) {
            Ok(t) => t,
            Err(code) => return self.fail(code),
        };
        if targets.iter().any(|&(i, _)| !self.axes[i].referenced) {
            return self.fail(PiErrorCode::MoveWithoutRefOrNoServo);
        }
        if !self.reachable(&targets) {
            return self.fail(PiErrorCode::PosOutOfLimits);
        }
        for (i, value) in targets {
            self.axes[i].target = value;
        }
    }

    fn start_reference(&mut self, args: &[&str]) {
        let indices: Vec<usize> = if args.is_empty() {
            (0..self.axes.len()).collect()
        } else {
            let mut indices = Vec::new();
            for name in args {
                match self.axes.iter().position(|a| a.name == *name) {
                    Some(i) => indices.push(i),
                    None => return self.fail(PiErrorCode::InvalidAxisIdentifier),
                }
            }
            indices
        };
        for i in indices {
            let axis = &mut self.axes[i];
            axis.referenced = false;
            axis.referencing = true;
            axis.target = 0.0;
        }
    }

    fn set_axis_velocities(&mut self, args: &[&str]) {
        let pairs = match self.parse_targets(args) {
            Ok(p) => p,
            Err(code) => return self.fail(code),
        };
        if pairs.iter().any(|&(_, v)| v <= 0.0) {
            return self.fail(PiErrorCode::VelOutOfLimits);
        }
        for (i, v) in pairs {
            self.axes[i].velocity = v;
        }
    }

    fn set_pivot(&mut self, args: &[&str]) {
        if self.any_moving() {
            return self.fail(PiErrorCode::SetPivotNotPossible);
        }
        if args.len() % 2 != 0 || args.is_empty() {
            return self.fail(PiErrorCode::ParamSyntax);
        }
        let mut pivot = self.pivot;
        for pair in args.chunks(2) {
            let index = match pair[0] {
                "R" => 0,
                "S" => 1,
                "T" => 2,
                _ => return self.fail(PiErrorCode::InvalidAxisIdentifier),
            };
            match pair[1].parse::<f64>() {
                Ok(v) => pivot[index] = v,
                Err(_) => return self.fail(PiErrorCode::ParamSyntax),
            }
        }
        self.pivot = pivot;
    }
}

fn flag(value: bool) -> String {
    if value { "1" } else { "0" }.to_string()
}

/// Join reply lines, marking all but the last with a trailing space.
fn format_reply(lines: &[String]) -> String {
    let mut out = lines.join(" \n");
    out.push('\n');
    out
}
