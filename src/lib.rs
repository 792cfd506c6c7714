//! pigcs-rs: device server for PI hexapods and PI GCS2 motion controllers.
//!
//! Controllers and their axes are exposed as devices on an HTTP/JSON bus.
//! Hardware is reached through the [`gcs`] call layer over TCP or RS-232.

pub mod address;
pub mod axis;
pub mod config;
pub mod controller;
pub mod error;
pub mod gcs;
pub mod hexapod;
pub mod memorized;
pub mod registry;
pub mod simulator;
pub mod state;
pub mod web;
