//! # Controller Module
//!
//! Gamepad input handling and control remapping.
//!
//! This module handles:
//! - The catalog of logical actions and their default bindings
//! - Per-device mapping tables with conflict resolution
//! - Axis calibration (range, inversion, normalization)
//! - Device discovery and snapshot polling via evdev
//! - Action queries and the interactive remap workflow

pub mod actions;
pub mod calibration;
pub mod device;
pub mod evdev_source;
pub mod mapping;
pub mod poller;
pub mod query;
pub mod remap;
pub mod snapshot;
