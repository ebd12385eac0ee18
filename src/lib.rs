//! # Relay Pilot Library
//!
//! Drive a remote vehicle from a gamepad with remappable controls.
//!
//! This library provides the input mapping and remapping engine: it polls a
//! gamepad, translates raw buttons and axes into logical actions through a
//! per-device mapping table, lets the operator rebind actions interactively,
//! and streams the resulting control state to a WebSocket relay.

pub mod config;
pub mod controller;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod relay;
pub mod storage;
