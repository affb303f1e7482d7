//! # Rover Bridge Library
//!
//! Drive a wheeled robot with a game controller over a network link.
//!
//! This library provides the core functionality of the operator node: a
//! declarative controller-event transformation pipeline that turns raw
//! gamepad events into named actuator commands, plus the snapshot/envelope
//! plumbing that carries them to the robot side.

pub mod config;
pub mod controller;
pub mod error;
pub mod link;
pub mod telemetry;
pub mod transform;
