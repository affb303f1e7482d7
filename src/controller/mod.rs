//! # Controller Module
//!
//! Gamepad input handling.
//!
//! This module handles:
//! - Gamepad detection and connection via evdev
//! - Decoding raw device events into [`events::RawEvent`]s
//! - Pre-filtering of synchronization and miscellaneous events

pub mod events;
pub mod gamepad;

pub use events::{DeviceClass, RawEvent};
pub use gamepad::Gamepad;
