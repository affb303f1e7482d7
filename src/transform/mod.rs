//! # Transform Module
//!
//! The controller-event transformation pipeline.
//!
//! This module handles:
//! - The declarative control registry loaded from a JSON document
//! - Dispatching raw events through their configured transform kind
//! - The differential-drive merge of two stick axes into wheel speeds
//! - Last-known-value caching for snapshot reads between sparse events

pub mod cache;
pub mod drive;
pub mod engine;
pub mod registry;

pub use cache::{LastValueCache, OutputValue, Snapshot};
pub use drive::{DifferentialDriveState, WheelSpeeds};
pub use engine::{Command, TransformEngine, TransformError};
pub use registry::{
    AxisRole, ControlDescriptor, ControlRegistry, DriveGroup, Range, TransformKind, TurnLimit,
};
