//! # Differential Drive Module
//!
//! Merges two perpendicular stick axes into independent left/right wheel
//! speeds (skid steering).
//!
//! ## Mixing Policy
//!
//! `y` (forward/backward) carries the base speed for both wheels; `x`
//! (lateral) subtracts from the wheel on the inside of the turn, scaled by
//! the per-direction turn limit. With `x`,`y` the current normalized axis
//! values and `Lmax`/`Rmax` the configured limits:
//!
//! | x sign | y sign | left       | right      |
//! |--------|--------|------------|------------|
//! | x ≥ 0  | y ≥ 0  | y          | y − Rmax·x |
//! | x ≥ 0  | y < 0  | y          | y + Rmax·x |
//! | x < 0  | y ≥ 0  | y + Lmax·x | y          |
//! | x < 0  | y < 0  | y − Lmax·x | y          |
//!
//! The outside wheel always runs at exactly `y`, so steering never pushes a
//! wheel past the commanded speed.
//!
//! ## State
//!
//! Each drive group keeps the last value seen on each axis, so a fresh merge
//! is produced on **every** axis update — the stick only reports the axis
//! that moved, and the stored other-axis value fills the gap.

use std::collections::BTreeMap;

use crate::transform::registry::{AxisRole, DriveGroup, TurnLimit};

/// Merged output of one drive group.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WheelSpeeds {
    pub left: f64,
    pub right: f64,
}

/// Per-group merge state: the last normalized value of each axis.
///
/// One instance exists per drive group for the whole engine lifetime; both
/// axes start at rest (0).
///
/// # Examples
///
/// ```
/// use rover_bridge::transform::drive::DifferentialDriveState;
/// use rover_bridge::transform::registry::{AxisRole, TurnLimit};
///
/// let mut drive = DifferentialDriveState::new("wheels", TurnLimit(1.0, 1.0));
///
/// // Full forward, stick centered laterally: both wheels at speed
/// let speeds = drive.update(AxisRole::Y, 1.0);
/// assert_eq!(speeds.left, 1.0);
/// assert_eq!(speeds.right, 1.0);
///
/// // Stick hard right: right wheel drops out, left keeps the pace
/// let speeds = drive.update(AxisRole::X, 1.0);
/// assert_eq!(speeds.left, 1.0);
/// assert_eq!(speeds.right, 0.0);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DifferentialDriveState {
    output_name: String,
    turn_limit: TurnLimit,
    x_value: f64,
    y_value: f64,
}

impl DifferentialDriveState {
    /// Creates a drive state at rest.
    #[must_use]
    pub fn new(output_name: impl Into<String>, turn_limit: TurnLimit) -> Self {
        Self {
            output_name: output_name.into(),
            turn_limit,
            x_value: 0.0,
            y_value: 0.0,
        }
    }

    /// Creates a drive state from a validated registry group.
    #[must_use]
    pub fn from_group(group: &DriveGroup) -> Self {
        Self::new(group.output_name.clone(), group.turn_limit)
    }

    /// The group's output name prefix.
    #[must_use]
    pub fn output_name(&self) -> &str {
        &self.output_name
    }

    /// Last stored lateral value.
    #[must_use]
    pub fn x_value(&self) -> f64 {
        self.x_value
    }

    /// Last stored forward/backward value.
    #[must_use]
    pub fn y_value(&self) -> f64 {
        self.y_value
    }

    /// Stores a fresh normalized axis value and recomputes the merge.
    ///
    /// The other axis keeps its last stored value; the merge is never gated
    /// on both axes being fresh.
    pub fn update(&mut self, role: AxisRole, value: f64) -> WheelSpeeds {
        match role {
            AxisRole::X => self.x_value = value,
            AxisRole::Y => self.y_value = value,
        }
        self.mix()
    }

    /// Computes the merged wheel speeds from the current state.
    #[must_use]
    pub fn mix(&self) -> WheelSpeeds {
        let x = self.x_value;
        let y = self.y_value;

        if x >= 0.0 {
            let bite = self.turn_limit.right() * x;
            if y >= 0.0 {
                WheelSpeeds { left: y, right: y - bite }
            } else {
                WheelSpeeds { left: y, right: y + bite }
            }
        } else {
            let bite = self.turn_limit.left() * x;
            if y >= 0.0 {
                WheelSpeeds { left: y + bite, right: y }
            } else {
                WheelSpeeds { left: y - bite, right: y }
            }
        }
    }

    /// The merged output as named command entries
    /// (`<name>_Left`, `<name>_Right`).
    #[must_use]
    pub fn named_speeds(&self) -> BTreeMap<String, f64> {
        let speeds = self.mix();
        let mut entries = BTreeMap::new();
        entries.insert(format!("{}_Left", self.output_name), speeds.left);
        entries.insert(format!("{}_Right", self.output_name), speeds.right);
        entries
    }

    /// Returns both axes to rest.
    pub fn reset(&mut self) {
        self.x_value = 0.0;
        self.y_value = 0.0;
    }
}
