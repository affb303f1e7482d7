//! # Control Registry Module
//!
//! The declarative per-control configuration: a mapping from control key
//! (`Class-CODE`, see [`crate::controller::events`]) to a transform
//! descriptor. Loaded once at startup from a JSON document and validated
//! all-or-nothing — a registry either loads completely or not at all.
//!
//! ## Document Format
//!
//! The document is a JSON object keyed by control key. Descriptor fields:
//!
//! | Field | Type | Required for | Description |
//! |-------|------|--------------|-------------|
//! | `used_funct` | string | all | `exact_func`, `normalization_func` or `XYfunct` |
//! | `return_name` | string | all | logical output name |
//! | `ctrl_range` | `{min, max}` | normalize, XY | raw device value range |
//! | `output_range` | `{min, max}` | normalize, XY | produced value range (may be inverted) |
//! | `XYfunct_axis` | `"X"` / `"Y"` | XY | which drive axis this control feeds |
//! | `max_turn_LR` | `[left, right]` | XY | per-direction turn limits |
//! | `return_only_value` | bool | optional | emit the merged map bare, unwrapped |
//!
//! Unknown extra fields (e.g. `description`) are tolerated and ignored, so
//! the same document can carry operator notes.
//!
//! Both axes of a differential drive group share one `return_name`; the
//! registry verifies each group has exactly one `X` and one `Y` entry with
//! identical `max_turn_LR`, and pre-builds the group list so the engine
//! never observes a half-wired pair.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::error::{Result, RoverBridgeError};

/// A numeric range with named endpoints.
///
/// `min`/`max` are nominal endpoint labels, not an ordering constraint: an
/// output range of `{min: 1, max: -1}` is valid and flips axis polarity.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    /// Signed width of the range.
    #[must_use]
    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// True when both endpoints coincide (the division-by-zero case).
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.min == self.max
    }
}

/// Per-direction turn limits, deserialized from the `[left, right]` pair.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TurnLimit(pub f64, pub f64);

impl TurnLimit {
    /// Limit applied when turning left (x < 0).
    #[must_use]
    pub fn left(&self) -> f64 {
        self.0
    }

    /// Limit applied when turning right (x ≥ 0).
    #[must_use]
    pub fn right(&self) -> f64 {
        self.1
    }
}

/// Which drive axis a differential control feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum AxisRole {
    X,
    Y,
}

/// The transform applied to a control's raw values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum TransformKind {
    /// Raw value forwarded unchanged (`exact_func`).
    #[serde(rename = "exact_func")]
    Passthrough,
    /// Affine map from `ctrl_range` onto `output_range`
    /// (`normalization_func`).
    #[serde(rename = "normalization_func")]
    Normalize,
    /// One axis of a differential drive group (`XYfunct`).
    #[serde(rename = "XYfunct")]
    DifferentialAxis,
}

/// One control's configuration entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ControlDescriptor {
    /// Transform kind (`used_funct`).
    #[serde(rename = "used_funct")]
    pub kind: TransformKind,

    /// Logical output name (`return_name`). Shared by both axes of a
    /// differential drive group.
    #[serde(rename = "return_name")]
    pub output_name: String,

    /// Raw device value range (`ctrl_range`).
    #[serde(rename = "ctrl_range", default)]
    pub control_range: Option<Range>,

    /// Produced value range (`output_range`).
    #[serde(rename = "output_range", default)]
    pub output_range: Option<Range>,

    /// Drive axis fed by this control (`XYfunct_axis`).
    #[serde(rename = "XYfunct_axis", default)]
    pub axis_role: Option<AxisRole>,

    /// Per-direction turn limits (`max_turn_LR`).
    #[serde(rename = "max_turn_LR", default)]
    pub turn_limit: Option<TurnLimit>,

    /// Emit the merged value map bare instead of nested under
    /// `return_name` (`return_only_value`).
    #[serde(rename = "return_only_value", default)]
    pub bare_value: bool,
}

/// A validated differential drive group, one per distinct `return_name`
/// of kind [`TransformKind::DifferentialAxis`].
#[derive(Debug, Clone, PartialEq)]
pub struct DriveGroup {
    /// Output name prefix shared by both axes.
    pub output_name: String,
    /// Turn limits, identical across the X and Y descriptors.
    pub turn_limit: TurnLimit,
}

/// The validated control configuration.
///
/// # Examples
///
/// ```
/// use rover_bridge::transform::registry::ControlRegistry;
///
/// let registry = ControlRegistry::from_json_str(r#"{
///     "Key-BTN_WEST": { "return_name": "led_blue", "used_funct": "exact_func" }
/// }"#)?;
///
/// assert_eq!(registry.len(), 1);
/// assert!(registry.get("Key-BTN_WEST").is_some());
/// # Ok::<(), rover_bridge::error::RoverBridgeError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ControlRegistry {
    descriptors: HashMap<String, ControlDescriptor>,
    drive_groups: Vec<DriveGroup>,
}

impl ControlRegistry {
    /// Build a registry from already-parsed descriptors.
    ///
    /// # Errors
    ///
    /// Returns `ControlMap` if any descriptor violates the load-time
    /// invariants (see [`module docs`](self)); nothing is partially applied.
    pub fn from_descriptors(descriptors: HashMap<String, ControlDescriptor>) -> Result<Self> {
        let drive_groups = validate(&descriptors)?;
        Ok(Self {
            descriptors,
            drive_groups,
        })
    }

    /// Parse and validate a registry from a JSON document string.
    ///
    /// # Errors
    ///
    /// `Json` on malformed JSON, `ControlMap` on invariant
    /// violations.
    pub fn from_json_str(document: &str) -> Result<Self> {
        let descriptors: HashMap<String, ControlDescriptor> = serde_json::from_str(document)?;
        Self::from_descriptors(descriptors)
    }

    /// Load and validate a registry from a JSON document on disk.
    ///
    /// # Errors
    ///
    /// `Io` if the file cannot be read, plus the parse/validation errors of
    /// [`Self::from_json_str`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Look up the descriptor for a control key.
    #[must_use]
    pub fn get(&self, control_key: &str) -> Option<&ControlDescriptor> {
        self.descriptors.get(control_key)
    }

    /// The validated differential drive groups.
    #[must_use]
    pub fn drive_groups(&self) -> &[DriveGroup] {
        &self.drive_groups
    }

    /// Number of configured controls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// True when no controls are configured (everything passes through
    /// unknown).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Validates all descriptors and collects the differential drive groups.
///
/// Iterates in key order so failure messages are deterministic.
fn validate(descriptors: &HashMap<String, ControlDescriptor>) -> Result<Vec<DriveGroup>> {
    let ordered: BTreeMap<&String, &ControlDescriptor> = descriptors.iter().collect();

    // Per-descriptor field requirements
    for (key, desc) in &ordered {
        match desc.kind {
            TransformKind::Passthrough => {}
            TransformKind::Normalize => {
                require_ranges(key, desc)?;
            }
            TransformKind::DifferentialAxis => {
                require_ranges(key, desc)?;
                if desc.axis_role.is_none() {
                    return Err(RoverBridgeError::ControlMap(format!(
                        "'{}': XYfunct requires XYfunct_axis",
                        key
                    )));
                }
                if desc.turn_limit.is_none() {
                    return Err(RoverBridgeError::ControlMap(format!(
                        "'{}': XYfunct requires max_turn_LR",
                        key
                    )));
                }
            }
        }
    }

    // Group pairing: every XYfunct return_name needs exactly one X and one Y
    // with matching turn limits
    let mut groups: BTreeMap<&str, Vec<(&str, AxisRole, TurnLimit)>> = BTreeMap::new();
    for (key, desc) in &ordered {
        if desc.kind == TransformKind::DifferentialAxis {
            // Presence checked above
            let role = desc.axis_role.ok_or_else(|| {
                RoverBridgeError::ControlMap(format!("'{}': missing XYfunct_axis", key))
            })?;
            let limit = desc.turn_limit.ok_or_else(|| {
                RoverBridgeError::ControlMap(format!("'{}': missing max_turn_LR", key))
            })?;
            groups
                .entry(desc.output_name.as_str())
                .or_default()
                .push((key.as_str(), role, limit));
        }
    }

    let mut drive_groups = Vec::with_capacity(groups.len());
    for (name, members) in groups {
        let x_count = members.iter().filter(|(_, r, _)| *r == AxisRole::X).count();
        let y_count = members.iter().filter(|(_, r, _)| *r == AxisRole::Y).count();

        if members.len() != 2 || x_count != 1 || y_count != 1 {
            return Err(RoverBridgeError::ControlMap(format!(
                "drive group '{}' must have exactly one X and one Y axis (found {} X, {} Y)",
                name, x_count, y_count
            )));
        }

        let first_limit = members[0].2;
        if members.iter().any(|(_, _, l)| *l != first_limit) {
            return Err(RoverBridgeError::ControlMap(format!(
                "drive group '{}' has mismatched max_turn_LR across its axes",
                name
            )));
        }

        drive_groups.push(DriveGroup {
            output_name: name.to_string(),
            turn_limit: first_limit,
        });
    }

    Ok(drive_groups)
}

/// Checks the range requirements shared by normalize and XYfunct entries.
fn require_ranges(key: &str, desc: &ControlDescriptor) -> Result<()> {
    let control_range = desc.control_range.ok_or_else(|| {
        RoverBridgeError::ControlMap(format!("'{}': {:?} requires ctrl_range", key, desc.kind))
    })?;

    if control_range.is_degenerate() {
        return Err(RoverBridgeError::ControlMap(format!(
            "'{}': degenerate ctrl_range (min == max == {})",
            key, control_range.min
        )));
    }

    if desc.output_range.is_none() {
        return Err(RoverBridgeError::ControlMap(format!(
            "'{}': {:?} requires output_range",
            key, desc.kind
        )));
    }

    Ok(())
}
