//! # Raw Event Module
//!
//! Decodes evdev input events into [`RawEvent`] values, the unit consumed by
//! the transform engine.
//!
//! ## Event Classes
//!
//! | Class | evdev source | Examples |
//! |-------|--------------|----------|
//! | `Key` | EV_KEY | BTN_SOUTH, BTN_WEST, BTN_TL |
//! | `Absolute` | EV_ABS | ABS_X, ABS_Y, ABS_RX, ABS_HAT0X |
//! | `Other` | EV_REL, EV_SW, ... | REL_X, SW_LID |
//!
//! Synchronization (EV_SYN) and miscellaneous (EV_MSC) events are filtered
//! out during decoding and never reach the engine.
//!
//! ## Control Keys
//!
//! Every event is identified by its *control key*, the string
//! `<class>-<code>` (for example `Absolute-ABS_X` or `Key-BTN_SOUTH`). The
//! control key is what joins an event to its entry in the control map.

use evdev::{InputEvent, InputEventKind};
use std::fmt;

/// Broad class of an input event, mirroring the evdev event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceClass {
    /// Digital buttons (EV_KEY).
    Key,
    /// Analog axes (EV_ABS).
    Absolute,
    /// Anything else a device may emit (relative axes, switches, ...).
    Other,
}

impl fmt::Display for DeviceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceClass::Key => write!(f, "Key"),
            DeviceClass::Absolute => write!(f, "Absolute"),
            DeviceClass::Other => write!(f, "Other"),
        }
    }
}

/// A single decoded input event.
///
/// Ephemeral: produced per polling cycle, consumed by
/// [`TransformEngine::apply`](crate::transform::TransformEngine::apply),
/// never retained.
///
/// # Examples
///
/// ```
/// use rover_bridge::controller::events::{DeviceClass, RawEvent};
///
/// let event = RawEvent::new(DeviceClass::Absolute, "ABS_X", 1200.0);
/// assert_eq!(event.control_key(), "Absolute-ABS_X");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    /// Event class (Key, Absolute, Other).
    pub class: DeviceClass,
    /// evdev code name, e.g. `BTN_SOUTH` or `ABS_X`.
    pub code: String,
    /// Raw value as reported by the device.
    pub value: f64,
}

impl RawEvent {
    /// Creates a raw event from its parts.
    #[must_use]
    pub fn new(class: DeviceClass, code: impl Into<String>, value: f64) -> Self {
        Self {
            class,
            code: code.into(),
            value,
        }
    }

    /// Returns the control key `<class>-<code>` identifying this signal.
    ///
    /// # Examples
    ///
    /// ```
    /// use rover_bridge::controller::events::{DeviceClass, RawEvent};
    ///
    /// let event = RawEvent::new(DeviceClass::Key, "BTN_SOUTH", 1.0);
    /// assert_eq!(event.control_key(), "Key-BTN_SOUTH");
    /// ```
    #[must_use]
    pub fn control_key(&self) -> String {
        format!("{}-{}", self.class, self.code)
    }

    /// Decodes an evdev input event.
    ///
    /// Returns `None` for synchronization and miscellaneous events, which
    /// carry no control information and must not reach the engine.
    #[must_use]
    pub fn from_evdev(event: &InputEvent) -> Option<Self> {
        let value = f64::from(event.value());
        match event.kind() {
            InputEventKind::Synchronization(_) | InputEventKind::Misc(_) => None,
            InputEventKind::Key(key) => Some(Self::new(
                DeviceClass::Key,
                format!("{:?}", key),
                value,
            )),
            InputEventKind::AbsAxis(axis) => Some(Self::new(
                DeviceClass::Absolute,
                format!("{:?}", axis),
                value,
            )),
            InputEventKind::RelAxis(axis) => Some(Self::new(
                DeviceClass::Other,
                format!("{:?}", axis),
                value,
            )),
            InputEventKind::Switch(switch) => Some(Self::new(
                DeviceClass::Other,
                format!("{:?}", switch),
                value,
            )),
            other => Some(Self::new(
                DeviceClass::Other,
                format!("{:?}", other),
                value,
            )),
        }
    }
}
