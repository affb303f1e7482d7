//! # Last Value Cache Module
//!
//! The most recently produced value for every output name. The event stream
//! is sparse — a stick only reports the axis that moved — so consumers that
//! need a complete command set read this cache instead of the per-event
//! deltas.
//!
//! The key set grows monotonically as controls fire for the first time;
//! values are overwritten in place. Unknown-control fallbacks share the
//! namespace with configured output names (their `Key-`/`Absolute-`/
//! `Other-` prefix keeps accidental collisions unlikely; see DESIGN.md).

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// A cached (and wire-serializable) output value.
///
/// Scalar for passthrough/normalized controls, a map of `_Left`/`_Right`
/// entries for a non-bare differential drive group. Serializes untagged, so
/// the JSON shapes are a bare number or a nested object — exactly what the
/// robot side consumes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputValue {
    /// One numeric value.
    Scalar(f64),
    /// A merged value map, e.g. `{"wheels_Left": 1.0, "wheels_Right": 0.0}`.
    Map(BTreeMap<String, f64>),
}

impl OutputValue {
    /// The scalar payload, if this is a scalar.
    #[must_use]
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            OutputValue::Scalar(v) => Some(*v),
            OutputValue::Map(_) => None,
        }
    }

    /// The map payload, if this is a merged map.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, f64>> {
        match self {
            OutputValue::Scalar(_) => None,
            OutputValue::Map(m) => Some(m),
        }
    }
}

/// An ordered, owned copy of the cache, suitable for publishing.
pub type Snapshot = BTreeMap<String, OutputValue>;

/// Last-write-wins store of produced output values.
///
/// Owned by the engine; reads are idempotent and cheap, so the publisher can
/// poll snapshots at any rate without side effects.
#[derive(Debug, Clone, Default)]
pub struct LastValueCache {
    values: HashMap<String, OutputValue>,
}

impl LastValueCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a value under an output name, replacing any previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: OutputValue) {
        self.values.insert(name.into(), value);
    }

    /// Stores a scalar under an output name.
    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.insert(name, OutputValue::Scalar(value));
    }

    /// Stores every entry of a bare value map as its own scalar.
    ///
    /// This is the `return_only_value` path: the merged map is flattened
    /// into the cache rather than nested under a group name.
    pub fn insert_scalars(&mut self, entries: &BTreeMap<String, f64>) {
        for (name, value) in entries {
            self.insert_scalar(name.clone(), *value);
        }
    }

    /// Looks up the last value for an output name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&OutputValue> {
        self.values.get(name)
    }

    /// Number of distinct output names seen so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no control has fired yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Drops every cached value (engine reset only).
    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// An ordered, owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}
