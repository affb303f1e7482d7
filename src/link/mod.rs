//! # Link Module
//!
//! The boundary between the transform pipeline and the robot-side node.
//!
//! This module handles:
//! - [`CommandEnvelope`]: a timestamped wrapper around a full command
//!   snapshot, the unit shipped over the wire (fields `CTime_ID` and
//!   `GPIO_command`, the contract the robot node consumes)
//! - [`CommandSink`]: the transport seam — the real network transport lives
//!   outside this crate and implements this trait
//! - [`publish_tick`]: one publisher step, sampling the latest snapshot
//!
//! Snapshots travel through a `tokio::sync::watch` channel: last writer
//! wins, no queueing, no backpressure. Stale reads are expected — control
//! loops only care about current state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::debug;

use crate::error::Result;
use crate::transform::cache::Snapshot;

#[cfg(test)]
use mockall::automock;

/// A timestamped command snapshot.
///
/// The producer stamps at publish time; the robot side compares `CTime_ID`
/// against its wall clock for staleness and against the previous envelope
/// for dedup. Both checks live outside this crate.
///
/// # Examples
///
/// ```
/// use rover_bridge::link::CommandEnvelope;
/// use std::collections::BTreeMap;
///
/// let envelope = CommandEnvelope::now(BTreeMap::new());
/// let json = envelope.to_json()?;
/// assert!(json.contains("CTime_ID"));
/// assert!(json.contains("GPIO_command"));
/// # Ok::<(), rover_bridge::error::RoverBridgeError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    /// Publish timestamp (RFC 3339, UTC).
    #[serde(rename = "CTime_ID")]
    pub time_id: DateTime<Utc>,

    /// The full last-value snapshot at publish time.
    #[serde(rename = "GPIO_command")]
    pub commands: Snapshot,
}

impl CommandEnvelope {
    /// Creates an envelope with an explicit timestamp.
    #[must_use]
    pub fn new(time_id: DateTime<Utc>, commands: Snapshot) -> Self {
        Self { time_id, commands }
    }

    /// Creates an envelope stamped with the current wall clock.
    #[must_use]
    pub fn now(commands: Snapshot) -> Self {
        Self::new(Utc::now(), commands)
    }

    /// Serializes the envelope to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns `Json` wrapping the underlying serde error (the
    /// snapshot types are always serializable, so this is defensive only in
    /// signature).
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Receives published command envelopes.
///
/// The transport seam: the shipped binary uses [`DebugSink`]; a deployment
/// wires its network transport here. Implementations should be quick —
/// the publisher calls `send` inline on its tick.
#[cfg_attr(test, automock)]
pub trait CommandSink {
    /// Delivers one envelope.
    ///
    /// # Errors
    ///
    /// Returns `Sink` on delivery failure; the publisher logs and keeps
    /// ticking.
    fn send(&mut self, envelope: &CommandEnvelope) -> Result<()>;
}

/// Sink that logs every envelope via `tracing` and counts deliveries.
#[derive(Debug, Default)]
pub struct DebugSink {
    sent: u64,
}

impl DebugSink {
    /// Creates a sink with a zeroed counter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of envelopes delivered so far.
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent
    }
}

impl CommandSink for DebugSink {
    fn send(&mut self, envelope: &CommandEnvelope) -> Result<()> {
        let json = envelope.to_json()?;
        debug!("command envelope: {}", json);
        self.sent += 1;
        Ok(())
    }
}

/// One publisher step: sample the latest snapshot, wrap, deliver.
///
/// Always samples the *current* channel value — intermediate snapshots the
/// poll loop overwrote between ticks are skipped by design.
///
/// # Errors
///
/// Propagates the sink's failure; the caller decides whether to keep
/// ticking (the shipped binary does).
pub fn publish_tick(
    receiver: &watch::Receiver<Snapshot>,
    sink: &mut dyn CommandSink,
) -> Result<CommandEnvelope> {
    let snapshot = receiver.borrow().clone();
    let envelope = CommandEnvelope::now(snapshot);
    sink.send(&envelope)?;
    Ok(envelope)
}
