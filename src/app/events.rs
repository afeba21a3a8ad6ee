//! Outbound loop events.
//!
//! The [`Orchestrator`](super::orchestrator::Orchestrator) emits these
//! through the [`Broadcaster`](super::ports::Broadcaster) port.  Adapters on
//! the other side decide what to do with them: log a line, queue them for a
//! push transport, etc.

use serde::Serialize;

use crate::model::{ActuatorState, Reading};
use crate::persistence::{Backend, BackendStatus};
use crate::sensors::SensorMode;

/// Structured events emitted by the loop.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoopEvent {
    /// The loop has started.
    Started {
        #[serde(serialize_with = "serialize_mode")]
        mode: SensorMode,
        backend: Backend,
    },

    /// One tick completed.
    Update(StateUpdate),

    /// Persistence switched backend.
    BackendChanged { from: Backend, to: Backend },

    /// A tick failed; the next attempt follows after the backoff.
    Degraded { error: String, retry_in_secs: u64 },

    /// A tick succeeded after one or more failures.
    Recovered,
}

/// The state observers see after a tick.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateUpdate {
    pub reading: Reading,
    pub actuators: ActuatorState,
    pub backend: BackendStatus,
}

fn serialize_mode<S: serde::Serializer>(mode: &SensorMode, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(mode.as_str())
}
