//! Inbound operator commands.
//!
//! These represent actions requested by the outside world (dashboard,
//! serial console, scripts) that the [`ControlHandle`](super::context::ControlHandle)
//! interprets and acts upon.

use std::time::Duration;

use crate::app::events::StateUpdate;
use crate::model::{ActuatorState, GrowthPhase};

/// Commands that external adapters can send into the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppCommand {
    /// Switch the active growth phase.  Rejected if the phase is not
    /// configured.
    SetPhase(GrowthPhase),

    /// Run the fogger for the given time, subject to the water check.
    PulseFogger(Duration),

    /// Return the most recent tick's state.
    RequestSnapshot,
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandReply {
    PhaseChanged(GrowthPhase),
    Actuators(ActuatorState),
    /// `None` until the first tick completes.
    Snapshot(Option<StateUpdate>),
}
