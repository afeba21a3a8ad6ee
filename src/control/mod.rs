//! Actuator decision logic.

pub mod auto_off;
pub mod engine;

pub use auto_off::{AutoOffDeadline, AutoOffTimer, AutoOffToken, TimerDirective};
pub use engine::{ActuatorCommand, Commands, ControlEngine, Decision};
