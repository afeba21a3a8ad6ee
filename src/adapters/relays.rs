//! Actuator drivers for a relay board and for simulation.
//!
//! [`RelayBoard`] drives the fogger and grow-light relays through
//! `embedded-hal` output pins and the fan through a PWM channel, so any
//! HAL (Linux GPIO character device, a port expander, a test double) can
//! sit underneath.  Relay modules are commonly active-low; polarity is
//! set per board.
//!
//! [`SimulatedActuators`] keeps the state in memory and logs each change.
//! It is what the binary uses when no GPIO backend is linked.

use embedded_hal::digital::{OutputPin, PinState};
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, info};

use crate::app::ports::ActuatorDriver;
use crate::error::ActuatorError;
use crate::model::ActuatorState;

// ───────────────────────────────────────────────────────────────
// Relay board
// ───────────────────────────────────────────────────────────────

pub struct RelayBoard<F, L, P>
where
    F: OutputPin,
    L: OutputPin,
    P: SetDutyCycle,
{
    fogger: F,
    lights: L,
    fan: P,
    active_low: bool,
}

impl<F, L, P> RelayBoard<F, L, P>
where
    F: OutputPin,
    L: OutputPin,
    P: SetDutyCycle,
{
    pub fn new(fogger: F, lights: L, fan: P, active_low: bool) -> Self {
        Self {
            fogger,
            lights,
            fan,
            active_low,
        }
    }

    /// Pin level that puts a relay in the requested state.
    fn level(&self, on: bool) -> PinState {
        PinState::from(on != self.active_low)
    }
}

impl<F, L, P> ActuatorDriver for RelayBoard<F, L, P>
where
    F: OutputPin,
    L: OutputPin,
    P: SetDutyCycle,
{
    fn set_fogger(&mut self, on: bool) -> Result<(), ActuatorError> {
        let level = self.level(on);
        self.fogger
            .set_state(level)
            .map_err(|_| ActuatorError::GpioWriteFailed)
    }

    fn set_fan(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::OutOfRange);
        }
        self.fan
            .set_duty_cycle_percent(percent)
            .map_err(|_| ActuatorError::PwmWriteFailed)
    }

    fn set_lights(&mut self, on: bool) -> Result<(), ActuatorError> {
        let level = self.level(on);
        self.lights
            .set_state(level)
            .map_err(|_| ActuatorError::GpioWriteFailed)
    }
}

// ───────────────────────────────────────────────────────────────
// Simulation
// ───────────────────────────────────────────────────────────────

/// In-memory actuators for runs without hardware.
#[derive(Debug, Default)]
pub struct SimulatedActuators {
    state: ActuatorState,
}

impl SimulatedActuators {
    pub fn new() -> Self {
        info!("SimulatedActuators: no GPIO backend, outputs are logged only");
        Self::default()
    }

    pub fn state(&self) -> ActuatorState {
        self.state
    }
}

impl ActuatorDriver for SimulatedActuators {
    fn set_fogger(&mut self, on: bool) -> Result<(), ActuatorError> {
        if self.state.fogger_active != on {
            info!("SimulatedActuators: fogger {}", if on { "on" } else { "off" });
        }
        self.state.fogger_active = on;
        Ok(())
    }

    fn set_fan(&mut self, percent: u8) -> Result<(), ActuatorError> {
        if percent > 100 {
            return Err(ActuatorError::OutOfRange);
        }
        if self.state.fan_speed_percent != percent {
            debug!("SimulatedActuators: fan {percent}%");
        }
        self.state.fan_speed_percent = percent;
        Ok(())
    }

    fn set_lights(&mut self, on: bool) -> Result<(), ActuatorError> {
        if self.state.lights_active != on {
            info!("SimulatedActuators: lights {}", if on { "on" } else { "off" });
        }
        self.state.lights_active = on;
        Ok(())
    }
}
