//! Threshold/hysteresis rules for the fogger, fan and lights.
//!
//! Rules run in a fixed order each tick; an earlier rule can veto a later
//! one.
//!
//! | # | Condition                                              | Action                     |
//! |---|--------------------------------------------------------|----------------------------|
//! | 1 | water < cutoff and fogger on                           | fogger off, cancel auto-off |
//! | 2 | humidity < min - margin, fogger off, water > minimum   | fogger on, arm auto-off    |
//! | 3 | humidity > max + margin and fan < boost                | fan to boost               |
//! | 4 | humidity <= max and fan > 0                            | fan off                    |
//! | 5 | lights differ from (phase needs light and in schedule) | toggle lights              |
//!
//! Rules 1/2 share the fogger and rules 3/4 the fan, so a tick emits at
//! most one command per actuator.  A missing water sensor never blocks the
//! fogger.

use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::{ControlThresholds, LightSchedule, PhaseConfig};
use crate::control::auto_off::{AutoOffDeadline, AutoOffTimer, AutoOffToken, TimerDirective};
use crate::model::{ActuatorState, Reading};

/// Maximum commands a single decision can produce.
pub const MAX_COMMANDS: usize = 4;

/// One actuator write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCommand {
    /// `auto_off` is set when the fogger was started with a timeout.
    Fogger { on: bool, auto_off: Option<Duration> },
    Fan(u8),
    Lights(bool),
}

pub type Commands = heapless::Vec<ActuatorCommand, MAX_COMMANDS>;

/// Outcome of one decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub state: ActuatorState,
    pub commands: Commands,
    pub timer: Option<TimerDirective>,
}

impl Decision {
    fn unchanged(state: ActuatorState) -> Self {
        Self {
            state,
            commands: Commands::new(),
            timer: None,
        }
    }

    fn emit(&mut self, command: ActuatorCommand) {
        if self.commands.push(command).is_err() {
            warn!("ControlEngine: command buffer full, dropping {command:?}");
        }
    }
}

/// Rule evaluator.  Owns the only engine state: the pending auto-off.
pub struct ControlEngine {
    thresholds: ControlThresholds,
    schedule: LightSchedule,
    auto_off: AutoOffTimer,
}

impl ControlEngine {
    pub fn new(thresholds: ControlThresholds, schedule: LightSchedule) -> Self {
        Self {
            thresholds,
            schedule,
            auto_off: AutoOffTimer::new(),
        }
    }

    pub fn thresholds(&self) -> &ControlThresholds {
        &self.thresholds
    }

    pub fn pending_auto_off(&self) -> Option<AutoOffDeadline> {
        self.auto_off.pending()
    }

    /// Evaluate every rule against one reading.
    ///
    /// `hour` is the local hour for the light schedule; `now` anchors the
    /// auto-off deadline.
    pub fn decide(
        &mut self,
        reading: &Reading,
        state: ActuatorState,
        phase: &PhaseConfig,
        hour: u32,
        now: Instant,
    ) -> Decision {
        let t = self.thresholds;
        let mut d = Decision::unchanged(state);
        let humidity = reading.humidity;
        let water = reading.water_level;

        // ── Rule 1: water safety ──────────────────────────────
        let mut fogger_vetoed = false;
        if let Some(level) = water {
            if level < t.water_cutoff_pct {
                fogger_vetoed = true;
                if d.state.fogger_active {
                    warn!(
                        "ControlEngine: water {level:.1}% below {:.0}%, forcing fogger off",
                        t.water_cutoff_pct
                    );
                    d.state.fogger_active = false;
                    d.emit(ActuatorCommand::Fogger {
                        on: false,
                        auto_off: None,
                    });
                    d.timer = self.auto_off.cancel();
                }
            }
        }

        // ── Rule 2: humidity low → fogger on ──────────────────
        let water_ok = water.is_none_or(|level| level > t.fogger_min_water_pct);
        if !fogger_vetoed
            && !d.state.fogger_active
            && humidity < phase.humidity.min - t.humidity_on_margin
            && water_ok
        {
            let duration = t.fogger_on_duration();
            let deadline = self.auto_off.arm(now, duration);
            info!(
                "ControlEngine: humidity {humidity:.1}% low, fogger on for {}s",
                duration.as_secs()
            );
            d.state.fogger_active = true;
            d.emit(ActuatorCommand::Fogger {
                on: true,
                auto_off: Some(duration),
            });
            d.timer = Some(TimerDirective::Arm(deadline));
        }

        // ── Rules 3/4: fan hysteresis ─────────────────────────
        if humidity > phase.humidity.max + t.humidity_fan_margin
            && d.state.fan_speed_percent < t.fan_boost_percent
        {
            d.state.fan_speed_percent = t.fan_boost_percent;
            d.emit(ActuatorCommand::Fan(t.fan_boost_percent));
        } else if humidity <= phase.humidity.max && d.state.fan_speed_percent > 0 {
            d.state.fan_speed_percent = 0;
            d.emit(ActuatorCommand::Fan(0));
        }

        // ── Rule 5: light schedule ────────────────────────────
        let lights = phase.needs_light && self.schedule.is_on(hour);
        if lights != d.state.lights_active {
            d.state.lights_active = lights;
            d.emit(ActuatorCommand::Lights(lights));
        }

        d
    }

    /// Manual fogger pulse.
    ///
    /// Refused when the water level is too low to start the fogger.  When
    /// the fogger is already running on a pending deadline, that deadline
    /// is kept.
    pub fn activate_fogger(
        &mut self,
        state: ActuatorState,
        duration: Duration,
        water: Option<f32>,
        now: Instant,
    ) -> Decision {
        let mut d = Decision::unchanged(state);
        if water.is_some_and(|level| level <= self.thresholds.fogger_min_water_pct) {
            warn!("ControlEngine: fogger pulse refused, water level too low");
            return d;
        }
        if state.fogger_active && self.auto_off.pending().is_some() {
            return d;
        }
        let deadline = self.auto_off.arm(now, duration);
        d.state.fogger_active = true;
        if !state.fogger_active {
            d.emit(ActuatorCommand::Fogger {
                on: true,
                auto_off: Some(duration),
            });
        }
        d.timer = Some(TimerDirective::Arm(deadline));
        d
    }

    /// Auto-off deadline reached.  Turns the fogger off unconditionally
    /// unless `token` has been superseded or cancelled.
    pub fn expire(&mut self, token: AutoOffToken, state: ActuatorState) -> Decision {
        let mut d = Decision::unchanged(state);
        if !self.auto_off.take_if_current(token) {
            return d;
        }
        if state.fogger_active {
            info!("ControlEngine: fogger auto-off");
            d.state.fogger_active = false;
            d.emit(ActuatorCommand::Fogger {
                on: false,
                auto_off: None,
            });
        }
        d
    }

    /// Forget the pending deadline, e.g. after a failed fogger start.
    pub fn cancel_auto_off(&mut self) -> Option<TimerDirective> {
        self.auto_off.cancel()
    }

    /// Arm a fresh deadline, e.g. to retry a fogger-off write that failed.
    pub fn schedule_fogger_off(&mut self, now: Instant, after: Duration) -> TimerDirective {
        TimerDirective::Arm(self.auto_off.arm(now, after))
    }
}
