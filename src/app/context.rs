//! Owned control state.
//!
//! [`ControlContext`] holds everything the decision step mutates: actuator
//! state, the current growth phase, the engine's pending auto-off and the
//! actuator driver itself.  It lives behind one mutex ([`SharedControl`]),
//! so the sampling tick, the auto-off timer and operator commands are
//! serialized: a state change and the driver write that realizes it happen
//! under the same lock.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, error, info};

use crate::app::commands::{AppCommand, CommandReply};
use crate::app::events::StateUpdate;
use crate::app::ports::{ActuatorDriver, AutoOffScheduler};
use crate::config::{PhaseConfig, PhaseTable};
use crate::control::{
    ActuatorCommand, AutoOffDeadline, AutoOffToken, Commands, ControlEngine, Decision,
    TimerDirective,
};
use crate::error::{ActuatorError, ConfigError, Error, Result};
use crate::model::{ActuatorState, GrowthPhase, Reading};

/// Retry delay after a fogger-off write fails.
const FOGGER_OFF_RETRY: Duration = Duration::from_secs(5);

pub type SharedControl<A> = Arc<Mutex<ControlContext<A>>>;

/// Lock the shared context, mapping poisoning to [`Error::LockPoisoned`].
pub fn lock_control<A: ActuatorDriver>(
    control: &SharedControl<A>,
) -> Result<MutexGuard<'_, ControlContext<A>>> {
    control
        .lock()
        .map_err(|_| Error::LockPoisoned("control context"))
}

/// Result of applying one decision to the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub actuators: ActuatorState,
    /// Commands the driver accepted.
    pub commands: Commands,
    /// Directive for the auto-off timer task, if anything changed.
    pub timer: Option<TimerDirective>,
}

pub struct ControlContext<A: ActuatorDriver> {
    actuators: ActuatorState,
    phase: GrowthPhase,
    phases: PhaseTable,
    engine: ControlEngine,
    driver: A,
    last_water: Option<f32>,
}

impl<A: ActuatorDriver> ControlContext<A> {
    /// Actuators start all-off; `initial` must exist in `phases`.
    pub fn new(
        phases: PhaseTable,
        initial: GrowthPhase,
        engine: ControlEngine,
        driver: A,
    ) -> core::result::Result<Self, ConfigError> {
        phases.require(initial)?;
        Ok(Self {
            actuators: ActuatorState::ALL_OFF,
            phase: initial,
            phases,
            engine,
            driver,
            last_water: None,
        })
    }

    pub fn into_shared(self) -> SharedControl<A> {
        Arc::new(Mutex::new(self))
    }

    pub fn phase(&self) -> GrowthPhase {
        self.phase
    }

    pub fn phase_config(&self) -> core::result::Result<&PhaseConfig, ConfigError> {
        self.phases.require(self.phase)
    }

    /// Switch phase.  Unknown phases are rejected and nothing changes.
    pub fn set_phase(&mut self, phase: GrowthPhase) -> core::result::Result<(), ConfigError> {
        self.phases.require(phase)?;
        if phase != self.phase {
            info!("ControlContext: phase {} → {}", self.phase, phase);
            self.phase = phase;
        }
        Ok(())
    }

    pub fn actuators(&self) -> ActuatorState {
        self.actuators
    }

    pub fn pending_auto_off(&self) -> Option<AutoOffDeadline> {
        self.engine.pending_auto_off()
    }

    pub fn driver(&self) -> &A {
        &self.driver
    }

    /// Run the rules for one reading and drive the outputs.
    ///
    /// Targets come from the phase the reading was classified under, so a
    /// phase switch made while the sensors were being read takes effect on
    /// the next tick.
    pub fn step(
        &mut self,
        reading: &Reading,
        hour: u32,
        now: Instant,
    ) -> core::result::Result<StepOutcome, ConfigError> {
        if reading.growth_phase != self.phase {
            debug!(
                "ControlContext: phase is now {}, deciding this tick for {}",
                self.phase, reading.growth_phase
            );
        }
        let phase = self.phases.require(reading.growth_phase)?;
        self.last_water = reading.water_level;
        let decision = self
            .engine
            .decide(reading, self.actuators, phase, hour, now);
        Ok(self.apply(decision))
    }

    /// Operator fogger pulse, checked against the last water reading.
    pub fn pulse_fogger(&mut self, duration: Duration, now: Instant) -> StepOutcome {
        let decision =
            self.engine
                .activate_fogger(self.actuators, duration, self.last_water, now);
        self.apply(decision)
    }

    /// Auto-off deadline reached for `token`.
    pub fn expire_auto_off(&mut self, token: AutoOffToken) -> StepOutcome {
        let decision = self.engine.expire(token, self.actuators);
        self.apply(decision)
    }

    /// Switch everything off and forget any pending auto-off.
    pub fn fail_safe(&mut self) -> core::result::Result<(), ActuatorError> {
        self.engine.cancel_auto_off();
        self.actuators = ActuatorState::ALL_OFF;
        self.driver.all_off()
    }

    /// Write each command; a failed write leaves that field at its
    /// previous value.
    fn apply(&mut self, decision: Decision) -> StepOutcome {
        let previous = self.actuators;
        let mut state = decision.state;
        let mut timer = decision.timer;
        let mut accepted = Commands::new();

        for command in decision.commands {
            let result = match command {
                ActuatorCommand::Fogger { on, .. } => self.driver.set_fogger(on),
                ActuatorCommand::Fan(percent) => self.driver.set_fan(percent),
                ActuatorCommand::Lights(on) => self.driver.set_lights(on),
            };
            if let Err(e) = result {
                error!("ControlContext: {command:?} failed: {e}");
                match command {
                    ActuatorCommand::Fogger { on: true, .. } => {
                        state.fogger_active = previous.fogger_active;
                        if let Some(cancel) = self.engine.cancel_auto_off() {
                            timer = Some(cancel);
                        }
                    }
                    ActuatorCommand::Fogger { on: false, .. } => {
                        state.fogger_active = previous.fogger_active;
                        timer = Some(
                            self.engine
                                .schedule_fogger_off(Instant::now(), FOGGER_OFF_RETRY),
                        );
                    }
                    ActuatorCommand::Fan(_) => {
                        state.fan_speed_percent = previous.fan_speed_percent;
                    }
                    ActuatorCommand::Lights(_) => state.lights_active = previous.lights_active,
                }
                continue;
            }
            if accepted.push(command).is_err() {
                error!("ControlContext: accepted-command buffer full");
            }
        }

        self.actuators = state;
        StepOutcome {
            actuators: state,
            commands: accepted,
            timer,
        }
    }
}

// ── Snapshot cache ────────────────────────────────────────────

/// Most recent tick state, shared with late subscribers.
#[derive(Debug, Clone, Default)]
pub struct SnapshotCache(Arc<Mutex<Option<StateUpdate>>>);

impl SnapshotCache {
    pub fn store(&self, update: StateUpdate) {
        match self.0.lock() {
            Ok(mut slot) => *slot = Some(update),
            Err(_) => error!("SnapshotCache: lock poisoned, snapshot not updated"),
        }
    }

    pub fn get(&self) -> Option<StateUpdate> {
        self.0.lock().ok().and_then(|slot| slot.clone())
    }
}

// ── Operator handle ───────────────────────────────────────────

/// Cloneable entry point for operator commands from other threads.
pub struct ControlHandle<A: ActuatorDriver, S: AutoOffScheduler> {
    control: SharedControl<A>,
    scheduler: S,
    snapshot: SnapshotCache,
}

impl<A: ActuatorDriver, S: AutoOffScheduler + Clone> Clone for ControlHandle<A, S> {
    fn clone(&self) -> Self {
        Self {
            control: Arc::clone(&self.control),
            scheduler: self.scheduler.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}

impl<A: ActuatorDriver, S: AutoOffScheduler> ControlHandle<A, S> {
    pub fn new(control: SharedControl<A>, scheduler: S, snapshot: SnapshotCache) -> Self {
        Self {
            control,
            scheduler,
            snapshot,
        }
    }

    pub fn execute(&self, command: AppCommand) -> Result<CommandReply> {
        match command {
            AppCommand::SetPhase(phase) => {
                lock_control(&self.control)?.set_phase(phase)?;
                Ok(CommandReply::PhaseChanged(phase))
            }
            AppCommand::PulseFogger(duration) => {
                let outcome = lock_control(&self.control)?.pulse_fogger(duration, Instant::now());
                if let Some(directive) = outcome.timer {
                    self.scheduler.submit(directive);
                }
                Ok(CommandReply::Actuators(outcome.actuators))
            }
            AppCommand::RequestSnapshot => Ok(CommandReply::Snapshot(self.snapshot.get())),
        }
    }
}
