//! Loop orchestrator — the sampling tick and its failure policy.
//!
//! ```text
//!  SensorReader ──▶ ┌───────────────────────────┐ ──▶ Broadcaster
//!                   │       Orchestrator         │
//!  ControlContext ◀─│ read · decide · save · pub │ ──▶ PersistenceService
//!                   └───────────────────────────┘
//! ```
//!
//! Two states:
//!
//! - `Running`: ticks every `sample_interval`.
//! - `Degraded`: the last tick failed; the next attempt comes after the
//!   shorter backoff, and the loop returns to `Running` before retrying.
//!
//! Readings that could not be stored are held in a bounded backlog and
//! written ahead of the next reading, so storage order matches sampling
//! order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::app::context::{ControlHandle, SharedControl, SnapshotCache, lock_control};
use crate::app::events::{LoopEvent, StateUpdate};
use crate::app::ports::{ActuatorDriver, AutoOffScheduler, Broadcaster, Clock};
use crate::config::SystemConfig;
use crate::error::{Result, StoreError};
use crate::model::{ActuatorState, Reading};
use crate::persistence::{Backend, PersistenceService, ReadingId};
use crate::sensors::{ReadContext, SensorMode, SensorReader};

/// Unsaved readings kept while both backends are down.
pub const BACKLOG_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Degraded { last_error: String, retry_at: Instant },
}

/// Summary of one successful tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub reading: Reading,
    pub actuators: ActuatorState,
    pub id: ReadingId,
    /// Actuator writes performed this tick.
    pub commands: usize,
}

pub struct Orchestrator<A, B, S>
where
    A: ActuatorDriver,
    B: Broadcaster,
    S: AutoOffScheduler,
{
    reader: SensorReader,
    control: SharedControl<A>,
    persistence: Arc<PersistenceService>,
    broadcaster: B,
    scheduler: S,
    clock: Arc<dyn Clock>,
    snapshot: SnapshotCache,
    backlog: heapless::Deque<Reading, BACKLOG_CAPACITY>,
    state: LoopState,
    interval: Duration,
    backoff: Duration,
    last_backend: Backend,
}

impl<A, B, S> Orchestrator<A, B, S>
where
    A: ActuatorDriver,
    B: Broadcaster,
    S: AutoOffScheduler,
{
    pub fn new(
        config: &SystemConfig,
        reader: SensorReader,
        control: SharedControl<A>,
        persistence: Arc<PersistenceService>,
        broadcaster: B,
        scheduler: S,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let last_backend = persistence.current_backend();
        Self {
            reader,
            control,
            persistence,
            broadcaster,
            scheduler,
            clock,
            snapshot: SnapshotCache::default(),
            backlog: heapless::Deque::new(),
            state: LoopState::Running,
            interval: config.sample_interval(),
            backoff: config.degraded_backoff(),
            last_backend,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn mode(&self) -> SensorMode {
        self.reader.mode()
    }

    /// State published by the last successful tick.
    pub fn current(&self) -> Option<StateUpdate> {
        self.snapshot.get()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn persistence(&self) -> &Arc<PersistenceService> {
        &self.persistence
    }

    /// Handle for operator commands from other threads.
    pub fn handle(&self) -> ControlHandle<A, S>
    where
        S: Clone,
    {
        ControlHandle::new(
            Arc::clone(&self.control),
            self.scheduler.clone(),
            self.snapshot.clone(),
        )
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Announce the loop to observers.
    pub fn start(&mut self) {
        let mode = self.reader.mode();
        let backend = self.persistence.current_backend();
        info!(
            "Orchestrator: started ({} sensors, {} backend, every {}s)",
            mode.as_str(),
            backend,
            self.interval.as_secs()
        );
        self.broadcaster.publish(&LoopEvent::Started { mode, backend });
    }

    /// Run one tick under the failure policy and return how long to wait
    /// before the next call.
    pub fn run_once(&mut self) -> Duration {
        let recovering = matches!(self.state, LoopState::Degraded { .. });
        if recovering {
            info!("Orchestrator: retrying after backoff");
            self.state = LoopState::Running;
        }

        let result = self.tick();
        self.publish_backend_change();

        match result {
            Ok(_) => {
                if recovering {
                    info!("Orchestrator: recovered");
                    self.broadcaster.publish(&LoopEvent::Recovered);
                }
                self.interval
            }
            Err(e) => {
                error!(
                    "Orchestrator: tick failed: {e}; degraded, retry in {}s",
                    self.backoff.as_secs()
                );
                self.broadcaster.publish(&LoopEvent::Degraded {
                    error: e.to_string(),
                    retry_in_secs: self.backoff.as_secs(),
                });
                self.state = LoopState::Degraded {
                    last_error: e.to_string(),
                    retry_at: Instant::now() + self.backoff,
                };
                self.backoff
            }
        }
    }

    // ── Per-tick orchestration ────────────────────────────────

    /// One full cycle: read → decide → save → publish.
    pub fn tick(&mut self) -> Result<TickReport> {
        // 1. Snapshot what the reader needs, without holding the lock
        //    across sensor I/O.
        let (phase, phase_config, actuators) = {
            let ctx = lock_control(&self.control)?;
            (ctx.phase(), ctx.phase_config()?.clone(), ctx.actuators())
        };

        // 2. Read
        let mut reading = self.reader.read(&ReadContext {
            now: self.clock.now(),
            phase,
            phase_config: &phase_config,
            actuators,
        });

        // 3. Decide + drive actuators
        let outcome =
            lock_control(&self.control)?.step(&reading, self.clock.local_hour(), Instant::now())?;
        if let Some(directive) = outcome.timer {
            self.scheduler.submit(directive);
        }

        // 4. Save
        let id = self.persist(&mut reading)?;

        // 5. Publish
        let update = StateUpdate {
            reading: reading.clone(),
            actuators: outcome.actuators,
            backend: self.persistence.status(),
        };
        self.snapshot.store(update.clone());
        self.broadcaster.publish(&LoopEvent::Update(update));

        Ok(TickReport {
            reading,
            actuators: outcome.actuators,
            id,
            commands: outcome.commands.len(),
        })
    }

    fn persist(&mut self, reading: &mut Reading) -> Result<ReadingId> {
        if let Err(e) = self.flush_backlog() {
            self.enqueue(reading.clone());
            return Err(e.into());
        }
        match self.persistence.save(reading) {
            Ok(id) => Ok(id),
            Err(e) => {
                self.enqueue(reading.clone());
                Err(e.into())
            }
        }
    }

    fn flush_backlog(&mut self) -> core::result::Result<(), StoreError> {
        let pending = self.backlog.len();
        while let Some(oldest) = self.backlog.front_mut() {
            self.persistence.save(oldest)?;
            self.backlog.pop_front();
        }
        if pending > 0 {
            info!("Orchestrator: flushed {pending} unsaved readings");
        }
        Ok(())
    }

    fn enqueue(&mut self, reading: Reading) {
        if self.backlog.is_full() {
            if let Some(dropped) = self.backlog.pop_front() {
                warn!(
                    "Orchestrator: backlog full, dropping unsaved reading from {}",
                    dropped.timestamp
                );
            }
        }
        if self.backlog.push_back(reading).is_err() {
            warn!("Orchestrator: backlog rejected reading");
        }
    }

    fn publish_backend_change(&mut self) {
        let current = self.persistence.current_backend();
        if current != self.last_backend {
            self.broadcaster.publish(&LoopEvent::BackendChanged {
                from: self.last_backend,
                to: current,
            });
            self.last_backend = current;
        }
    }
}
