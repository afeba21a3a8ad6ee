//! Worker threads for sampling, health probing and fogger auto-off.
//!
//! ```text
//!  ┌───────────────┐ TimerDirective ┌────────────────┐
//!  │ mycobox-tick  │───────────────▶│ mycobox-timer  │
//!  │ Orchestrator  │    (Signal)    │ auto-off loop  │
//!  └──────┬────────┘                └───────┬────────┘
//!         │      SharedControl (Mutex)      │
//!         └────────────────┬────────────────┘
//!                          ▼
//!                   ActuatorDriver
//!
//!  ┌───────────────┐             ┌────────────────┐
//!  │ mycobox-health│ probe ────▶ │ Persistence    │
//!  └───────────────┘             └────────────────┘
//! ```
//!
//! Each worker is a named std thread running one async task on an
//! `edge_executor::LocalExecutor`, with `async_io_mini` timers for the
//! waits.  A slow sensor read or database write on the tick thread never
//! delays the probe or the auto-off deadline.
//!
//! Shutdown: every task races its wait against a per-task stop
//! [`Signal`].  [`Workers::shutdown`] raises all of them and joins what
//! finishes within the grace period.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use async_io_mini::Timer;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;
use log::{debug, error, info, warn};

use crate::adapters::channel_sink::EventFeed;
use crate::app::context::{SharedControl, lock_control};
use crate::app::events::LoopEvent;
use crate::app::orchestrator::Orchestrator;
use crate::app::ports::{ActuatorDriver, AutoOffScheduler, Broadcaster};
use crate::control::{AutoOffDeadline, AutoOffToken, TimerDirective};
use crate::persistence::health::HealthMonitor;

type StopSignal = Arc<Signal<CriticalSectionRawMutex, ()>>;

/// Poll period while waiting for workers to finish.
const JOIN_POLL: Duration = Duration::from_millis(10);

// ───────────────────────────────────────────────────────────────
// Auto-off scheduler
// ───────────────────────────────────────────────────────────────

/// Hands timer directives to the auto-off task.
///
/// Directives coalesce: if several arrive before the task wakes, only the
/// latest is seen.  The task treats any directive as a wake-up and reads
/// the pending deadline from the control context, so neither coalescing nor
/// a directive submitted late by another thread can lose a deadline.
#[derive(Clone)]
pub struct SignalScheduler(Arc<Signal<CriticalSectionRawMutex, TimerDirective>>);

impl Default for SignalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalScheduler {
    pub fn new() -> Self {
        Self(Arc::new(Signal::new()))
    }

    async fn next(&self) -> TimerDirective {
        self.0.wait().await
    }
}

impl AutoOffScheduler for SignalScheduler {
    fn submit(&self, directive: TimerDirective) {
        self.0.signal(directive);
    }
}

// ───────────────────────────────────────────────────────────────
// Tasks
// ───────────────────────────────────────────────────────────────

/// Sleep for `duration`.  `true` if stop was raised first.
async fn sleep_or_stop(duration: Duration, stop: &Signal<CriticalSectionRawMutex, ()>) -> bool {
    future::or(
        async {
            stop.wait().await;
            true
        },
        async {
            Timer::after(duration).await;
            false
        },
    )
    .await
}

async fn sampling_loop<A, B>(
    mut orchestrator: Orchestrator<A, B, SignalScheduler>,
    stop: StopSignal,
) where
    A: ActuatorDriver,
    B: Broadcaster,
{
    orchestrator.start();
    loop {
        let wait = orchestrator.run_once();
        if sleep_or_stop(wait, &stop).await {
            break;
        }
    }
    info!(
        "Sampling: stopped ({} readings unsaved)",
        orchestrator.backlog_len()
    );
}

async fn health_loop(monitor: HealthMonitor, stop: StopSignal) {
    loop {
        if sleep_or_stop(monitor.interval(), &stop).await {
            break;
        }
        if monitor.probe() {
            debug!("Health: primary restored");
        }
    }
    info!("Health: stopped");
}

enum Wake {
    Stop,
    Directive(TimerDirective),
    Expired(AutoOffToken),
}

async fn auto_off_loop<A: ActuatorDriver>(
    control: SharedControl<A>,
    scheduler: SignalScheduler,
    stop: StopSignal,
) {
    let mut pending: Option<AutoOffDeadline> = None;

    loop {
        let expiry = async {
            match pending {
                Some(deadline) => {
                    Timer::after(deadline.at.saturating_duration_since(Instant::now())).await;
                    Wake::Expired(deadline.token)
                }
                None => future::pending::<Wake>().await,
            }
        };
        let wake = future::or(
            async {
                stop.wait().await;
                Wake::Stop
            },
            future::or(
                async { Wake::Directive(scheduler.next().await) },
                expiry,
            ),
        )
        .await;

        match wake {
            Wake::Stop => break,
            Wake::Directive(directive) => debug!("AutoOff: woken by {directive:?}"),
            Wake::Expired(token) => match lock_control(&control) {
                Ok(mut ctx) => {
                    ctx.expire_auto_off(token);
                }
                Err(e) => error!("AutoOff: {e}, fogger-off skipped"),
            },
        }

        // The context owns the deadline; a directive is only a wake-up.
        pending = match lock_control(&control) {
            Ok(ctx) => ctx.pending_auto_off(),
            Err(e) => {
                error!("AutoOff: {e}, timer idle");
                None
            }
        };
        if let Some(deadline) = pending {
            debug!(
                "AutoOff: armed, fires in {}ms",
                deadline
                    .at
                    .saturating_duration_since(Instant::now())
                    .as_millis()
            );
        }
    }
    info!("AutoOff: stopped");
}

async fn publisher_loop<F>(feed: EventFeed, mut deliver: F, stop: StopSignal)
where
    F: FnMut(&LoopEvent),
{
    loop {
        let next = future::or(
            async {
                stop.wait().await;
                None
            },
            async { Some(feed.next().await) },
        )
        .await;
        match next {
            Some(event) => deliver(&event),
            None => break,
        }
    }
    info!("Publisher: stopped");
}

// ───────────────────────────────────────────────────────────────
// Thread spawn
// ───────────────────────────────────────────────────────────────

/// Run the future built by `task` on its own named thread.
///
/// The future is built on the new thread, so it does not need to be `Send`.
fn spawn_worker<T, F>(name: &'static str, task: T) -> io::Result<JoinHandle<()>>
where
    T: FnOnce() -> F + Send + 'static,
    F: core::future::Future<Output = ()> + 'static,
{
    debug!("Spawning '{name}'");
    std::thread::Builder::new()
        .name(name.into())
        .spawn(move || {
            let executor: edge_executor::LocalExecutor<'_, 4> = edge_executor::LocalExecutor::new();
            future::block_on(executor.run(task()));
        })
}

/// Running worker threads and their stop signals.
#[derive(Default)]
pub struct Workers {
    threads: Vec<(&'static str, JoinHandle<()>, StopSignal)>,
}

impl Workers {
    pub fn new() -> Self {
        Self::default()
    }

    fn spawn<T, F>(&mut self, name: &'static str, task: T) -> io::Result<()>
    where
        T: FnOnce(StopSignal) -> F + Send + 'static,
        F: core::future::Future<Output = ()> + 'static,
    {
        let stop: StopSignal = Arc::new(Signal::new());
        let handle = spawn_worker(name, {
            let stop = Arc::clone(&stop);
            move || task(stop)
        })?;
        self.threads.push((name, handle, stop));
        Ok(())
    }

    /// Start the sampling loop.
    pub fn spawn_sampling<A, B>(
        &mut self,
        orchestrator: Orchestrator<A, B, SignalScheduler>,
    ) -> io::Result<()>
    where
        A: ActuatorDriver + Send + 'static,
        B: Broadcaster + Send + 'static,
    {
        self.spawn("mycobox-tick", move |stop| sampling_loop(orchestrator, stop))
    }

    /// Start the primary-backend probe.
    pub fn spawn_health(&mut self, monitor: HealthMonitor) -> io::Result<()> {
        self.spawn("mycobox-health", move |stop| health_loop(monitor, stop))
    }

    /// Start the fogger auto-off timer fed by `scheduler`.
    pub fn spawn_auto_off<A>(
        &mut self,
        control: SharedControl<A>,
        scheduler: SignalScheduler,
    ) -> io::Result<()>
    where
        A: ActuatorDriver + Send + 'static,
    {
        self.spawn("mycobox-timer", move |stop| {
            auto_off_loop(control, scheduler, stop)
        })
    }

    /// Drain `feed`, handing each event to `deliver`.
    pub fn spawn_publisher<F>(&mut self, feed: EventFeed, deliver: F) -> io::Result<()>
    where
        F: FnMut(&LoopEvent) + Send + 'static,
    {
        self.spawn("mycobox-publish", move |stop| {
            publisher_loop(feed, deliver, stop)
        })
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    /// Stop every worker and wait up to `grace` for them to finish.
    /// Returns the names of workers still running afterwards.
    pub fn shutdown(self, grace: Duration) -> Vec<&'static str> {
        info!("Runtime: stopping {} workers", self.threads.len());
        for (_, _, stop) in &self.threads {
            stop.signal(());
        }

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline
            && self.threads.iter().any(|(_, handle, _)| !handle.is_finished())
        {
            std::thread::sleep(JOIN_POLL);
        }

        let mut stragglers = Vec::new();
        for (name, handle, _) in self.threads {
            if !handle.is_finished() {
                warn!("Runtime: '{name}' still busy after {}ms", grace.as_millis());
                stragglers.push(name);
                continue;
            }
            if handle.join().is_err() {
                error!("Runtime: '{name}' panicked");
            }
        }
        stragglers
    }
}
