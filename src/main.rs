//! Mycobox — Main Entry Point
//!
//! Hexagonal architecture with one worker thread per periodic concern.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  SensorReader      SimulatedActuators   JsonConfigFile         │
//! │  (sim / hardware)  (ActuatorDriver)     (ConfigPort)           │
//! │  LogBroadcaster    ChannelBroadcaster   SystemClock            │
//! │  LocalStore        RemoteStore          Console (stdin)        │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │   Orchestrator · ControlContext · PersistenceService   │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Workers: tick · health · auto-off timer · event publisher     │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::fs::{File, OpenOptions};
use std::io::{BufRead, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use env_logger::Env;
use log::{debug, error, info, warn};

use mycobox::adapters::channel_sink::event_channel;
use mycobox::adapters::config_file::JsonConfigFile;
use mycobox::adapters::console::{parse_command, render_reply};
use mycobox::adapters::log_sink::LogBroadcaster;
use mycobox::adapters::relays::SimulatedActuators;
use mycobox::adapters::time::SystemClock;
use mycobox::app::context::{ControlContext, ControlHandle, lock_control};
use mycobox::app::events::LoopEvent;
use mycobox::app::orchestrator::Orchestrator;
use mycobox::app::ports::{Clock, ReadingStore};
use mycobox::config::SystemConfig;
use mycobox::control::ControlEngine;
use mycobox::persistence::PersistenceService;
use mycobox::persistence::health::HealthMonitor;
use mycobox::persistence::local::LocalStore;
use mycobox::persistence::remote::RemoteStore;
use mycobox::runtime::{SignalScheduler, Workers};
use mycobox::sensors::SensorReader;

const DEFAULT_CONFIG_PATH: &str = "mycobox.json";

// ── Environment overrides ─────────────────────────────────────

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn apply_env_overrides(config: &mut SystemConfig) {
    if let Some(uri) = env_value("MONGODB_URI") {
        config.storage.mongo_uri = Some(uri);
    }
    if let Some(id) = env_value("DEVICE_ID") {
        config.device_id = id;
    }
    if let Some(path) = env_value("MYCOBOX_DB") {
        config.storage.sqlite_path = path;
    }
}

// ── Persistence ───────────────────────────────────────────────

fn open_persistence(config: &SystemConfig, clock: Arc<dyn Clock>) -> Result<PersistenceService> {
    let storage = &config.storage;
    let local = LocalStore::open(&storage.sqlite_path)
        .with_context(|| format!("opening local store {}", storage.sqlite_path))?;

    let primary: Option<Box<dyn ReadingStore>> = match storage.mongo_uri.as_deref() {
        Some(uri) => match RemoteStore::connect(
            uri,
            &storage.database,
            &storage.collection,
            storage.connect_timeout(),
        ) {
            Ok(store) => Some(Box::new(store)),
            Err(e) => {
                warn!("Remote store client failed ({e}), running on local store only");
                None
            }
        },
        None => None,
    };

    Ok(PersistenceService::new(
        config.device_id.clone(),
        primary,
        Box::new(local),
        clock,
    ))
}

// ── Event delivery ────────────────────────────────────────────

/// JSON lines to `MYCOBOX_EVENT_LOG` when set, otherwise debug log.
fn event_writer() -> Result<impl FnMut(&LoopEvent) + Send + 'static> {
    let mut sink: Option<File> = match env_value("MYCOBOX_EVENT_LOG") {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening event log {path}"))?,
        ),
        None => None,
    };
    Ok(move |event: &LoopEvent| {
        let line = match serde_json::to_string(event) {
            Ok(line) => line,
            Err(e) => {
                warn!("Publisher: event not serializable: {e}");
                return;
            }
        };
        match sink.as_mut() {
            Some(file) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!("Publisher: event log write failed: {e}");
                }
            }
            None => debug!("EVENT | {line}"),
        }
    })
}

// ── Operator console ──────────────────────────────────────────

fn spawn_console(handle: ControlHandle<SimulatedActuators, SignalScheduler>) -> Result<()> {
    std::thread::Builder::new()
        .name("mycobox-console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => match handle.execute(command) {
                        Ok(reply) => println!("{}", render_reply(&reply)),
                        Err(e) => println!("error: {e}"),
                    },
                    Err(e) => println!("error: {e}"),
                }
            }
            debug!("Console: input closed");
        })
        .context("spawning console thread")?;
    Ok(())
}

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    info!("╔══════════════════════════════════════╗");
    info!("║  Mycobox v{}                      ║", env!("CARGO_PKG_VERSION"));
    info!("╚══════════════════════════════════════╝");

    // ── 2. Config (file, then environment) ────────────────────
    let config_path = env_value("MYCOBOX_CONFIG").unwrap_or_else(|| DEFAULT_CONFIG_PATH.into());
    let mut config = match JsonConfigFile::new(&config_path).load_or_default() {
        Ok(config) => config,
        Err(e) => {
            warn!("Config {config_path} unusable ({e}), using defaults");
            SystemConfig::default()
        }
    };
    apply_env_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    // ── 3. Persistence ────────────────────────────────────────
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
    let persistence = Arc::new(open_persistence(&config, Arc::clone(&clock))?);

    // ── 4. Control ────────────────────────────────────────────
    // No GPIO backend is linked into this binary; sensors and outputs run
    // simulated.
    let reader = SensorReader::simulated(&config);
    let control = ControlContext::new(
        config.phases.clone(),
        config.initial_phase,
        ControlEngine::new(config.control, config.light_schedule),
        SimulatedActuators::new(),
    )?
    .into_shared();

    info!(
        "Device {} | phase={} | sensors={} | backend={}",
        config.device_id,
        config.initial_phase,
        reader.mode().as_str(),
        persistence.current_backend()
    );

    // ── 5. Workers ────────────────────────────────────────────
    let scheduler = SignalScheduler::new();
    let (channel_tx, feed) = event_channel();
    let orchestrator = Orchestrator::new(
        &config,
        reader,
        Arc::clone(&control),
        Arc::clone(&persistence),
        (LogBroadcaster::new(), channel_tx),
        scheduler.clone(),
        Arc::clone(&clock),
    );
    let handle = orchestrator.handle();

    let mut workers = Workers::new();
    workers.spawn_auto_off(Arc::clone(&control), scheduler)?;
    workers.spawn_health(HealthMonitor::new(
        Arc::clone(&persistence),
        config.health_interval(),
    ))?;
    workers.spawn_publisher(feed, event_writer()?)?;
    workers.spawn_sampling(orchestrator)?;
    spawn_console(handle)?;

    // ── 6. Wait for SIGINT / SIGTERM ──────────────────────────
    let stop = Arc::new(Signal::<CriticalSectionRawMutex, ()>::new());
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.signal(())).context("installing signal handler")?;
    }
    futures_lite::future::block_on(stop.wait());
    info!("Shutdown requested");

    // ── 7. Drain, then fail safe ──────────────────────────────
    let stragglers = workers.shutdown(config.shutdown_grace());
    if !stragglers.is_empty() {
        warn!("Shutdown: {stragglers:?} did not finish in time");
    }
    if config.fail_safe_on_shutdown {
        match lock_control(&control) {
            Ok(mut ctx) => match ctx.fail_safe() {
                Ok(()) => info!("Shutdown: all actuators off"),
                Err(e) => error!("Shutdown: fail-safe incomplete: {e}"),
            },
            Err(e) => error!("Shutdown: {e}, actuators left as-is"),
        }
    }
    info!("Mycobox stopped");
    Ok(())
}
