//! Mock adapters for integration tests.
//!
//! Sensors are scripted through a shared handle, actuators record every
//! call, and the in-memory store can be taken down and brought back so the
//! failover paths run without a database server.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use mycobox::app::events::LoopEvent;
use mycobox::app::ports::{
    ActuatorDriver, AutoOffScheduler, Broadcaster, Clock, ReadingStore, SensorDriver,
};
use mycobox::config::{SystemConfig, TankGeometry};
use mycobox::control::TimerDirective;
use mycobox::error::{ActuatorError, StoreError};
use mycobox::model::{GrowthPhase, Reading, Status};
use mycobox::persistence::ReadingId;
use mycobox::sensors::water_level::distance_for_level;

// ── Sensors ───────────────────────────────────────────────────

/// Raw values the mock driver returns.  `None` simulates a failed read.
#[derive(Debug, Clone, Copy)]
pub struct RawValues {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub co2: Option<f32>,
    pub light_voltage: Option<f32>,
    pub water_distance: Option<f32>,
}

/// Comfortable fruiting conditions: 23 °C, 75 %, 800 ppm, ~500 lux, 80 % tank.
pub fn comfortable() -> RawValues {
    RawValues {
        temperature: Some(23.0),
        humidity: Some(75.0),
        co2: Some(800.0),
        light_voltage: Some(1.65),
        water_distance: Some(water_distance(80.0)),
    }
}

pub fn water_distance(level_pct: f32) -> f32 {
    distance_for_level(&TankGeometry::default(), level_pct)
}

/// Scripted sensor driver; clone the handle to change values between ticks.
#[derive(Clone)]
pub struct MockSensors(Arc<Mutex<RawValues>>);

impl MockSensors {
    pub fn new(values: RawValues) -> Self {
        Self(Arc::new(Mutex::new(values)))
    }

    pub fn update(&self, f: impl FnOnce(&mut RawValues)) {
        f(&mut self.0.lock().unwrap());
    }

    fn get(&self) -> RawValues {
        *self.0.lock().unwrap()
    }
}

impl SensorDriver for MockSensors {
    fn temperature_c(&mut self, _timeout: Duration) -> Option<f32> {
        self.get().temperature
    }
    fn humidity_pct(&mut self, _timeout: Duration) -> Option<f32> {
        self.get().humidity
    }
    fn co2_ppm(&mut self, _timeout: Duration) -> Option<f32> {
        self.get().co2
    }
    fn light_voltage(&mut self, _timeout: Duration) -> Option<f32> {
        self.get().light_voltage
    }
    fn water_distance_cm(&mut self, _timeout: Duration) -> Option<f32> {
        self.get().water_distance
    }
}

// ── Actuators ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActuatorCall {
    Fogger(bool),
    Fan(u8),
    Lights(bool),
}

#[derive(Default)]
pub struct RecordingActuators {
    pub calls: Vec<ActuatorCall>,
    pub fail_fogger: bool,
}

impl RecordingActuators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fogger_calls(&self) -> Vec<bool> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                ActuatorCall::Fogger(on) => Some(*on),
                _ => None,
            })
            .collect()
    }
}

impl ActuatorDriver for RecordingActuators {
    fn set_fogger(&mut self, on: bool) -> Result<(), ActuatorError> {
        if self.fail_fogger {
            return Err(ActuatorError::GpioWriteFailed);
        }
        self.calls.push(ActuatorCall::Fogger(on));
        Ok(())
    }

    fn set_fan(&mut self, percent: u8) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Fan(percent));
        Ok(())
    }

    fn set_lights(&mut self, on: bool) -> Result<(), ActuatorError> {
        self.calls.push(ActuatorCall::Lights(on));
        Ok(())
    }
}

// ── Broadcaster ───────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingBroadcaster {
    pub events: Vec<LoopEvent>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn updates(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, LoopEvent::Update(_)))
            .count()
    }

    pub fn count(&self, pred: impl Fn(&LoopEvent) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn publish(&mut self, event: &LoopEvent) {
        self.events.push(event.clone());
    }
}

// ── Scheduler ─────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct RecordingScheduler(Arc<Mutex<Vec<TimerDirective>>>);

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directives(&self) -> Vec<TimerDirective> {
        self.0.lock().unwrap().clone()
    }
}

impl AutoOffScheduler for RecordingScheduler {
    fn submit(&self, directive: TimerDirective) {
        self.0.lock().unwrap().push(directive);
    }
}

// ── Clock ─────────────────────────────────────────────────────

/// Manually advanced clock.  Starts at 2024-05-01 12:00:00 UTC, hour 12.
#[derive(Clone)]
pub struct FixedClock {
    now: Arc<Mutex<DateTime<Utc>>>,
    hour: Arc<AtomicU32>,
}

impl FixedClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(
                Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            )),
            hour: Arc::new(AtomicU32::new(12)),
        }
    }

    pub fn advance(&self, secs: i64) {
        *self.now.lock().unwrap() += TimeDelta::seconds(secs);
    }

    pub fn set_hour(&self, hour: u32) {
        self.hour.store(hour, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn local_hour(&self) -> u32 {
        self.hour.load(Ordering::SeqCst)
    }
}

// ── Store ─────────────────────────────────────────────────────

struct FlakyInner {
    name: &'static str,
    up: AtomicBool,
    reads_up: AtomicBool,
    rows: Mutex<Vec<Reading>>,
}

/// In-memory [`ReadingStore`] that can be switched off.
#[derive(Clone)]
pub struct FlakyStore(Arc<FlakyInner>);

impl FlakyStore {
    pub fn new(name: &'static str) -> Self {
        Self(Arc::new(FlakyInner {
            name,
            up: AtomicBool::new(true),
            reads_up: AtomicBool::new(true),
            rows: Mutex::new(Vec::new()),
        }))
    }

    pub fn set_up(&self, up: bool) {
        self.0.up.store(up, Ordering::SeqCst);
    }

    /// Fail `latest` / `since` while writes and pings keep working.
    pub fn set_reads_up(&self, up: bool) {
        self.0.reads_up.store(up, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<Reading> {
        self.0.rows.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.0.up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} down", self.0.name)))
        }
    }

    fn check_read(&self) -> Result<(), StoreError> {
        self.check()?;
        if self.0.reads_up.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!("{} query failed", self.0.name)))
        }
    }

    fn sorted(&self, device_id: &str, keep: impl Fn(&Reading) -> bool) -> Vec<Reading> {
        let mut out: Vec<Reading> = self
            .rows()
            .into_iter()
            .filter(|r| r.device_id == device_id && keep(r))
            .collect();
        out.sort_by(|a, b| b.server_timestamp.cmp(&a.server_timestamp));
        out
    }
}

impl ReadingStore for FlakyStore {
    fn name(&self) -> &'static str {
        self.0.name
    }

    fn insert(&self, reading: &Reading) -> Result<ReadingId, StoreError> {
        self.check()?;
        let mut rows = self.0.rows.lock().unwrap();
        rows.push(reading.clone());
        Ok(ReadingId::Local(rows.len() as i64))
    }

    fn latest(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError> {
        self.check_read()?;
        let mut out = self.sorted(device_id, |_| true);
        out.truncate(limit);
        Ok(out)
    }

    fn since(
        &self,
        device_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError> {
        self.check_read()?;
        let mut out = self.sorted(device_id, |r| {
            r.server_timestamp.is_some_and(|ts| ts >= cutoff)
        });
        out.truncate(limit);
        Ok(out)
    }

    fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }
}

// ── Fixtures ──────────────────────────────────────────────────

pub fn test_config() -> SystemConfig {
    SystemConfig {
        device_id: "chamber-test".into(),
        initial_phase: GrowthPhase::Fruiting,
        ..SystemConfig::default()
    }
}

pub fn reading_at(clock: &FixedClock, humidity: f32) -> Reading {
    Reading {
        device_id: "chamber-test".into(),
        timestamp: clock.now(),
        server_timestamp: None,
        temperature: 23.0,
        humidity,
        co2: 800,
        light_intensity: Some(500),
        water_level: Some(80.0),
        growth_phase: GrowthPhase::Fruiting,
        status: Status::Optimal,
    }
}
