//! System configuration parameters
//!
//! All tunable parameters for the Mycobox controller.  Values come from the
//! JSON config file (see [`crate::adapters::config_file`]) with environment
//! overrides applied by the binary.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::GrowthPhase;

// ═══════════════════════════════════════════════════════════════
//  Growth phases
// ═══════════════════════════════════════════════════════════════

/// Inclusive optimal range for one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub min: f32,
    pub max: f32,
}

impl Band {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn midpoint(&self) -> f32 {
        (self.min + self.max) / 2.0
    }
}

/// Optimal climate for one growth phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    pub name: String,
    /// °C
    pub temperature: Band,
    /// % RH
    pub humidity: Band,
    /// Whether the light schedule applies in this phase.
    pub needs_light: bool,
}

/// Read-only phase lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseTable(BTreeMap<GrowthPhase, PhaseConfig>);

impl PhaseTable {
    pub fn new(entries: impl IntoIterator<Item = (GrowthPhase, PhaseConfig)>) -> Self {
        Self(entries.into_iter().collect())
    }

    pub fn get(&self, phase: GrowthPhase) -> Option<&PhaseConfig> {
        self.0.get(&phase)
    }

    /// Look up a phase, failing with `UnknownPhase` when it is not configured.
    pub fn require(&self, phase: GrowthPhase) -> Result<&PhaseConfig, ConfigError> {
        self.get(phase)
            .ok_or_else(|| ConfigError::UnknownPhase(phase.as_str().to_string()))
    }

    pub fn contains(&self, phase: GrowthPhase) -> bool {
        self.0.contains_key(&phase)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (GrowthPhase, &PhaseConfig)> {
        self.0.iter().map(|(p, c)| (*p, c))
    }
}

impl Default for PhaseTable {
    fn default() -> Self {
        Self::new([
            (
                GrowthPhase::Colonization,
                PhaseConfig {
                    name: "Colonization".into(),
                    temperature: Band::new(22.0, 27.0),
                    humidity: Band::new(60.0, 75.0),
                    needs_light: false,
                },
            ),
            (
                GrowthPhase::Pinning,
                PhaseConfig {
                    name: "Pinning".into(),
                    temperature: Band::new(18.0, 22.0),
                    humidity: Band::new(80.0, 95.0),
                    needs_light: true,
                },
            ),
            (
                GrowthPhase::Fruiting,
                PhaseConfig {
                    name: "Fruiting".into(),
                    temperature: Band::new(20.0, 26.0),
                    humidity: Band::new(65.0, 85.0),
                    needs_light: true,
                },
            ),
        ])
    }
}

// ═══════════════════════════════════════════════════════════════
//  Light schedule
// ═══════════════════════════════════════════════════════════════

/// Daily light window `[on_hour, off_hour)` in local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightSchedule {
    /// Hour the lights come on (0-23).
    pub on_hour: u8,
    /// Hour the lights go off (0-23).  May be earlier than `on_hour`.
    pub off_hour: u8,
}

impl LightSchedule {
    pub fn is_on(&self, hour: u32) -> bool {
        let (on, off) = (u32::from(self.on_hour), u32::from(self.off_hour));
        if on <= off {
            hour >= on && hour < off
        } else {
            // e.g. 20..8 wraps around midnight
            hour >= on || hour < off
        }
    }
}

impl Default for LightSchedule {
    fn default() -> Self {
        Self {
            on_hour: 8,
            off_hour: 20,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Thresholds
// ═══════════════════════════════════════════════════════════════

/// Constants for status classification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Allowed drift outside the phase temperature band (°C).
    pub temperature_margin_c: f32,
    /// Allowed drift below the phase humidity band (% RH).
    pub humidity_low_margin: f32,
    /// Allowed drift above the phase humidity band (% RH).
    pub humidity_high_margin: f32,
    pub co2_min_ppm: u32,
    pub co2_max_ppm: u32,
    /// Minimum light intensity when the phase needs light.
    pub light_min: u16,
    /// Water below this counts as an issue (%).
    pub water_low_pct: f32,
    /// Water below this forces `critical` (%).
    pub water_critical_pct: f32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            temperature_margin_c: 2.0,
            humidity_low_margin: 10.0,
            humidity_high_margin: 5.0,
            co2_min_ppm: 600,
            co2_max_ppm: 1500,
            light_min: 200,
            water_low_pct: 20.0,
            water_critical_pct: 10.0,
        }
    }
}

/// Constants for the actuator rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlThresholds {
    /// Fogger is forced off below this water level (%).
    pub water_cutoff_pct: f32,
    /// Fogger may only start above this water level (%).
    pub fogger_min_water_pct: f32,
    /// Fogger starts when humidity drops this far below the phase minimum.
    pub humidity_on_margin: f32,
    /// Fan boosts when humidity rises this far above the phase maximum.
    pub humidity_fan_margin: f32,
    /// Fan duty used by the humidity-high rule (%).
    pub fan_boost_percent: u8,
    /// Fogger auto-off after this many seconds.
    pub fogger_on_secs: u32,
}

impl ControlThresholds {
    pub fn fogger_on_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.fogger_on_secs))
    }
}

impl Default for ControlThresholds {
    fn default() -> Self {
        Self {
            water_cutoff_pct: 15.0,
            fogger_min_water_pct: 20.0,
            humidity_on_margin: 5.0,
            humidity_fan_margin: 5.0,
            fan_boost_percent: 50,
            fogger_on_secs: 30,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Sensors
// ═══════════════════════════════════════════════════════════════

/// Per-field offsets added after unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationOffsets {
    pub temperature: f32,
    pub humidity: f32,
    pub co2: f32,
    pub light: f32,
    pub water_level: f32,
}

/// Ultrasonic reservoir geometry (cm).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankGeometry {
    /// Sensor mount height above the reservoir floor.
    pub sensor_height_cm: f32,
    /// Maximum usable water depth.
    pub max_depth_cm: f32,
    /// Depth below which the pump/fogger cannot draw (dead zone).
    pub min_depth_cm: f32,
}

impl Default for TankGeometry {
    fn default() -> Self {
        Self {
            sensor_height_cm: 35.0,
            max_depth_cm: 30.0,
            min_depth_cm: 5.0,
        }
    }
}

/// Which optional sensors are fitted on this deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorLayout {
    pub light: bool,
    pub water_level: bool,
}

impl Default for SensorLayout {
    fn default() -> Self {
        Self {
            light: true,
            water_level: true,
        }
    }
}

/// Shape of simulated temperature and humidity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationProfile {
    /// Day/night sinusoid, humidity anti-correlated with temperature.
    #[default]
    Diurnal,
    /// Noise around the active phase's midpoints.
    PhaseCentered,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub profile: SimulationProfile,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
    pub initial_water_pct: f32,
    /// Reservoir loss per hour with the fogger idle (%).
    pub idle_water_loss_per_hour: f32,
    /// Reservoir loss per hour with the fogger running (%).
    pub fogger_water_loss_per_hour: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            profile: SimulationProfile::Diurnal,
            seed: None,
            initial_water_pct: 80.0,
            idle_water_loss_per_hour: 0.5,
            fogger_water_loss_per_hour: 6.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Storage
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite fallback database file.
    pub sqlite_path: String,
    /// MongoDB connection string; `None` runs on the fallback only.
    pub mongo_uri: Option<String>,
    pub database: String,
    pub collection: String,
    /// Server selection / connect timeout for the primary (ms).
    pub connect_timeout_ms: u32,
}

impl StorageConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.connect_timeout_ms))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: "sensor_data.db".into(),
            mongo_uri: None,
            database: "sensor_db".into(),
            collection: "readings".into(),
            connect_timeout_ms: 5000,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  System configuration
// ═══════════════════════════════════════════════════════════════

/// Core system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    pub device_id: String,

    // --- Timing ---
    /// Sampling tick interval (seconds)
    pub sample_interval_secs: u32,
    /// Primary backend probe interval (seconds)
    pub health_interval_secs: u32,
    /// Wait after a failed tick (seconds)
    pub degraded_backoff_secs: u32,
    /// Time in-flight work gets on shutdown (milliseconds)
    pub shutdown_grace_ms: u32,
    /// Switch every actuator off on shutdown
    pub fail_safe_on_shutdown: bool,

    // --- Control ---
    pub initial_phase: GrowthPhase,
    pub phases: PhaseTable,
    pub light_schedule: LightSchedule,
    pub control: ControlThresholds,
    pub alerts: AlertThresholds,

    // --- Sensors ---
    pub calibration: CalibrationOffsets,
    /// ADC reference voltage for the light sensor (V)
    pub adc_vref: f32,
    pub tank: TankGeometry,
    /// Upper bound on a single sensor read (milliseconds)
    pub sensor_timeout_ms: u32,
    pub sensors: SensorLayout,
    pub simulation: SimulationConfig,

    // --- Persistence ---
    pub storage: StorageConfig,
}

impl SystemConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.sample_interval_secs))
    }

    pub fn health_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.health_interval_secs))
    }

    pub fn degraded_backoff(&self) -> Duration {
        Duration::from_secs(u64::from(self.degraded_backoff_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(u64::from(self.shutdown_grace_ms))
    }

    pub fn sensor_timeout(&self) -> Duration {
        Duration::from_millis(u64::from(self.sensor_timeout_ms))
    }

    /// Range-check every field.  The first violation is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device_id.trim().is_empty() {
            return Err(ConfigError::ValidationFailed("device_id must not be empty"));
        }
        if !(1..=3600).contains(&self.sample_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "sample_interval_secs must be 1–3600",
            ));
        }
        if !(1..=3600).contains(&self.health_interval_secs) {
            return Err(ConfigError::ValidationFailed(
                "health_interval_secs must be 1–3600",
            ));
        }
        if self.degraded_backoff_secs == 0 || self.degraded_backoff_secs > self.sample_interval_secs
        {
            return Err(ConfigError::ValidationFailed(
                "degraded_backoff_secs must be 1–sample_interval_secs",
            ));
        }
        if self.shutdown_grace_ms > 60_000 {
            return Err(ConfigError::ValidationFailed(
                "shutdown_grace_ms must be 0–60000",
            ));
        }
        if self.phases.is_empty() {
            return Err(ConfigError::ValidationFailed("phases must not be empty"));
        }
        if !self.phases.contains(self.initial_phase) {
            return Err(ConfigError::UnknownPhase(
                self.initial_phase.as_str().to_string(),
            ));
        }
        for (_, phase) in self.phases.iter() {
            if !(phase.temperature.min < phase.temperature.max) {
                return Err(ConfigError::ValidationFailed(
                    "phase temperature min must be < max",
                ));
            }
            if !(phase.humidity.min < phase.humidity.max)
                || phase.humidity.min < 0.0
                || phase.humidity.max > 100.0
            {
                return Err(ConfigError::ValidationFailed(
                    "phase humidity must satisfy 0 <= min < max <= 100",
                ));
            }
        }
        if self.light_schedule.on_hour > 23 || self.light_schedule.off_hour > 23 {
            return Err(ConfigError::ValidationFailed(
                "light_schedule hours must be 0–23",
            ));
        }
        if self.control.fan_boost_percent > 100 {
            return Err(ConfigError::ValidationFailed(
                "fan_boost_percent must be 0–100",
            ));
        }
        if !(1..=3600).contains(&self.control.fogger_on_secs) {
            return Err(ConfigError::ValidationFailed(
                "fogger_on_secs must be 1–3600",
            ));
        }
        if self.control.water_cutoff_pct > self.control.fogger_min_water_pct {
            return Err(ConfigError::ValidationFailed(
                "water_cutoff_pct must be <= fogger_min_water_pct",
            ));
        }
        if self.alerts.co2_min_ppm >= self.alerts.co2_max_ppm {
            return Err(ConfigError::ValidationFailed(
                "alerts co2_min_ppm must be < co2_max_ppm",
            ));
        }
        if self.alerts.water_critical_pct > self.alerts.water_low_pct {
            return Err(ConfigError::ValidationFailed(
                "alerts water_critical_pct must be <= water_low_pct",
            ));
        }
        if !(self.adc_vref > 0.0) {
            return Err(ConfigError::ValidationFailed("adc_vref must be > 0"));
        }
        let tank = &self.tank;
        if !(tank.min_depth_cm >= 0.0
            && tank.min_depth_cm < tank.max_depth_cm
            && tank.max_depth_cm <= tank.sensor_height_cm)
        {
            return Err(ConfigError::ValidationFailed(
                "tank must satisfy 0 <= min_depth < max_depth <= sensor_height",
            ));
        }
        if !(1..=10_000).contains(&self.sensor_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "sensor_timeout_ms must be 1–10000",
            ));
        }
        if !(0.0..=100.0).contains(&self.simulation.initial_water_pct) {
            return Err(ConfigError::ValidationFailed(
                "simulation initial_water_pct must be 0–100",
            ));
        }
        if self.simulation.idle_water_loss_per_hour < 0.0
            || self.simulation.fogger_water_loss_per_hour < 0.0
        {
            return Err(ConfigError::ValidationFailed(
                "simulation water loss rates must be >= 0",
            ));
        }
        if self.storage.sqlite_path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "storage sqlite_path must not be empty",
            ));
        }
        if !(100..=60_000).contains(&self.storage.connect_timeout_ms) {
            return Err(ConfigError::ValidationFailed(
                "storage connect_timeout_ms must be 100–60000",
            ));
        }
        Ok(())
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            device_id: "raspberry-pi-01".into(),

            // Timing
            sample_interval_secs: 10,
            health_interval_secs: 30,
            degraded_backoff_secs: 5,
            shutdown_grace_ms: 5000,
            fail_safe_on_shutdown: true,

            // Control
            initial_phase: GrowthPhase::Fruiting,
            phases: PhaseTable::default(),
            light_schedule: LightSchedule::default(),
            control: ControlThresholds::default(),
            alerts: AlertThresholds::default(),

            // Sensors
            calibration: CalibrationOffsets::default(),
            adc_vref: 3.3,
            tank: TankGeometry::default(),
            sensor_timeout_ms: 2000,
            sensors: SensorLayout::default(),
            simulation: SimulationConfig::default(),

            // Persistence
            storage: StorageConfig::default(),
        }
    }
}
