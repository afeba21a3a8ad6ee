//! Domain records shared by the sensor, control and persistence layers.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ── Growth phase ──────────────────────────────────────────────

/// Stage of the mushroom grow cycle; selects the climate targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowthPhase {
    Colonization,
    Pinning,
    Fruiting,
}

impl GrowthPhase {
    pub const ALL: [Self; 3] = [Self::Colonization, Self::Pinning, Self::Fruiting];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Colonization => "colonization",
            Self::Pinning => "pinning",
            Self::Fruiting => "fruiting",
        }
    }
}

impl fmt::Display for GrowthPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrowthPhase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownPhase(name.to_string()))
    }
}

// ── Status ────────────────────────────────────────────────────

/// Overall chamber health derived from a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Optimal,
    Good,
    Warning,
    Critical,
}

impl Status {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::Good => "good",
            Self::Warning => "warning",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "optimal" => Ok(Self::Optimal),
            "good" => Ok(Self::Good),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown status '{other}'")),
        }
    }
}

// ── Actuator state ────────────────────────────────────────────

/// Last commanded state of every actuator.  Starts all-off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActuatorState {
    pub fogger_active: bool,
    /// Exhaust fan duty, 0–100.
    pub fan_speed_percent: u8,
    /// Reported for completeness; no rule drives the heater.
    pub heater_active: bool,
    pub lights_active: bool,
}

impl ActuatorState {
    pub const ALL_OFF: Self = Self {
        fogger_active: false,
        fan_speed_percent: 0,
        heater_active: false,
        lights_active: false,
    };
}

// ── Measurements / Reading ────────────────────────────────────

/// The physical quantities of one sample, before identity and status
/// are attached.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Measurements {
    /// °C
    pub temperature: f32,
    /// % relative humidity
    pub humidity: f32,
    /// ppm
    pub co2: u32,
    /// 0–1000 relative lux, absent when no light sensor is fitted.
    pub light_intensity: Option<u16>,
    /// 0–100 % of usable reservoir depth.
    pub water_level: Option<f32>,
}

impl Measurements {
    /// Clamp every quantity into its physical range.
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.humidity = clamp_finite(self.humidity, 0.0, 100.0);
        self.light_intensity = self.light_intensity.map(|l| l.min(1000));
        self.water_level = self.water_level.map(|w| clamp_finite(w, 0.0, 100.0));
        self
    }
}

fn clamp_finite(v: f32, lo: f32, hi: f32) -> f32 {
    if v.is_nan() { lo } else { v.clamp(lo, hi) }
}

/// One sample from the chamber, as stored and broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub device_id: String,
    /// When the sample was taken.
    pub timestamp: DateTime<Utc>,
    /// Assigned by the persistence layer when the reading is stored.
    pub server_timestamp: Option<DateTime<Utc>>,
    pub temperature: f32,
    pub humidity: f32,
    pub co2: u32,
    pub light_intensity: Option<u16>,
    pub water_level: Option<f32>,
    pub growth_phase: GrowthPhase,
    pub status: Status,
}

impl Reading {
    pub fn measurements(&self) -> Measurements {
        Measurements {
            temperature: self.temperature,
            humidity: self.humidity,
            co2: self.co2,
            light_intensity: self.light_intensity,
            water_level: self.water_level,
        }
    }

    /// Re-apply the physical range clamps in place.
    pub fn clamp_ranges(&mut self) {
        let m = self.measurements().clamped();
        self.humidity = m.humidity;
        self.light_intensity = m.light_intensity;
        self.water_level = m.water_level;
    }
}
