//! Status classification.
//!
//! A pure function of a reading's measurements and the active phase's
//! ranges.  Out-of-range quantities are collected into an [`Issues`]
//! bitmask and the count decides the status:
//!
//! ```text
//!   issues:   0         1       2         3+
//!   status:   optimal   good    warning   critical
//! ```
//!
//! Water below the critical level forces `critical` regardless of the count.

use core::fmt;

use crate::config::{AlertThresholds, PhaseConfig};
use crate::model::{Measurements, Status};

/// One out-of-range quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Issue {
    Temperature = 0b0000_0001,
    Humidity = 0b0000_0010,
    Co2 = 0b0000_0100,
    LightLow = 0b0000_1000,
    WaterLow = 0b0001_0000,
}

impl Issue {
    pub const ALL: [Self; 5] = [
        Self::Temperature,
        Self::Humidity,
        Self::Co2,
        Self::LightLow,
        Self::WaterLow,
    ];

    pub const fn mask(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature out of range"),
            Self::Humidity => write!(f, "humidity out of range"),
            Self::Co2 => write!(f, "CO2 out of range"),
            Self::LightLow => write!(f, "light too low"),
            Self::WaterLow => write!(f, "water level low"),
        }
    }
}

/// Set of issues found in one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Issues(u8);

impl Issues {
    pub const NONE: Self = Self(0);

    pub fn insert(&mut self, issue: Issue) {
        self.0 |= issue.mask();
    }

    pub fn contains(self, issue: Issue) -> bool {
        self.0 & issue.mask() != 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Issue> {
        Issue::ALL.into_iter().filter(move |i| self.contains(*i))
    }
}

/// Result of classifying one reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Assessment {
    pub status: Status,
    pub issues: Issues,
}

/// Collect the out-of-range quantities.  Bounds are inclusive.
pub fn find_issues(m: &Measurements, phase: &PhaseConfig, t: &AlertThresholds) -> Issues {
    let mut issues = Issues::NONE;

    let temp_lo = phase.temperature.min - t.temperature_margin_c;
    let temp_hi = phase.temperature.max + t.temperature_margin_c;
    if !(temp_lo..=temp_hi).contains(&m.temperature) {
        issues.insert(Issue::Temperature);
    }

    let hum_lo = phase.humidity.min - t.humidity_low_margin;
    let hum_hi = phase.humidity.max + t.humidity_high_margin;
    if !(hum_lo..=hum_hi).contains(&m.humidity) {
        issues.insert(Issue::Humidity);
    }

    if !(t.co2_min_ppm..=t.co2_max_ppm).contains(&m.co2) {
        issues.insert(Issue::Co2);
    }

    if phase.needs_light && m.light_intensity.is_some_and(|l| l < t.light_min) {
        issues.insert(Issue::LightLow);
    }

    if m.water_level.is_some_and(|w| w < t.water_low_pct) {
        issues.insert(Issue::WaterLow);
    }

    issues
}

/// Derive the status for a reading under the given phase.
pub fn classify(m: &Measurements, phase: &PhaseConfig, t: &AlertThresholds) -> Assessment {
    let issues = find_issues(m, phase, t);
    let water_critical = m.water_level.is_some_and(|w| w < t.water_critical_pct);
    let status = if water_critical {
        Status::Critical
    } else {
        match issues.count() {
            0 => Status::Optimal,
            1 => Status::Good,
            2 => Status::Warning,
            _ => Status::Critical,
        }
    };
    Assessment { status, issues }
}
