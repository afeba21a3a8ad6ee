//! Sensor subsystem: unit conversions, the simulator, and the aggregating
//! [`SensorReader`].
//!
//! The reader produces one [`Reading`] per tick.  The source is chosen once
//! at startup:
//!
//! ```text
//!   Hardware:   SensorDriver ─► convert ─► + offset ─┐
//!                                                    ├─► last-known ─► clamp ─► classify
//!   Simulation: Simulator ───────────────────────────┘   substitution
//! ```
//!
//! A failed field never fails the whole reading; the last good value for
//! that field is reused instead.

pub mod light;
pub mod simulation;
pub mod water_level;

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::warn;

use crate::app::ports::SensorDriver;
use crate::config::{
    AlertThresholds, CalibrationOffsets, PhaseConfig, SensorLayout, SystemConfig, TankGeometry,
};
use crate::error::SensorError;
use crate::model::{ActuatorState, GrowthPhase, Measurements, Reading};
use crate::status;
use simulation::{SimInputs, Simulator};

/// Fallback CO2 when the sensor has never produced a value (outdoor air).
const CO2_AMBIENT_PPM: f32 = 400.0;

/// Which source feeds the reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorMode {
    Hardware,
    Simulation,
}

impl SensorMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Hardware => "hardware",
            Self::Simulation => "simulation",
        }
    }
}

/// Per-tick inputs that live outside the reader.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    pub now: DateTime<Utc>,
    pub phase: GrowthPhase,
    pub phase_config: &'a PhaseConfig,
    pub actuators: ActuatorState,
}

// ── Field bookkeeping ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Temperature = 0,
    Humidity = 1,
    Co2 = 2,
    Light = 3,
    WaterLevel = 4,
}

impl Field {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Co2 => "co2",
            Self::Light => "light",
            Self::WaterLevel => "water_level",
        }
    }
}

/// Last good value per field.
#[derive(Debug, Clone, Copy, Default)]
struct LastKnown([Option<f32>; 5]);

impl LastKnown {
    /// Record a fresh value, or fall back to the last good one, or to
    /// `seed` when there has never been one.
    fn resolve(&mut self, field: Field, fresh: Result<f32, SensorError>, seed: f32) -> f32 {
        let slot = &mut self.0[field as usize];
        match fresh {
            Ok(v) => {
                *slot = Some(v);
                v
            }
            Err(e) => match *slot {
                Some(last) => {
                    warn!("SensorReader: {} read failed ({e}), reusing {last:.1}", field.name());
                    last
                }
                None => {
                    warn!(
                        "SensorReader: {} read failed ({e}), no history, using {seed:.1}",
                        field.name()
                    );
                    seed
                }
            },
        }
    }

    fn remember(&mut self, m: &Measurements) {
        self.0[Field::Temperature as usize] = Some(m.temperature);
        self.0[Field::Humidity as usize] = Some(m.humidity);
        self.0[Field::Co2 as usize] = Some(m.co2 as f32);
        if let Some(l) = m.light_intensity {
            self.0[Field::Light as usize] = Some(f32::from(l));
        }
        if let Some(w) = m.water_level {
            self.0[Field::WaterLevel as usize] = Some(w);
        }
    }
}

// ── Hardware source ───────────────────────────────────────────

struct HardwareSource {
    driver: Box<dyn SensorDriver + Send>,
    calibration: CalibrationOffsets,
    tank: TankGeometry,
    vref: f32,
    timeout: Duration,
}

impl HardwareSource {
    /// Run one driver read, turning late or non-finite values into errors.
    fn sample(
        &mut self,
        read: impl FnOnce(&mut dyn SensorDriver, Duration) -> Option<f32>,
    ) -> Result<f32, SensorError> {
        let started = Instant::now();
        let value = read(self.driver.as_mut(), self.timeout);
        if started.elapsed() > self.timeout {
            return Err(SensorError::Timeout);
        }
        match value {
            Some(v) if v.is_finite() => Ok(v),
            Some(_) => Err(SensorError::NotFinite),
            None => Err(SensorError::NoData),
        }
    }

    fn measure(
        &mut self,
        layout: SensorLayout,
        last: &mut LastKnown,
        phase: &PhaseConfig,
    ) -> Measurements {
        let cal = self.calibration;

        let temperature = self
            .sample(|d, t| d.temperature_c(t))
            .map(|v| v + cal.temperature);
        let temperature =
            last.resolve(Field::Temperature, temperature, phase.temperature.midpoint());

        let humidity = self
            .sample(|d, t| d.humidity_pct(t))
            .map(|v| v + cal.humidity);
        let humidity = last.resolve(Field::Humidity, humidity, phase.humidity.midpoint());

        let co2 = self.sample(|d, t| d.co2_ppm(t)).map(|v| v + cal.co2);
        let co2 = last.resolve(Field::Co2, co2, CO2_AMBIENT_PPM);

        let light_intensity = if layout.light {
            let vref = self.vref;
            let light = self
                .sample(|d, t| d.light_voltage(t))
                .map(|v| light::intensity_from_voltage(v, vref) + cal.light);
            let light = last.resolve(Field::Light, light, 0.0);
            Some(light.clamp(0.0, light::LIGHT_SCALE_MAX).round() as u16)
        } else {
            None
        };

        // No history reads as an empty tank so the fogger stays off.
        let water_level = if layout.water_level {
            let tank = self.tank;
            let water = self
                .sample(|d, t| d.water_distance_cm(t))
                .map(|cm| water_level::level_percent(&tank, cm) + cal.water_level);
            Some(last.resolve(Field::WaterLevel, water, 0.0))
        } else {
            None
        };

        Measurements {
            temperature,
            humidity,
            co2: co2.max(0.0).round() as u32,
            light_intensity,
            water_level,
        }
    }
}

enum Source {
    Hardware(HardwareSource),
    Simulation(Simulator),
}

// ── Reader ────────────────────────────────────────────────────

/// Produces one normalized reading per tick.
pub struct SensorReader {
    device_id: String,
    source: Source,
    layout: SensorLayout,
    alerts: AlertThresholds,
    last: LastKnown,
}

impl SensorReader {
    /// Read real sensors through `driver`.
    pub fn hardware(config: &SystemConfig, driver: Box<dyn SensorDriver + Send>) -> Self {
        Self::with_source(
            config,
            Source::Hardware(HardwareSource {
                driver,
                calibration: config.calibration,
                tank: config.tank,
                vref: config.adc_vref,
                timeout: config.sensor_timeout(),
            }),
        )
    }

    /// Generate plausible values instead of reading hardware.
    pub fn simulated(config: &SystemConfig) -> Self {
        Self::with_source(
            config,
            Source::Simulation(Simulator::new(config.simulation, config.sensors, config.tank)),
        )
    }

    /// Pick hardware when a driver is available, simulation otherwise.
    pub fn from_driver(
        config: &SystemConfig,
        driver: Option<Box<dyn SensorDriver + Send>>,
    ) -> Self {
        match driver {
            Some(d) => Self::hardware(config, d),
            None => Self::simulated(config),
        }
    }

    fn with_source(config: &SystemConfig, source: Source) -> Self {
        Self {
            device_id: config.device_id.clone(),
            source,
            layout: config.sensors,
            alerts: config.alerts,
            last: LastKnown::default(),
        }
    }

    pub fn mode(&self) -> SensorMode {
        match self.source {
            Source::Hardware(_) => SensorMode::Hardware,
            Source::Simulation(_) => SensorMode::Simulation,
        }
    }

    /// Take one reading.  Never fails; see the module docs.
    pub fn read(&mut self, ctx: &ReadContext<'_>) -> Reading {
        let measured = match &mut self.source {
            Source::Hardware(hw) => hw.measure(self.layout, &mut self.last, ctx.phase_config),
            Source::Simulation(sim) => {
                let m = sim.sample(&SimInputs {
                    now: ctx.now,
                    phase: ctx.phase_config,
                    fogger_active: ctx.actuators.fogger_active,
                    lights_active: ctx.actuators.lights_active,
                });
                self.last.remember(&m);
                m
            }
        }
        .clamped();

        let assessment = status::classify(&measured, ctx.phase_config, &self.alerts);

        Reading {
            device_id: self.device_id.clone(),
            timestamp: ctx.now,
            server_timestamp: None,
            temperature: measured.temperature,
            humidity: measured.humidity,
            co2: measured.co2,
            light_intensity: measured.light_intensity,
            water_level: measured.water_level,
            growth_phase: ctx.phase,
            status: assessment.status,
        }
    }
}
