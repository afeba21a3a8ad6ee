//! Simulated sensor source, used when no hardware sensor layer is present.
//!
//! Values are physically plausible rather than random:
//!
//! - temperature follows a day/night sinusoid (`24 + 3·sin((h-6)·π/12)`)
//!   or sits near the phase midpoint
//! - humidity is anti-correlated with temperature, or phase-centred
//! - CO2 is an 800 ppm baseline with noise, floored at 400
//! - the reservoir drains over time, faster while the fogger runs; the
//!   level is reported through the same echo-distance conversion as the
//!   ultrasonic sensor, so the dead zone reads as empty in both modes

use chrono::{DateTime, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{
    PhaseConfig, SensorLayout, SimulationConfig, SimulationProfile, TankGeometry,
};
use crate::model::Measurements;
use crate::sensors::water_level::{distance_for_level, level_percent};

/// Inputs the simulator needs besides its own state.
#[derive(Debug, Clone, Copy)]
pub struct SimInputs<'a> {
    pub now: DateTime<Utc>,
    pub phase: &'a PhaseConfig,
    pub fogger_active: bool,
    pub lights_active: bool,
}

pub struct Simulator {
    rng: StdRng,
    config: SimulationConfig,
    layout: SensorLayout,
    tank: TankGeometry,
    water_pct: f32,
    last_sample: Option<DateTime<Utc>>,
}

impl Simulator {
    pub fn new(config: SimulationConfig, layout: SensorLayout, tank: TankGeometry) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng,
            config,
            layout,
            tank,
            water_pct: config.initial_water_pct.clamp(0.0, 100.0),
            last_sample: None,
        }
    }

    /// Current simulated reservoir level (%).
    pub fn water_pct(&self) -> f32 {
        self.water_pct
    }

    /// Echo distance (cm) the ultrasonic sensor would report right now.
    pub fn echo_distance_cm(&self) -> f32 {
        distance_for_level(&self.tank, self.water_pct)
    }

    pub fn sample(&mut self, inputs: &SimInputs<'_>) -> Measurements {
        self.drain(inputs.now, inputs.fogger_active);

        let (temperature, humidity) = match self.config.profile {
            SimulationProfile::Diurnal => self.diurnal(inputs.now),
            SimulationProfile::PhaseCentered => self.phase_centered(inputs.phase),
        };
        let co2 = (800.0 + self.rng.gen_range(-100.0_f32..=150.0)).max(400.0);

        let light_intensity = self.layout.light.then(|| {
            let lux: f32 = if inputs.lights_active {
                self.rng.gen_range(450.0..=650.0)
            } else {
                self.rng.gen_range(0.0..=30.0)
            };
            lux.round() as u16
        });
        let water_level = self
            .layout
            .water_level
            .then(|| round1(level_percent(&self.tank, self.echo_distance_cm())));

        Measurements {
            temperature: round1(temperature),
            humidity: round1(humidity),
            co2: co2.round() as u32,
            light_intensity,
            water_level,
        }
    }

    fn diurnal(&mut self, now: DateTime<Utc>) -> (f32, f32) {
        let hour = now.num_seconds_from_midnight() as f32 / 3600.0;
        let base = 24.0 + 3.0 * ((hour - 6.0) * core::f32::consts::PI / 12.0).sin();
        let temperature = base + self.rng.gen_range(-0.5..=0.5);
        let humidity =
            (65.0 - 1.2 * (temperature - 24.0) + self.rng.gen_range(-2.0..=2.0)).clamp(30.0, 90.0);
        (temperature, humidity)
    }

    fn phase_centered(&mut self, phase: &PhaseConfig) -> (f32, f32) {
        let t_spread = (phase.temperature.max - phase.temperature.min) / 4.0;
        let h_spread = (phase.humidity.max - phase.humidity.min) / 4.0;
        let temperature = phase.temperature.midpoint() + self.rng.gen_range(-t_spread..=t_spread);
        let humidity = (phase.humidity.midpoint() + self.rng.gen_range(-h_spread..=h_spread))
            .clamp(0.0, 100.0);
        (temperature, humidity)
    }

    fn drain(&mut self, now: DateTime<Utc>, fogger_active: bool) {
        if let Some(last) = self.last_sample {
            let hours = (now - last).num_milliseconds().max(0) as f32 / 3_600_000.0;
            let rate = if fogger_active {
                self.config.fogger_water_loss_per_hour
            } else {
                self.config.idle_water_loss_per_hour
            };
            self.water_pct = (self.water_pct - rate * hours).clamp(0.0, 100.0);
        }
        self.last_sample = Some(now);
    }
}

fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}
