//! Port traits — the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ Orchestrator / ControlContext (domain)
//! ```
//!
//! Driven adapters (sensors, actuators, broadcasters, stores, config) implement
//! these traits.  The domain core consumes them via generics or trait objects,
//! so it never touches hardware, databases or sockets directly.
//!
//! - **ConfigPort** implementations MUST validate before persisting.
//! - All port errors are typed; callers handle every variant explicitly.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::app::events::LoopEvent;
use crate::config::SystemConfig;
use crate::control::TimerDirective;
use crate::error::{ActuatorError, ConfigError, StoreError};
use crate::model::Reading;
use crate::persistence::ReadingId;

// ───────────────────────────────────────────────────────────────
// Sensor driver (driven adapter: hardware → domain)
// ───────────────────────────────────────────────────────────────

/// One read per physical quantity, in the sensor's raw units.
///
/// `None` means the read failed.  Each call must return within `timeout`;
/// a late value is discarded by the reader.
pub trait SensorDriver {
    /// Air temperature (°C).
    fn temperature_c(&mut self, timeout: Duration) -> Option<f32>;
    /// Relative humidity (%).
    fn humidity_pct(&mut self, timeout: Duration) -> Option<f32>;
    /// CO2 concentration (ppm).
    fn co2_ppm(&mut self, timeout: Duration) -> Option<f32>;
    /// Light sensor ADC channel voltage (V).
    fn light_voltage(&mut self, timeout: Duration) -> Option<f32>;
    /// Ultrasonic echo distance to the reservoir surface (cm).
    fn water_distance_cm(&mut self, timeout: Duration) -> Option<f32>;
}

// ───────────────────────────────────────────────────────────────
// Actuator driver (driven adapter: domain → hardware)
// ───────────────────────────────────────────────────────────────

/// Write-side port.  Every call is idempotent and returns promptly.
pub trait ActuatorDriver {
    fn set_fogger(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Fan duty 0–100 %.
    fn set_fan(&mut self, percent: u8) -> Result<(), ActuatorError>;

    fn set_lights(&mut self, on: bool) -> Result<(), ActuatorError>;

    /// Switch everything off.  Every output is attempted; the first error
    /// is returned.
    fn all_off(&mut self) -> Result<(), ActuatorError> {
        let fogger = self.set_fogger(false);
        let fan = self.set_fan(0);
        let lights = self.set_lights(false);
        fogger.and(fan).and(lights)
    }
}

// ───────────────────────────────────────────────────────────────
// Broadcaster (driving adapter: domain → observers)
// ───────────────────────────────────────────────────────────────

/// Fire-and-forget publication of loop events.  Must never block on
/// subscribers.
pub trait Broadcaster {
    fn publish(&mut self, event: &LoopEvent);
}

impl<A: Broadcaster, B: Broadcaster> Broadcaster for (A, B) {
    fn publish(&mut self, event: &LoopEvent) {
        self.0.publish(event);
        self.1.publish(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Reading store (driven adapter: domain → database)
// ───────────────────────────────────────────────────────────────

/// One persistence backend.  Query results are ordered by
/// `server_timestamp` descending.
pub trait ReadingStore: Send + Sync {
    /// Short backend name for logs and status ("mongodb", "sqlite").
    fn name(&self) -> &'static str;

    /// Append a reading.  `server_timestamp` must already be set.
    fn insert(&self, reading: &Reading) -> Result<ReadingId, StoreError>;

    fn latest(&self, device_id: &str, limit: usize) -> Result<Vec<Reading>, StoreError>;

    /// Readings with `server_timestamp >= cutoff`.
    fn since(
        &self,
        device_id: &str,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Reading>, StoreError>;

    /// Cheap liveness check.
    fn ping(&self) -> Result<(), StoreError>;
}

// ───────────────────────────────────────────────────────────────
// Config port (driven adapter: domain ↔ config file)
// ───────────────────────────────────────────────────────────────

/// Load and persist [`SystemConfig`].
pub trait ConfigPort {
    /// Load the stored config, or `Err(ConfigError::NotFound)` when none.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate, then persist.
    fn save(&mut self, config: &SystemConfig) -> Result<(), ConfigError>;
}

// ───────────────────────────────────────────────────────────────
// Clock
// ───────────────────────────────────────────────────────────────

/// Wall-clock source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Local hour of day (0–23) for the light schedule.
    fn local_hour(&self) -> u32;
}

// ───────────────────────────────────────────────────────────────
// Auto-off scheduler
// ───────────────────────────────────────────────────────────────

/// Hands fogger auto-off directives to whatever runs the timer.
pub trait AutoOffScheduler {
    fn submit(&self, directive: TimerDirective);
}
