//! Log-based broadcaster adapter.
//!
//! Implements [`Broadcaster`] by writing one structured line per loop
//! event to the process logger.  A dashboard push adapter would implement
//! the same trait.

use log::{info, warn};

use crate::app::events::LoopEvent;
use crate::app::ports::Broadcaster;

/// Adapter that logs every [`LoopEvent`].
#[derive(Debug, Default)]
pub struct LogBroadcaster;

impl LogBroadcaster {
    pub fn new() -> Self {
        Self
    }
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "off" }
}

impl Broadcaster for LogBroadcaster {
    fn publish(&mut self, event: &LoopEvent) {
        match event {
            LoopEvent::Update(u) => {
                let r = &u.reading;
                let light = r
                    .light_intensity
                    .map_or_else(|| "-".to_string(), |l| l.to_string());
                let water = r
                    .water_level
                    .map_or_else(|| "-".to_string(), |w| format!("{w:.1}%"));
                info!(
                    "TELEM | phase={} status={} | T={:.1}\u{00b0}C RH={:.1}% CO2={}ppm \
                     light={} water={} | fogger={} fan={}% lights={} | store={}",
                    r.growth_phase,
                    r.status,
                    r.temperature,
                    r.humidity,
                    r.co2,
                    light,
                    water,
                    on_off(u.actuators.fogger_active),
                    u.actuators.fan_speed_percent,
                    on_off(u.actuators.lights_active),
                    u.backend.store,
                );
            }
            LoopEvent::BackendChanged { from, to } => {
                info!("STORE | {from} -> {to}");
            }
            LoopEvent::Degraded {
                error,
                retry_in_secs,
            } => {
                warn!("LOOP  | degraded: {error} (retry in {retry_in_secs}s)");
            }
            LoopEvent::Recovered => {
                info!("LOOP  | recovered");
            }
            LoopEvent::Started { mode, backend } => {
                info!("START | sensors={} backend={backend}", mode.as_str());
            }
        }
    }
}
