//! Ultrasonic reservoir level.
//!
//! The sensor sits `H` cm above the reservoir floor and reports the echo
//! distance to the water surface.  The bottom `Dmin` cm are a dead zone the
//! fogger cannot draw from, so they read as empty:
//!
//! ```text
//!   depth = clamp(H - distance, 0, Dmax)
//!   level = 0                                   if depth <= Dmin
//!           (depth - Dmin) / (Dmax - Dmin) * 100  otherwise
//! ```

use crate::config::TankGeometry;

/// Convert an echo distance (cm) into a 0–100 % level.
///
/// Non-increasing in `distance_cm`; NaN reads as empty.
pub fn level_percent(tank: &TankGeometry, distance_cm: f32) -> f32 {
    if distance_cm.is_nan() {
        return 0.0;
    }
    let depth = (tank.sensor_height_cm - distance_cm).clamp(0.0, tank.max_depth_cm);
    if depth <= tank.min_depth_cm {
        return 0.0;
    }
    let span = tank.max_depth_cm - tank.min_depth_cm;
    if span <= 0.0 {
        return 0.0;
    }
    ((depth - tank.min_depth_cm) / span * 100.0).clamp(0.0, 100.0)
}

/// Inverse of [`level_percent`] for the usable band.  The simulator models
/// its reservoir as an echo distance through this.
pub fn distance_for_level(tank: &TankGeometry, level_pct: f32) -> f32 {
    let span = tank.max_depth_cm - tank.min_depth_cm;
    let depth = tank.min_depth_cm + level_pct.clamp(0.0, 100.0) / 100.0 * span;
    tank.sensor_height_cm - depth
}
