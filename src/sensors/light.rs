//! Light sensor on an ADC channel (LDR divider or BH1750 analog out).
//!
//! The core only sees the channel voltage; full-scale `Vref` maps to 1000.

/// Top of the relative light scale.
pub const LIGHT_SCALE_MAX: f32 = 1000.0;

/// Scale an ADC voltage into the 0–1000 light range.
pub fn intensity_from_voltage(voltage: f32, vref: f32) -> f32 {
    if !(vref > 0.0) || voltage.is_nan() {
        return 0.0;
    }
    (voltage / vref * LIGHT_SCALE_MAX).clamp(0.0, LIGHT_SCALE_MAX)
}
