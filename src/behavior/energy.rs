//! Lighting, plug loads, metering and generation

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{clear_sky_irradiance, walk_step, Environment};
use crate::hierarchy::device::{Device, DeviceState, StateValue};

const NOMINAL_VOLTAGE: f64 = 230.0;

/// A lit lamp draws in proportion to its brightness.
pub fn smart_light(device: &Device, state: &mut DeviceState) {
    let brightness = state.get_f64("brightness").unwrap_or(80.0).clamp(0.0, 100.0);
    let full_draw = device.config.active_draw_watts.unwrap_or(10.0);
    state.set(
        "power_consumption",
        StateValue::Float(full_draw * brightness / 100.0),
    );
}

/// The attached appliance load wanders around its base draw.
pub fn smart_plug(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let base = device.config.base_load_watts.unwrap_or(60.0);
    let current = state.get_f64("power_consumption").unwrap_or(base);
    let draw = walk_step(rng, current, 5.0, env.elapsed, base * 0.2, base * 1.8);
    state.set("power_consumption", StateValue::Float(draw));

    let voltage = NOMINAL_VOLTAGE + rng.gen_range(-2.0..=2.0);
    state.set("voltage", StateValue::Float(voltage));
    state.set("current", StateValue::Float(draw / voltage));
}

/// Sums the live draw of every device on its circuit (its dependency list)
/// and integrates consumption in kWh.
pub fn power_meter(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let mut watts = device.config.base_load_watts.unwrap_or(0.0);
    for dep in &device.dependencies {
        if let Some(s) = env.states.state_of(dep) {
            if let Some(w) = s.get_f64("power_consumption") {
                watts += w;
            }
        }
    }
    state.set("current_power", StateValue::Float(watts));

    let voltage = NOMINAL_VOLTAGE + rng.gen_range(-2.0..=2.0);
    state.set("voltage", StateValue::Float(voltage));

    let total = state.get_f64("total_consumption").unwrap_or(0.0);
    state.set(
        "total_consumption",
        StateValue::Float(total + watts / 1000.0 * env.elapsed_hours()),
    );
}

/// Output follows the clear-sky curve scaled by the day's cloud cover,
/// panel area and conversion efficiency.
pub fn solar_panel(device: &Device, state: &mut DeviceState, env: &Environment<'_>) {
    let irradiance = clear_sky_irradiance(env.now) * env.weather_factor;
    state.set("irradiance", StateValue::Float(irradiance));

    let area = device.config.panel_area_m2.unwrap_or(10.0);
    let efficiency = device.config.efficiency.unwrap_or(0.2);
    let watts = irradiance * area * efficiency;
    state.set("current_power", StateValue::Float(watts));

    let total = state.get_f64("total_generation").unwrap_or(0.0);
    state.set(
        "total_generation",
        StateValue::Float(total + watts / 1000.0 * env.elapsed_hours()),
    );
}
