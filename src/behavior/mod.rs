//! Per-type device behavior models
//!
//! Each tick the engine hands every device its own state map, a read-only
//! view of the rest of the building, and a deterministic RNG stream. The
//! model for its type writes the next state in place. All stochastic steps
//! scale with simulated elapsed time, so a run at time scale 1000 walks the
//! same statistical path as one at time scale 1.

pub mod climate;
pub mod energy;
pub mod security;
pub mod sensors;

use std::time::Duration;

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use crate::core::time::SimTime;
use crate::core::types::DeviceId;
use crate::hierarchy::device::{Device, DeviceConfig, DeviceKind, DeviceState, StateValue};

/// Read-only view of other devices' current-tick state. `Sync` so a view
/// can be shared across a rayon layer.
pub trait StateView: Sync {
    fn state_of(&self, id: &DeviceId) -> Option<&DeviceState>;
}

/// Shared per-tick inputs for behavior models
pub struct Environment<'a> {
    pub now: SimTime,
    /// Simulated time elapsed since the previous tick
    pub elapsed: Duration,
    pub states: &'a dyn StateView,
    /// Whether the device's own room currently reads as occupied
    pub room_occupied: bool,
    /// Daily cloud-cover factor applied to solar output (0.6..1.0)
    pub weather_factor: f64,
}

impl Environment<'_> {
    pub fn elapsed_hours(&self) -> f64 {
        self.elapsed.as_secs_f64() / 3600.0
    }

    pub fn ambient_temperature(&self) -> f64 {
        ambient_temperature(self.now)
    }
}

/// Outdoor temperature: 20 °C mean, 5 °C diurnal swing, coldest at 06:00
pub fn ambient_temperature(now: SimTime) -> f64 {
    let h = now.hour_of_day();
    20.0 + 5.0 * (std::f64::consts::TAU * (h - 6.0) / 24.0).sin()
}

/// Clear-sky solar irradiance in W/m²: a parabola peaking at 1000 at noon
/// and reaching zero at 06:00 and 18:00
pub fn clear_sky_irradiance(now: SimTime) -> f64 {
    let h = now.hour_of_day();
    (1000.0 - (1000.0 / 36.0) * (h - 12.0).powi(2)).clamp(0.0, 1000.0)
}

/// Advance one device by one tick.
///
/// Inactive devices skip their model; actuators still report idle draw.
/// Meters and solar panels always run, they have no standby mode worth
/// modeling.
pub fn step(device: &Device, state: &mut DeviceState, env: &Environment<'_>, rng: &mut ChaCha8Rng) {
    let always_on = matches!(device.kind, DeviceKind::PowerMeter | DeviceKind::SolarPanel);
    if !always_on && !device.kind.is_active(state) {
        standby(device, state);
        return;
    }

    match device.kind {
        DeviceKind::TemperatureSensor => sensors::temperature(device, state, env, rng),
        DeviceKind::HumiditySensor => sensors::humidity(device, state, env, rng),
        DeviceKind::Co2Sensor => sensors::co2(device, state, env, rng),
        DeviceKind::MotionSensor => sensors::motion(device, state, env, rng),
        DeviceKind::OccupancySensor => sensors::occupancy(device, state, env, rng),
        DeviceKind::DoorSensor | DeviceKind::WindowSensor => {
            sensors::contact(device, state, env, rng)
        }
        DeviceKind::LeakSensor => sensors::leak(device, state, env, rng),
        DeviceKind::SmokeSensor => sensors::smoke(device, state, env, rng),
        DeviceKind::SmartLight => energy::smart_light(device, state),
        DeviceKind::SmartPlug => energy::smart_plug(device, state, env, rng),
        DeviceKind::Hvac => climate::hvac(device, state, env, rng),
        DeviceKind::AccessControl => security::access_control(device, state, env, rng),
        DeviceKind::Camera => security::camera(device, state, env),
        DeviceKind::PowerMeter => energy::power_meter(device, state, env, rng),
        DeviceKind::SolarPanel => energy::solar_panel(device, state, env),
    }
}

fn standby(device: &Device, state: &mut DeviceState) {
    match device.kind {
        DeviceKind::SmartLight | DeviceKind::SmartPlug => {
            let idle = device.config.idle_draw_watts.unwrap_or(0.5);
            state.set("power_consumption", StateValue::Float(idle));
        }
        DeviceKind::Hvac => {
            let idle = device.config.idle_draw_watts.unwrap_or(25.0);
            state.set("power_consumption", StateValue::Float(idle));
        }
        _ => {}
    }
}

/// Whether at least one event of a Poisson process with the given hourly
/// rate lands in the elapsed interval.
pub(crate) fn event_occurs(rng: &mut ChaCha8Rng, rate_per_hour: f64, hours: f64) -> bool {
    if rate_per_hour <= 0.0 || hours <= 0.0 {
        return false;
    }
    let p = 1.0 - (-rate_per_hour * hours).exp();
    rng.gen_bool(p.clamp(0.0, 1.0))
}

/// One bounded random-walk step. The amplitude is calibrated for a
/// five-minute interval and scales with the square root of elapsed time.
pub(crate) fn walk_step(
    rng: &mut ChaCha8Rng,
    current: f64,
    amplitude: f64,
    elapsed: Duration,
    lo: f64,
    hi: f64,
) -> f64 {
    let scale = (elapsed.as_secs_f64() / 300.0).sqrt().min(4.0);
    (current + rng.gen_range(-amplitude..=amplitude) * scale).clamp(lo, hi)
}

/// Fraction of a gap closed over the elapsed interval, given the fraction
/// closed per five simulated minutes.
pub(crate) fn approach_alpha(per_five_min: f64, elapsed: Duration) -> f64 {
    1.0 - (1.0 - per_five_min).powf(elapsed.as_secs_f64() / 300.0)
}

/// Clamp a continuous reading to the configured bounds, falling back to the
/// model's own defaults.
pub(crate) fn clamp_reading(value: f64, config: &DeviceConfig, lo: f64, hi: f64) -> f64 {
    value.clamp(config.min_val.unwrap_or(lo), config.max_val.unwrap_or(hi))
}
