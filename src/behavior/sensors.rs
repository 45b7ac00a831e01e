//! Passive sensor models
//!
//! Continuous sensors track a physical driver (ambient temperature, room
//! occupancy) with inertia plus measurement noise; discrete sensors fire
//! Poisson events. Every reading is clamped to the configured bounds.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{approach_alpha, clamp_reading, event_occurs, walk_step, Environment};
use crate::hierarchy::device::{Device, DeviceState, StateValue};

const BATTERY_DRAIN_PCT_PER_HOUR: f64 = 0.01;

pub fn temperature(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let ambient = env.ambient_temperature();
    let current = state.get_f64("temperature").unwrap_or(21.0);
    // Room air closes 10% of the gap to ambient every five minutes
    let alpha = approach_alpha(0.1, env.elapsed);
    let pulled = current + (ambient - current) * alpha + rng.gen_range(-0.3..=0.3);
    let value = clamp_reading(pulled, &device.config, -10.0, 45.0);
    state.set("temperature", StateValue::Float(value));

    let humidity = state.get_f64("humidity").unwrap_or(45.0);
    let humidity = walk_step(rng, humidity, 2.0, env.elapsed, 20.0, 90.0);
    state.set("humidity", StateValue::Float(humidity));
}

pub fn humidity(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let current = state.get_f64("humidity").unwrap_or(50.0);
    let lo = device.config.min_val.unwrap_or(20.0);
    let hi = device.config.max_val.unwrap_or(90.0);
    let value = walk_step(rng, current, 2.0, env.elapsed, lo, hi);
    state.set("humidity", StateValue::Float(value));
}

pub fn co2(device: &Device, state: &mut DeviceState, env: &Environment<'_>, rng: &mut ChaCha8Rng) {
    let current = state.get_f64("co2").unwrap_or(420.0);
    // Exhaled CO2 accumulates while occupied, ventilation pulls it back down
    let target = if env.room_occupied { 900.0 } else { 420.0 };
    let alpha = approach_alpha(0.15, env.elapsed);
    let pulled = current + (target - current) * alpha + rng.gen_range(-15.0..=15.0);
    let value = clamp_reading(pulled, &device.config, 350.0, 5000.0);
    state.set("co2", StateValue::Float(value));

    let aqi = ((value - 400.0) / 16.0).clamp(0.0, 500.0);
    state.set("air_quality_index", StateValue::Float(aqi));
}

pub fn motion(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let sensitivity = device.config.sensitivity.unwrap_or(0.8).clamp(0.0, 1.0);
    let detected = if env.room_occupied {
        rng.gen_bool(sensitivity)
    } else {
        // Occasional false positive (pets, drafts)
        event_occurs(rng, 0.02, env.elapsed_hours())
    };
    state.set("motion_detected", StateValue::Bool(detected));

    let signal = state.get_f64("signal_strength").unwrap_or(90.0);
    let signal = walk_step(rng, signal, 3.0, env.elapsed, 60.0, 100.0);
    state.set("signal_strength", StateValue::Float(signal));
}

pub fn occupancy(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let capacity = device.config.max_val.unwrap_or(8.0).max(1.0) as i64;
    let h = env.now.hour_of_day();
    let workday = !env.now.weekday().is_weekend();
    let expected = if workday && (8.0..18.0).contains(&h) {
        // Light lunchtime dip
        if (12.0..13.0).contains(&h) {
            capacity / 2
        } else {
            capacity
        }
    } else {
        0
    };

    // People arrive and leave one at a time
    let mut count = state.get_i64("occupant_count").unwrap_or(0);
    if count != expected && event_occurs(rng, 6.0, env.elapsed_hours()) {
        count += if count < expected { 1 } else { -1 };
    }
    state.set("occupant_count", StateValue::Int(count.clamp(0, capacity)));

    let signal = state.get_f64("signal_strength").unwrap_or(90.0);
    let signal = walk_step(rng, signal, 3.0, env.elapsed, 60.0, 100.0);
    state.set("signal_strength", StateValue::Float(signal));
}

/// Door and window contact sensors share a model; they differ only in how
/// often they are operated.
pub fn contact(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let base_rate = device.config.event_rate_per_hour.unwrap_or(
        if device.kind == crate::hierarchy::device::DeviceKind::DoorSensor {
            4.0
        } else {
            0.5
        },
    );
    // Barely anything moves at night
    let h = env.now.hour_of_day();
    let rate = if (7.0..20.0).contains(&h) {
        base_rate
    } else {
        base_rate * 0.05
    };
    if event_occurs(rng, rate, env.elapsed_hours()) {
        let open = state.get_bool("open").unwrap_or(false);
        state.set("open", StateValue::Bool(!open));
    }
    drain_battery(state, env);
}

pub fn leak(device: &Device, state: &mut DeviceState, env: &Environment<'_>, rng: &mut ChaCha8Rng) {
    let rate = device.config.event_rate_per_hour.unwrap_or(0.0005);
    let leaking = state.get_bool("leak_detected").unwrap_or(false);
    if leaking {
        // Maintenance shows up within a couple of hours on average
        if event_occurs(rng, 0.5, env.elapsed_hours()) {
            state.set("leak_detected", StateValue::Bool(false));
        }
    } else if event_occurs(rng, rate, env.elapsed_hours()) {
        state.set("leak_detected", StateValue::Bool(true));
    }
    drain_battery(state, env);
}

pub fn smoke(device: &Device, state: &mut DeviceState, env: &Environment<'_>, rng: &mut ChaCha8Rng) {
    let rate = device.config.event_rate_per_hour.unwrap_or(0.0002);
    let current = state.get_f64("smoke_level").unwrap_or(0.0);
    let level = if event_occurs(rng, rate, env.elapsed_hours()) {
        rng.gen_range(60.0..150.0)
    } else {
        // Halves roughly every five minutes back toward baseline dust noise
        let decay = 0.5f64.powf(env.elapsed.as_secs_f64() / 300.0);
        current * decay + rng.gen_range(0.0..=1.5)
    };
    let level = clamp_reading(level, &device.config, 0.0, 300.0);
    state.set("smoke_level", StateValue::Float(level));
    state.set("alarm_active", StateValue::Bool(level > 50.0));
}

fn drain_battery(state: &mut DeviceState, env: &Environment<'_>) {
    let battery = state.get_f64("battery_level").unwrap_or(100.0);
    let drained = (battery - BATTERY_DRAIN_PCT_PER_HOUR * env.elapsed_hours()).max(0.0);
    state.set("battery_level", StateValue::Float(drained));
}
