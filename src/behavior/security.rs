//! Access control and camera models

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{event_occurs, Environment};
use crate::hierarchy::device::{Device, DeviceState, StateValue};

/// Badge readers see sporadic swipe attempts; most carry a registered card.
pub fn access_control(
    device: &Device,
    state: &mut DeviceState,
    env: &Environment<'_>,
    rng: &mut ChaCha8Rng,
) {
    let rate = device.config.event_rate_per_hour.unwrap_or(1.2);
    if !event_occurs(rng, rate, env.elapsed_hours()) {
        return;
    }

    let attempts = state.get_i64("access_attempts").unwrap_or(0);
    state.set("access_attempts", StateValue::Int(attempts + 1));

    let granted = rng.gen_bool(0.8);
    state.set("last_access_granted", StateValue::Bool(granted));
    if granted && !device.config.authorized_cards.is_empty() {
        let idx = rng.gen_range(0..device.config.authorized_cards.len());
        state.set(
            "last_card_id",
            StateValue::Text(device.config.authorized_cards[idx].clone()),
        );
    }
    // A granted swipe opens the door momentarily; it re-latches before the
    // next tick, so `locked` only changes through explicit actions.
}

/// Recording cameras fill storage at a rate set by their resolution.
pub fn camera(device: &Device, state: &mut DeviceState, env: &Environment<'_>) {
    let gb_per_hour = match device.config.resolution.as_deref() {
        Some("4k") | Some("2160p") => 4.0,
        Some("1080p") => 1.5,
        _ => 0.8, // 720p default
    };
    let used = state.get_f64("storage_usage").unwrap_or(0.0);
    let capacity = device.config.max_val.unwrap_or(f64::INFINITY);
    let next = (used + gb_per_hour * env.elapsed_hours()).min(capacity);
    state.set("storage_usage", StateValue::Float(next));
}
