//! HVAC model
//!
//! The unit pulls room temperature toward its setpoint while the building
//! envelope leaks toward ambient. When the linked presence source reports an
//! empty room, an eco setback relaxes the setpoint toward ambient to save
//! energy.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

use super::{approach_alpha, Environment};
use crate::hierarchy::device::{Device, DeviceState, StateValue};

const DEFAULT_ECO_SETBACK: f64 = 3.0;
const DEFAULT_ACTIVE_DRAW_WATTS: f64 = 2000.0;
const DEFAULT_IDLE_DRAW_WATTS: f64 = 25.0;
/// Gap below which the unit stops conditioning in auto mode
const DEADBAND: f64 = 0.5;

pub fn hvac(device: &Device, state: &mut DeviceState, env: &Environment<'_>, rng: &mut ChaCha8Rng) {
    let target = state
        .get_f64("target_temperature")
        .or(device.config.target_temperature)
        .unwrap_or(21.0);
    let ambient = env.ambient_temperature();

    let occupied = presence(device, env);
    let effective = if occupied {
        target
    } else {
        let setback = device.config.eco_setback.unwrap_or(DEFAULT_ECO_SETBACK);
        if ambient > target {
            target + setback
        } else {
            target - setback
        }
    };

    let current = state.get_f64("current_temperature").unwrap_or(21.0);
    let mode = state.get_text("mode").unwrap_or("auto");
    let conditioning = match mode {
        "heat" => current < effective - DEADBAND,
        "cool" => current > effective + DEADBAND,
        _ => (current - effective).abs() > DEADBAND,
    };

    let mut next = current;
    if conditioning {
        // The unit closes 20% of the gap to its setpoint every five minutes
        next += (effective - next) * approach_alpha(0.2, env.elapsed);
    }
    // The envelope leaks 3% toward ambient over the same interval
    next += (ambient - next) * approach_alpha(0.03, env.elapsed);
    next += rng.gen_range(-0.1..=0.1);
    state.set("current_temperature", StateValue::Float(next));

    let draw = if conditioning {
        let effort = ((effective - next).abs() / 5.0).clamp(0.2, 1.0);
        let fan = state.get_i64("fan_speed").unwrap_or(1) as f64;
        device
            .config
            .active_draw_watts
            .unwrap_or(DEFAULT_ACTIVE_DRAW_WATTS)
            * effort
            + 50.0 * fan
    } else {
        device.config.idle_draw_watts.unwrap_or(DEFAULT_IDLE_DRAW_WATTS)
    };
    state.set("power_consumption", StateValue::Float(draw));
}

/// Presence according to the configured source device, falling back to the
/// room-level occupancy signal.
fn presence(device: &Device, env: &Environment<'_>) -> bool {
    let Some(src) = &device.config.presence_detection_source_device_id else {
        return env.room_occupied;
    };
    let Some(state) = env.states.state_of(src) else {
        return false;
    };
    state
        .get_i64("occupant_count")
        .map(|c| c > 0)
        .or_else(|| state.get_bool("motion_detected"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::behavior::tests::{env_at, make_device, MapView};
    use crate::behavior::StateView;
    use crate::core::types::DeviceId;
    use crate::hierarchy::device::{default_state, DeviceKind};
    use ahash::AHashMap;
    use rand::SeedableRng;

    #[test]
    fn test_converges_to_setpoint_when_occupied() {
        let device = make_device(DeviceKind::Hvac);
        let mut state = default_state(DeviceKind::Hvac);
        state.set("target_temperature", StateValue::Float(23.0));
        state.set("current_temperature", StateValue::Float(15.0));
        let view = MapView(AHashMap::new());
        let env = env_at(12, 1800, true, &view);
        let mut rng = ChaCha8Rng::seed_from_u64(31);
        for _ in 0..50 {
            hvac(&device, &mut state, &env, &mut rng);
        }
        let t = state.get_f64("current_temperature").unwrap();
        assert!((t - 23.0).abs() < 1.5, "temperature {t} off setpoint");
    }

    #[test]
    fn test_eco_setback_reads_presence_source() {
        let occ_id = DeviceId::new("occ-1");
        let mut device = make_device(DeviceKind::Hvac);
        device.dependencies = vec![occ_id.clone()];
        device.config.presence_detection_source_device_id = Some(occ_id.clone());

        let mut occ_state = default_state(DeviceKind::OccupancySensor);
        occ_state.set("occupant_count", StateValue::Int(0));
        let mut map = AHashMap::new();
        map.insert(occ_id.clone(), occ_state);
        let view = MapView(map);

        // Night, ambient below target: setback lowers the effective target
        let env = env_at(3, 1800, true, &view);
        let mut state = default_state(DeviceKind::Hvac);
        state.set("target_temperature", StateValue::Float(21.0));
        state.set("current_temperature", StateValue::Float(21.0));
        let mut rng = ChaCha8Rng::seed_from_u64(37);
        for _ in 0..50 {
            hvac(&device, &mut state, &env, &mut rng);
        }
        let vacant_t = state.get_f64("current_temperature").unwrap();
        assert!(
            vacant_t < 19.5,
            "vacant room held {vacant_t}, setback not applied"
        );

        // Same setup with someone present holds the real setpoint
        let mut occ_state = default_state(DeviceKind::OccupancySensor);
        occ_state.set("occupant_count", StateValue::Int(3));
        let mut map = AHashMap::new();
        map.insert(occ_id.clone(), occ_state);
        let view = MapView(map);
        assert!(view.state_of(&occ_id).is_some());
        let env = env_at(3, 1800, true, &view);
        let mut state = default_state(DeviceKind::Hvac);
        state.set("target_temperature", StateValue::Float(21.0));
        state.set("current_temperature", StateValue::Float(21.0));
        for _ in 0..50 {
            hvac(&device, &mut state, &env, &mut rng);
        }
        let occupied_t = state.get_f64("current_temperature").unwrap();
        assert!((occupied_t - 21.0).abs() < 1.8);
        assert!(
            occupied_t > vacant_t + 0.8,
            "occupied {occupied_t} not warmer than vacant {vacant_t}"
        );
    }

    #[test]
    fn test_idle_draw_inside_deadband() {
        let device = make_device(DeviceKind::Hvac);
        let mut state = default_state(DeviceKind::Hvac);
        state.set("target_temperature", StateValue::Float(21.0));
        state.set("current_temperature", StateValue::Float(21.0));
        let view = MapView(AHashMap::new());
        // Noon ambient is 25 but one short tick barely moves the room
        let env = env_at(12, 60, true, &view);
        let mut rng = ChaCha8Rng::seed_from_u64(41);
        hvac(&device, &mut state, &env, &mut rng);
        assert_eq!(state.get_f64("power_consumption"), Some(25.0));
    }

    #[test]
    fn test_heat_mode_never_cools() {
        let device = make_device(DeviceKind::Hvac);
        let mut state = default_state(DeviceKind::Hvac);
        state.set("mode", StateValue::Text("heat".into()));
        state.set("target_temperature", StateValue::Float(18.0));
        state.set("current_temperature", StateValue::Float(22.0));
        let view = MapView(AHashMap::new());
        // Midnight, ambient 15: drift is leakage only, the unit stays off
        let env = env_at(0, 60, true, &view);
        let mut rng = ChaCha8Rng::seed_from_u64(43);
        hvac(&device, &mut state, &env, &mut rng);
        assert_eq!(state.get_f64("power_consumption"), Some(25.0));
    }
}
