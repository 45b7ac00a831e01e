//! Device schedules
//!
//! Matches schedule entries against a window of simulated time and produces
//! the actions due in that window, in chronological order. Large time scales
//! can push several schedule instants — even several days — into a single
//! tick; every crossing in `(prev, now]` fires exactly once.
//!
//! Firing an action mutates the target device's state and nothing else; the
//! scheduler never reads or writes telemetry.

use serde::{Deserialize, Serialize};

use crate::core::time::{SimDate, SimTime, TimeOfDay, Weekday, MILLIS_PER_DAY};
use crate::core::types::{DeviceId, RoomId};
use crate::hierarchy::device::{Device, DeviceKind, DeviceState, StateValue};

/// A state mutation a schedule entry (or an external caller) can request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    PowerOn,
    PowerOff,
    SetState { key: String, value: StateValue },
    SetTargetTemperature { value: f64 },
    SetMode { mode: String },
    Lock,
    Unlock,
}

impl Action {
    /// Whether a device of the given type accepts this action
    pub fn supported_by(&self, kind: DeviceKind) -> bool {
        match self {
            Action::PowerOn | Action::PowerOff | Action::SetState { .. } => true,
            Action::SetTargetTemperature { .. } | Action::SetMode { .. } => {
                kind == DeviceKind::Hvac
            }
            Action::Lock | Action::Unlock => kind == DeviceKind::AccessControl,
        }
    }

    /// Apply the action to a device's state, returning the entries written
    pub fn apply(&self, kind: DeviceKind, state: &mut DeviceState) -> Vec<(String, StateValue)> {
        let writes: Vec<(String, StateValue)> = match self {
            Action::PowerOn => match kind {
                DeviceKind::SmartLight | DeviceKind::SmartPlug => {
                    vec![("power_state".into(), StateValue::Bool(true))]
                }
                DeviceKind::Hvac => vec![("mode".into(), StateValue::Text("auto".into()))],
                DeviceKind::Camera => vec![("recording".into(), StateValue::Bool(true))],
                _ => vec![("status".into(), StateValue::Text("active".into()))],
            },
            Action::PowerOff => match kind {
                DeviceKind::SmartLight | DeviceKind::SmartPlug => {
                    vec![("power_state".into(), StateValue::Bool(false))]
                }
                DeviceKind::Hvac => vec![("mode".into(), StateValue::Text("off".into()))],
                DeviceKind::Camera => vec![("recording".into(), StateValue::Bool(false))],
                _ => vec![("status".into(), StateValue::Text("standby".into()))],
            },
            Action::SetState { key, value } => vec![(key.clone(), value.clone())],
            Action::SetTargetTemperature { value } => {
                vec![("target_temperature".into(), StateValue::Float(*value))]
            }
            Action::SetMode { mode } => vec![("mode".into(), StateValue::Text(mode.clone()))],
            Action::Lock => vec![("locked".into(), StateValue::Bool(true))],
            Action::Unlock => vec![("locked".into(), StateValue::Bool(false))],
        };
        for (k, v) in &writes {
            state.set(k.clone(), v.clone());
        }
        writes
    }
}

/// Named predicate gating a schedule entry, resolved at the instant the
/// entry's time-of-day is crossed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Condition {
    RoomOccupied,
    RoomVacant,
    BuildingOccupied,
    BuildingVacant,
    DeviceStateTrue { device_id: DeviceId, key: String },
    DeviceStateFalse { device_id: DeviceId, key: String },
}

/// Occupancy and device-state lookups a condition needs. Implemented by the
/// run context over its state table.
pub trait ConditionSource {
    fn room_occupied(&self, room: &RoomId) -> bool;
    /// Occupancy of the building containing `room`
    fn building_occupied(&self, room: &RoomId) -> bool;
    fn device_state_bool(&self, device: &DeviceId, key: &str) -> Option<bool>;
}

impl Condition {
    pub fn evaluate(&self, room: &RoomId, src: &dyn ConditionSource) -> bool {
        match self {
            Condition::RoomOccupied => src.room_occupied(room),
            Condition::RoomVacant => !src.room_occupied(room),
            Condition::BuildingOccupied => src.building_occupied(room),
            Condition::BuildingVacant => !src.building_occupied(room),
            Condition::DeviceStateTrue { device_id, key } => {
                src.device_state_bool(device_id, key).unwrap_or(false)
            }
            Condition::DeviceStateFalse { device_id, key } => {
                !src.device_state_bool(device_id, key).unwrap_or(false)
            }
        }
    }
}

/// One entry in a device's schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub action: Action,
    pub time_of_day: TimeOfDay,
    /// Eligible weekdays; `None` means every day
    #[serde(default)]
    pub days: Option<Vec<Weekday>>,
    /// If set, the entry fires only on this date and `days` is ignored
    #[serde(default)]
    pub date: Option<SimDate>,
    #[serde(default)]
    pub condition: Option<Condition>,
}

impl ScheduleEntry {
    fn matches_day(&self, day_number: u64) -> bool {
        if let Some(date) = &self.date {
            return date.day_number() == day_number as i64;
        }
        match &self.days {
            None => true,
            Some(days) => days.contains(&Weekday::from_day_number(day_number)),
        }
    }
}

/// A schedule entry that came due, pinned to the instant it crossed
#[derive(Debug, Clone)]
pub struct FiredAction {
    pub device_id: DeviceId,
    /// Index into the device's schedule, breaks ties at equal instants
    pub entry_index: usize,
    pub at: SimTime,
    pub action: Action,
}

/// All schedule actions for `device` due in `(prev, now]`, in chronological
/// order (declaration order at equal instants).
pub fn due_actions(
    device: &Device,
    prev: SimTime,
    now: SimTime,
    src: &dyn ConditionSource,
) -> Vec<FiredAction> {
    let mut fired = Vec::new();
    if now <= prev {
        return fired;
    }

    for (entry_index, entry) in device.schedule.iter().enumerate() {
        // Each day the window touches contributes one candidate instant.
        for day in prev.day_number()..=now.day_number() {
            let at = SimTime(day * MILLIS_PER_DAY + entry.time_of_day.as_millis_into_day());
            if at <= prev || at > now || !entry.matches_day(day) {
                continue;
            }
            let gated_off = entry
                .condition
                .as_ref()
                .is_some_and(|c| !c.evaluate(&device.room_id, src));
            if gated_off {
                continue;
            }
            fired.push(FiredAction {
                device_id: device.id.clone(),
                entry_index,
                at,
                action: entry.action.clone(),
            });
        }
    }

    fired.sort_by(|a, b| a.at.cmp(&b.at).then(a.entry_index.cmp(&b.entry_index)));
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RoomId;
    use crate::hierarchy::device::DeviceConfig;

    struct NoOccupancy;

    impl ConditionSource for NoOccupancy {
        fn room_occupied(&self, _room: &RoomId) -> bool {
            false
        }
        fn building_occupied(&self, _room: &RoomId) -> bool {
            false
        }
        fn device_state_bool(&self, _device: &DeviceId, _key: &str) -> Option<bool> {
            None
        }
    }

    fn light_with_schedule(schedule: Vec<ScheduleEntry>) -> Device {
        Device {
            id: DeviceId::new("light-1"),
            kind: DeviceKind::SmartLight,
            room_id: RoomId::new("room-1"),
            config: DeviceConfig::default(),
            schedule,
            dependencies: vec![],
            initial_state: DeviceState::default(),
        }
    }

    fn entry_at(tod: &str, action: Action) -> ScheduleEntry {
        ScheduleEntry {
            action,
            time_of_day: tod.parse().unwrap(),
            days: None,
            date: None,
            condition: None,
        }
    }

    #[test]
    fn test_single_crossing_fires_once() {
        let device = light_with_schedule(vec![entry_at("06:00", Action::PowerOn)]);
        // Window 05:59 -> 06:01 on day 0
        let fired = due_actions(&device, SimTime(21_540_000), SimTime(21_660_000), &NoOccupancy);
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at, SimTime(21_600_000));
    }

    #[test]
    fn test_window_is_left_exclusive() {
        let device = light_with_schedule(vec![entry_at("06:00", Action::PowerOn)]);
        let six_am = SimTime(21_600_000);
        // Entry exactly at the window start already fired last window
        assert!(due_actions(&device, six_am, SimTime(21_700_000), &NoOccupancy).is_empty());
        // ...but fires when it is the window end
        assert_eq!(
            due_actions(&device, SimTime(21_500_000), six_am, &NoOccupancy).len(),
            1
        );
    }

    #[test]
    fn test_multiple_crossings_fire_chronologically() {
        let device = light_with_schedule(vec![
            entry_at("18:00", Action::PowerOff),
            entry_at("06:00", Action::PowerOn),
        ]);
        // A window spanning two full days: each entry fires twice
        let fired = due_actions(
            &device,
            SimTime(0),
            SimTime(2 * MILLIS_PER_DAY),
            &NoOccupancy,
        );
        assert_eq!(fired.len(), 4);
        let times: Vec<u64> = fired.iter().map(|f| f.at.0).collect();
        let mut sorted = times.clone();
        sorted.sort_unstable();
        assert_eq!(times, sorted);
        assert!(matches!(fired[0].action, Action::PowerOn));
        assert!(matches!(fired[1].action, Action::PowerOff));
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let device = light_with_schedule(vec![
            entry_at("06:00", Action::PowerOff),
            entry_at("06:00", Action::PowerOn),
        ]);
        let fired = due_actions(&device, SimTime(0), SimTime(MILLIS_PER_DAY), &NoOccupancy);
        assert_eq!(fired.len(), 2);
        assert_eq!(fired[0].entry_index, 0);
        assert_eq!(fired[1].entry_index, 1);
    }

    #[test]
    fn test_weekday_filter() {
        let mut entry = entry_at("12:00", Action::PowerOn);
        entry.days = Some(vec![Weekday::Monday]);
        let device = light_with_schedule(vec![entry]);
        // Day 0 is a Thursday, day 4 is the first Monday
        let fired = due_actions(
            &device,
            SimTime(0),
            SimTime(7 * MILLIS_PER_DAY),
            &NoOccupancy,
        );
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at.day_number(), 4);
    }

    #[test]
    fn test_date_takes_precedence_over_days() {
        // days would match every Monday; the date pins it to one Friday
        let mut entry = entry_at("12:00", Action::PowerOn);
        entry.days = Some(vec![Weekday::Monday]);
        entry.date = Some("1970-01-02".parse().unwrap());
        let device = light_with_schedule(vec![entry]);
        let fired = due_actions(
            &device,
            SimTime(0),
            SimTime(14 * MILLIS_PER_DAY),
            &NoOccupancy,
        );
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].at.day_number(), 1);
    }

    #[test]
    fn test_condition_gates_firing() {
        let mut entry = entry_at("12:00", Action::PowerOn);
        entry.condition = Some(Condition::RoomOccupied);
        let device = light_with_schedule(vec![entry]);
        let fired = due_actions(&device, SimTime(0), SimTime(MILLIS_PER_DAY), &NoOccupancy);
        assert!(fired.is_empty());

        struct Occupied;
        impl ConditionSource for Occupied {
            fn room_occupied(&self, _room: &RoomId) -> bool {
                true
            }
            fn building_occupied(&self, _room: &RoomId) -> bool {
                true
            }
            fn device_state_bool(&self, _device: &DeviceId, _key: &str) -> Option<bool> {
                None
            }
        }
        let fired = due_actions(&device, SimTime(0), SimTime(MILLIS_PER_DAY), &Occupied);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_action_support_by_kind() {
        assert!(Action::Lock.supported_by(DeviceKind::AccessControl));
        assert!(!Action::Lock.supported_by(DeviceKind::SmartLight));
        assert!(Action::SetMode { mode: "cool".into() }.supported_by(DeviceKind::Hvac));
        assert!(!Action::SetTargetTemperature { value: 20.0 }.supported_by(DeviceKind::Camera));
        assert!(Action::PowerOff.supported_by(DeviceKind::Co2Sensor));
    }

    #[test]
    fn test_power_off_maps_to_kind_specific_state() {
        let mut state = DeviceState::default();
        Action::PowerOff.apply(DeviceKind::Hvac, &mut state);
        assert_eq!(state.get_text("mode"), Some("off"));

        let mut state = DeviceState::default();
        Action::PowerOff.apply(DeviceKind::TemperatureSensor, &mut state);
        assert_eq!(state.get_text("status"), Some("standby"));
    }
}
