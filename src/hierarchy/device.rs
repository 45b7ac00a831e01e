//! Device model
//!
//! A device is immutable for the lifetime of a run: its type, configuration,
//! schedule and dependency declarations are fixed at run creation. The only
//! mutable piece is its state map, which lives in the run context, not here.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::core::error::{Result, SimError};
use crate::core::types::{DeviceId, RoomId};
use crate::schedule::ScheduleEntry;

/// Closed set of supported device types.
///
/// Unknown type strings are rejected at configuration time, never at
/// runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    TemperatureSensor,
    HumiditySensor,
    Co2Sensor,
    MotionSensor,
    OccupancySensor,
    DoorSensor,
    WindowSensor,
    LeakSensor,
    SmokeSensor,
    SmartLight,
    SmartPlug,
    Hvac,
    AccessControl,
    Camera,
    PowerMeter,
    SolarPanel,
}

impl DeviceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::TemperatureSensor => "temperature_sensor",
            DeviceKind::HumiditySensor => "humidity_sensor",
            DeviceKind::Co2Sensor => "co2_sensor",
            DeviceKind::MotionSensor => "motion_sensor",
            DeviceKind::OccupancySensor => "occupancy_sensor",
            DeviceKind::DoorSensor => "door_sensor",
            DeviceKind::WindowSensor => "window_sensor",
            DeviceKind::LeakSensor => "leak_sensor",
            DeviceKind::SmokeSensor => "smoke_sensor",
            DeviceKind::SmartLight => "smart_light",
            DeviceKind::SmartPlug => "smart_plug",
            DeviceKind::Hvac => "hvac",
            DeviceKind::AccessControl => "access_control",
            DeviceKind::Camera => "camera",
            DeviceKind::PowerMeter => "power_meter",
            DeviceKind::SolarPanel => "solar_panel",
        }
    }

    /// Telemetry keys this type emits while active. Downstream consumers
    /// rely on these being stable per type.
    pub fn telemetry_keys(&self) -> &'static [&'static str] {
        match self {
            DeviceKind::TemperatureSensor => &["temperature", "humidity"],
            DeviceKind::HumiditySensor => &["humidity"],
            DeviceKind::Co2Sensor => &["co2", "air_quality_index"],
            DeviceKind::MotionSensor => &["motion_detected", "signal_strength"],
            DeviceKind::OccupancySensor => &["occupant_count", "signal_strength"],
            DeviceKind::DoorSensor => &["open", "battery_level"],
            DeviceKind::WindowSensor => &["open", "battery_level"],
            DeviceKind::LeakSensor => &["leak_detected", "battery_level"],
            DeviceKind::SmokeSensor => &["smoke_level", "alarm_active"],
            DeviceKind::SmartLight => &["power_state", "brightness", "power_consumption"],
            DeviceKind::SmartPlug => &["power_consumption", "voltage", "current"],
            DeviceKind::Hvac => &["mode", "target_temperature", "fan_speed", "power_consumption"],
            DeviceKind::AccessControl => &["locked", "access_attempts"],
            DeviceKind::Camera => &["recording", "storage_usage"],
            DeviceKind::PowerMeter => &["current_power", "voltage", "total_consumption"],
            DeviceKind::SolarPanel => &["current_power", "total_generation", "irradiance"],
        }
    }

    /// Telemetry keys emitted while inactive (the standby set). Meters and
    /// generators never sleep; actuators report draw only.
    pub fn standby_keys(&self) -> &'static [&'static str] {
        match self {
            DeviceKind::SmartLight | DeviceKind::SmartPlug | DeviceKind::Hvac => {
                &["power_consumption"]
            }
            DeviceKind::Camera => &["recording"],
            DeviceKind::PowerMeter | DeviceKind::SolarPanel => self.telemetry_keys(),
            _ => &[],
        }
    }

    /// Whether the device is currently in its active mode given its state.
    pub fn is_active(&self, state: &DeviceState) -> bool {
        match self {
            DeviceKind::SmartLight | DeviceKind::SmartPlug => {
                state.get_bool("power_state").unwrap_or(false)
            }
            DeviceKind::Hvac => state.get_text("mode").map(|m| m != "off").unwrap_or(true),
            DeviceKind::Camera => state.get_bool("recording").unwrap_or(false),
            _ => state.get_text("status").map(|s| s != "standby").unwrap_or(true),
        }
    }
}

impl FromStr for DeviceKind {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "temperature_sensor" => Ok(DeviceKind::TemperatureSensor),
            "humidity_sensor" => Ok(DeviceKind::HumiditySensor),
            "co2_sensor" => Ok(DeviceKind::Co2Sensor),
            "motion_sensor" => Ok(DeviceKind::MotionSensor),
            "occupancy_sensor" => Ok(DeviceKind::OccupancySensor),
            "door_sensor" => Ok(DeviceKind::DoorSensor),
            "window_sensor" => Ok(DeviceKind::WindowSensor),
            "leak_sensor" => Ok(DeviceKind::LeakSensor),
            "smoke_sensor" => Ok(DeviceKind::SmokeSensor),
            "smart_light" => Ok(DeviceKind::SmartLight),
            "smart_plug" => Ok(DeviceKind::SmartPlug),
            "hvac" => Ok(DeviceKind::Hvac),
            "access_control" => Ok(DeviceKind::AccessControl),
            "camera" => Ok(DeviceKind::Camera),
            "power_meter" => Ok(DeviceKind::PowerMeter),
            "solar_panel" => Ok(DeviceKind::SolarPanel),
            other => Err(SimError::UnknownDeviceType(other.to_string())),
        }
    }
}

/// A single named state or telemetry value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl StateValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StateValue::Int(i) => Some(*i as f64),
            StateValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            StateValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

/// Mutable per-device state map.
///
/// Exclusively owned by the run context; the engine tick currently
/// processing a device is the only writer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceState(pub AHashMap<String, StateValue>);

impl DeviceState {
    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.0.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: StateValue) {
        self.0.insert(key.into(), value);
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(StateValue::as_f64)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(StateValue::as_bool)
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(StateValue::Int(i)) => Some(*i),
            Some(StateValue::Float(f)) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(StateValue::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }
}

/// Type-specific configuration knobs, immutable for the run.
///
/// All fields are optional; each behavior model falls back to documented
/// defaults for the knobs it reads.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Hard lower bound for continuous readings
    pub min_val: Option<f64>,
    /// Hard upper bound for continuous readings
    pub max_val: Option<f64>,
    pub target_temperature: Option<f64>,
    /// Detection probability weight for motion sensors (0..1)
    pub sensitivity: Option<f64>,
    /// Baseline draw in watts for plugs and meters
    pub base_load_watts: Option<f64>,
    /// Draw in watts while the device is doing work
    pub active_draw_watts: Option<f64>,
    /// Draw in watts while idle/standby
    pub idle_draw_watts: Option<f64>,
    /// Solar conversion efficiency (0..1)
    pub efficiency: Option<f64>,
    pub panel_area_m2: Option<f64>,
    pub authorized_cards: Vec<String>,
    /// Setback in degrees applied by HVAC eco mode when the linked
    /// presence source reports nobody
    pub eco_setback: Option<f64>,
    /// Occupancy/motion device this device reads for presence decisions.
    /// Must also appear in the device's dependency list.
    pub presence_detection_source_device_id: Option<DeviceId>,
    /// Camera resolution label, drives storage accumulation rate
    pub resolution: Option<String>,
    /// Expected spontaneous events per simulated hour for discrete sensors
    pub event_rate_per_hour: Option<f64>,
}

/// A configured device within the hierarchy
#[derive(Debug, Clone)]
pub struct Device {
    pub id: DeviceId,
    pub kind: DeviceKind,
    pub room_id: RoomId,
    pub config: DeviceConfig,
    /// Evaluated in declaration order
    pub schedule: Vec<ScheduleEntry>,
    /// Devices whose current-tick state this device reads
    pub dependencies: Vec<DeviceId>,
    pub initial_state: DeviceState,
}

impl Device {
    /// Starting state: the type's defaults overlaid with any configured
    /// initial values.
    pub fn starting_state(&self) -> DeviceState {
        let mut state = default_state(self.kind);
        for (k, v) in &self.initial_state.0 {
            state.set(k.clone(), v.clone());
        }
        state
    }
}

/// Per-type default state before any configuration overlay
pub fn default_state(kind: DeviceKind) -> DeviceState {
    let mut s = DeviceState::default();
    s.set("status", StateValue::Text("active".into()));
    match kind {
        DeviceKind::TemperatureSensor => {
            s.set("temperature", StateValue::Float(21.0));
            s.set("humidity", StateValue::Float(45.0));
        }
        DeviceKind::HumiditySensor => {
            s.set("humidity", StateValue::Float(50.0));
        }
        DeviceKind::Co2Sensor => {
            s.set("co2", StateValue::Float(420.0));
        }
        DeviceKind::MotionSensor => {
            s.set("motion_detected", StateValue::Bool(false));
        }
        DeviceKind::OccupancySensor => {
            s.set("occupant_count", StateValue::Int(0));
        }
        DeviceKind::DoorSensor | DeviceKind::WindowSensor => {
            s.set("open", StateValue::Bool(false));
            s.set("battery_level", StateValue::Float(100.0));
        }
        DeviceKind::LeakSensor => {
            s.set("leak_detected", StateValue::Bool(false));
            s.set("battery_level", StateValue::Float(100.0));
        }
        DeviceKind::SmokeSensor => {
            s.set("smoke_level", StateValue::Float(0.0));
            s.set("alarm_active", StateValue::Bool(false));
        }
        DeviceKind::SmartLight => {
            s.set("power_state", StateValue::Bool(false));
            s.set("brightness", StateValue::Float(80.0));
        }
        DeviceKind::SmartPlug => {
            s.set("power_state", StateValue::Bool(true));
        }
        DeviceKind::Hvac => {
            s.set("mode", StateValue::Text("auto".into()));
            s.set("target_temperature", StateValue::Float(21.0));
            s.set("fan_speed", StateValue::Int(1));
            s.set("current_temperature", StateValue::Float(21.0));
        }
        DeviceKind::AccessControl => {
            s.set("locked", StateValue::Bool(true));
            s.set("access_attempts", StateValue::Int(0));
        }
        DeviceKind::Camera => {
            s.set("recording", StateValue::Bool(true));
            s.set("storage_usage", StateValue::Float(0.0));
        }
        DeviceKind::PowerMeter => {
            s.set("total_consumption", StateValue::Float(0.0));
        }
        DeviceKind::SolarPanel => {
            s.set("total_generation", StateValue::Float(0.0));
        }
    }
    s
}
