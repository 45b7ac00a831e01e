//! Run configuration
//!
//! A run is created from one JSON document describing the clock, the
//! building hierarchy with its devices, and the alarm rules. Definition
//! structs here are pure serde shapes; `Hierarchy::build` turns them into
//! the validated containment tree.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::alarm::AlarmRule;
use crate::core::error::{Result, SimError};
use crate::core::types::{DeviceId, RoomId};
use crate::hierarchy::device::{Device, DeviceConfig, DeviceKind, DeviceState};
use crate::schedule::ScheduleEntry;

/// Engine tuning knobs. The defaults are sized for buildings of a few
/// hundred devices; none of them changes simulation semantics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    /// Real milliseconds between ticks in the driven run loop
    pub tick_interval_ms: u64,
    /// Evaluation layers at least this wide are stepped on the rayon pool;
    /// smaller layers run inline, the fan-out overhead isn't worth it
    pub parallel_threshold: usize,
    /// Daily cloud-cover factor is drawn uniformly from this range and
    /// applied to solar output
    pub weather_factor_min: f64,
    pub weather_factor_max: f64,
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            parallel_threshold: 64,
            weather_factor_min: 0.6,
            weather_factor_max: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Simulated start instant, seconds since the Unix epoch
    pub start_time: u64,
    /// Simulated seconds the run covers before it stops on its own
    pub duration_secs: u64,
    /// Simulated seconds per real second
    pub time_scale: f64,
    /// Seed for all stochastic behavior; equal seeds give equal runs
    #[serde(default)]
    pub seed: u64,
    pub buildings: Vec<BuildingDef>,
    #[serde(default)]
    pub rules: Vec<AlarmRule>,
    #[serde(default)]
    pub tuning: EngineTuning,
}

impl RunConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Scalar sanity checks. Structural validation of the hierarchy happens
    /// in `Hierarchy::build`.
    pub fn validate(&self) -> Result<()> {
        if !self.time_scale.is_finite() || self.time_scale <= 0.0 {
            return Err(SimError::Configuration(format!(
                "time_scale must be a positive number, got {}",
                self.time_scale
            )));
        }
        if self.duration_secs == 0 {
            return Err(SimError::Configuration("duration_secs must be positive".into()));
        }
        if self.tuning.tick_interval_ms == 0 {
            return Err(SimError::Configuration("tick_interval_ms must be positive".into()));
        }
        let (lo, hi) = (self.tuning.weather_factor_min, self.tuning.weather_factor_max);
        if !(0.0..=1.0).contains(&lo) || !(0.0..=1.0).contains(&hi) || lo > hi {
            return Err(SimError::Configuration(format!(
                "weather factor range [{lo}, {hi}] is invalid"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub floors: Vec<FloorDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloorDef {
    pub id: String,
    #[serde(default)]
    pub level: i32,
    pub rooms: Vec<RoomDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomDef {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub devices: Vec<DeviceDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDef {
    pub id: String,
    /// Device type string, must name a supported kind
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: DeviceConfig,
    #[serde(default)]
    pub schedule: Vec<ScheduleEntry>,
    #[serde(default)]
    pub dependencies: Vec<DeviceId>,
    #[serde(default)]
    pub initial_state: DeviceState,
}

impl DeviceDef {
    /// Resolve the definition into a device, rejecting unknown type strings
    /// and schedule actions the type does not accept.
    pub fn build(&self, room_id: RoomId) -> Result<Device> {
        let kind: DeviceKind = self.kind.parse()?;
        for (index, entry) in self.schedule.iter().enumerate() {
            if !entry.action.supported_by(kind) {
                return Err(SimError::Configuration(format!(
                    "device {}: schedule entry {} holds an action {} devices do not accept",
                    self.id,
                    index,
                    kind.as_str()
                )));
            }
        }
        Ok(Device {
            id: DeviceId::new(&self.id),
            kind,
            room_id,
            config: self.config.clone(),
            schedule: self.schedule.clone(),
            dependencies: self.dependencies.clone(),
            initial_state: self.initial_state.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "start_time": 1700000000,
        "duration_secs": 86400,
        "time_scale": 60.0,
        "seed": 7,
        "buildings": [{
            "id": "hq",
            "name": "Headquarters",
            "floors": [{
                "id": "hq-1",
                "level": 1,
                "rooms": [{
                    "id": "hq-1-lab",
                    "name": "Lab",
                    "devices": [
                        {
                            "id": "temp-1",
                            "type": "temperature_sensor",
                            "config": { "min_val": 10.0, "max_val": 40.0 }
                        },
                        {
                            "id": "light-1",
                            "type": "smart_light",
                            "schedule": [
                                { "action": { "type": "power_on" }, "time_of_day": "07:30" },
                                { "action": { "type": "power_off" }, "time_of_day": "19:00",
                                  "days": ["monday", "tuesday", "wednesday", "thursday", "friday"] }
                            ]
                        }
                    ]
                }]
            }]
        }],
        "rules": [{
            "id": "lab-overheat",
            "name": "Lab overheating",
            "key": "temperature",
            "predicate": { "type": "greater_than", "threshold": 32.0 },
            "scope": { "type": "room", "room_id": "hq-1-lab" },
            "severity": "critical",
            "sustain_secs": 300
        }]
    }"#;

    #[test]
    fn test_sample_config_parses() {
        let config = RunConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.buildings.len(), 1);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.tuning.parallel_threshold, 64); // default
        let devices = &config.buildings[0].floors[0].rooms[0].devices;
        assert_eq!(devices[1].schedule.len(), 2);
    }

    #[test]
    fn test_nonpositive_time_scale_is_rejected() {
        let mut config = RunConfig::from_json(SAMPLE).unwrap();
        config.time_scale = 0.0;
        assert!(matches!(
            config.validate(),
            Err(SimError::Configuration(_))
        ));
        config.time_scale = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_type_string_fails_resolution() {
        let def = DeviceDef {
            id: "x".into(),
            kind: "flux_capacitor".into(),
            config: Default::default(),
            schedule: vec![],
            dependencies: vec![],
            initial_state: Default::default(),
        };
        assert!(matches!(
            def.build(RoomId::new("r")),
            Err(SimError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn test_unsupported_schedule_action_is_rejected() {
        let def = DeviceDef {
            id: "temp-1".into(),
            kind: "temperature_sensor".into(),
            config: Default::default(),
            schedule: vec![ScheduleEntry {
                action: crate::schedule::Action::Lock,
                time_of_day: "08:00".parse().unwrap(),
                days: None,
                date: None,
                condition: None,
            }],
            dependencies: vec![],
            initial_state: Default::default(),
        };
        assert!(matches!(
            def.build(RoomId::new("r")),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_bad_json_maps_to_serde_error() {
        assert!(matches!(
            RunConfig::from_json("{ not json"),
            Err(SimError::Serde(_))
        ));
    }
}
