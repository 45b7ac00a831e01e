//! Alarm rule engine
//!
//! Rules are threshold predicates over telemetry, scoped to one device or
//! aggregated (arithmetic mean) over a room, floor or building. A predicate
//! must hold continuously for the rule's sustain window before an alarm is
//! raised; a single failing evaluation clears it. Acknowledgement is an
//! operator act and survives continued re-triggering; only a full
//! clear-and-re-raise produces a fresh unacknowledged alarm.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::{Result, SimError};
use crate::core::time::SimTime;
use crate::core::types::{AlarmId, BuildingId, DeviceId, FloorId, RoomId, RuleId};
use crate::engine::output::TelemetryPoint;
use crate::hierarchy::device::StateValue;
use crate::hierarchy::Hierarchy;

/// Tolerance for equality tests over float telemetry
const FLOAT_EQ_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    GreaterThan { threshold: f64 },
    LessThan { threshold: f64 },
    Equals { value: f64 },
    InRange { min: f64, max: f64 },
    OutOfRange { min: f64, max: f64 },
}

impl Predicate {
    pub fn holds(&self, observed: f64) -> bool {
        match self {
            Predicate::GreaterThan { threshold } => observed > *threshold,
            Predicate::LessThan { threshold } => observed < *threshold,
            Predicate::Equals { value } => (observed - value).abs() <= FLOAT_EQ_EPSILON,
            Predicate::InRange { min, max } => (*min..=*max).contains(&observed),
            Predicate::OutOfRange { min, max } => !(*min..=*max).contains(&observed),
        }
    }
}

/// Which devices a rule observes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleScope {
    Device { device_id: DeviceId },
    Room { room_id: RoomId },
    Floor { floor_id: FloorId },
    Building { building_id: BuildingId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlarmRule {
    pub id: RuleId,
    pub name: String,
    /// Telemetry key the rule observes
    pub key: String,
    pub predicate: Predicate,
    pub scope: RuleScope,
    pub severity: Severity,
    /// How long the predicate must hold, in simulated seconds, before the
    /// alarm is raised
    #[serde(default)]
    pub sustain_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmStatus {
    New,
    Acknowledged,
    Cleared,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alarm {
    pub id: AlarmId,
    pub rule_id: RuleId,
    pub severity: Severity,
    pub message: String,
    pub status: AlarmStatus,
    /// Start of the hold window that raised this alarm
    pub first_triggered_at: SimTime,
    /// Most recent evaluation at which the predicate still held
    pub last_triggered_at: SimTime,
    pub observed_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AlarmTransition {
    Raised { alarm: Alarm },
    Cleared { alarm: Alarm },
}

#[derive(Debug, Default)]
struct RuleTracker {
    /// Instant the predicate started holding, if it currently holds
    holding_since: Option<SimTime>,
}

/// Per-run alarm state: one tracker and at most one active alarm per rule
#[derive(Debug)]
pub struct AlarmEngine {
    rules: Vec<AlarmRule>,
    trackers: AHashMap<RuleId, RuleTracker>,
    active: AHashMap<RuleId, Alarm>,
}

impl AlarmEngine {
    pub fn new(rules: Vec<AlarmRule>) -> Self {
        Self {
            rules,
            trackers: AHashMap::new(),
            active: AHashMap::new(),
        }
    }

    pub fn active_alarms(&self) -> impl Iterator<Item = &Alarm> {
        self.active.values()
    }

    /// Mark an active alarm acknowledged. The mark survives continued
    /// re-triggering; it is lost only when the alarm clears.
    pub fn acknowledge(&mut self, id: AlarmId) -> Result<()> {
        match self.active.values_mut().find(|a| a.id == id) {
            Some(alarm) => {
                alarm.status = AlarmStatus::Acknowledged;
                Ok(())
            }
            None => Err(SimError::AlarmNotFound(id)),
        }
    }

    /// Evaluate every rule against one tick's telemetry batch.
    ///
    /// A rule whose scope yields no numeric sample this tick is treated as
    /// not holding, which also clears any active alarm for it.
    pub fn evaluate_all(
        &mut self,
        batch: &[TelemetryPoint],
        hierarchy: &Hierarchy,
        now: SimTime,
    ) -> Vec<AlarmTransition> {
        let mut samples: AHashMap<(&DeviceId, &str), f64> = AHashMap::new();
        for point in batch {
            if let Some(v) = numeric(&point.value) {
                samples.insert((&point.device_id, point.key.as_str()), v);
            }
        }

        let mut transitions = Vec::new();
        for rule in &self.rules {
            let tracker = self.trackers.entry(rule.id.clone()).or_default();
            let observed = scope_mean(rule, &samples, hierarchy);
            let holding = observed.map(|v| rule.predicate.holds(v)).unwrap_or(false);

            if holding {
                let value = observed.unwrap_or_default();
                let since = *tracker.holding_since.get_or_insert(now);
                if now.since(since) < Duration::from_secs(rule.sustain_secs) {
                    continue;
                }
                match self.active.get_mut(&rule.id) {
                    Some(alarm) => {
                        alarm.last_triggered_at = now;
                        alarm.observed_value = value;
                    }
                    None => {
                        let alarm = Alarm {
                            id: AlarmId::new(),
                            rule_id: rule.id.clone(),
                            severity: rule.severity,
                            message: format!("{}: {} = {:.3}", rule.name, rule.key, value),
                            status: AlarmStatus::New,
                            first_triggered_at: since,
                            last_triggered_at: now,
                            observed_value: value,
                        };
                        tracing::warn!(rule = %rule.id, value, "alarm raised");
                        self.active.insert(rule.id.clone(), alarm.clone());
                        transitions.push(AlarmTransition::Raised { alarm });
                    }
                }
            } else {
                tracker.holding_since = None;
                if let Some(mut alarm) = self.active.remove(&rule.id) {
                    alarm.status = AlarmStatus::Cleared;
                    alarm.last_triggered_at = now;
                    tracing::info!(rule = %rule.id, "alarm cleared");
                    transitions.push(AlarmTransition::Cleared { alarm });
                }
            }
        }
        transitions
    }
}

/// Booleans participate in threshold rules as 0/1
fn numeric(value: &StateValue) -> Option<f64> {
    match value {
        StateValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        other => other.as_f64(),
    }
}

/// Mean of this tick's samples for the rule's key across its scope
fn scope_mean(
    rule: &AlarmRule,
    samples: &AHashMap<(&DeviceId, &str), f64>,
    hierarchy: &Hierarchy,
) -> Option<f64> {
    let device_ids: &[DeviceId] = match &rule.scope {
        RuleScope::Device { device_id } => std::slice::from_ref(device_id),
        RuleScope::Room { room_id } => hierarchy.devices_in_room(room_id),
        RuleScope::Floor { floor_id } => hierarchy.devices_in_floor(floor_id),
        RuleScope::Building { building_id } => hierarchy.devices_in_building(building_id),
    };

    let mut sum = 0.0;
    let mut n = 0usize;
    for id in device_ids {
        if let Some(v) = samples.get(&(id, rule.key.as_str())) {
            sum += v;
            n += 1;
        }
    }
    (n > 0).then(|| sum / n as f64)
}
