//! Run context and tick orchestration
//!
//! A `SimulationRun` owns everything mutable about one running simulation:
//! the clock, the per-device state table, pending external actions and the
//! alarm engine. Ticks are strictly sequential per run; independent runs are
//! independent values with no shared state.
//!
//! Tick pipeline: advance the clock, apply external then scheduled actions,
//! step device behavior layer by layer (cycle members first, from the
//! previous snapshot), sample telemetry, evaluate alarm rules, emit one
//! `TickOutput`.

pub mod output;
pub mod runner;

use std::hash::BuildHasher;
use std::time::Duration;

use ahash::AHashMap;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand::Rng;
use rayon::prelude::*;

use crate::alarm::{Alarm, AlarmEngine, AlarmRule, RuleScope};
use crate::behavior::{self, Environment, StateView};
use crate::config::{EngineTuning, RunConfig};
use crate::core::clock::{ClockStatus, SimClock};
use crate::core::error::{Result, SimError};
use crate::core::time::SimTime;
use crate::core::types::{AlarmId, DeviceId, RunId, Tick};
use crate::hierarchy::device::DeviceState;
use crate::hierarchy::Hierarchy;
use crate::resolver::{self, EvaluationOrder};
use crate::schedule::{self, Action, ConditionSource};
use output::{ChangeCause, StateChange, TelemetryPoint, TickOutput};

/// One live simulation
pub struct SimulationRun {
    id: RunId,
    clock: SimClock,
    hierarchy: Hierarchy,
    states: AHashMap<DeviceId, DeviceState>,
    order: EvaluationOrder,
    alarms: AlarmEngine,
    /// External actions folded into the next tick
    pending: Vec<(DeviceId, Action)>,
    prev_time: SimTime,
    tick: Tick,
    seed: u64,
    duration: Duration,
    tuning: EngineTuning,
}

impl SimulationRun {
    pub fn new(config: &RunConfig) -> Result<Self> {
        config.validate()?;
        let hierarchy = Hierarchy::build(&config.buildings)?;
        validate_rules(&hierarchy, &config.rules)?;

        // Dependencies are immutable for the run, so the order is computed
        // once up front.
        let order = resolver::resolve(hierarchy.devices());
        if order.has_cycles() {
            tracing::warn!(
                devices = ?order.cyclic,
                "dependency cycles detected; affected devices evaluate from the previous tick"
            );
        }

        let states = hierarchy
            .devices()
            .map(|d| (d.id.clone(), d.starting_state()))
            .collect();

        let start = SimTime::from_unix_seconds(config.start_time);
        let id = RunId::new();
        tracing::info!(
            run = %id.0,
            devices = hierarchy.device_count(),
            rules = config.rules.len(),
            time_scale = config.time_scale,
            "run created"
        );

        Ok(Self {
            id,
            clock: SimClock::new(start, config.time_scale),
            hierarchy,
            states,
            order,
            alarms: AlarmEngine::new(config.rules.clone()),
            pending: Vec::new(),
            prev_time: start,
            tick: 0,
            seed: config.seed,
            duration: Duration::from_secs(config.duration_secs),
            tuning: config.tuning.clone(),
        })
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn now(&self) -> SimTime {
        self.clock.now()
    }

    pub fn status(&self) -> ClockStatus {
        self.clock.status()
    }

    /// Whether the configured simulated duration has been covered
    pub fn is_finished(&self) -> bool {
        self.clock.now().since(self.clock.start_time()) >= self.duration
    }

    pub fn pause(&mut self) {
        self.clock.pause();
        tracing::info!(run = %self.id.0, "run paused");
    }

    pub fn resume(&mut self) -> Result<()> {
        self.clock.resume()?;
        tracing::info!(run = %self.id.0, "run resumed");
        Ok(())
    }

    pub fn stop(&mut self) {
        if self.clock.status() != ClockStatus::Stopped {
            tracing::info!(run = %self.id.0, ticks = self.tick, "run stopped");
        }
        self.clock.stop();
    }

    /// Validate and queue an external action for the next tick.
    pub fn apply_external_action(&mut self, device_id: DeviceId, action: Action) -> Result<()> {
        let device = self.hierarchy.device(&device_id).ok_or_else(|| {
            SimError::InvalidAction {
                device: device_id.clone(),
                reason: "unknown device".into(),
            }
        })?;
        if !action.supported_by(device.kind) {
            return Err(SimError::InvalidAction {
                device: device_id,
                reason: format!("{} devices do not accept this action", device.kind.as_str()),
            });
        }
        self.pending.push((device_id, action));
        Ok(())
    }

    pub fn acknowledge_alarm(&mut self, id: AlarmId) -> Result<()> {
        self.alarms.acknowledge(id)
    }

    pub fn active_alarms(&self) -> impl Iterator<Item = &Alarm> {
        self.alarms.active_alarms()
    }

    /// Current state of a device, mainly for inspection and tests
    pub fn device_state(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.states.get(id)
    }

    /// Advance the run by one tick worth of real elapsed time.
    ///
    /// Returns `None` while paused: paused ticks advance nothing and emit
    /// nothing, so a paused-and-resumed run replays exactly like an
    /// uninterrupted one with the same seed.
    pub fn tick(&mut self, real_elapsed: Duration) -> Result<Option<TickOutput>> {
        let sim_elapsed = self.clock.advance(real_elapsed)?;
        if self.clock.status() == ClockStatus::Paused {
            return Ok(None);
        }
        self.tick += 1;
        let now = self.clock.now();
        let prev = self.prev_time;

        let state_changes = self.apply_actions(prev, now);
        let telemetry = self.step_devices(now, sim_elapsed);
        let alarm_transitions = self.alarms.evaluate_all(&telemetry, &self.hierarchy, now);

        self.prev_time = now;
        Ok(Some(TickOutput {
            tick: self.tick,
            sim_time: now,
            telemetry,
            state_changes,
            alarm_transitions,
            cyclic_devices: self.order.cyclic.clone(),
        }))
    }

    /// External actions first, then every schedule crossing in `(prev, now]`
    /// in global chronological order.
    fn apply_actions(&mut self, prev: SimTime, now: SimTime) -> Vec<StateChange> {
        let mut changes = Vec::new();

        for (device_id, action) in std::mem::take(&mut self.pending) {
            // Existence and support were validated at submission
            let Some(device) = self.hierarchy.device(&device_id) else {
                continue;
            };
            let kind = device.kind;
            if let Some(state) = self.states.get_mut(&device_id) {
                for (key, value) in action.apply(kind, state) {
                    changes.push(StateChange {
                        device_id: device_id.clone(),
                        key,
                        value,
                        cause: ChangeCause::External,
                        at: now,
                    });
                }
            }
        }

        let mut fired = Vec::new();
        {
            let view = RunView {
                states: &self.states,
                hierarchy: &self.hierarchy,
            };
            for (position, device) in self.hierarchy.devices().enumerate() {
                for f in schedule::due_actions(device, prev, now, &view) {
                    fired.push((position, f));
                }
            }
        }
        fired.sort_by(|(pa, a), (pb, b)| {
            a.at.cmp(&b.at)
                .then(pa.cmp(pb))
                .then(a.entry_index.cmp(&b.entry_index))
        });

        for (_, f) in fired {
            let Some(device) = self.hierarchy.device(&f.device_id) else {
                continue;
            };
            let kind = device.kind;
            if let Some(state) = self.states.get_mut(&f.device_id) {
                for (key, value) in f.action.apply(kind, state) {
                    changes.push(StateChange {
                        device_id: f.device_id.clone(),
                        key,
                        value,
                        cause: ChangeCause::Schedule {
                            entry_index: f.entry_index,
                        },
                        at: f.at,
                    });
                }
            }
        }
        changes
    }

    /// Step every device's behavior model and sample telemetry.
    ///
    /// Cycle members go first, reading the pre-behavior snapshot. Layers
    /// then run in order; devices within a layer are independent and step
    /// on the rayon pool once the layer is wide enough.
    fn step_devices(&mut self, now: SimTime, sim_elapsed: Duration) -> Vec<TelemetryPoint> {
        let weather_factor = self.weather_factor(now.day_number());

        if !self.order.cyclic.is_empty() {
            let snapshot = self.states.clone();
            let snapshot_view = SnapshotView(&snapshot);
            let mut stepped = Vec::with_capacity(self.order.cyclic.len());
            for id in &self.order.cyclic {
                let Some(device) = self.hierarchy.device(id) else {
                    continue;
                };
                let Some(state) = snapshot.get(id) else {
                    continue;
                };
                let mut state = state.clone();
                let env = Environment {
                    now,
                    elapsed: sim_elapsed,
                    states: &snapshot_view,
                    room_occupied: room_occupied(&snapshot, &self.hierarchy, &device.room_id),
                    weather_factor,
                };
                let mut rng = ChaCha8Rng::seed_from_u64(self.stream_seed(id));
                behavior::step(device, &mut state, &env, &mut rng);
                stepped.push((id.clone(), state));
            }
            for (id, state) in stepped {
                self.states.insert(id, state);
            }
        }

        for layer in &self.order.layers {
            let step_one = |id: &DeviceId| -> Option<(DeviceId, DeviceState)> {
                let device = self.hierarchy.device(id)?;
                let mut state = self.states.get(id)?.clone();
                let view = RunView {
                    states: &self.states,
                    hierarchy: &self.hierarchy,
                };
                let env = Environment {
                    now,
                    elapsed: sim_elapsed,
                    states: &view,
                    room_occupied: room_occupied(&self.states, &self.hierarchy, &device.room_id),
                    weather_factor,
                };
                let mut rng = ChaCha8Rng::seed_from_u64(self.stream_seed(id));
                behavior::step(device, &mut state, &env, &mut rng);
                Some((id.clone(), state))
            };

            let stepped: Vec<(DeviceId, DeviceState)> =
                if layer.len() >= self.tuning.parallel_threshold {
                    layer.par_iter().filter_map(step_one).collect()
                } else {
                    layer.iter().filter_map(step_one).collect()
                };
            for (id, state) in stepped {
                self.states.insert(id, state);
            }
        }

        let mut telemetry = Vec::new();
        for device in self.hierarchy.devices() {
            let Some(state) = self.states.get(&device.id) else {
                continue;
            };
            let keys = if device.kind.is_active(state) {
                device.kind.telemetry_keys()
            } else {
                device.kind.standby_keys()
            };
            for key in keys {
                if let Some(value) = state.get(key) {
                    telemetry.push(TelemetryPoint {
                        device_id: device.id.clone(),
                        key: (*key).into(),
                        value: value.clone(),
                        at: now,
                    });
                }
            }
        }
        telemetry
    }

    /// Seed for one device's RNG stream this tick. Derived from the run
    /// seed, the tick counter and the device id, so replays are exact and
    /// independent of evaluation order.
    fn stream_seed(&self, id: &DeviceId) -> u64 {
        ahash::RandomState::with_seeds(
            self.seed,
            self.tick,
            0x9e37_79b9_7f4a_7c15,
            0x6a09_e667_f3bc_c909,
        )
        .hash_one(id)
    }

    /// Cloud cover for a simulated day, stable across the day and across
    /// replays with the same seed.
    fn weather_factor(&self, day: u64) -> f64 {
        let (lo, hi) = (
            self.tuning.weather_factor_min,
            self.tuning.weather_factor_max,
        );
        if lo >= hi {
            return lo;
        }
        let mut rng =
            ChaCha8Rng::seed_from_u64(self.seed ^ day.wrapping_mul(0x9e37_79b9_7f4a_7c15));
        rng.gen_range(lo..hi)
    }
}

fn validate_rules(hierarchy: &Hierarchy, rules: &[AlarmRule]) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for rule in rules {
        if !seen.insert(&rule.id) {
            return Err(SimError::Configuration(format!(
                "duplicate rule id: {}",
                rule.id
            )));
        }
        let resolved = match &rule.scope {
            RuleScope::Device { device_id } => hierarchy.contains_device(device_id),
            RuleScope::Room { room_id } => hierarchy.room(room_id).is_some(),
            RuleScope::Floor { floor_id } => hierarchy.floor(floor_id).is_some(),
            RuleScope::Building { building_id } => {
                hierarchy.buildings().iter().any(|b| &b.id == building_id)
            }
        };
        if !resolved {
            return Err(SimError::Configuration(format!(
                "rule {} targets an unknown scope",
                rule.id
            )));
        }
    }
    Ok(())
}

/// Live view over the run's state table
struct RunView<'a> {
    states: &'a AHashMap<DeviceId, DeviceState>,
    hierarchy: &'a Hierarchy,
}

impl StateView for RunView<'_> {
    fn state_of(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.states.get(id)
    }
}

impl ConditionSource for RunView<'_> {
    fn room_occupied(&self, room: &crate::core::types::RoomId) -> bool {
        room_occupied(self.states, self.hierarchy, room)
    }

    fn building_occupied(&self, room: &crate::core::types::RoomId) -> bool {
        let Some(building) = self.hierarchy.building_of_room(room) else {
            return false;
        };
        self.hierarchy
            .buildings()
            .iter()
            .filter(|b| &b.id == building)
            .flat_map(|b| &b.floors)
            .filter_map(|f| self.hierarchy.floor(f))
            .flat_map(|f| &f.rooms)
            .any(|r| room_occupied(self.states, self.hierarchy, r))
    }

    fn device_state_bool(&self, device: &DeviceId, key: &str) -> Option<bool> {
        self.states.get(device)?.get_bool(key)
    }
}

/// Frozen pre-behavior snapshot, used for cycle members
struct SnapshotView<'a>(&'a AHashMap<DeviceId, DeviceState>);

impl StateView for SnapshotView<'_> {
    fn state_of(&self, id: &DeviceId) -> Option<&DeviceState> {
        self.0.get(id)
    }
}

/// A room reads as occupied when any of its presence-capable sensors says
/// someone is there.
fn room_occupied(
    states: &AHashMap<DeviceId, DeviceState>,
    hierarchy: &Hierarchy,
    room: &crate::core::types::RoomId,
) -> bool {
    hierarchy.devices_in_room(room).iter().any(|id| {
        let Some(state) = states.get(id) else {
            return false;
        };
        state
            .get_i64("occupant_count")
            .map(|c| c > 0)
            .or_else(|| state.get_bool("motion_detected"))
            .unwrap_or(false)
    })
}
