//! Per-tick output records
//!
//! One `TickOutput` batch is emitted per completed tick. Batches are plain
//! serializable data with no references into the run, so sinks can buffer or
//! ship them without holding the engine up.

use serde::Serialize;

use crate::alarm::AlarmTransition;
use crate::core::time::SimTime;
use crate::core::types::{DeviceId, Tick};
use crate::hierarchy::device::StateValue;

/// One sampled telemetry value
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryPoint {
    pub device_id: DeviceId,
    pub key: String,
    pub value: StateValue,
    /// Simulated instant the sample was taken
    pub at: SimTime,
}

/// What caused a recorded state change
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeCause {
    /// A schedule entry fired (index into the device's schedule)
    Schedule { entry_index: usize },
    /// An action injected through the control surface
    External,
}

/// A state write performed by an action. Behavior-model drift is not
/// recorded here; it shows up as telemetry.
#[derive(Debug, Clone, Serialize)]
pub struct StateChange {
    pub device_id: DeviceId,
    pub key: String,
    pub value: StateValue,
    pub cause: ChangeCause,
    pub at: SimTime,
}

/// Everything one tick produced
#[derive(Debug, Clone, Serialize)]
pub struct TickOutput {
    pub tick: Tick,
    pub sim_time: SimTime,
    pub telemetry: Vec<TelemetryPoint>,
    pub state_changes: Vec<StateChange>,
    pub alarm_transitions: Vec<AlarmTransition>,
    /// Devices evaluated from the previous tick's snapshot because they sit
    /// on a dependency cycle; empty in healthy configurations
    pub cyclic_devices: Vec<DeviceId>,
}
