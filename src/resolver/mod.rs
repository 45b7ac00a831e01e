//! Dependency resolution for device evaluation order
//!
//! Devices may declare read dependencies on other devices (a thermostat
//! reading an occupancy sensor). Each tick they must be evaluated so that
//! every device runs after everything it reads from. The resolver produces
//! evaluation layers: devices within a layer are mutually independent and
//! may run in parallel; layers run in sequence.
//!
//! Cycles do not fail the tick. Devices on a cycle are pulled out, evaluated
//! against the previous tick's state snapshot, and their dependents are
//! ordered as if the cycle members had already run.

use ahash::{AHashMap, AHashSet};

use crate::core::types::DeviceId;
use crate::hierarchy::device::Device;

/// Evaluation order for one tick's device set
#[derive(Debug, Clone, Default)]
pub struct EvaluationOrder {
    /// Topological layers; all of a device's dependencies appear in
    /// earlier layers (or in `cyclic`)
    pub layers: Vec<Vec<DeviceId>>,
    /// Devices on a dependency cycle, evaluated from prior-tick state
    pub cyclic: Vec<DeviceId>,
}

impl EvaluationOrder {
    pub fn has_cycles(&self) -> bool {
        !self.cyclic.is_empty()
    }
}

/// Compute the evaluation order for a set of devices.
///
/// Edges to device ids outside the set are ignored (configuration
/// validation guarantees they do not exist in practice).
pub fn resolve<'a, I>(devices: I) -> EvaluationOrder
where
    I: IntoIterator<Item = &'a Device>,
{
    let devices: Vec<&Device> = devices.into_iter().collect();
    let ids: AHashSet<&DeviceId> = devices.iter().map(|d| &d.id).collect();

    // dependency -> dependents adjacency, restricted to the device set
    let mut dependents: AHashMap<&DeviceId, Vec<&DeviceId>> = AHashMap::new();
    let mut indegree: AHashMap<&DeviceId, usize> = AHashMap::new();
    for device in &devices {
        indegree.entry(&device.id).or_insert(0);
        for dep in &device.dependencies {
            if dep == &device.id || !ids.contains(dep) {
                continue;
            }
            dependents.entry(dep).or_default().push(&device.id);
            *indegree.entry(&device.id).or_insert(0) += 1;
        }
    }

    let cyclic_set = find_cycle_members(&devices, &ids);

    // Layered Kahn over the acyclic remainder; edges from cycle members are
    // treated as satisfied since those devices evaluate first from the
    // previous snapshot.
    let mut remaining: AHashMap<&DeviceId, usize> = AHashMap::new();
    for device in &devices {
        if cyclic_set.contains(&device.id) {
            continue;
        }
        let deg = device
            .dependencies
            .iter()
            .filter(|dep| {
                **dep != device.id && ids.contains(*dep) && !cyclic_set.contains(*dep)
            })
            .count();
        remaining.insert(&device.id, deg);
    }

    let mut layers = Vec::new();
    let mut frontier: Vec<&DeviceId> = remaining
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();

    while !frontier.is_empty() {
        frontier.sort_unstable();
        let layer: Vec<DeviceId> = frontier.iter().map(|id| (*id).clone()).collect();

        let mut next = Vec::new();
        for id in frontier {
            remaining.remove(id);
            if let Some(deps) = dependents.get(id) {
                for dependent in deps {
                    if let Some(deg) = remaining.get_mut(dependent) {
                        *deg -= 1;
                        if *deg == 0 {
                            next.push(*dependent);
                        }
                    }
                }
            }
        }
        layers.push(layer);
        frontier = next;
    }

    let mut cyclic: Vec<DeviceId> = cyclic_set.into_iter().collect();
    cyclic.sort_unstable();

    EvaluationOrder { layers, cyclic }
}

/// Exactly the devices that sit on a dependency cycle.
///
/// Forward peeling (repeatedly removing devices whose dependencies are all
/// satisfied) leaves cycle members plus everything downstream of them;
/// peeling the leftover from the other end (removing devices nothing in the
/// leftover reads from) strips the downstream part, leaving the cycles.
fn find_cycle_members(devices: &[&Device], ids: &AHashSet<&DeviceId>) -> AHashSet<DeviceId> {
    let mut indegree: AHashMap<&DeviceId, usize> = AHashMap::new();
    let mut dependents: AHashMap<&DeviceId, Vec<&DeviceId>> = AHashMap::new();
    for device in devices {
        indegree.entry(&device.id).or_insert(0);
        for dep in &device.dependencies {
            if dep == &device.id {
                // A self-loop is the smallest cycle
                continue;
            }
            if !ids.contains(dep) {
                continue;
            }
            dependents.entry(dep).or_default().push(&device.id);
            *indegree.entry(&device.id).or_insert(0) += 1;
        }
    }

    // Forward peel
    let mut queue: Vec<&DeviceId> = indegree
        .iter()
        .filter(|(_, d)| **d == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut removed: AHashSet<&DeviceId> = AHashSet::new();
    while let Some(id) = queue.pop() {
        removed.insert(id);
        if let Some(deps) = dependents.get(id) {
            for dependent in deps {
                let deg = indegree.get_mut(dependent).expect("dependent tracked");
                *deg -= 1;
                if *deg == 0 {
                    queue.push(dependent);
                }
            }
        }
    }

    let device_by_id: AHashMap<&DeviceId, &Device> =
        devices.iter().map(|d| (&d.id, *d)).collect();
    let leftover: AHashSet<&DeviceId> = devices
        .iter()
        .map(|d| &d.id)
        .filter(|id| !removed.contains(*id))
        .collect();

    // Reverse peel within the leftover: a device with no within-leftover
    // readers cannot be on a cycle
    let mut readers_of: AHashMap<&DeviceId, Vec<&DeviceId>> = AHashMap::new();
    for id in &leftover {
        let device = device_by_id[*id];
        for dep in &device.dependencies {
            if leftover.contains(dep) && dep != *id {
                readers_of.entry(dep).or_default().push(&device.id);
            }
        }
    }
    let mut read_count: AHashMap<&DeviceId, usize> = leftover
        .iter()
        .map(|id| (*id, readers_of.get(*id).map_or(0, Vec::len)))
        .collect();
    let mut queue: Vec<&DeviceId> = read_count
        .iter()
        .filter(|(_, c)| **c == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut stripped: AHashSet<&DeviceId> = AHashSet::new();
    while let Some(id) = queue.pop() {
        stripped.insert(id);
        let device = device_by_id[id];
        for dep in &device.dependencies {
            if dep == id {
                continue;
            }
            if let Some(c) = read_count.get_mut(dep) {
                if *c > 0 {
                    *c -= 1;
                    if *c == 0 && !stripped.contains(dep) {
                        queue.push(dep);
                    }
                }
            }
        }
    }

    let mut cyclic: AHashSet<DeviceId> = leftover
        .iter()
        .filter(|id| !stripped.contains(*id))
        .map(|id| (*id).clone())
        .collect();

    // Self-loops, skipped above, are cycles of one
    for device in devices {
        if device.dependencies.contains(&device.id) {
            cyclic.insert(device.id.clone());
        }
    }

    cyclic
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::RoomId;
    use crate::hierarchy::device::{DeviceConfig, DeviceKind, DeviceState};

    fn device(id: &str, deps: &[&str]) -> Device {
        Device {
            id: DeviceId::new(id),
            kind: DeviceKind::MotionSensor,
            room_id: RoomId::new("room-1"),
            config: DeviceConfig::default(),
            schedule: vec![],
            dependencies: deps.iter().map(|d| DeviceId::new(*d)).collect(),
            initial_state: DeviceState::default(),
        }
    }

    fn position(order: &EvaluationOrder, id: &str) -> usize {
        order
            .layers
            .iter()
            .position(|layer| layer.contains(&DeviceId::new(id)))
            .expect("device in some layer")
    }

    #[test]
    fn test_independent_devices_share_first_layer() {
        let devices = vec![device("a", &[]), device("b", &[]), device("c", &[])];
        let order = resolve(&devices);
        assert_eq!(order.layers.len(), 1);
        assert_eq!(order.layers[0].len(), 3);
        assert!(!order.has_cycles());
    }

    #[test]
    fn test_chain_respects_topological_order() {
        let devices = vec![
            device("thermostat", &["occupancy"]),
            device("occupancy", &["motion"]),
            device("motion", &[]),
        ];
        let order = resolve(&devices);
        assert!(position(&order, "motion") < position(&order, "occupancy"));
        assert!(position(&order, "occupancy") < position(&order, "thermostat"));
    }

    #[test]
    fn test_mutual_dependency_is_contained() {
        let devices = vec![
            device("a", &["b"]),
            device("b", &["a"]),
            device("c", &[]),
        ];
        let order = resolve(&devices);
        assert_eq!(order.cyclic, vec![DeviceId::new("a"), DeviceId::new("b")]);
        // The independent device is unaffected
        assert_eq!(order.layers, vec![vec![DeviceId::new("c")]]);
    }

    #[test]
    fn test_dependent_of_cycle_is_still_ordered() {
        let devices = vec![
            device("a", &["b"]),
            device("b", &["a"]),
            device("reader", &["a"]),
        ];
        let order = resolve(&devices);
        assert_eq!(order.cyclic, vec![DeviceId::new("a"), DeviceId::new("b")]);
        // reader is evaluated normally, after the cycle members
        assert_eq!(order.layers, vec![vec![DeviceId::new("reader")]]);
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let devices = vec![device("selfish", &["selfish"]), device("ok", &[])];
        let order = resolve(&devices);
        assert_eq!(order.cyclic, vec![DeviceId::new("selfish")]);
        assert_eq!(order.layers, vec![vec![DeviceId::new("ok")]]);
    }

    #[test]
    fn test_unknown_dependency_ids_are_ignored() {
        let devices = vec![device("a", &["ghost"])];
        let order = resolve(&devices);
        assert_eq!(order.layers, vec![vec![DeviceId::new("a")]]);
        assert!(!order.has_cycles());
    }

    #[test]
    fn test_diamond_layers() {
        let devices = vec![
            device("sink", &["left", "right"]),
            device("left", &["source"]),
            device("right", &["source"]),
            device("source", &[]),
        ];
        let order = resolve(&devices);
        assert_eq!(position(&order, "source"), 0);
        assert_eq!(position(&order, "left"), 1);
        assert_eq!(position(&order, "right"), 1);
        assert_eq!(position(&order, "sink"), 2);
    }
}
