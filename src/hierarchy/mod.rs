//! Static building hierarchy
//!
//! Building -> Floor -> Room -> Device containment tree, immutable once a
//! run starts. Rooms own device ids; devices carry a room-id back-reference
//! for aggregation queries. Cross-device references are id lookups resolved
//! at evaluation time, never embedded pointers, so the tree stays acyclic
//! and freely shareable for read-only queries.

pub mod device;

use ahash::AHashMap;

use crate::config::BuildingDef;
use crate::core::error::{Result, SimError};
use crate::core::types::{BuildingId, DeviceId, FloorId, RoomId};
use device::Device;

#[derive(Debug, Clone)]
pub struct Building {
    pub id: BuildingId,
    pub name: String,
    pub floors: Vec<FloorId>,
}

#[derive(Debug, Clone)]
pub struct Floor {
    pub id: FloorId,
    pub building_id: BuildingId,
    pub level: i32,
    pub rooms: Vec<RoomId>,
}

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub floor_id: FloorId,
    pub name: String,
    pub devices: Vec<DeviceId>,
}

/// The validated containment tree plus lookup indexes
#[derive(Debug, Clone)]
pub struct Hierarchy {
    buildings: Vec<Building>,
    floors: AHashMap<FloorId, Floor>,
    rooms: AHashMap<RoomId, Room>,
    devices: AHashMap<DeviceId, Device>,
    /// Declaration order, for stable iteration
    device_order: Vec<DeviceId>,
    devices_by_floor: AHashMap<FloorId, Vec<DeviceId>>,
    devices_by_building: AHashMap<BuildingId, Vec<DeviceId>>,
}

impl Hierarchy {
    /// Build and validate the hierarchy from configuration definitions.
    ///
    /// All structural problems are fatal here, before the first tick:
    /// duplicate ids, unknown device types, dangling dependency or
    /// presence-source references, empty trees.
    pub fn build(buildings: &[BuildingDef]) -> Result<Self> {
        if buildings.is_empty() {
            return Err(SimError::Configuration("no buildings defined".into()));
        }

        let mut out = Hierarchy {
            buildings: Vec::new(),
            floors: AHashMap::new(),
            rooms: AHashMap::new(),
            devices: AHashMap::new(),
            device_order: Vec::new(),
            devices_by_floor: AHashMap::new(),
            devices_by_building: AHashMap::new(),
        };

        for b in buildings {
            let building_id = BuildingId::new(&b.id);
            if out.buildings.iter().any(|x| x.id == building_id) {
                return Err(SimError::Configuration(format!(
                    "duplicate building id: {}",
                    b.id
                )));
            }
            let mut floor_ids = Vec::new();
            for f in &b.floors {
                let floor_id = FloorId::new(&f.id);
                if out.floors.contains_key(&floor_id) {
                    return Err(SimError::Configuration(format!(
                        "duplicate floor id: {}",
                        f.id
                    )));
                }
                let mut room_ids = Vec::new();
                for r in &f.rooms {
                    let room_id = RoomId::new(&r.id);
                    if out.rooms.contains_key(&room_id) {
                        return Err(SimError::Configuration(format!(
                            "duplicate room id: {}",
                            r.id
                        )));
                    }
                    let mut dev_ids = Vec::new();
                    for d in &r.devices {
                        let device = d.build(room_id.clone())?;
                        if out.devices.contains_key(&device.id) {
                            return Err(SimError::Configuration(format!(
                                "duplicate device id: {}",
                                device.id
                            )));
                        }
                        dev_ids.push(device.id.clone());
                        out.device_order.push(device.id.clone());
                        out.devices_by_floor
                            .entry(floor_id.clone())
                            .or_default()
                            .push(device.id.clone());
                        out.devices_by_building
                            .entry(building_id.clone())
                            .or_default()
                            .push(device.id.clone());
                        out.devices.insert(device.id.clone(), device);
                    }
                    room_ids.push(room_id.clone());
                    out.rooms.insert(
                        room_id.clone(),
                        Room {
                            id: room_id,
                            floor_id: floor_id.clone(),
                            name: r.name.clone(),
                            devices: dev_ids,
                        },
                    );
                }
                floor_ids.push(floor_id.clone());
                out.floors.insert(
                    floor_id.clone(),
                    Floor {
                        id: floor_id,
                        building_id: building_id.clone(),
                        level: f.level,
                        rooms: room_ids,
                    },
                );
            }
            out.buildings.push(Building {
                id: building_id,
                name: b.name.clone(),
                floors: floor_ids,
            });
        }

        out.validate_references()?;
        Ok(out)
    }

    fn validate_references(&self) -> Result<()> {
        for device in self.devices.values() {
            for dep in &device.dependencies {
                if !self.devices.contains_key(dep) {
                    return Err(SimError::Configuration(format!(
                        "device {} depends on unknown device {}",
                        device.id, dep
                    )));
                }
            }
            if let Some(src) = &device.config.presence_detection_source_device_id {
                if !device.dependencies.contains(src) {
                    return Err(SimError::Configuration(format!(
                        "device {} names presence source {} outside its dependency list",
                        device.id, src
                    )));
                }
            }
            if let (Some(min), Some(max)) = (device.config.min_val, device.config.max_val) {
                if min > max {
                    return Err(SimError::Configuration(format!(
                        "device {} has min_val {} above max_val {}",
                        device.id, min, max
                    )));
                }
            }
            for entry in &device.schedule {
                if let Some(cond) = &entry.condition {
                    use crate::schedule::Condition;
                    if let Condition::DeviceStateTrue { device_id, .. }
                    | Condition::DeviceStateFalse { device_id, .. } = cond
                    {
                        if !self.devices.contains_key(device_id) {
                            return Err(SimError::Configuration(format!(
                                "schedule condition on device {} references unknown device {}",
                                device.id, device_id
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn device(&self, id: &DeviceId) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn contains_device(&self, id: &DeviceId) -> bool {
        self.devices.contains_key(id)
    }

    /// Devices in declaration order
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.device_order.iter().filter_map(|id| self.devices.get(id))
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn floor(&self, id: &FloorId) -> Option<&Floor> {
        self.floors.get(id)
    }

    pub fn buildings(&self) -> &[Building] {
        &self.buildings
    }

    pub fn devices_in_room(&self, id: &RoomId) -> &[DeviceId] {
        self.rooms.get(id).map(|r| r.devices.as_slice()).unwrap_or(&[])
    }

    pub fn devices_in_floor(&self, id: &FloorId) -> &[DeviceId] {
        self.devices_by_floor
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn devices_in_building(&self, id: &BuildingId) -> &[DeviceId] {
        self.devices_by_building
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Building containing the given room, if any
    pub fn building_of_room(&self, room: &RoomId) -> Option<&BuildingId> {
        let floor = &self.rooms.get(room)?.floor_id;
        self.floors.get(floor).map(|f| &f.building_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BuildingDef, DeviceDef, FloorDef, RoomDef};

    fn minimal_building(devices: Vec<DeviceDef>) -> BuildingDef {
        BuildingDef {
            id: "hq".into(),
            name: "Headquarters".into(),
            floors: vec![FloorDef {
                id: "hq-1".into(),
                level: 1,
                rooms: vec![RoomDef {
                    id: "hq-1-lobby".into(),
                    name: "Lobby".into(),
                    devices,
                }],
            }],
        }
    }

    fn device_def(id: &str, kind: &str) -> DeviceDef {
        DeviceDef {
            id: id.into(),
            kind: kind.into(),
            config: Default::default(),
            schedule: vec![],
            dependencies: vec![],
            initial_state: Default::default(),
        }
    }

    #[test]
    fn test_build_and_indexes() {
        let def = minimal_building(vec![
            device_def("temp-1", "temperature_sensor"),
            device_def("light-1", "smart_light"),
        ]);
        let h = Hierarchy::build(&[def]).unwrap();
        assert_eq!(h.device_count(), 2);
        assert_eq!(h.devices_in_room(&RoomId::new("hq-1-lobby")).len(), 2);
        assert_eq!(h.devices_in_floor(&FloorId::new("hq-1")).len(), 2);
        assert_eq!(h.devices_in_building(&BuildingId::new("hq")).len(), 2);
        assert_eq!(
            h.building_of_room(&RoomId::new("hq-1-lobby")),
            Some(&BuildingId::new("hq"))
        );
    }

    #[test]
    fn test_unknown_device_type_is_fatal() {
        let def = minimal_building(vec![device_def("x", "teleporter")]);
        assert!(matches!(
            Hierarchy::build(&[def]),
            Err(SimError::UnknownDeviceType(_))
        ));
    }

    #[test]
    fn test_duplicate_device_id_is_fatal() {
        let def = minimal_building(vec![
            device_def("dup", "temperature_sensor"),
            device_def("dup", "smart_light"),
        ]);
        assert!(matches!(
            Hierarchy::build(&[def]),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_dangling_dependency_is_fatal() {
        let mut dev = device_def("hvac-1", "hvac");
        dev.dependencies = vec![DeviceId::new("ghost")];
        let def = minimal_building(vec![dev]);
        assert!(matches!(
            Hierarchy::build(&[def]),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_presence_source_must_be_declared_dependency() {
        let mut hvac = device_def("hvac-1", "hvac");
        hvac.config.presence_detection_source_device_id = Some(DeviceId::new("occ-1"));
        let def = minimal_building(vec![device_def("occ-1", "occupancy_sensor"), hvac]);
        assert!(matches!(
            Hierarchy::build(&[def]),
            Err(SimError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_config_is_fatal() {
        assert!(matches!(
            Hierarchy::build(&[]),
            Err(SimError::Configuration(_))
        ));
    }
}
