//! Test helpers for common test setup and utilities.
//!
//! This module provides shared test utilities to reduce duplication across test files.

use std::sync::Arc;

use bevy_ecs::prelude::{Entity, World};

use crate::battery::{BatteryFactory, BatteryType};
use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::network::{NodeId, RoadNetwork};
use crate::scenario::{build_scenario, Catalog, SimulationConfig, VehicleTypeSpec};
use crate::selection::SelectionStrategy;
use crate::station::StationType;
use crate::vehicle::{Vehicle, VehicleType};

/// Capacity of the single battery type used by [`single_battery_config`].
pub const TEST_BATTERY_KWH: f64 = 10.0;

/// Battery type 0 of [`TEST_BATTERY_KWH`].
pub fn test_battery_type() -> Arc<BatteryType> {
    Arc::new(BatteryType::new(0, TEST_BATTERY_KWH))
}

/// Flat-ground vehicle type on the test battery type.
pub fn test_vehicle_type(battery_count: usize, consumption_rate: f64) -> Arc<VehicleType> {
    Arc::new(VehicleType {
        id: 0,
        battery_type: test_battery_type(),
        battery_count,
        consumption_rate,
        positive_slope_rate: 0.0,
        negative_slope_rate: 0.0,
    })
}

/// One battery type, one vehicle type with two batteries, one station type
/// (id 0) with `slots` swap slots and a charger for `charger_capacity`
/// batteries. Stations start empty, deterministic selection.
pub fn single_battery_config(slots: usize, power_kw: f64, charger_capacity: usize) -> SimulationConfig {
    SimulationConfig {
        battery_types: vec![BatteryType::new(0, TEST_BATTERY_KWH)],
        vehicle_types: vec![VehicleTypeSpec {
            id: 0,
            battery_type: 0,
            battery_count: 2,
            consumption_rate: 0.5,
            positive_slope_rate: 0.0,
            negative_slope_rate: 0.0,
        }],
        station_types: vec![StationType {
            id: 0,
            capacity: slots,
            power_kw,
            charger_capacities: vec![charger_capacity],
        }],
        vehicle_selector: SelectionStrategy::Uniform,
        station_selector: SelectionStrategy::Uniform,
        initial_stock_fraction: 0.0,
        ..SimulationConfig::default()
    }
}

/// Straight line of `count` nodes 1 km apart with a type-0 station
/// preassigned on each of `stations`.
///
/// # Panics
///
/// Panics if a station node is out of range.
pub fn line_with_stations(count: u32, stations: &[u32]) -> RoadNetwork {
    let mut network = RoadNetwork::line(count, 1.0).expect("line network");
    for node in stations {
        network
            .preassign_station(NodeId(*node), 0)
            .expect("station node on the line");
    }
    network
}

/// World with every simulation resource for `config` on `network`.
///
/// # Panics
///
/// Panics if the scenario does not build.
pub fn create_test_world(config: &SimulationConfig, network: RoadNetwork) -> World {
    let mut world = World::new();
    build_scenario(&mut world, config, network).expect("test scenario builds");
    world
}

/// Spawns a vehicle of the first catalog type at `position` heading to
/// `destination`, every battery at `level_kwh`, and schedules `kind` for it
/// at `at`.
pub fn spawn_vehicle_with_event(
    world: &mut World,
    position: NodeId,
    destination: NodeId,
    level_kwh: f64,
    kind: EventKind,
    at: u64,
) -> Entity {
    let vehicle_type = world.resource::<Catalog>().vehicle_types[0].clone();
    let batteries = {
        let mut factory = world.resource_mut::<BatteryFactory>();
        (0..vehicle_type.battery_count)
            .map(|_| factory.with_level(&vehicle_type.battery_type, level_kwh))
            .collect()
    };
    let entity = world
        .spawn(Vehicle::new(vehicle_type, batteries, position, destination, at))
        .id();
    world
        .resource_mut::<SimulationClock>()
        .schedule_at(at, kind, Some(EventSubject::Vehicle(entity)));
    entity
}
