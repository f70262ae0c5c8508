//! Vehicle trip process: plan, drive edge by edge, hand over to the station
//! protocol at a station terminal, end and get replaced.

use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut};
use tracing::{debug, warn};

use crate::battery::BatteryFactory;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::error::PathError;
use crate::network::{travel_time_ms, RoadNetwork};
use crate::routing::define_path_with;
use crate::scenario::{Catalog, FleetPolicy, SimRng, SimulationEndTimeMs, TripSampler};
use crate::telemetry::{SimTelemetry, TripOutcome, TripRecord};
use crate::vehicle::{Vehicle, VehicleState};

use super::spawner::spawn_trip;

fn end_trip(clock: &mut SimulationClock, vehicle: &mut Vehicle, entity: Entity, outcome: TripOutcome) {
    vehicle.outcome = Some(outcome);
    vehicle.state = VehicleState::Finished;
    vehicle.route.clear();
    clock.schedule_in(0, EventKind::TripEnded, Some(EventSubject::Vehicle(entity)));
}

/// Schedules the `MoveStep` for the next hop of the route.
fn schedule_next_hop(
    clock: &mut SimulationClock,
    network: &RoadNetwork,
    vehicle: &Vehicle,
    entity: Entity,
    speed_kmh: f64,
) -> bool {
    let Some(next) = vehicle.route.front() else {
        return false;
    };
    let Some(edge) = network.edge(vehicle.position, *next) else {
        return false;
    };
    clock.schedule_in(
        travel_time_ms(edge.length_km, speed_kmh),
        EventKind::MoveStep,
        Some(EventSubject::Vehicle(entity)),
    );
    true
}

/// Plans from the current node. Runs at trip start and after every station stop.
pub fn trip_started_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    network: Res<RoadNetwork>,
    policy: Res<FleetPolicy>,
    mut vehicles: Query<&mut Vehicle>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };

    if vehicle.position == vehicle.destination {
        end_trip(&mut clock, &mut vehicle, entity, TripOutcome::Completed);
        return;
    }

    let plan = define_path_with(
        &network,
        vehicle.position,
        vehicle.destination,
        &*vehicle,
        &policy.planner,
    );
    let path = match plan {
        Ok(path) => path,
        Err(err) => {
            debug!(vehicle = ?entity, %err, "trip abandoned");
            let outcome = match err {
                PathError::NoPath { .. } => TripOutcome::FailedNoPath,
                PathError::EnergyConstrained { .. } => TripOutcome::FailedEnergy,
            };
            end_trip(&mut clock, &mut vehicle, entity, outcome);
            return;
        }
    };

    let terminal = path.last().copied().unwrap_or(vehicle.position);
    if terminal != vehicle.destination && vehicle.station_stops >= policy.max_station_stops {
        debug!(vehicle = ?entity, stops = vehicle.station_stops, "station stop limit reached");
        end_trip(&mut clock, &mut vehicle, entity, TripOutcome::FailedEnergy);
        return;
    }

    vehicle.route = path.into_iter().skip(1).collect();
    vehicle.state = VehicleState::Driving;
    debug!(vehicle = ?entity, ?terminal, hops = vehicle.route.len(), "path planned");
    if !schedule_next_hop(&mut clock, &network, &vehicle, entity, policy.vehicle_speed_kmh) {
        end_trip(&mut clock, &mut vehicle, entity, TripOutcome::FailedNoPath);
    }
}

/// Arrival at the next node: pays the edge's energy and moves on.
pub fn move_step_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    network: Res<RoadNetwork>,
    policy: Res<FleetPolicy>,
    mut vehicles: Query<&mut Vehicle>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };
    if vehicle.state != VehicleState::Driving {
        return;
    }
    let Some(next) = vehicle.route.pop_front() else {
        return;
    };
    let Some(edge) = network.edge(vehicle.position, next).copied() else {
        warn!(vehicle = ?entity, from = ?vehicle.position, to = ?next, "route follows a missing edge");
        end_trip(&mut clock, &mut vehicle, entity, TripOutcome::FailedNoPath);
        return;
    };

    let energy = vehicle.vehicle_type.consumption(&edge);
    vehicle.consume(energy);
    vehicle.distance_km += edge.length_km;
    vehicle.position = next;

    if !vehicle.route.is_empty() {
        schedule_next_hop(&mut clock, &network, &vehicle, entity, policy.vehicle_speed_kmh);
        return;
    }
    if vehicle.position == vehicle.destination {
        end_trip(&mut clock, &mut vehicle, entity, TripOutcome::Completed);
        return;
    }
    clock.schedule_in(
        0,
        EventKind::StationArrival,
        Some(EventSubject::Vehicle(entity)),
    );
}

/// Records the finished trip, removes the vehicle and spawns a replacement
/// while the horizon has not been reached.
#[allow(clippy::too_many_arguments)]
pub fn trip_ended_system(
    mut commands: Commands,
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    end: Option<Res<SimulationEndTimeMs>>,
    catalog: Res<Catalog>,
    policy: Res<FleetPolicy>,
    sampler: Res<TripSampler>,
    mut rng: ResMut<SimRng>,
    mut factory: ResMut<BatteryFactory>,
    mut telemetry: ResMut<SimTelemetry>,
    vehicles: Query<&Vehicle>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(vehicle) = vehicles.get(entity) else {
        return;
    };
    let now = clock.now();
    let outcome = vehicle.outcome.unwrap_or(TripOutcome::FailedNoPath);
    telemetry.trips.push(TripRecord {
        vehicle: entity,
        vehicle_type: vehicle.vehicle_type.id,
        origin: vehicle.origin,
        destination: vehicle.destination,
        position: vehicle.position,
        started_at: vehicle.started_at,
        ended_at: now,
        distance_km: vehicle.distance_km,
        station_stops: vehicle.station_stops,
        outcome,
    });
    debug!(vehicle = ?entity, ?outcome, distance_km = vehicle.distance_km, "trip ended");
    commands.entity(entity).despawn();

    let admit = end.map_or(true, |end| now < end.0);
    if admit {
        spawn_trip(
            &mut commands,
            &mut clock,
            &catalog,
            &policy,
            &sampler,
            &mut rng,
            &mut factory,
            &mut telemetry,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use bevy_ecs::prelude::{IntoSystemConfigs, Schedule, World};

    use crate::battery::{BatteryFactory, BatteryType};
    use crate::clock::Event;
    use crate::network::NodeId;
    use crate::routing::PlannerOptions;
    use crate::runner::on_event;
    use crate::selection::SelectionStrategy;
    use crate::vehicle::VehicleType;

    fn policy() -> FleetPolicy {
        FleetPolicy {
            n_vehicles: 1,
            vehicle_speed_kmh: 60.0,
            vehicle_selector: SelectionStrategy::Uniform,
            swap_time_ms: 0,
            sharing: true,
            wait_for_full_charge: false,
            max_station_stops: 2,
            planner: PlannerOptions::default(),
        }
    }

    fn world_with_vehicle(level: f64, destination: NodeId) -> (World, Entity) {
        let mut world = World::new();
        world.insert_resource(SimulationClock::default());
        world.insert_resource(RoadNetwork::line(4, 1.0).expect("line"));
        world.insert_resource(policy());
        let vehicle_type = Arc::new(VehicleType {
            id: 0,
            battery_type: Arc::new(BatteryType::new(0, 10.0)),
            battery_count: 1,
            consumption_rate: 1.0,
            positive_slope_rate: 0.0,
            negative_slope_rate: 0.0,
        });
        let battery = BatteryFactory::default().with_level(&vehicle_type.battery_type, level);
        let entity = world
            .spawn(Vehicle::new(vehicle_type, vec![battery], NodeId(0), destination, 0))
            .id();
        (world, entity)
    }

    fn step(world: &mut World, schedule: &mut Schedule) -> Option<Event> {
        let event = world.resource_mut::<SimulationClock>().pop_next()?;
        world.insert_resource(CurrentEvent(event));
        schedule.run(world);
        Some(event)
    }

    fn trip_schedule() -> Schedule {
        let mut schedule = Schedule::default();
        schedule.add_systems((
            trip_started_system.run_if(on_event(EventKind::TripStarted)),
            move_step_system.run_if(on_event(EventKind::MoveStep)),
        ));
        schedule
    }

    #[test]
    fn vehicle_drives_to_destination_paying_energy() {
        let (mut world, entity) = world_with_vehicle(10.0, NodeId(3));
        world.resource_mut::<SimulationClock>().schedule_at(
            0,
            EventKind::TripStarted,
            Some(EventSubject::Vehicle(entity)),
        );
        let mut schedule = trip_schedule();
        let mut last = None;
        while let Some(event) = step(&mut world, &mut schedule) {
            last = Some(event);
            if event.kind == EventKind::TripEnded {
                break;
            }
        }

        let last = last.expect("events");
        assert_eq!(last.kind, EventKind::TripEnded);
        // 3 km at 60 km/h
        assert_eq!(last.timestamp, 3 * 60_000);
        let vehicle = world.get::<Vehicle>(entity).expect("vehicle");
        assert_eq!(vehicle.position, NodeId(3));
        assert_eq!(vehicle.outcome, Some(TripOutcome::Completed));
        assert!((vehicle.level() - 7.0).abs() < 1e-9);
        assert!((vehicle.distance_km - 3.0).abs() < 1e-9);
    }

    #[test]
    fn unreachable_destination_without_stations_fails_on_energy() {
        let (mut world, entity) = world_with_vehicle(1.5, NodeId(3));
        world.resource_mut::<SimulationClock>().schedule_at(
            0,
            EventKind::TripStarted,
            Some(EventSubject::Vehicle(entity)),
        );
        let mut schedule = trip_schedule();
        let event = step(&mut world, &mut schedule).expect("trip started");
        assert_eq!(event.kind, EventKind::TripStarted);

        let next = world
            .resource_mut::<SimulationClock>()
            .pop_next()
            .expect("trip ended");
        assert_eq!(next.kind, EventKind::TripEnded);
        let vehicle = world.get::<Vehicle>(entity).expect("vehicle");
        assert_eq!(vehicle.outcome, Some(TripOutcome::FailedEnergy));
    }

    #[test]
    fn station_terminal_hands_over_to_station_arrival() {
        let (mut world, entity) = world_with_vehicle(2.5, NodeId(3));
        world
            .resource_mut::<RoadNetwork>()
            .attach_station(NodeId(2), Entity::from_raw(99))
            .expect("station");
        world.resource_mut::<SimulationClock>().schedule_at(
            0,
            EventKind::TripStarted,
            Some(EventSubject::Vehicle(entity)),
        );
        let mut schedule = trip_schedule();
        let mut kinds = Vec::new();
        while let Some(event) = step(&mut world, &mut schedule) {
            kinds.push(event.kind);
            if event.kind == EventKind::StationArrival {
                break;
            }
        }
        assert_eq!(
            kinds,
            vec![
                EventKind::TripStarted,
                EventKind::MoveStep,
                EventKind::MoveStep,
                EventKind::StationArrival
            ]
        );
        let vehicle = world.get::<Vehicle>(entity).expect("vehicle");
        assert_eq!(vehicle.position, NodeId(2));
        assert!((vehicle.level() - 0.5).abs() < 1e-9);
    }
}
