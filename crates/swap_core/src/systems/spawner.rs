//! Trip spawning: the initial fleet at `SimulationStarted` and replacements as
//! trips end.

use bevy_ecs::prelude::{Commands, Entity, Query, Res, ResMut, With};
use tracing::{debug, info};

use crate::battery::BatteryFactory;
use crate::clock::{EventKind, EventSubject, SimulationClock};
use crate::scenario::{Catalog, FleetPolicy, RedistributionCycle, SimRng, TripSampler};
use crate::telemetry::SimTelemetry;
use crate::vehicle::{Distributor, Vehicle};

/// Spawns one vehicle with a full battery set and schedules its first plan.
#[allow(clippy::too_many_arguments)]
pub(crate) fn spawn_trip(
    commands: &mut Commands,
    clock: &mut SimulationClock,
    catalog: &Catalog,
    policy: &FleetPolicy,
    sampler: &TripSampler,
    rng: &mut SimRng,
    factory: &mut BatteryFactory,
    telemetry: &mut SimTelemetry,
) -> Entity {
    let now = clock.now();
    let pick = policy
        .vehicle_selector
        .select(catalog.vehicle_types.len(), &mut rng.0);
    let vehicle_type = &catalog.vehicle_types[pick];
    let origin = sampler.origin(&mut rng.0);
    let destination = sampler.destination(&mut rng.0);
    let batteries = (0..vehicle_type.battery_count)
        .map(|_| factory.full(&vehicle_type.battery_type))
        .collect();

    let entity = commands
        .spawn(Vehicle::new(
            vehicle_type.clone(),
            batteries,
            origin,
            destination,
            now,
        ))
        .id();
    telemetry.trips_started += 1;
    clock.schedule_at(now, EventKind::TripStarted, Some(EventSubject::Vehicle(entity)));
    debug!(vehicle = ?entity, ?origin, ?destination, vehicle_type = vehicle_type.id, "trip spawned");
    entity
}

#[allow(clippy::too_many_arguments)]
pub fn simulation_started_system(
    mut commands: Commands,
    mut clock: ResMut<SimulationClock>,
    catalog: Res<Catalog>,
    policy: Res<FleetPolicy>,
    sampler: Res<TripSampler>,
    mut rng: ResMut<SimRng>,
    mut factory: ResMut<BatteryFactory>,
    mut telemetry: ResMut<SimTelemetry>,
    mut cycle: ResMut<RedistributionCycle>,
    distributors: Query<(), With<Distributor>>,
) {
    for _ in 0..policy.n_vehicles {
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

    let redistribution = policy.sharing && !distributors.is_empty();
    if redistribution {
        cycle.active = true;
        let now = clock.now();
        clock.schedule_at(now, EventKind::RedistributionRound, None);
    }
    info!(
        vehicles = policy.n_vehicles,
        sharing = policy.sharing,
        redistribution,
        "simulation started"
    );
}
