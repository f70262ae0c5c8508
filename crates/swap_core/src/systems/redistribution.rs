//! Battery redistribution rounds (sharing only).
//!
//! Each round every distributor picks the station with the most batteries
//! waiting on the side as pickup and another station with the most free
//! charger capacity as drop-off, drives to the pickup, loads, drives to the
//! drop-off and unloads into the chargers. The next round starts once every
//! agent of the round is done and the round interval has elapsed.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::{debug, info, warn};

use crate::charger::ChargerEffects;
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::network::{travel_time_ms, NodeId, RoadNetwork};
use crate::scenario::{RedistributionConfig, RedistributionCycle, SimulationEndTimeMs};
use crate::station::Station;
use crate::telemetry::SimTelemetry;
use crate::vehicle::{Distributor, DistributorState, Vehicle};

use super::apply_charger_effects;

/// Drive time between two nodes along the shortest path, if any.
fn drive_time_ms(network: &RoadNetwork, from: NodeId, to: NodeId, speed_kmh: f64) -> Option<u64> {
    let path = network.shortest_path(from, to)?;
    let length_km = network.path_length_km(&path)?;
    Some(travel_time_ms(length_km, speed_kmh))
}

fn start_round_when_ready(cycle: &mut RedistributionCycle, clock: &mut SimulationClock) {
    if cycle.ready() {
        cycle.interval_elapsed = false;
        clock.schedule_in(0, EventKind::RedistributionRound, None);
    }
}

fn finish_agent(
    entity: Entity,
    distributor: &mut Distributor,
    cycle: &mut RedistributionCycle,
    clock: &mut SimulationClock,
) {
    distributor.state = DistributorState::Idle;
    distributor.pickup = None;
    distributor.dropoff = None;
    cycle.outstanding = cycle.outstanding.saturating_sub(1);
    debug!(distributor = ?entity, outstanding = cycle.outstanding, "distributor done");
    start_round_when_ready(cycle, clock);
}

/// Pickup: most on-the-side batteries, first station wins ties.
/// Drop-off: any other station with the most free charger capacity.
fn choose_stations(
    network: &RoadNetwork,
    stations: &Query<&Station>,
) -> Option<(Entity, NodeId, Entity)> {
    let mut pickup: Option<(Entity, NodeId, usize)> = None;
    for (node, entity) in network.stations() {
        let Ok(station) = stations.get(entity) else {
            continue;
        };
        let waiting = station.on_the_side_total();
        if pickup.map_or(true, |(_, _, best)| waiting > best) {
            pickup = Some((entity, node, waiting));
        }
    }
    let (pickup, pickup_node, waiting) = pickup?;
    if waiting == 0 {
        return None;
    }

    let mut dropoff: Option<(Entity, usize)> = None;
    for (_, entity) in network.stations() {
        if entity == pickup {
            continue;
        }
        let Ok(station) = stations.get(entity) else {
            continue;
        };
        let free = station.free_charger_capacity();
        if dropoff.map_or(true, |(_, best)| free > best) {
            dropoff = Some((entity, free));
        }
    }
    dropoff.map(|(dropoff, _)| (pickup, pickup_node, dropoff))
}

#[allow(clippy::too_many_arguments)]
pub fn redistribution_round_system(
    mut clock: ResMut<SimulationClock>,
    end: Option<Res<SimulationEndTimeMs>>,
    network: Res<RoadNetwork>,
    config: Res<RedistributionConfig>,
    mut cycle: ResMut<RedistributionCycle>,
    mut telemetry: ResMut<SimTelemetry>,
    mut distributors: Query<(Entity, &mut Distributor)>,
    stations: Query<&Station>,
) {
    let now = clock.now();
    if end.is_some_and(|end| now >= end.0) {
        cycle.active = false;
        info!(rounds = cycle.round, "redistribution stopped at horizon");
        return;
    }

    cycle.round += 1;
    cycle.active = true;
    cycle.interval_elapsed = false;
    cycle.outstanding = 0;
    telemetry.redistribution_rounds += 1;
    clock.schedule_in(config.interval_ms, EventKind::RedistributionGate, None);

    for (entity, mut distributor) in distributors.iter_mut() {
        if distributor.is_busy() {
            continue;
        }
        let Some((pickup, pickup_node, dropoff)) = choose_stations(&network, &stations) else {
            debug!(distributor = ?entity, "nothing to redistribute");
            continue;
        };
        let Some(drive_ms) = drive_time_ms(&network, distributor.position, pickup_node, config.speed_kmh)
        else {
            debug!(distributor = ?entity, ?pickup_node, "pickup unreachable");
            continue;
        };
        distributor.pickup = Some(pickup);
        distributor.dropoff = Some(dropoff);
        distributor.state = DistributorState::Loading;
        cycle.outstanding += 1;
        clock.schedule_in(
            drive_ms.saturating_add(config.load_time_ms),
            EventKind::DistributorLoaded,
            Some(EventSubject::Distributor(entity)),
        );
    }
    debug!(round = cycle.round, agents = cycle.outstanding, "redistribution round started");
}

/// The round interval elapsed.
pub fn redistribution_gate_system(
    mut clock: ResMut<SimulationClock>,
    mut cycle: ResMut<RedistributionCycle>,
) {
    cycle.interval_elapsed = true;
    start_round_when_ready(&mut cycle, &mut clock);
}

/// Loading finished at the pickup: the cargo is the pickup's on-the-side stock.
#[allow(clippy::too_many_arguments)]
pub fn distributor_loaded_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    network: Res<RoadNetwork>,
    config: Res<RedistributionConfig>,
    mut cycle: ResMut<RedistributionCycle>,
    mut telemetry: ResMut<SimTelemetry>,
    mut distributors: Query<&mut Distributor>,
    mut stations: Query<&mut Station>,
    mut vehicles: Query<&mut Vehicle>,
) {
    let Some(entity) = event.0.distributor() else {
        return;
    };
    let Ok(mut distributor) = distributors.get_mut(entity) else {
        return;
    };
    let (Some(pickup), Some(dropoff)) = (distributor.pickup, distributor.dropoff) else {
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };
    let Ok(dropoff_node) = stations.get(dropoff).map(|s| s.node) else {
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };
    let Ok(mut station) = stations.get_mut(pickup) else {
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };

    distributor.position = station.node;
    distributor.cargo = station.take_on_the_side();

    let drive_ms = drive_time_ms(&network, station.node, dropoff_node, config.speed_kmh);
    let Some(drive_ms) = drive_ms.filter(|_| !distributor.cargo.is_empty()) else {
        let now = clock.now();
        let mut effects = ChargerEffects::default();
        for battery in std::mem::take(&mut distributor.cargo) {
            if let Err(battery) = station.put_battery(battery, now, &mut effects) {
                warn!(distributor = ?entity, battery = ?battery.id(), "returned battery has no charger");
            }
        }
        drop(station);
        apply_charger_effects(pickup, effects, &mut clock, &mut vehicles, &mut telemetry);
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };

    distributor.state = DistributorState::Travelling;
    debug!(distributor = ?entity, cargo = distributor.cargo.len(), ?dropoff_node, "distributor loaded");
    clock.schedule_in(
        drive_ms,
        EventKind::DistributorArrived,
        Some(EventSubject::Distributor(entity)),
    );
}

pub fn distributor_arrived_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    config: Res<RedistributionConfig>,
    mut distributors: Query<&mut Distributor>,
    stations: Query<&Station>,
) {
    let Some(entity) = event.0.distributor() else {
        return;
    };
    let Ok(mut distributor) = distributors.get_mut(entity) else {
        return;
    };
    if let Some(node) = distributor
        .dropoff
        .and_then(|dropoff| stations.get(dropoff).ok())
        .map(|station| station.node)
    {
        distributor.position = node;
    }
    distributor.state = DistributorState::Unloading;
    clock.schedule_in(
        config.unload_time_ms,
        EventKind::DistributorUnloaded,
        Some(EventSubject::Distributor(entity)),
    );
}

/// Unloading finished: every battery goes into the drop-off charger of its type.
pub fn distributor_unloaded_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    mut cycle: ResMut<RedistributionCycle>,
    mut telemetry: ResMut<SimTelemetry>,
    mut distributors: Query<&mut Distributor>,
    mut stations: Query<&mut Station>,
    mut vehicles: Query<&mut Vehicle>,
) {
    let Some(entity) = event.0.distributor() else {
        return;
    };
    let Ok(mut distributor) = distributors.get_mut(entity) else {
        return;
    };
    let Some(dropoff) = distributor.dropoff else {
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };
    let Ok(mut station) = stations.get_mut(dropoff) else {
        warn!(distributor = ?entity, station = ?dropoff, "drop-off station missing");
        finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
        return;
    };

    let now = clock.now();
    let mut effects = ChargerEffects::default();
    let mut delivered = 0u64;
    for battery in std::mem::take(&mut distributor.cargo) {
        match station.put_battery(battery, now, &mut effects) {
            Ok(_) => delivered += 1,
            Err(battery) => {
                warn!(distributor = ?entity, battery = ?battery.id(), "drop-off has no charger for battery");
                distributor.cargo.push(battery);
            }
        }
    }
    drop(station);
    telemetry.batteries_redistributed += delivered;
    debug!(distributor = ?entity, delivered, "distributor unloaded");
    apply_charger_effects(dropoff, effects, &mut clock, &mut vehicles, &mut telemetry);
    finish_agent(entity, &mut distributor, &mut cycle, &mut clock);
}
