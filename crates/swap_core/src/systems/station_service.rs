//! Station visit protocol: queue for a slot, swap (sharing) or recharge in
//! place (no sharing), release the slot and resume the trip.

use bevy_ecs::prelude::{Entity, Query, Res, ResMut};
use tracing::{debug, warn};

use crate::battery::{charge_time_ms, Battery};
use crate::charger::{ChargerEffects, GetOutcome};
use crate::clock::{CurrentEvent, EventKind, EventSubject, SimulationClock};
use crate::network::RoadNetwork;
use crate::scenario::FleetPolicy;
use crate::station::{SlotGrant, Station};
use crate::telemetry::{SimTelemetry, StationWaitRecord};
use crate::vehicle::{ServiceProgress, Vehicle, VehicleState};

use super::apply_charger_effects;

fn record_grant(
    clock: &mut SimulationClock,
    telemetry: &mut SimTelemetry,
    station_entity: Entity,
    station: &Station,
    grant: SlotGrant,
) {
    telemetry.station_waits.push(StationWaitRecord {
        station: station_entity,
        node: station.node,
        vehicle: grant.requester,
        requested_at: grant.requested_at,
        granted_at: grant.granted_at,
    });
    clock.schedule_in(
        0,
        EventKind::SlotGranted,
        Some(EventSubject::Vehicle(grant.requester)),
    );
}

/// Releases the slot (waking the next vehicle in line) and sends the vehicle
/// back to planning.
fn finish_service(
    clock: &mut SimulationClock,
    telemetry: &mut SimTelemetry,
    station_entity: Entity,
    station: &mut Station,
    vehicle_entity: Entity,
    vehicle: &mut Vehicle,
) {
    let now = clock.now();
    if let Some(grant) = station.slots.release(now) {
        record_grant(clock, telemetry, station_entity, station, grant);
    }
    vehicle.service = None;
    vehicle.station_stops += 1;
    vehicle.state = VehicleState::Planning;
    debug!(
        vehicle = ?vehicle_entity,
        station = ?station_entity,
        level_kwh = vehicle.level(),
        "station service finished"
    );
    clock.schedule_in(
        0,
        EventKind::TripStarted,
        Some(EventSubject::Vehicle(vehicle_entity)),
    );
}

fn schedule_recharge_step(
    clock: &mut SimulationClock,
    vehicle_entity: Entity,
    vehicle: &Vehicle,
    cursor: usize,
    power_kw: f64,
) -> bool {
    let Some(battery) = vehicle.batteries.get(cursor) else {
        return false;
    };
    clock.schedule_in(
        charge_time_ms(battery.level(), battery.capacity(), power_kw),
        EventKind::RechargeStep,
        Some(EventSubject::Vehicle(vehicle_entity)),
    );
    true
}

/// Vehicle reached the station node at the end of its path and asks for a slot.
pub fn station_arrival_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    network: Res<RoadNetwork>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<&mut Vehicle>,
    mut stations: Query<&mut Station>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(station_entity) = network.station_at(vehicle.position) else {
        warn!(vehicle = ?entity, node = ?vehicle.position, "arrived at a node without station, replanning");
        vehicle.state = VehicleState::Planning;
        clock.schedule_in(0, EventKind::TripStarted, Some(EventSubject::Vehicle(entity)));
        return;
    };
    let Ok(mut station) = stations.get_mut(station_entity) else {
        warn!(vehicle = ?entity, station = ?station_entity, "station entity missing, replanning");
        vehicle.state = VehicleState::Planning;
        clock.schedule_in(0, EventKind::TripStarted, Some(EventSubject::Vehicle(entity)));
        return;
    };

    let lowest_soc = vehicle
        .batteries
        .iter()
        .map(Battery::state_of_charge)
        .fold(1.0, f64::min);
    debug!(vehicle = ?entity, station = ?station_entity, lowest_soc, "vehicle arrived at station");
    vehicle.service = Some(ServiceProgress {
        station: station_entity,
        pending_gets: 0,
        recharge_cursor: 0,
    });
    vehicle.state = VehicleState::WaitingForSlot;

    let now = clock.now();
    match station.slots.request(entity, now) {
        Some(grant) => record_grant(&mut clock, &mut telemetry, station_entity, &station, grant),
        None => debug!(
            vehicle = ?entity,
            station = ?station_entity,
            waiting = station.slots.waiting(),
            "vehicle queued for a station slot"
        ),
    }
}

/// Slot acquired. With sharing every held battery is dropped into the
/// chargers and the swap timer starts; otherwise the held batteries are
/// recharged in place one after the other.
pub fn slot_granted_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    policy: Res<FleetPolicy>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<&mut Vehicle>,
    mut stations: Query<&mut Station>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(station_entity) = vehicle.service.as_ref().map(|s| s.station) else {
        return;
    };
    let Ok(mut station) = stations.get_mut(station_entity) else {
        return;
    };
    vehicle.state = VehicleState::Servicing;
    let now = clock.now();

    if !policy.sharing {
        if !schedule_recharge_step(&mut clock, entity, &vehicle, 0, station.power_kw) {
            finish_service(
                &mut clock,
                &mut telemetry,
                station_entity,
                &mut station,
                entity,
                &mut vehicle,
            );
        }
        return;
    }

    let held = std::mem::take(&mut vehicle.batteries);
    let mut effects = ChargerEffects::default();
    for battery in held {
        if let Err(battery) = station.put_battery(battery, now, &mut effects) {
            warn!(vehicle = ?entity, battery = ?battery.id(), "station has no charger for battery type");
            vehicle.batteries.push(battery);
        }
    }
    let wanted = vehicle
        .vehicle_type
        .battery_count
        .saturating_sub(vehicle.batteries.len());
    if let Some(service) = vehicle.service.as_mut() {
        service.pending_gets = wanted;
    }
    clock.schedule_in(
        policy.swap_time_ms,
        EventKind::SwapCompleted,
        Some(EventSubject::Vehicle(entity)),
    );
    drop(vehicle);
    apply_charger_effects(station_entity, effects, &mut clock, &mut vehicles, &mut telemetry);
}

/// Drives the battery retrieval loop: one `get` at a time until the vehicle
/// holds its full battery count. Handles both `SwapCompleted` (first get) and
/// `BatteryDelivered` (one more battery received).
pub fn battery_retrieval_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    policy: Res<FleetPolicy>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<&mut Vehicle>,
    mut stations: Query<&mut Station>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(service) = vehicle.service.as_mut() else {
        return;
    };
    if event.0.kind == EventKind::BatteryDelivered {
        service.pending_gets = service.pending_gets.saturating_sub(1);
    }
    let station_entity = service.station;
    let pending = service.pending_gets;
    let Ok(mut station) = stations.get_mut(station_entity) else {
        return;
    };

    if pending == 0 {
        finish_service(
            &mut clock,
            &mut telemetry,
            station_entity,
            &mut station,
            entity,
            &mut vehicle,
        );
        return;
    }

    let battery_type = vehicle.vehicle_type.battery_type.id;
    let Some(charger) = station.charger_mut(battery_type) else {
        warn!(vehicle = ?entity, ?battery_type, "station has no charger for the vehicle's battery type");
        finish_service(
            &mut clock,
            &mut telemetry,
            station_entity,
            &mut station,
            entity,
            &mut vehicle,
        );
        return;
    };
    let now = clock.now();
    let mut effects = ChargerEffects::default();
    let outcome = charger.get(entity, policy.wait_for_full_charge, now, &mut effects);
    match outcome {
        GetOutcome::Delivered => {}
        GetOutcome::Reserved(battery) => debug!(
            vehicle = ?entity,
            ?battery,
            level_kwh = ?charger.level_at(battery, now),
            pending,
            "waiting for a reserved battery to charge"
        ),
        GetOutcome::Queued => debug!(
            vehicle = ?entity,
            queued = charger.pending_requests(),
            pending,
            "waiting for a battery"
        ),
    }
    drop(vehicle);
    apply_charger_effects(station_entity, effects, &mut clock, &mut vehicles, &mut telemetry);
}

/// In-place recharge of one held battery finished (no sharing).
pub fn recharge_step_system(
    mut clock: ResMut<SimulationClock>,
    event: Res<CurrentEvent>,
    mut telemetry: ResMut<SimTelemetry>,
    mut vehicles: Query<&mut Vehicle>,
    mut stations: Query<&mut Station>,
) {
    let Some(entity) = event.0.vehicle() else {
        return;
    };
    let Ok(mut vehicle) = vehicles.get_mut(entity) else {
        return;
    };
    let Some(service) = vehicle.service.as_mut() else {
        return;
    };
    let station_entity = service.station;
    let cursor = service.recharge_cursor;
    service.recharge_cursor += 1;
    let Ok(mut station) = stations.get_mut(station_entity) else {
        return;
    };

    if let Some(battery) = vehicle.batteries.get_mut(cursor) {
        battery.fill();
    }
    if !schedule_recharge_step(&mut clock, entity, &vehicle, cursor + 1, station.power_kw) {
        finish_service(
            &mut clock,
            &mut telemetry,
            station_entity,
            &mut station,
            entity,
            &mut vehicle,
        );
    }
}
