//! Simulation runner: advances the clock and routes events into the ECS.
//!
//! Clock progression and event routing happen here, outside systems. Each step
//! pops the next event from [SimulationClock], inserts it as [CurrentEvent],
//! then runs the schedule. There is no cutoff at the horizon: processes
//! started before it drain until the queue is empty.

use bevy_ecs::prelude::{Res, With};
use bevy_ecs::prelude::{Schedule, World};
use bevy_ecs::schedule::{apply_deferred, IntoSystemConfigs};
use tracing::{info, warn};

use crate::clock::{CurrentEvent, Event, EventKind, SimulationClock};
use crate::error::ScenarioError;
use crate::network::RoadNetwork;
use crate::profiling::EventMetrics;
use crate::scenario::{build_scenario, SimulationConfig};
use crate::systems::{
    charging::charge_complete_system,
    redistribution::{
        distributor_arrived_system, distributor_loaded_system, distributor_unloaded_system,
        redistribution_gate_system, redistribution_round_system,
    },
    spawner::simulation_started_system,
    station_service::{
        battery_retrieval_system, recharge_step_system, slot_granted_system,
        station_arrival_system,
    },
    trip::{move_step_system, trip_ended_system, trip_started_system},
};
use crate::telemetry::{SimSummary, SimTelemetry};
use crate::vehicle::Vehicle;

/// Safety net for `run_simulation`; a day with a few hundred vehicles stays
/// far below it.
pub const DEFAULT_MAX_STEPS: usize = 50_000_000;

/// Run condition: the current event is of `kind`.
pub fn on_event(kind: EventKind) -> impl FnMut(Option<Res<CurrentEvent>>) -> bool + Clone {
    move |event: Option<Res<CurrentEvent>>| event.map(|e| e.0.kind == kind).unwrap_or(false)
}

/// Runs one simulation step: pops the next event, inserts it as [CurrentEvent], then runs the schedule.
/// Returns `false` once the clock is empty.
pub fn run_next_event(world: &mut World, schedule: &mut Schedule) -> bool {
    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));

    if let Some(mut metrics) = world.get_resource_mut::<EventMetrics>() {
        metrics.record_event(event.kind);
    }

    schedule.run(world);
    true
}

/// Runs one simulation step and invokes `hook` after the schedule completes.
pub fn run_next_event_with_hook<F>(world: &mut World, schedule: &mut Schedule, mut hook: F) -> bool
where
    F: FnMut(&World, &Event),
{
    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };
    world.insert_resource(CurrentEvent(event));

    if let Some(mut metrics) = world.get_resource_mut::<EventMetrics>() {
        metrics.record_event(event.kind);
    }

    schedule.run(world);
    hook(world, &event);
    true
}

/// Runs simulation steps until the event queue is empty or `max_steps` is reached.
/// Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, schedule: &mut Schedule, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world, schedule) {
        steps += 1;
    }
    steps
}

/// Runs simulation steps until empty and invokes `hook` after each step.
pub fn run_until_empty_with_hook<F>(
    world: &mut World,
    schedule: &mut Schedule,
    max_steps: usize,
    mut hook: F,
) -> usize
where
    F: FnMut(&World, &Event),
{
    let mut steps = 0;
    while steps < max_steps && run_next_event_with_hook(world, schedule, &mut hook) {
        steps += 1;
    }
    steps
}

/// Builds the simulation schedule: one system per event kind plus
/// [apply_deferred] so spawned vehicles exist before the next step.
pub fn simulation_schedule() -> Schedule {
    let mut schedule = Schedule::default();

    schedule.add_systems((
        simulation_started_system.run_if(on_event(EventKind::SimulationStarted)),
        // vehicle trip
        trip_started_system.run_if(on_event(EventKind::TripStarted)),
        move_step_system.run_if(on_event(EventKind::MoveStep)),
        trip_ended_system.run_if(on_event(EventKind::TripEnded)),
        // station visit
        station_arrival_system.run_if(on_event(EventKind::StationArrival)),
        slot_granted_system.run_if(on_event(EventKind::SlotGranted)),
        battery_retrieval_system.run_if(on_event(EventKind::SwapCompleted)),
        battery_retrieval_system.run_if(on_event(EventKind::BatteryDelivered)),
        recharge_step_system.run_if(on_event(EventKind::RechargeStep)),
        charge_complete_system.run_if(on_event(EventKind::ChargeComplete)),
        apply_deferred,
    ));

    schedule.add_systems((
        redistribution_round_system.run_if(on_event(EventKind::RedistributionRound)),
        redistribution_gate_system.run_if(on_event(EventKind::RedistributionGate)),
        distributor_loaded_system.run_if(on_event(EventKind::DistributorLoaded)),
        distributor_arrived_system.run_if(on_event(EventKind::DistributorArrived)),
        distributor_unloaded_system.run_if(on_event(EventKind::DistributorUnloaded)),
    ));

    schedule
}

/// Schedules the SimulationStarted event at time 0.
/// Call this after building the scenario and before running events.
pub fn initialize_simulation(world: &mut World) {
    let mut clock = world.resource_mut::<SimulationClock>();
    clock.schedule_at(0, EventKind::SimulationStarted, None);
}

/// Summary of a world that has been run; vehicles still alive count as stranded.
pub fn summarize(world: &mut World) -> SimSummary {
    let stranded = world
        .query_filtered::<(), With<Vehicle>>()
        .iter(world)
        .count() as u64;
    let ended_at = world.resource::<SimulationClock>().now();
    SimSummary::from_telemetry(world.resource::<SimTelemetry>(), stranded, ended_at)
}

/// A finished run: summary plus the raw records behind it.
#[derive(Debug)]
pub struct SimulationReport {
    pub summary: SimSummary,
    pub telemetry: SimTelemetry,
    pub steps: usize,
}

/// Builds the scenario, runs it until the event queue drains and reports.
pub fn run_simulation(
    config: &SimulationConfig,
    network: RoadNetwork,
) -> Result<SimulationReport, ScenarioError> {
    let mut world = World::new();
    build_scenario(&mut world, config, network)?;
    initialize_simulation(&mut world);

    let mut schedule = simulation_schedule();
    let steps = run_until_empty(&mut world, &mut schedule, DEFAULT_MAX_STEPS);
    if steps == DEFAULT_MAX_STEPS {
        warn!(steps, "step limit reached before the event queue drained");
    }

    let summary = summarize(&mut world);
    info!(
        steps,
        completed = summary.trips_completed,
        failed_no_path = summary.trips_failed_no_path,
        failed_energy = summary.trips_failed_energy,
        stranded = summary.trips_stranded,
        ended_at_ms = summary.ended_at_ms,
        "simulation finished"
    );
    let telemetry = world
        .remove_resource::<SimTelemetry>()
        .unwrap_or_default();
    Ok(SimulationReport {
        summary,
        telemetry,
        steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::{ResMut, Resource};

    use crate::clock::ONE_HOUR_MS;

    #[derive(Resource, Default)]
    struct Hits(u32);

    fn count_hit(mut hits: ResMut<Hits>) {
        hits.0 += 1;
    }

    #[test]
    fn on_event_matches_only_its_kind() {
        let mut world = World::new();
        world.init_resource::<Hits>();
        let mut schedule = Schedule::default();
        schedule.add_systems(count_hit.run_if(on_event(EventKind::MoveStep)));

        schedule.run(&mut world);
        assert_eq!(world.resource::<Hits>().0, 0);

        for kind in [EventKind::MoveStep, EventKind::TripEnded, EventKind::MoveStep] {
            world.insert_resource(CurrentEvent(Event {
                timestamp: 0,
                kind,
                subject: None,
            }));
            schedule.run(&mut world);
        }
        assert_eq!(world.resource::<Hits>().0, 2);
    }

    #[test]
    fn small_run_drains_and_accounts_for_every_trip() {
        let config = SimulationConfig::default()
            .with_vehicles(6)
            .with_sim_time_ms(2 * ONE_HOUR_MS);
        let network = RoadNetwork::grid(5, 5, 2.0).expect("grid");
        let report = run_simulation(&config, network).expect("run");

        let summary = &report.summary;
        assert!(summary.trips_started >= 6);
        assert_eq!(
            summary.trips_started,
            summary.trips_completed
                + summary.trips_failed_no_path
                + summary.trips_failed_energy
                + summary.trips_stranded
        );
        assert!(summary.ended_at_ms >= 2 * ONE_HOUR_MS);
        assert!(report.steps > 0);
    }
}
