use bevy_ecs::prelude::World;
use rand::rngs::StdRng;
use rand::seq::index::sample;
use tracing::{info, warn};

use crate::battery::BatteryFactory;
use crate::charger::ChargerEffects;
use crate::clock::SimulationClock;
use crate::error::{ConfigError, ScenarioError};
use crate::network::{NodeId, RoadNetwork};
use crate::profiling::EventMetrics;
use crate::scenario::params::{
    Catalog, FleetPolicy, RedistributionCycle, SimRng, SimulationConfig, SimulationEndTimeMs,
    TripSampler,
};
use crate::station::{Station, StationType};
use crate::telemetry::SimTelemetry;
use crate::vehicle::Distributor;

/// Chooses station nodes and types, ordered by node.
///
/// Types preassigned by the network win; otherwise `station_share` of the
/// nodes are drawn at random and typed with the station selector.
pub fn place_stations(
    network: &RoadNetwork,
    catalog: &Catalog,
    config: &SimulationConfig,
    rng: &mut StdRng,
) -> Result<Vec<(NodeId, u32)>, ConfigError> {
    let preassigned: Vec<(NodeId, u32)> = network
        .nodes()
        .iter()
        .filter_map(|node| node.station_type.map(|t| (node.id, t)))
        .collect();
    if !preassigned.is_empty() {
        for (node, station_type) in &preassigned {
            if catalog.station_type(*station_type).is_none() {
                return Err(ConfigError::UnknownStationType {
                    node: node.0,
                    station_type: *station_type,
                });
            }
        }
        return Ok(preassigned);
    }

    let node_count = network.node_count();
    let count = ((node_count as f64 * config.station_share).round() as usize).min(node_count);
    let mut indices = sample(rng, node_count, count).into_vec();
    indices.sort_unstable();
    Ok(indices
        .into_iter()
        .map(|index| {
            let pick = config
                .station_selector
                .select(catalog.station_types.len(), rng);
            (NodeId(index as u32), catalog.station_types[pick].id)
        })
        .collect())
}

fn stock_station(
    station: &mut Station,
    station_type: &StationType,
    catalog: &Catalog,
    fraction: f64,
    factory: &mut BatteryFactory,
) {
    let mut effects = ChargerEffects::default();
    for (battery_type, capacity) in catalog
        .battery_types
        .iter()
        .zip(station_type.charger_capacities.iter())
    {
        let count = (*capacity as f64 * fraction).floor() as usize;
        for _ in 0..count {
            if let Err(battery) = station.put_battery(factory.full(battery_type), 0, &mut effects) {
                warn!(battery = ?battery.id(), "station has no charger for stock battery");
            }
        }
    }
    debug_assert!(effects.is_empty(), "stock batteries are full");
}

/// Validates `config`, spawns stations and distributors, and inserts every
/// resource the simulation schedule needs.
pub fn build_scenario(
    world: &mut World,
    config: &SimulationConfig,
    mut network: RoadNetwork,
) -> Result<(), ScenarioError> {
    config.validate()?;
    if network.node_count() == 0 {
        return Err(ScenarioError::EmptyNetwork);
    }
    let catalog = Catalog::from_config(config)?;
    let mut rng = SimRng::seeded(config.seed);
    let mut factory = BatteryFactory::default();

    let placements = place_stations(&network, &catalog, config, &mut rng.0)?;
    for (node, type_id) in &placements {
        let Some(station_type) = catalog.station_type(*type_id) else {
            continue;
        };
        let mut station = Station::new(*node, station_type, &catalog.battery_types);
        stock_station(
            &mut station,
            station_type,
            &catalog,
            config.initial_stock_fraction,
            &mut factory,
        );
        let entity = world.spawn(station).id();
        network.attach_station(*node, entity)?;
    }

    let mut distributors = 0;
    if config.sharing {
        let depot = placements.first().map(|(node, _)| *node).unwrap_or(NodeId(0));
        for _ in 0..config.redistribution.fleet_size {
            world.spawn(Distributor::new(depot));
            distributors += 1;
        }
    }

    info!(
        nodes = network.node_count(),
        edges = network.edge_count(),
        stations = placements.len(),
        distributors,
        batteries = factory.issued(),
        sharing = config.sharing,
        "scenario built"
    );

    world.insert_resource(SimulationClock::default());
    world.insert_resource(SimTelemetry::default());
    world.insert_resource(EventMetrics::default());
    world.insert_resource(TripSampler::from_network(&network));
    world.insert_resource(network);
    world.insert_resource(catalog);
    world.insert_resource(FleetPolicy::from(config));
    world.insert_resource(config.redistribution);
    world.insert_resource(RedistributionCycle::default());
    world.insert_resource(rng);
    world.insert_resource(factory);
    world.insert_resource(SimulationEndTimeMs(config.sim_time_ms));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stations_follow_share_and_are_stocked() {
        let mut world = World::new();
        let config = SimulationConfig::default()
            .with_station_share(0.25)
            .with_initial_stock_fraction(0.5);
        let network = RoadNetwork::grid(4, 4, 1.0).expect("grid");
        build_scenario(&mut world, &config, network).expect("scenario");

        let network = world.resource::<RoadNetwork>();
        let stations: Vec<_> = network.stations().collect();
        assert_eq!(stations.len(), 4);
        assert!(stations.windows(2).all(|w| w[0].0 < w[1].0));

        let (_, entity) = stations[0];
        let station = world.get::<Station>(entity).expect("station");
        let expected: usize = config
            .station_types
            .iter()
            .find(|s| s.id == station.station_type)
            .map(|s| s.charger_capacities.iter().map(|c| c / 2).sum())
            .expect("type");
        assert_eq!(station.battery_count(), expected);
        assert!(station.chargers().all(|c| c.in_charge() == 0));

        let mut query = world.query::<&Distributor>();
        assert_eq!(query.iter(&world).count(), config.redistribution.fleet_size);
    }

    #[test]
    fn preassigned_station_types_are_used() {
        let mut world = World::new();
        let mut network = RoadNetwork::line(5, 1.0).expect("line");
        network.preassign_station(NodeId(3), 2).expect("node");
        let config = SimulationConfig::default().with_sharing(false);
        build_scenario(&mut world, &config, network).expect("scenario");

        let network = world.resource::<RoadNetwork>();
        let stations: Vec<_> = network.stations().collect();
        assert_eq!(stations.len(), 1);
        assert_eq!(stations[0].0, NodeId(3));
        let station = world.get::<Station>(stations[0].1).expect("station");
        assert_eq!(station.slots.capacity(), 6);

        let mut query = world.query::<&Distributor>();
        assert_eq!(query.iter(&world).count(), 0);
    }

    #[test]
    fn unknown_preassigned_type_fails_fast() {
        let mut world = World::new();
        let mut network = RoadNetwork::line(2, 1.0).expect("line");
        network.preassign_station(NodeId(1), 42).expect("node");
        let result = build_scenario(&mut world, &SimulationConfig::default(), network);
        assert!(matches!(
            result,
            Err(ScenarioError::Config(ConfigError::UnknownStationType { station_type: 42, .. }))
        ));
    }
}
