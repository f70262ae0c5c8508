mod support;

use bevy_ecs::prelude::World;
use swap_core::error::{ConfigError, ScenarioError};
use swap_core::network::RoadNetwork;
use swap_core::runner::run_simulation;
use swap_core::scenario::{build_scenario, RedistributionConfig, SimulationConfig};
use swap_core::selection::SelectionStrategy;
use swap_core::station::Station;
use support::world::TestWorldBuilder;

#[test]
fn config_survives_a_json_file_round_trip() {
    let mut config = SimulationConfig::default()
        .with_seed(99)
        .with_wait_for_full_charge(true)
        .with_max_detour_hops(Some(6))
        .with_redistribution(RedistributionConfig {
            fleet_size: 3,
            ..RedistributionConfig::default()
        });
    config.station_selector = SelectionStrategy::BiasedGeometric { beta: 0.25 };

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.json");
    config.write_json(&path).expect("write");
    let loaded = SimulationConfig::read_json(&path).expect("read");
    assert_eq!(loaded, config);
}

#[test]
fn inconsistent_catalog_fails_before_the_run() {
    let mut config = SimulationConfig::default();
    config.station_types[1].charger_capacities.pop();
    let result = run_simulation(&config, RoadNetwork::grid(3, 3, 1.0).expect("grid"));
    assert!(matches!(
        result,
        Err(ScenarioError::Config(ConfigError::BatteryTypeCountMismatch { station_type: 1, .. }))
    ));
}

#[test]
fn charger_without_room_for_a_swap_fails_before_the_run() {
    let builder = TestWorldBuilder::new().with_slots(1).with_charger(0, 10.0);
    let mut world = World::new();
    let result = build_scenario(&mut world, &builder.simulation_config(), builder.network());
    assert!(matches!(
        result,
        Err(ScenarioError::Config(ConfigError::NonPositive { field: "charger capacity", .. }))
    ));

    let builder = TestWorldBuilder::new().with_charger(1, 10.0);
    let result = build_scenario(&mut World::new(), &builder.simulation_config(), builder.network());
    assert!(matches!(
        result,
        Err(ScenarioError::Config(ConfigError::ChargerTooSmall {
            capacity: 1,
            required: 2,
            ..
        }))
    ));
}

#[test]
fn empty_network_is_rejected() {
    let mut world = World::new();
    let result = build_scenario(&mut world, &SimulationConfig::default(), RoadNetwork::new());
    assert!(matches!(result, Err(ScenarioError::EmptyNetwork)));
}

#[test]
fn builder_stocks_stations_from_the_configured_fraction() {
    let mut world = TestWorldBuilder::new()
        .with_charger(6, 20.0)
        .with_initial_stock_fraction(0.5)
        .with_line(4, &[1, 3])
        .build();
    let mut query = world.query::<&Station>();
    let counts: Vec<_> = query.iter(&world).map(Station::battery_count).collect();
    assert_eq!(counts, vec![3, 3]);
}
