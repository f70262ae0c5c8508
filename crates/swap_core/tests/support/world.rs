#![allow(dead_code)]

use bevy_ecs::prelude::World;
use swap_core::network::RoadNetwork;
use swap_core::scenario::SimulationConfig;
use swap_core::test_helpers::{create_test_world, line_with_stations, single_battery_config};

/// Builder configuration for reproducible test worlds.
#[derive(Clone, Debug)]
pub struct TestWorldConfig {
    pub seed: u64,
    pub slots: usize,
    pub power_kw: f64,
    pub charger_capacity: usize,
    pub sharing: bool,
    pub wait_for_full_charge: bool,
    pub swap_time_ms: u64,
    pub initial_stock_fraction: f64,
    /// Horizon for replacement trips; 0 keeps the world to the vehicles a test spawns.
    pub sim_time_ms: u64,
    pub line_length: u32,
    pub stations: Vec<u32>,
}

impl Default for TestWorldConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            slots: 2,
            power_kw: 10.0,
            charger_capacity: 8,
            sharing: true,
            wait_for_full_charge: false,
            swap_time_ms: 30_000,
            initial_stock_fraction: 0.0,
            sim_time_ms: 0,
            line_length: 5,
            stations: vec![2],
        }
    }
}

/// Helper that populates the ECS world for station-level tests: a straight
/// line with preassigned stations and a single battery type.
#[derive(Debug, Default)]
pub struct TestWorldBuilder {
    config: TestWorldConfig,
}

impl TestWorldBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Swap slots per station.
    pub fn with_slots(mut self, slots: usize) -> Self {
        self.config.slots = slots;
        self
    }

    pub fn with_charger(mut self, capacity: usize, power_kw: f64) -> Self {
        self.config.charger_capacity = capacity;
        self.config.power_kw = power_kw;
        self
    }

    pub fn with_sharing(mut self, sharing: bool) -> Self {
        self.config.sharing = sharing;
        self
    }

    pub fn with_wait_for_full_charge(mut self, wait: bool) -> Self {
        self.config.wait_for_full_charge = wait;
        self
    }

    pub fn with_swap_time_ms(mut self, swap_time_ms: u64) -> Self {
        self.config.swap_time_ms = swap_time_ms;
        self
    }

    pub fn with_initial_stock_fraction(mut self, fraction: f64) -> Self {
        self.config.initial_stock_fraction = fraction;
        self
    }

    pub fn with_sim_time_ms(mut self, sim_time_ms: u64) -> Self {
        self.config.sim_time_ms = sim_time_ms;
        self
    }

    /// Line of `length` nodes with stations on `stations`.
    pub fn with_line(mut self, length: u32, stations: &[u32]) -> Self {
        self.config.line_length = length;
        self.config.stations = stations.to_vec();
        self
    }

    pub fn simulation_config(&self) -> SimulationConfig {
        let TestWorldConfig {
            seed,
            slots,
            power_kw,
            charger_capacity,
            sharing,
            wait_for_full_charge,
            swap_time_ms,
            initial_stock_fraction,
            sim_time_ms,
            ..
        } = self.config;
        let mut config = single_battery_config(slots, power_kw, charger_capacity)
            .with_seed(seed)
            .with_sharing(sharing)
            .with_wait_for_full_charge(wait_for_full_charge)
            .with_swap_time_ms(swap_time_ms)
            .with_initial_stock_fraction(initial_stock_fraction)
            .with_sim_time_ms(sim_time_ms);
        config.redistribution.fleet_size = 0;
        config
    }

    pub fn network(&self) -> RoadNetwork {
        line_with_stations(self.config.line_length, &self.config.stations)
    }

    /// Build the ECS world with the configured resources.
    pub fn build(self) -> World {
        create_test_world(&self.simulation_config(), self.network())
    }
}
