use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use bevy_ecs::prelude::Resource;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::battery::{BatteryType, BatteryTypeId};
use crate::clock::{ONE_HOUR_MS, ONE_MIN_MS, ONE_SEC_MS};
use crate::error::{ConfigError, ScenarioError};
use crate::network::{NodeId, RoadNetwork};
use crate::routing::PlannerOptions;
use crate::selection::SelectionStrategy;
use crate::station::StationType;
use crate::vehicle::VehicleType;

/// Vehicle type as configured: the battery type is referenced by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleTypeSpec {
    pub id: u32,
    pub battery_type: u32,
    pub battery_count: usize,
    /// kWh/km.
    pub consumption_rate: f64,
    pub positive_slope_rate: f64,
    pub negative_slope_rate: f64,
}

/// Battery redistribution fleet settings. Only used when sharing is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Resource)]
pub struct RedistributionConfig {
    /// Minimum time between the starts of two rounds.
    pub interval_ms: u64,
    pub fleet_size: usize,
    pub load_time_ms: u64,
    pub unload_time_ms: u64,
    pub speed_kmh: f64,
}

impl Default for RedistributionConfig {
    fn default() -> Self {
        Self {
            interval_ms: ONE_HOUR_MS,
            fleet_size: 2,
            load_time_ms: 5 * ONE_MIN_MS,
            unload_time_ms: 5 * ONE_MIN_MS,
            speed_kmh: 50.0,
        }
    }
}

/// Full parameter set of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    /// Horizon: no trip or redistribution round starts after it.
    pub sim_time_ms: u64,
    pub n_vehicles: usize,
    pub vehicle_speed_kmh: f64,
    pub battery_types: Vec<BatteryType>,
    pub vehicle_types: Vec<VehicleTypeSpec>,
    pub station_types: Vec<StationType>,
    pub vehicle_selector: SelectionStrategy,
    pub station_selector: SelectionStrategy,
    /// Share of nodes hosting a station when the network preassigns none.
    pub station_share: f64,
    pub swap_time_ms: u64,
    pub sharing: bool,
    pub wait_for_full_charge: bool,
    pub redistribution: RedistributionConfig,
    /// Share of each charger's capacity stocked with full batteries at start.
    pub initial_stock_fraction: f64,
    /// A trip needing more stops than this fails as energy constrained.
    pub max_station_stops: u32,
    pub max_detour_hops: Option<u32>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            sim_time_ms: 24 * ONE_HOUR_MS,
            n_vehicles: 40,
            vehicle_speed_kmh: 72.0,
            battery_types: vec![
                BatteryType::new(0, 10.0),
                BatteryType::new(1, 20.0),
                BatteryType::new(2, 20.0),
            ],
            vehicle_types: vec![VehicleTypeSpec {
                id: 0,
                battery_type: 0,
                battery_count: 4,
                consumption_rate: 0.15,
                positive_slope_rate: 0.1,
                negative_slope_rate: 0.05,
            }],
            station_types: vec![
                StationType {
                    id: 0,
                    capacity: 2,
                    power_kw: 11.0,
                    charger_capacities: vec![20, 15, 10],
                },
                StationType {
                    id: 1,
                    capacity: 4,
                    power_kw: 20.0,
                    charger_capacities: vec![30, 25, 25],
                },
                StationType {
                    id: 2,
                    capacity: 6,
                    power_kw: 50.0,
                    charger_capacities: vec![40, 35, 30],
                },
            ],
            vehicle_selector: SelectionStrategy::BiasedGeometric { beta: 0.4 },
            station_selector: SelectionStrategy::Uniform,
            station_share: 0.2,
            swap_time_ms: 30 * ONE_SEC_MS,
            sharing: true,
            wait_for_full_charge: false,
            redistribution: RedistributionConfig::default(),
            initial_stock_fraction: 0.5,
            max_station_stops: 8,
            max_detour_hops: None,
        }
    }
}

fn positive(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { field, value })
    }
}

fn unit(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfUnitRange { field, value })
    }
}

fn unique<I: IntoIterator<Item = u32>>(kind: &'static str, ids: I) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ConfigError::DuplicateId { kind, id });
        }
    }
    Ok(())
}

impl SimulationConfig {
    /// Consistency checks run before any entity is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.battery_types.is_empty() {
            return Err(ConfigError::EmptyCatalog("battery_types"));
        }
        if self.vehicle_types.is_empty() {
            return Err(ConfigError::EmptyCatalog("vehicle_types"));
        }
        if self.station_types.is_empty() {
            return Err(ConfigError::EmptyCatalog("station_types"));
        }
        unique("battery type", self.battery_types.iter().map(|b| b.id.0))?;
        unique("vehicle type", self.vehicle_types.iter().map(|v| v.id))?;
        unique("station type", self.station_types.iter().map(|s| s.id))?;

        for battery_type in &self.battery_types {
            positive("battery capacity_kwh", battery_type.capacity_kwh)?;
        }
        for vehicle_type in &self.vehicle_types {
            if !self
                .battery_types
                .iter()
                .any(|b| b.id == BatteryTypeId(vehicle_type.battery_type))
            {
                return Err(ConfigError::UnknownBatteryType {
                    vehicle_type: vehicle_type.id,
                    battery_type: BatteryTypeId(vehicle_type.battery_type),
                });
            }
            positive("battery_count", vehicle_type.battery_count as f64)?;
            positive("consumption_rate", vehicle_type.consumption_rate)?;
        }
        for station_type in &self.station_types {
            if station_type.charger_capacities.len() != self.battery_types.len() {
                return Err(ConfigError::BatteryTypeCountMismatch {
                    station_type: station_type.id,
                    expected: self.battery_types.len(),
                    got: station_type.charger_capacities.len(),
                });
            }
            positive("station capacity", station_type.capacity as f64)?;
            positive("station power_kw", station_type.power_kw)?;
            for (battery_type, &capacity) in
                self.battery_types.iter().zip(&station_type.charger_capacities)
            {
                positive("charger capacity", capacity as f64)?;
                if !self.sharing {
                    continue;
                }
                let required = self
                    .vehicle_types
                    .iter()
                    .filter(|v| BatteryTypeId(v.battery_type) == battery_type.id)
                    .map(|v| v.battery_count)
                    .max()
                    .unwrap_or(0);
                if capacity < required {
                    return Err(ConfigError::ChargerTooSmall {
                        station_type: station_type.id,
                        battery_type: battery_type.id,
                        capacity,
                        required,
                    });
                }
            }
        }

        positive("vehicle_speed_kmh", self.vehicle_speed_kmh)?;
        self.vehicle_selector.validate()?;
        self.station_selector.validate()?;
        unit("station_share", self.station_share)?;
        unit("initial_stock_fraction", self.initial_stock_fraction)?;
        if self.sharing && self.redistribution.fleet_size > 0 {
            positive("redistribution speed_kmh", self.redistribution.speed_kmh)?;
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String, ScenarioError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ScenarioError> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_json<P: AsRef<Path>>(path: P) -> Result<Self, ScenarioError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_sim_time_ms(mut self, sim_time_ms: u64) -> Self {
        self.sim_time_ms = sim_time_ms;
        self
    }

    pub fn with_vehicles(mut self, n_vehicles: usize) -> Self {
        self.n_vehicles = n_vehicles;
        self
    }

    pub fn with_vehicle_speed_kmh(mut self, speed_kmh: f64) -> Self {
        self.vehicle_speed_kmh = speed_kmh;
        self
    }

    pub fn with_sharing(mut self, sharing: bool) -> Self {
        self.sharing = sharing;
        self
    }

    pub fn with_wait_for_full_charge(mut self, wait: bool) -> Self {
        self.wait_for_full_charge = wait;
        self
    }

    pub fn with_swap_time_ms(mut self, swap_time_ms: u64) -> Self {
        self.swap_time_ms = swap_time_ms;
        self
    }

    pub fn with_station_share(mut self, share: f64) -> Self {
        self.station_share = share;
        self
    }

    pub fn with_redistribution(mut self, redistribution: RedistributionConfig) -> Self {
        self.redistribution = redistribution;
        self
    }

    pub fn with_initial_stock_fraction(mut self, fraction: f64) -> Self {
        self.initial_stock_fraction = fraction;
        self
    }

    pub fn with_max_station_stops(mut self, stops: u32) -> Self {
        self.max_station_stops = stops;
        self
    }

    pub fn with_max_detour_hops(mut self, hops: Option<u32>) -> Self {
        self.max_detour_hops = hops;
        self
    }
}

/// Type catalogs resolved for the run: battery types shared by `Arc`.
#[derive(Debug, Clone, Resource)]
pub struct Catalog {
    pub battery_types: Vec<Arc<BatteryType>>,
    pub vehicle_types: Vec<Arc<VehicleType>>,
    pub station_types: Vec<StationType>,
}

impl Catalog {
    pub fn from_config(config: &SimulationConfig) -> Result<Self, ConfigError> {
        let battery_types: Vec<Arc<BatteryType>> =
            config.battery_types.iter().cloned().map(Arc::new).collect();
        let vehicle_types = config
            .vehicle_types
            .iter()
            .map(|spec| {
                let battery_type = battery_types
                    .iter()
                    .find(|b| b.id == BatteryTypeId(spec.battery_type))
                    .ok_or(ConfigError::UnknownBatteryType {
                        vehicle_type: spec.id,
                        battery_type: BatteryTypeId(spec.battery_type),
                    })?;
                Ok(Arc::new(VehicleType {
                    id: spec.id,
                    battery_type: Arc::clone(battery_type),
                    battery_count: spec.battery_count,
                    consumption_rate: spec.consumption_rate,
                    positive_slope_rate: spec.positive_slope_rate,
                    negative_slope_rate: spec.negative_slope_rate,
                }))
            })
            .collect::<Result<Vec<_>, ConfigError>>()?;
        Ok(Self {
            battery_types,
            vehicle_types,
            station_types: config.station_types.clone(),
        })
    }

    pub fn station_type(&self, id: u32) -> Option<&StationType> {
        self.station_types.iter().find(|s| s.id == id)
    }
}

/// Trip-level policy shared by every vehicle.
#[derive(Debug, Clone, Copy, Resource)]
pub struct FleetPolicy {
    pub n_vehicles: usize,
    pub vehicle_speed_kmh: f64,
    pub vehicle_selector: SelectionStrategy,
    pub swap_time_ms: u64,
    pub sharing: bool,
    pub wait_for_full_charge: bool,
    pub max_station_stops: u32,
    pub planner: PlannerOptions,
}

impl From<&SimulationConfig> for FleetPolicy {
    fn from(config: &SimulationConfig) -> Self {
        Self {
            n_vehicles: config.n_vehicles,
            vehicle_speed_kmh: config.vehicle_speed_kmh,
            vehicle_selector: config.vehicle_selector,
            swap_time_ms: config.swap_time_ms,
            sharing: config.sharing,
            wait_for_full_charge: config.wait_for_full_charge,
            max_station_stops: config.max_station_stops,
            planner: PlannerOptions {
                max_detour_hops: config.max_detour_hops,
            },
        }
    }
}

/// State of the redistribution round gate.
#[derive(Debug, Clone, Copy, Default, Resource)]
pub struct RedistributionCycle {
    pub round: u64,
    /// Agents of the current round still working.
    pub outstanding: usize,
    pub interval_elapsed: bool,
    /// A round is in progress; cleared when the gate opens past the horizon.
    pub active: bool,
}

impl RedistributionCycle {
    /// Another round may start: the cycle runs, no agent is out and the
    /// interval has elapsed.
    pub fn ready(&self) -> bool {
        self.active && self.outstanding == 0 && self.interval_elapsed
    }
}

/// Seeded random source for every stochastic choice of the run.
#[derive(Debug, Resource)]
pub struct SimRng(pub StdRng);

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

/// Simulation horizon in milliseconds. Trips and redistribution rounds are
/// only admitted before it; processes already running drain past it.
#[derive(Debug, Clone, Copy, Resource)]
pub struct SimulationEndTimeMs(pub u64);

/// Origin/destination sampler built from node weights.
#[derive(Debug, Clone, Resource)]
pub struct TripSampler {
    node_count: usize,
    origins: Option<WeightedIndex<f64>>,
    destinations: Option<WeightedIndex<f64>>,
}

impl TripSampler {
    /// Falls back to uniform choice when weights are unusable (all zero or negative).
    pub fn from_network(network: &RoadNetwork) -> Self {
        let nodes = network.nodes();
        Self {
            node_count: nodes.len(),
            origins: WeightedIndex::new(nodes.iter().map(|n| n.start_weight)).ok(),
            destinations: WeightedIndex::new(nodes.iter().map(|n| n.end_weight)).ok(),
        }
    }

    pub fn origin<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        Self::pick(&self.origins, self.node_count, rng)
    }

    pub fn destination<R: Rng + ?Sized>(&self, rng: &mut R) -> NodeId {
        Self::pick(&self.destinations, self.node_count, rng)
    }

    fn pick<R: Rng + ?Sized>(weights: &Option<WeightedIndex<f64>>, count: usize, rng: &mut R) -> NodeId {
        let index = match weights {
            Some(weights) => weights.sample(rng),
            None => rng.gen_range(0..count.max(1)),
        };
        NodeId(index as u32)
    }
}
