//! Scenario setup: configuration, type catalogs and the initial world.
//!
//! Stations are placed on network nodes and stocked with charged batteries;
//! distributors are parked at the first station when battery sharing is on.

mod build;
mod params;

pub use build::{build_scenario, place_stations};
pub use params::{
    Catalog, FleetPolicy, RedistributionConfig, RedistributionCycle, SimRng, SimulationConfig,
    SimulationEndTimeMs, TripSampler, VehicleTypeSpec,
};
