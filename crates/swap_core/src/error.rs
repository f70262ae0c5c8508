//! Error types for configuration, road networks and route planning.

use thiserror::Error;

use crate::battery::BatteryTypeId;
use crate::network::NodeId;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("catalog `{0}` is empty")]
    EmptyCatalog(&'static str),

    #[error("duplicate {kind} id {id}")]
    DuplicateId { kind: &'static str, id: u32 },

    #[error("vehicle type {vehicle_type} references unknown battery type {battery_type:?}")]
    UnknownBatteryType {
        vehicle_type: u32,
        battery_type: BatteryTypeId,
    },

    #[error("node {node} preassigns unknown station type {station_type}")]
    UnknownStationType { node: u32, station_type: u32 },

    #[error(
        "station type {station_type} lists {got} charger capacities but there are {expected} battery types"
    )]
    BatteryTypeCountMismatch {
        station_type: u32,
        expected: usize,
        got: usize,
    },

    #[error(
        "station type {station_type} charges {capacity} batteries of type {battery_type:?}, vehicles hand in {required}"
    )]
    ChargerTooSmall {
        station_type: u32,
        battery_type: BatteryTypeId,
        capacity: usize,
        required: usize,
    },

    #[error("{field} must be positive, got {value}")]
    NonPositive { field: &'static str, value: f64 },

    #[error("beta must be in (0, 1), got {0}")]
    InvalidBeta(f64),

    #[error("{field} must be within [0, 1], got {value}")]
    OutOfUnitRange { field: &'static str, value: f64 },
}

/// Why no path could be planned.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum PathError {
    /// The target is not reachable in the graph at all.
    #[error("no path from {origin:?} to {target:?}")]
    NoPath { origin: NodeId, target: NodeId },

    /// The target is reachable but not on the remaining charge, and no station
    /// is reachable either.
    #[error("no energy-feasible path from {origin:?} to {target:?}")]
    EnergyConstrained { origin: NodeId, target: NodeId },
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum NetworkError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("edge {from:?} -> {to:?} has invalid length {length_km}")]
    InvalidLength {
        from: NodeId,
        to: NodeId,
        length_km: f64,
    },
}

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("config serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config io failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("the road network has no nodes")]
    EmptyNetwork,
}
