//! Mobile agents: vehicles on a trip and battery distributors.

use std::collections::VecDeque;
use std::sync::Arc;

use bevy_ecs::prelude::{Component, Entity};

use crate::battery::{Battery, BatteryType};
use crate::network::{Edge, NodeId};
use crate::telemetry::TripOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct VehicleType {
    pub id: u32,
    pub battery_type: Arc<BatteryType>,
    pub battery_count: usize,
    /// Base consumption in kWh/km.
    pub consumption_rate: f64,
    /// Extra consumption per degree of uphill grade.
    pub positive_slope_rate: f64,
    /// Consumption change per degree of downhill grade.
    pub negative_slope_rate: f64,
}

impl VehicleType {
    pub fn total_capacity(&self) -> f64 {
        self.battery_type.capacity_kwh * self.battery_count as f64
    }

    /// Energy spent traversing `edge`, never negative.
    pub fn consumption(&self, edge: &Edge) -> f64 {
        let slope_factor = if edge.grade > 0.0 {
            self.positive_slope_rate
        } else {
            self.negative_slope_rate
        };
        let energy =
            self.consumption_rate * (1.0 + slope_factor * edge.grade_degrees()) * edge.length_km;
        energy.max(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VehicleState {
    /// Waiting for its first plan.
    Planning,
    Driving,
    /// Queued for a station slot.
    WaitingForSlot,
    /// Holding a station slot.
    Servicing,
    Finished,
}

/// Progress through a station visit.
#[derive(Debug, Clone)]
pub struct ServiceProgress {
    pub station: Entity,
    /// Batteries still to be retrieved from the chargers (sharing).
    pub pending_gets: usize,
    /// Next held battery to recharge in place (no sharing).
    pub recharge_cursor: usize,
}

#[derive(Debug, Clone, Component)]
pub struct Vehicle {
    pub vehicle_type: Arc<VehicleType>,
    pub batteries: Vec<Battery>,
    pub position: NodeId,
    pub origin: NodeId,
    pub destination: NodeId,
    /// Remaining nodes to visit, next hop first.
    pub route: VecDeque<NodeId>,
    pub state: VehicleState,
    pub started_at: u64,
    pub distance_km: f64,
    pub station_stops: u32,
    pub service: Option<ServiceProgress>,
    pub outcome: Option<TripOutcome>,
}

impl Vehicle {
    pub fn new(
        vehicle_type: Arc<VehicleType>,
        batteries: Vec<Battery>,
        origin: NodeId,
        destination: NodeId,
        started_at: u64,
    ) -> Self {
        Self {
            vehicle_type,
            batteries,
            position: origin,
            origin,
            destination,
            route: VecDeque::new(),
            state: VehicleState::Planning,
            started_at,
            distance_km: 0.0,
            station_stops: 0,
            service: None,
            outcome: None,
        }
    }

    pub fn level(&self) -> f64 {
        self.batteries.iter().map(Battery::level).sum()
    }

    pub fn capacity(&self) -> f64 {
        self.batteries.iter().map(Battery::capacity).sum()
    }

    /// Splits `energy` evenly across held batteries; each floors at zero on its own.
    pub fn consume(&mut self, energy: f64) {
        if self.batteries.is_empty() || energy <= 0.0 {
            return;
        }
        let share = energy / self.batteries.len() as f64;
        for battery in &mut self.batteries {
            let level = battery.level() - share;
            battery.set_level(level);
        }
    }

    /// Batteries the vehicle should hold.
    pub fn batteries_needed(&self) -> usize {
        self.vehicle_type
            .battery_count
            .saturating_sub(self.batteries.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributorState {
    Idle,
    Loading,
    Travelling,
    Unloading,
}

#[derive(Debug, Clone, Component)]
pub struct Distributor {
    pub position: NodeId,
    pub pickup: Option<Entity>,
    pub dropoff: Option<Entity>,
    pub cargo: Vec<Battery>,
    pub state: DistributorState,
}

impl Distributor {
    pub fn new(position: NodeId) -> Self {
        Self {
            position,
            pickup: None,
            dropoff: None,
            cargo: Vec::new(),
            state: DistributorState::Idle,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state != DistributorState::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battery::BatteryFactory;

    fn vehicle_type(count: usize, rate: f64) -> Arc<VehicleType> {
        Arc::new(VehicleType {
            id: 0,
            battery_type: Arc::new(BatteryType::new(0, 10.0)),
            battery_count: count,
            consumption_rate: rate,
            positive_slope_rate: 0.1,
            negative_slope_rate: 0.05,
        })
    }

    fn flat_edge(length_km: f64) -> Edge {
        Edge {
            from: NodeId(0),
            to: NodeId(1),
            length_km,
            grade: 0.0,
            grade_abs: 0.0,
        }
    }

    fn vehicle_with_levels(vehicle_type: &Arc<VehicleType>, levels: &[f64]) -> Vehicle {
        let mut factory = BatteryFactory::default();
        let batteries = levels
            .iter()
            .map(|level| factory.with_level(&vehicle_type.battery_type, *level))
            .collect();
        Vehicle::new(Arc::clone(vehicle_type), batteries, NodeId(0), NodeId(1), 0)
    }

    #[test]
    fn forty_km_at_point_two_leaves_two_kwh() {
        let vehicle_type = vehicle_type(1, 0.2);
        let mut vehicle = vehicle_with_levels(&vehicle_type, &[10.0]);
        let energy = vehicle_type.consumption(&flat_edge(40.0));
        assert!((energy - 8.0).abs() < 1e-9);
        vehicle.consume(energy);
        assert!((vehicle.level() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn uphill_costs_more_and_steep_downhill_never_refunds() {
        let vehicle_type = vehicle_type(1, 0.2);
        let mut uphill = flat_edge(10.0);
        uphill.grade = 0.05;
        uphill.grade_abs = 0.05;
        assert!(vehicle_type.consumption(&uphill) > vehicle_type.consumption(&flat_edge(10.0)));

        let mut cliff = flat_edge(10.0);
        cliff.grade = -2.0;
        cliff.grade_abs = 2.0;
        assert_eq!(vehicle_type.consumption(&cliff), 0.0);
    }

    #[test]
    fn consume_keeps_total_level_within_bounds() {
        let vehicle_type = vehicle_type(3, 0.2);
        let mut vehicle = vehicle_with_levels(&vehicle_type, &[10.0, 1.0, 4.0]);
        let capacity = vehicle.capacity();
        for energy in [0.5, 3.0, 0.0, -2.0, 9.0, 40.0] {
            vehicle.consume(energy);
            assert!(vehicle.level() >= 0.0);
            assert!(vehicle.level() <= capacity);
        }
        assert_eq!(vehicle.level(), 0.0);
    }

    #[test]
    fn consume_splits_evenly_and_floors_each_battery() {
        let vehicle_type = vehicle_type(2, 0.2);
        let mut vehicle = vehicle_with_levels(&vehicle_type, &[10.0, 1.0]);
        vehicle.consume(4.0);
        assert_eq!(vehicle.batteries[0].level(), 8.0);
        assert_eq!(vehicle.batteries[1].level(), 0.0);
    }
}
