//! Telemetry / KPIs: trip outcomes, station waits and redistribution counters.

use bevy_ecs::prelude::{Entity, Resource};
use serde::Serialize;

use crate::network::NodeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripOutcome {
    Completed,
    /// Origin and destination are disconnected.
    FailedNoPath,
    /// No energy-feasible path, or too many station stops.
    FailedEnergy,
}

/// One finished trip, recorded when the vehicle leaves the simulation.
#[derive(Debug, Clone)]
pub struct TripRecord {
    pub vehicle: Entity,
    pub vehicle_type: u32,
    pub origin: NodeId,
    pub destination: NodeId,
    pub position: NodeId,
    pub started_at: u64,
    pub ended_at: u64,
    pub distance_km: f64,
    pub station_stops: u32,
    pub outcome: TripOutcome,
}

impl TripRecord {
    /// Includes time spent waiting and charging at stations.
    pub fn travel_time_ms(&self) -> u64 {
        self.ended_at.saturating_sub(self.started_at)
    }
}

/// Time a vehicle waited for a station slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationWaitRecord {
    pub station: Entity,
    pub node: NodeId,
    pub vehicle: Entity,
    pub requested_at: u64,
    pub granted_at: u64,
}

impl StationWaitRecord {
    pub fn waited_ms(&self) -> u64 {
        self.granted_at.saturating_sub(self.requested_at)
    }
}

#[derive(Debug, Default, Resource)]
pub struct SimTelemetry {
    pub trips_started: u64,
    pub trips: Vec<TripRecord>,
    pub station_waits: Vec<StationWaitRecord>,
    pub redistribution_rounds: u64,
    pub batteries_redistributed: u64,
    pub charge_interruptions: u64,
}

impl SimTelemetry {
    pub fn count(&self, outcome: TripOutcome) -> u64 {
        self.trips.iter().filter(|t| t.outcome == outcome).count() as u64
    }

    pub fn total_distance_km(&self) -> f64 {
        self.trips.iter().map(|t| t.distance_km).sum()
    }

    pub fn total_travel_time_ms(&self) -> u64 {
        self.trips.iter().map(TripRecord::travel_time_ms).sum()
    }

    pub fn waits_at(&self, station: Entity) -> impl Iterator<Item = &StationWaitRecord> {
        self.station_waits.iter().filter(move |w| w.station == station)
    }

    pub fn mean_station_wait_ms(&self) -> f64 {
        if self.station_waits.is_empty() {
            return 0.0;
        }
        let total: u64 = self.station_waits.iter().map(StationWaitRecord::waited_ms).sum();
        total as f64 / self.station_waits.len() as f64
    }
}

/// Run-level statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimSummary {
    pub trips_started: u64,
    pub trips_completed: u64,
    pub trips_failed_no_path: u64,
    pub trips_failed_energy: u64,
    /// Vehicles still waiting when the event queue ran dry.
    pub trips_stranded: u64,
    pub total_distance_km: f64,
    pub total_travel_time_ms: u64,
    pub station_wait_samples: usize,
    pub mean_station_wait_ms: f64,
    pub redistribution_rounds: u64,
    pub batteries_redistributed: u64,
    pub charge_interruptions: u64,
    pub ended_at_ms: u64,
}

impl SimSummary {
    pub fn from_telemetry(telemetry: &SimTelemetry, stranded: u64, ended_at_ms: u64) -> Self {
        Self {
            trips_started: telemetry.trips_started,
            trips_completed: telemetry.count(TripOutcome::Completed),
            trips_failed_no_path: telemetry.count(TripOutcome::FailedNoPath),
            trips_failed_energy: telemetry.count(TripOutcome::FailedEnergy),
            trips_stranded: stranded,
            total_distance_km: telemetry.total_distance_km(),
            total_travel_time_ms: telemetry.total_travel_time_ms(),
            station_wait_samples: telemetry.station_waits.len(),
            mean_station_wait_ms: telemetry.mean_station_wait_ms(),
            redistribution_rounds: telemetry.redistribution_rounds,
            batteries_redistributed: telemetry.batteries_redistributed,
            charge_interruptions: telemetry.charge_interruptions,
            ended_at_ms,
        }
    }

    /// Travel time per kilometre covered; zero when nothing moved.
    pub fn relative_travel_time_ms_per_km(&self) -> f64 {
        if self.total_distance_km <= 0.0 {
            return 0.0;
        }
        self.total_travel_time_ms as f64 / self.total_distance_km
    }
}
