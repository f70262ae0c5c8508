use crate::telemetry::{StationWaitRecord, TripOutcome, TripRecord};

/// Checks the internal consistency of an ended trip.
/// Returns an error message if validation fails, None if valid.
pub fn validate_trip_record(trip: &TripRecord) -> Option<String> {
    let id = trip.vehicle.to_bits();
    if trip.started_at > trip.ended_at {
        return Some(format!(
            "Trip {}: started_at ({}) > ended_at ({})",
            id, trip.started_at, trip.ended_at
        ));
    }
    if !trip.distance_km.is_finite() || trip.distance_km < 0.0 {
        return Some(format!("Trip {}: invalid distance {}", id, trip.distance_km));
    }
    match trip.outcome {
        TripOutcome::Completed if trip.position != trip.destination => Some(format!(
            "Trip {} (Completed): ended at {:?}, destination {:?}",
            id, trip.position, trip.destination
        )),
        TripOutcome::FailedNoPath | TripOutcome::FailedEnergy
            if trip.origin != trip.destination && trip.position == trip.destination =>
        {
            Some(format!(
                "Trip {} ({:?}): failed at its destination {:?}",
                id, trip.outcome, trip.destination
            ))
        }
        _ => None,
    }
}

pub fn validate_station_wait(wait: &StationWaitRecord) -> Option<String> {
    if wait.requested_at > wait.granted_at {
        return Some(format!(
            "Wait at station {}: requested_at ({}) > granted_at ({})",
            wait.station.to_bits(),
            wait.requested_at,
            wait.granted_at
        ));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::prelude::Entity;

    use crate::network::NodeId;

    fn record(outcome: TripOutcome, position: NodeId) -> TripRecord {
        TripRecord {
            vehicle: Entity::from_raw(1),
            vehicle_type: 0,
            origin: NodeId(0),
            destination: NodeId(3),
            position,
            started_at: 10,
            ended_at: 20,
            distance_km: 3.0,
            station_stops: 0,
            outcome,
        }
    }

    #[test]
    fn completed_trip_must_end_at_destination() {
        assert!(validate_trip_record(&record(TripOutcome::Completed, NodeId(3))).is_none());
        assert!(validate_trip_record(&record(TripOutcome::Completed, NodeId(2))).is_some());
        assert!(validate_trip_record(&record(TripOutcome::FailedEnergy, NodeId(2))).is_none());
    }

    #[test]
    fn time_must_not_run_backwards() {
        let mut trip = record(TripOutcome::Completed, NodeId(3));
        trip.ended_at = 5;
        assert!(validate_trip_record(&trip).is_some());

        let wait = StationWaitRecord {
            station: Entity::from_raw(2),
            node: NodeId(1),
            vehicle: Entity::from_raw(1),
            requested_at: 7,
            granted_at: 3,
        };
        assert!(validate_station_wait(&wait).is_some());
    }
}
