use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, UInt32Array, UInt64Array, UInt8Array};
use arrow::datatypes::Schema;

use crate::telemetry::SimTelemetry;

use super::utils::{f64_field, outcome_code, u32_field, u64_field, u8_field, write_record_batch};

/// One row per ended trip. `outcome`: 0 completed, 1 no path, 2 out of energy.
pub fn write_trips_parquet<P: AsRef<Path>>(
    path: P,
    telemetry: &SimTelemetry,
) -> Result<(), Box<dyn Error>> {
    let n = telemetry.trips.len();
    let mut vehicle = Vec::with_capacity(n);
    let mut vehicle_type = Vec::with_capacity(n);
    let mut origin = Vec::with_capacity(n);
    let mut destination = Vec::with_capacity(n);
    let mut position = Vec::with_capacity(n);
    let mut started_at = Vec::with_capacity(n);
    let mut ended_at = Vec::with_capacity(n);
    let mut distance_km = Vec::with_capacity(n);
    let mut station_stops = Vec::with_capacity(n);
    let mut outcome = Vec::with_capacity(n);

    for record in &telemetry.trips {
        vehicle.push(record.vehicle.to_bits());
        vehicle_type.push(record.vehicle_type);
        origin.push(record.origin.0);
        destination.push(record.destination.0);
        position.push(record.position.0);
        started_at.push(record.started_at);
        ended_at.push(record.ended_at);
        distance_km.push(record.distance_km);
        station_stops.push(record.station_stops);
        outcome.push(outcome_code(record.outcome));
    }

    let schema = Schema::new(vec![
        u64_field("vehicle_entity"),
        u32_field("vehicle_type"),
        u32_field("origin"),
        u32_field("destination"),
        u32_field("position"),
        u64_field("started_at"),
        u64_field("ended_at"),
        f64_field("distance_km"),
        u32_field("station_stops"),
        u8_field("outcome"),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(vehicle)),
        Arc::new(UInt32Array::from(vehicle_type)),
        Arc::new(UInt32Array::from(origin)),
        Arc::new(UInt32Array::from(destination)),
        Arc::new(UInt32Array::from(position)),
        Arc::new(UInt64Array::from(started_at)),
        Arc::new(UInt64Array::from(ended_at)),
        Arc::new(Float64Array::from(distance_km)),
        Arc::new(UInt32Array::from(station_stops)),
        Arc::new(UInt8Array::from(outcome)),
    ];

    write_record_batch(path, schema, arrays)
}
