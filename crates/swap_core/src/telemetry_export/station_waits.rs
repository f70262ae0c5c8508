use std::error::Error;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, UInt32Array, UInt64Array};
use arrow::datatypes::Schema;

use crate::telemetry::SimTelemetry;

use super::utils::{u32_field, u64_field, write_record_batch};

/// One row per slot grant, immediate grants included (`waited_ms` = 0).
pub fn write_station_waits_parquet<P: AsRef<Path>>(
    path: P,
    telemetry: &SimTelemetry,
) -> Result<(), Box<dyn Error>> {
    let n = telemetry.station_waits.len();
    let mut station = Vec::with_capacity(n);
    let mut node = Vec::with_capacity(n);
    let mut vehicle = Vec::with_capacity(n);
    let mut requested_at = Vec::with_capacity(n);
    let mut granted_at = Vec::with_capacity(n);
    let mut waited_ms = Vec::with_capacity(n);

    for record in &telemetry.station_waits {
        station.push(record.station.to_bits());
        node.push(record.node.0);
        vehicle.push(record.vehicle.to_bits());
        requested_at.push(record.requested_at);
        granted_at.push(record.granted_at);
        waited_ms.push(record.waited_ms());
    }

    let schema = Schema::new(vec![
        u64_field("station_entity"),
        u32_field("node"),
        u64_field("vehicle_entity"),
        u64_field("requested_at"),
        u64_field("granted_at"),
        u64_field("waited_ms"),
    ]);

    let arrays: Vec<ArrayRef> = vec![
        Arc::new(UInt64Array::from(station)),
        Arc::new(UInt32Array::from(node)),
        Arc::new(UInt64Array::from(vehicle)),
        Arc::new(UInt64Array::from(requested_at)),
        Arc::new(UInt64Array::from(granted_at)),
        Arc::new(UInt64Array::from(waited_ms)),
    ];

    write_record_batch(path, schema, arrays)
}
