//! Parquet export of per-trip records and station wait samples.

mod station_waits;
mod trips;
mod utils;
mod validate;

pub use station_waits::write_station_waits_parquet;
pub use trips::write_trips_parquet;
pub use validate::{validate_station_wait, validate_trip_record};
