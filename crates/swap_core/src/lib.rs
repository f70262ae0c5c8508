pub mod battery;
pub mod charger;
pub mod clock;
pub mod error;
pub mod network;
pub mod profiling;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod selection;
pub mod station;
pub mod systems;
pub mod telemetry;
pub mod telemetry_export;
pub mod vehicle;

#[cfg(feature = "test-helpers")]
pub mod test_helpers;
