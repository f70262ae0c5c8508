//! Run a day of the default battery-swap scenario on a 12 x 12 km grid and
//! print the summary. An optional first argument names a JSON config file.
//!
//! Run with: cargo run -p swap_core --example scenario_run [-- config.json]
//! Set RUST_LOG=swap_core=debug for per-process transitions.

use std::error::Error;

use swap_core::clock::ONE_SEC_MS;
use swap_core::network::RoadNetwork;
use swap_core::runner::run_simulation;
use swap_core::scenario::SimulationConfig;
use swap_core::telemetry::TripOutcome;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => SimulationConfig::read_json(path)?,
        None => SimulationConfig::default().with_seed(123),
    };
    let network = RoadNetwork::grid(13, 13, 1.0)?;
    let report = run_simulation(&config, network)?;
    let summary = &report.summary;

    println!(
        "--- Scenario run ({} vehicles, sharing={}, seed {}) ---",
        config.n_vehicles, config.sharing, config.seed
    );
    println!("Steps executed: {}", report.steps);
    println!("Simulation ended at: {} s", summary.ended_at_ms / ONE_SEC_MS);
    println!("Trips started: {}", summary.trips_started);
    println!("  completed:        {}", summary.trips_completed);
    println!("  failed (no path): {}", summary.trips_failed_no_path);
    println!("  failed (energy):  {}", summary.trips_failed_energy);
    println!("  stranded:         {}", summary.trips_stranded);
    println!("Distance: {:.1} km", summary.total_distance_km);
    println!(
        "Relative travel time: {:.0} ms/km",
        summary.relative_travel_time_ms_per_km()
    );
    println!(
        "Station waits: {} samples, mean {:.1} s",
        summary.station_wait_samples,
        summary.mean_station_wait_ms / ONE_SEC_MS as f64
    );
    println!(
        "Redistribution: {} rounds, {} batteries moved",
        summary.redistribution_rounds, summary.batteries_redistributed
    );
    println!("Charge interruptions: {}", summary.charge_interruptions);

    let with_stops = report
        .telemetry
        .trips
        .iter()
        .filter(|t| t.outcome == TripOutcome::Completed && t.station_stops > 0)
        .count();
    println!("Completed trips with station stops: {}", with_stops);

    println!("\nSummary JSON:\n{}", serde_json::to_string_pretty(summary)?);
    Ok(())
}
