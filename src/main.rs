use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use serde::Deserialize;

use route_cleaner_rs::{
    analyze_elevation, calculate_co2_emissions, clean_trajectory, enrich_with_elevation,
    CleaningConfig, EnricherConfig, GoogleRoadsClient, OpenElevationClient, RoadMatcher,
    SnapStatus, TrajectoryPoint, VehicleParams, DEFAULT_ELEVATION_URL,
};

#[derive(Parser, Debug)]
#[command(name = "route_cleaner")]
#[command(about = "Clean a GPS trace and estimate its CO2 emissions", long_about = None)]
struct Args {
    /// Input JSON file: array of {timestamp?, latitude, longitude}
    #[arg(value_name = "TRACE")]
    input: PathBuf,

    /// Write the cleaned trajectory JSON here
    #[arg(long)]
    output: Option<PathBuf>,

    /// Google Roads API key for map matching
    #[arg(long, required_unless_present = "skip_snap")]
    google_api_key: Option<String>,

    /// Skip the road-snapping stage entirely
    #[arg(long)]
    skip_snap: bool,

    /// Elevation service endpoint
    #[arg(long, default_value = DEFAULT_ELEVATION_URL)]
    elevation_url: String,

    /// Baseline fuel efficiency, km/L
    #[arg(long, default_value = "3.0")]
    fuel_efficiency: f64,

    /// Payload weight, tonnes
    #[arg(long, default_value = "10.0")]
    payload: f64,

    /// Maximum payload capacity, tonnes
    #[arg(long, default_value = "25.0")]
    max_payload: f64,

    /// CO2 emission factor, g per litre of fuel
    #[arg(long, default_value = "2640.0")]
    emission_factor: f64,

    /// RNG seed for the outlier forest
    #[arg(long, default_value = "42")]
    seed: u64,
}

/// One raw tracker record as stored in the trace file. Trackers that log
/// without a clock omit the timestamp.
#[derive(Deserialize)]
struct RawFix {
    #[serde(default)]
    timestamp: Option<f64>,
    latitude: f64,
    longitude: f64,
}

fn load_trace(path: &PathBuf) -> Result<Vec<TrajectoryPoint>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let fixes: Vec<RawFix> =
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))?;

    // Traces recorded without timestamps get a synthetic 5 s cadence ending now
    let all_timestamped = fixes.iter().all(|f| f.timestamp.is_some());
    let now = Utc::now().timestamp() as f64;
    let start = now - 5.0 * fixes.len() as f64;

    Ok(fixes
        .into_iter()
        .enumerate()
        .map(|(i, fix)| {
            let timestamp = if all_timestamped {
                fix.timestamp.unwrap_or(0.0)
            } else {
                start + 5.0 * i as f64
            };
            TrajectoryPoint::new(timestamp, fix.latitude, fix.longitude)
        })
        .collect())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S%.3f").to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    println!("[{}] Route Cleaner Starting", ts_now());
    println!("  Input: {}", args.input.display());
    println!("  Map Matching: {}", if args.skip_snap { "disabled" } else { "Google Roads" });
    println!("  Elevation: {}", args.elevation_url);

    let raw = load_trace(&args.input)?;
    println!("[{}] Loaded {} raw fixes", ts_now(), raw.len());

    // A missing key is a configuration error and fails here, before any work
    let matcher: Option<GoogleRoadsClient> = match (&args.google_api_key, args.skip_snap) {
        (Some(key), false) => Some(GoogleRoadsClient::new(key.clone())?),
        _ => None,
    };

    let mut config = CleaningConfig::default();
    config.forest.seed = args.seed;

    let result = clean_trajectory(
        raw,
        &config,
        matcher.as_ref().map(|m| m as &dyn RoadMatcher),
    )
    .await;

    if result.trajectory.is_empty() {
        println!("[{}] No usable points after cleaning", ts_now());
        return Ok(());
    }
    if result.snap_status == SnapStatus::Fallback {
        println!("  Warning: map matching unavailable, using raw-cleaned trace");
    }

    let mut trajectory = result.trajectory;
    let elevation_client = OpenElevationClient::new(args.elevation_url)?;
    let report =
        enrich_with_elevation(&mut trajectory, &elevation_client, &EnricherConfig::default()).await;
    if report.is_degraded() {
        println!(
            "  Warning: {}/{} elevation batches failed, their points default to 0 m",
            report.failed_batches, report.batches
        );
    }

    let profile = analyze_elevation(&trajectory)?;
    let vehicle = VehicleParams {
        fuel_efficiency_km_per_l: args.fuel_efficiency,
        payload_tonnes: args.payload,
        max_payload_tonnes: args.max_payload,
        co2_factor_g_per_l: args.emission_factor,
    };
    let emissions = calculate_co2_emissions(
        result.total_distance_km,
        profile.total_ascent,
        profile.total_descent,
        result.total_time_s,
        &vehicle,
    );

    println!("\nResults:");
    println!("  Distance: {:.2} km", result.total_distance_km);
    println!("  Time: {:.2} hours", result.total_time_s / 3600.0);
    println!("  Total Ascent: {:.2} m", profile.total_ascent);
    println!("  Total Descent: {:.2} m", profile.total_descent);
    println!("  Max Elevation: {:.2} m", profile.max_elevation);
    println!("  Min Elevation: {:.2} m", profile.min_elevation);
    println!("  CO2 Emissions: {:.2} kg", emissions);

    if let Some(path) = args.output {
        let json = serde_json::to_string_pretty(&trajectory)?;
        std::fs::write(&path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("[{}] Cleaned trajectory written to {}", ts_now(), path.display());
    }

    Ok(())
}
