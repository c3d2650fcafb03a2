//! GPS trace cleaning and CO2 estimation for vehicle trackers.
//!
//! Raw tracker fixes are noisy: sensor jitter, wild jumps, stale
//! timestamps, lateral drift off the road. The pipeline here runs a chain
//! of filters over a bounded trace and hands back a map-consistent,
//! uniformly sampled trajectory plus distance/time aggregates:
//!
//! 1. [`angle_filter`] rejects sharp-turn jitter patterns
//! 2. [`outlier`] drops spatially isolated noise spikes
//! 3. [`temporal`] drops stale timestamps and implausible speeds
//! 4. [`road_snap`] pulls fixes onto the road network (best effort)
//! 5. [`smoother`] smooths residual jitter and resamples to a fixed cadence
//!
//! Consumers then enrich the cleaned trace with [`elevation`] data and feed
//! the aggregates to the [`emission`] model. [`pipeline::clean_trajectory`]
//! wires the stages together.

pub mod angle_filter;
pub mod elevation;
pub mod emission;
pub mod geodesy;
pub mod outlier;
pub mod pipeline;
pub mod road_snap;
pub mod smoother;
pub mod temporal;
pub mod trajectory;

pub use angle_filter::{filter_by_turning_angle, AngleFilterOutput};
pub use elevation::{
    analyze_elevation, enrich_with_elevation, ElevationError, ElevationProfile,
    ElevationProvider, EnricherConfig, EnrichmentReport, OpenElevationClient,
    DEFAULT_ELEVATION_URL,
};
pub use emission::{calculate_co2_emissions, VehicleParams};
pub use geodesy::{haversine_distance, initial_bearing, turning_angle};
pub use outlier::{remove_outliers, ForestConfig, IsolationForest};
pub use pipeline::{clean_trajectory, CleaningConfig, CleaningResult};
pub use road_snap::{snap_to_roads, GoogleRoadsClient, RoadMatcher, SnapError, SnapStatus};
pub use smoother::{kalman_smooth, resample, SmootherConfig};
pub use temporal::{validate, ValidationOutput};
pub use trajectory::{Reliability, TrajectoryPoint};
