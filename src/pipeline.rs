//! Stage orchestration for the GPS cleaning pipeline.
//!
//! Raw trace -> angle filter -> outlier detector -> temporal/speed
//! validator -> road snap -> smoother -> resampler. Every stage consumes
//! and returns the same trajectory representation; a stage that empties the
//! trace short-circuits the rest. Each invocation owns its trajectory, so
//! concurrent traces just run independent pipelines.

use serde::Serialize;

use crate::angle_filter::{filter_by_turning_angle, DEFAULT_ANGLE_THRESHOLD_DEG};
use crate::outlier::{remove_outliers, ForestConfig};
use crate::road_snap::{snap_to_roads, RoadMatcher, SnapStatus, DEFAULT_BATCH_SIZE, DEFAULT_MAX_POINTS};
use crate::smoother::{kalman_smooth, resample, SmootherConfig, DEFAULT_RESAMPLE_INTERVAL_S};
use crate::temporal::{validate, DEFAULT_MAX_SPEED_MS};
use crate::trajectory::{
    sort_by_timestamp, total_distance_km, total_time_s, TrajectoryPoint,
};

/// Every knob of the cleaning pipeline, passed explicitly per invocation.
/// No stage reads ambient global state.
#[derive(Clone, Debug)]
pub struct CleaningConfig {
    pub angle_threshold_deg: f64,
    pub forest: ForestConfig,
    pub max_speed_ms: f64,
    pub snap_batch_size: usize,
    pub snap_max_points: usize,
    pub smoother: SmootherConfig,
    pub resample_interval_s: f64,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            angle_threshold_deg: DEFAULT_ANGLE_THRESHOLD_DEG,
            forest: ForestConfig::default(),
            max_speed_ms: DEFAULT_MAX_SPEED_MS,
            snap_batch_size: DEFAULT_BATCH_SIZE,
            snap_max_points: DEFAULT_MAX_POINTS,
            smoother: SmootherConfig::default(),
            resample_interval_s: DEFAULT_RESAMPLE_INTERVAL_S,
        }
    }
}

/// What a pipeline run produced.
///
/// `annotated` is the full input trajectory with the angle filter's
/// reliability tags, retained before road snapping for diagnostics and
/// visualization. It is not touched after creation.
#[derive(Clone, Debug, Serialize)]
pub struct CleaningResult {
    pub trajectory: Vec<TrajectoryPoint>,
    /// Sum of retained time deltas, seconds
    pub total_time_s: f64,
    /// Sum of retained step distances, kilometers
    pub total_distance_km: f64,
    pub annotated: Vec<TrajectoryPoint>,
    pub snap_status: SnapStatus,
}

impl CleaningResult {
    fn empty(annotated: Vec<TrajectoryPoint>) -> Self {
        CleaningResult {
            trajectory: Vec::new(),
            total_time_s: 0.0,
            total_distance_km: 0.0,
            annotated,
            snap_status: SnapStatus::Skipped,
        }
    }
}

/// Run the full cleaning pipeline over one raw trace.
///
/// With `matcher` set to `None` the road-snap stage is skipped; a supplied
/// matcher that fails degrades to the unsnapped trajectory (see
/// [`SnapStatus`]). An empty input, or a trace filtered down to nothing,
/// yields an empty result with zeroed aggregates; callers must check for
/// emptiness before indexing into the result.
pub async fn clean_trajectory(
    raw: Vec<TrajectoryPoint>,
    config: &CleaningConfig,
    matcher: Option<&dyn RoadMatcher>,
) -> CleaningResult {
    if raw.is_empty() {
        log::warn!("empty trace, nothing to clean");
        return CleaningResult::empty(Vec::new());
    }

    let mut points = raw;
    sort_by_timestamp(&mut points);
    let input_len = points.len();

    let angle_output = filter_by_turning_angle(points, config.angle_threshold_deg);
    let annotated = angle_output.annotated;
    if angle_output.retained.is_empty() {
        log::warn!("angle filter removed every point");
        return CleaningResult::empty(annotated);
    }

    let survivors = remove_outliers(angle_output.retained, &config.forest);
    if survivors.is_empty() {
        log::warn!("outlier detector removed every point");
        return CleaningResult::empty(annotated);
    }

    let validated = validate(survivors, config.max_speed_ms);
    if validated.retained.is_empty() {
        log::warn!("temporal validator removed every point");
        return CleaningResult::empty(annotated);
    }
    let mut total_time = validated.total_time_s;
    let mut total_distance = validated.total_distance_km;

    let (mut cleaned, snap_status) = match matcher {
        Some(matcher) => {
            let snap = snap_to_roads(
                validated.retained,
                matcher,
                config.snap_batch_size,
                config.snap_max_points,
            )
            .await;
            if snap.status == SnapStatus::Snapped {
                total_time = total_time_s(&snap.trajectory);
                total_distance = total_distance_km(&snap.trajectory);
            }
            (snap.trajectory, snap.status)
        }
        None => {
            log::info!("no road matcher configured, skipping map matching");
            (validated.retained, SnapStatus::Skipped)
        }
    };

    kalman_smooth(&mut cleaned, &config.smoother);
    let resampled = resample(&cleaned, config.resample_interval_s);

    log::info!(
        "cleaned trace: {} raw -> {} resampled points, {:.3} km over {:.0} s",
        input_len,
        resampled.len(),
        total_distance,
        total_time
    );

    CleaningResult {
        trajectory: resampled,
        total_time_s: total_time,
        total_distance_km: total_distance,
        annotated,
        snap_status,
    }
}
