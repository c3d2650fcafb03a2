//! Turning-angle jitter filter.
//!
//! Sensor noise often shows up as a zig-zag: a point jumps off the path and
//! the next one jumps back, producing a sharp local turn that a road vehicle
//! cannot make. For every consecutive triple the turning angle at the middle
//! point is computed; a triple turning harder than the threshold marks all
//! three points unreliable.

use crate::geodesy::turning_angle;
use crate::trajectory::{Reliability, TrajectoryPoint};

/// Default turning-angle threshold in degrees. 180 is a straight line, so
/// anything below 90 is a turn sharper than a right angle.
pub const DEFAULT_ANGLE_THRESHOLD_DEG: f64 = 90.0;

/// Sentinel substituted when the angle cannot be computed. Never filters.
const SENTINEL_ANGLE_DEG: f64 = 180.0;

/// Output of the angle filter.
///
/// `retained` is the subsequence of reliable points, order preserved.
/// `annotated` is the full input with reliability tags and the computed
/// turning angle on each interior point, kept for diagnostics and
/// visualization downstream.
#[derive(Clone, Debug)]
pub struct AngleFilterOutput {
    pub retained: Vec<TrajectoryPoint>,
    pub annotated: Vec<TrajectoryPoint>,
}

/// Filter a trajectory by local turning angle.
///
/// Trajectories with fewer than 3 points pass through unchanged with every
/// point marked reliable. Angle computation failures (non-finite
/// coordinates) substitute the 180 degree sentinel, are counted, and never
/// reject a point.
pub fn filter_by_turning_angle(
    points: Vec<TrajectoryPoint>,
    threshold_deg: f64,
) -> AngleFilterOutput {
    let mut annotated = points;
    for point in annotated.iter_mut() {
        point.reliability = Reliability::Reliable;
    }

    if annotated.len() < 3 {
        return AngleFilterOutput {
            retained: annotated.clone(),
            annotated,
        };
    }

    let mut failures = 0usize;
    for i in 0..annotated.len() - 2 {
        let p1 = annotated[i].coords();
        let p2 = annotated[i + 1].coords();
        let p3 = annotated[i + 2].coords();

        let angle = match turning_angle(p1, p2, p3) {
            Some(a) => a,
            None => {
                failures += 1;
                SENTINEL_ANGLE_DEG
            }
        };
        annotated[i + 1].turn_angle_deg = Some(angle);

        if angle < threshold_deg {
            for point in annotated[i..i + 3].iter_mut() {
                point.reliability = Reliability::Unreliable;
            }
        }
    }

    if failures > 0 {
        log::warn!(
            "{} turning-angle computations failed, sentinel applied",
            failures
        );
    }

    let retained: Vec<TrajectoryPoint> = annotated
        .iter()
        .filter(|p| p.reliability == Reliability::Reliable)
        .cloned()
        .collect();

    log::info!(
        "angle filter removed {} of {} points",
        annotated.len() - retained.len(),
        annotated.len()
    );

    AngleFilterOutput { retained, annotated }
}
