//! Temporal and speed validation.
//!
//! Drops duplicate or out-of-order timestamps and physically implausible
//! hops. The scan is cumulative: each candidate is judged against the last
//! point that was actually kept, so after a drop the next point is measured
//! from the surviving predecessor rather than the dropped one. That means a
//! burst of bad fixes is consumed one by one instead of poisoning the point
//! that follows it.

use crate::geodesy::haversine_distance;
use crate::trajectory::TrajectoryPoint;

/// Default maximum plausible speed, m/s (90 km/h).
pub const DEFAULT_MAX_SPEED_MS: f64 = 25.0;

/// Survivors of the validation scan plus aggregates over retained steps.
#[derive(Clone, Debug, Default)]
pub struct ValidationOutput {
    pub retained: Vec<TrajectoryPoint>,
    /// Sum of retained time deltas, seconds
    pub total_time_s: f64,
    /// Sum of retained step distances, kilometers
    pub total_distance_km: f64,
    pub dropped_time: usize,
    pub dropped_speed: usize,
}

/// Validate a timestamp-ascending trajectory.
///
/// The first point anchors the scan and is always retained. A later point
/// is dropped when its time delta against the last retained point is not
/// positive, or when the implied speed reaches `max_speed_ms`. Retained
/// points get their per-step distance, delta and speed filled in.
pub fn validate(points: Vec<TrajectoryPoint>, max_speed_ms: f64) -> ValidationOutput {
    let mut output = ValidationOutput::default();
    let mut iter = points.into_iter();

    let mut anchor = match iter.next() {
        Some(first) => first,
        None => return output,
    };
    anchor.distance_m = None;
    anchor.time_delta_s = None;
    anchor.speed_ms = None;
    output.retained.push(anchor);

    let mut total_distance_m = 0.0;
    for mut point in iter {
        let prev = &output.retained[output.retained.len() - 1];
        let dt = point.timestamp - prev.timestamp;
        if dt <= 0.0 {
            output.dropped_time += 1;
            continue;
        }

        let dist = haversine_distance(prev.latitude, prev.longitude, point.latitude, point.longitude);
        let speed = dist / dt;
        if speed >= max_speed_ms {
            output.dropped_speed += 1;
            continue;
        }

        point.distance_m = Some(dist);
        point.time_delta_s = Some(dt);
        point.speed_ms = Some(speed);
        output.total_time_s += dt;
        total_distance_m += dist;
        output.retained.push(point);
    }

    output.total_distance_km = total_distance_m / 1000.0;

    if output.dropped_time + output.dropped_speed > 0 {
        log::info!(
            "temporal validator dropped {} stale-timestamp and {} overspeed points",
            output.dropped_time,
            output.dropped_speed
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn point(t: f64, lat: f64, lon: f64) -> TrajectoryPoint {
        TrajectoryPoint::new(t, lat, lon)
    }

    /// ~10 m/s eastward at the equator: 0.00045 degrees of longitude per 5 s.
    fn steady_trace(n: usize) -> Vec<TrajectoryPoint> {
        (0..n)
            .map(|i| point(i as f64 * 5.0, 0.0, i as f64 * 0.00045))
            .collect()
    }

    #[test]
    fn test_clean_trace_fully_retained() {
        let out = validate(steady_trace(5), DEFAULT_MAX_SPEED_MS);
        assert_eq!(out.retained.len(), 5);
        assert_eq!(out.dropped_time, 0);
        assert_eq!(out.dropped_speed, 0);
        assert_relative_eq!(out.total_time_s, 20.0, epsilon = 1e-9);
        // 4 steps of ~50 m
        assert_relative_eq!(out.total_distance_km, 0.2, epsilon = 0.002);
    }

    #[test]
    fn test_duplicate_timestamp_dropped() {
        let mut points = steady_trace(4);
        points[2].timestamp = points[1].timestamp;
        let out = validate(points, DEFAULT_MAX_SPEED_MS);

        assert_eq!(out.retained.len(), 3);
        assert_eq!(out.dropped_time, 1);
        for pair in out.retained.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
        }
    }

    #[test]
    fn test_overspeed_point_dropped() {
        let mut points = steady_trace(5);
        // ~100 m/s against its predecessor
        points[2].longitude = points[1].longitude + 0.0045;
        let out = validate(points, DEFAULT_MAX_SPEED_MS);

        assert_eq!(out.dropped_speed, 1);
        assert_eq!(out.retained.len(), 4);
    }

    #[test]
    fn test_cumulative_evaluation_after_drop() {
        // The point after the spike is far from the spike but close to the
        // surviving anchor, so it must be kept.
        let points = vec![
            point(0.0, 0.0, 0.0000),
            point(5.0, 0.0, 0.0045), // ~100 m/s hop, dropped
            point(10.0, 0.0, 0.0009), // ~10 m/s against index 0, kept
        ];
        let out = validate(points, DEFAULT_MAX_SPEED_MS);

        assert_eq!(out.retained.len(), 2);
        assert_eq!(out.dropped_speed, 1);
        assert_relative_eq!(out.retained[1].longitude, 0.0009, epsilon = 1e-12);
        // Aggregates reflect only the retained segment
        assert_relative_eq!(out.total_time_s, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_never_increases_point_count() {
        let out = validate(steady_trace(20), DEFAULT_MAX_SPEED_MS);
        assert!(out.retained.len() <= 20);
    }

    #[test]
    fn test_retained_pairs_satisfy_bounds() {
        let mut points = steady_trace(10);
        points[3].longitude += 0.01;
        points[7].timestamp = points[6].timestamp - 1.0;
        let out = validate(points, DEFAULT_MAX_SPEED_MS);

        for p in &out.retained[1..] {
            assert!(p.time_delta_s.unwrap() > 0.0);
            assert!(p.speed_ms.unwrap() < DEFAULT_MAX_SPEED_MS);
        }
    }

    #[test]
    fn test_empty_input() {
        let out = validate(Vec::new(), DEFAULT_MAX_SPEED_MS);
        assert!(out.retained.is_empty());
        assert_eq!(out.total_time_s, 0.0);
        assert_eq!(out.total_distance_km, 0.0);
    }
}
