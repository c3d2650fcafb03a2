use serde::{Deserialize, Serialize};

use crate::geodesy::haversine_distance;

/// Reliability tag attached by the turning-angle filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    #[default]
    Reliable,
    Unreliable,
}

/// One timestamped GPS fix plus fields derived during cleaning.
///
/// `timestamp` is seconds since the Unix epoch. Latitude and longitude are
/// degrees (WGS84). The derived fields are populated stage by stage and
/// refer to the point's predecessor in the sequence it currently lives in.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elevation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_delta_s: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_angle_deg: Option<f64>,
    #[serde(default)]
    pub reliability: Reliability,
}

impl TrajectoryPoint {
    pub fn new(timestamp: f64, latitude: f64, longitude: f64) -> Self {
        TrajectoryPoint {
            timestamp,
            latitude,
            longitude,
            elevation: None,
            distance_m: None,
            time_delta_s: None,
            speed_ms: None,
            turn_angle_deg: None,
            reliability: Reliability::Reliable,
        }
    }

    pub fn coords(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }
}

/// Sort points by timestamp, keeping the original order of equal timestamps.
pub fn sort_by_timestamp(points: &mut [TrajectoryPoint]) {
    points.sort_by(|a, b| {
        a.timestamp
            .partial_cmp(&b.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Recompute per-step distance, time delta and speed from the current
/// coordinates and timestamps. The first point carries no derived values.
pub fn recompute_derived(points: &mut [TrajectoryPoint]) {
    if points.is_empty() {
        return;
    }
    points[0].distance_m = None;
    points[0].time_delta_s = None;
    points[0].speed_ms = None;

    for i in 1..points.len() {
        let (prev_lat, prev_lon) = points[i - 1].coords();
        let dt = points[i].timestamp - points[i - 1].timestamp;
        let dist = haversine_distance(prev_lat, prev_lon, points[i].latitude, points[i].longitude);
        points[i].distance_m = Some(dist);
        points[i].time_delta_s = Some(dt);
        points[i].speed_ms = if dt > 0.0 { Some(dist / dt) } else { None };
    }
}

/// Sum of the per-step distances, kilometers.
pub fn total_distance_km(points: &[TrajectoryPoint]) -> f64 {
    points.iter().filter_map(|p| p.distance_m).sum::<f64>() / 1000.0
}

/// Sum of the per-step time deltas, seconds.
pub fn total_time_s(points: &[TrajectoryPoint]) -> f64 {
    points.iter().filter_map(|p| p.time_delta_s).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_points(coords: &[(f64, f64, f64)]) -> Vec<TrajectoryPoint> {
        coords
            .iter()
            .map(|&(t, lat, lon)| TrajectoryPoint::new(t, lat, lon))
            .collect()
    }

    #[test]
    fn test_sort_by_timestamp() {
        let mut points = make_points(&[(10.0, 0.0, 0.0), (0.0, 1.0, 1.0), (5.0, 2.0, 2.0)]);
        sort_by_timestamp(&mut points);
        let order: Vec<f64> = points.iter().map(|p| p.timestamp).collect();
        assert_eq!(order, vec![0.0, 5.0, 10.0]);
    }

    #[test]
    fn test_recompute_derived() {
        let mut points = make_points(&[(0.0, 0.0, 0.0), (10.0, 0.0, 0.001), (20.0, 0.0, 0.002)]);
        recompute_derived(&mut points);

        assert!(points[0].distance_m.is_none());
        assert!(points[0].speed_ms.is_none());

        // 0.001 degrees of longitude at the equator is ~111.19 m
        let step = points[1].distance_m.unwrap();
        assert_relative_eq!(step, 111.19, epsilon = 0.1);
        assert_relative_eq!(points[1].time_delta_s.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(points[1].speed_ms.unwrap(), step / 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_totals() {
        let mut points = make_points(&[(0.0, 0.0, 0.0), (5.0, 0.0, 0.001), (10.0, 0.0, 0.002)]);
        recompute_derived(&mut points);

        assert_relative_eq!(total_time_s(&points), 10.0, epsilon = 1e-9);
        assert_relative_eq!(total_distance_km(&points), 2.0 * 111.19 / 1000.0, epsilon = 1e-3);
    }

    #[test]
    fn test_non_positive_delta_has_no_speed() {
        let mut points = make_points(&[(10.0, 0.0, 0.0), (10.0, 0.0, 0.001)]);
        recompute_derived(&mut points);
        assert!(points[1].speed_ms.is_none());
        assert_eq!(points[1].time_delta_s, Some(0.0));
    }

    #[test]
    fn test_point_serde_round_trip() {
        let mut point = TrajectoryPoint::new(1000.0, 22.3193, 114.1694);
        point.reliability = Reliability::Unreliable;
        point.elevation = Some(42.0);

        let json = serde_json::to_string(&point).unwrap();
        assert!(json.contains("\"unreliable\""));

        let back: TrajectoryPoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back.reliability, Reliability::Unreliable);
        assert_eq!(back.elevation, Some(42.0));
        assert!(back.distance_m.is_none());
    }

    #[test]
    fn test_minimal_json_defaults() {
        let json = r#"{"timestamp": 1.0, "latitude": 22.0, "longitude": 114.0}"#;
        let point: TrajectoryPoint = serde_json::from_str(json).unwrap();
        assert_eq!(point.reliability, Reliability::Reliable);
        assert!(point.elevation.is_none());
    }
}
