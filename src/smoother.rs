//! State-space smoothing and fixed-interval resampling.
//!
//! The smoother runs a constant-position Kalman model over (lat, lon):
//! identity transition and observation matrices, initial mean at the first
//! observed point, then a Rauch-Tung-Striebel backward pass. It knocks down
//! residual high-frequency jitter without bending the low-frequency shape
//! of the path.
//!
//! The resampler then reindexes the trajectory onto a fixed cadence,
//! averaging within buckets and interpolating interior gaps, so downstream
//! consumers see uniform inter-point spacing.

use nalgebra::{Matrix2, Vector2};

use crate::trajectory::{Reliability, TrajectoryPoint};

/// Default resampling cadence, seconds.
pub const DEFAULT_RESAMPLE_INTERVAL_S: f64 = 5.0;

/// Process and observation covariances, both identity scaled. Only their
/// ratio changes the smoothing; 1.0/1.0 gives a steady-state gain of ~0.62.
#[derive(Clone, Copy, Debug)]
pub struct SmootherConfig {
    pub process_noise: f64,
    pub observation_noise: f64,
}

impl Default for SmootherConfig {
    fn default() -> Self {
        Self {
            process_noise: 1.0,
            observation_noise: 1.0,
        }
    }
}

/// Replace raw (lat, lon) with smoothed state estimates in place.
///
/// Forward filter followed by an RTS backward pass. Fewer than 2 points is
/// a no-op. With the identity transition, the predicted mean at each step
/// equals the previous filtered mean, which keeps both passes short.
pub fn kalman_smooth(points: &mut [TrajectoryPoint], config: &SmootherConfig) {
    let n = points.len();
    if n < 2 {
        return;
    }

    let q = Matrix2::identity() * config.process_noise;
    let r = Matrix2::identity() * config.observation_noise;

    let mut filtered_means: Vec<Vector2<f64>> = Vec::with_capacity(n);
    let mut filtered_covs: Vec<Matrix2<f64>> = Vec::with_capacity(n);
    let mut predicted_covs: Vec<Matrix2<f64>> = Vec::with_capacity(n);

    let mut x = Vector2::new(points[0].latitude, points[0].longitude);
    let mut p = Matrix2::identity();

    for (k, point) in points.iter().enumerate() {
        if k > 0 {
            p += q;
        }
        predicted_covs.push(p);

        let z = Vector2::new(point.latitude, point.longitude);
        let innovation_cov = p + r;
        if let Some(s_inv) = innovation_cov.try_inverse() {
            let gain = p * s_inv;
            x += gain * (z - x);
            p = (Matrix2::identity() - gain) * p;
        }
        filtered_means.push(x);
        filtered_covs.push(p);
    }

    let mut smoothed = filtered_means.clone();
    for k in (0..n - 1).rev() {
        if let Some(pred_inv) = predicted_covs[k + 1].try_inverse() {
            let smoother_gain = filtered_covs[k] * pred_inv;
            // Predicted mean at k+1 equals the filtered mean at k
            smoothed[k] = filtered_means[k] + smoother_gain * (smoothed[k + 1] - filtered_means[k]);
        }
    }

    for (point, state) in points.iter_mut().zip(smoothed.iter()) {
        point.latitude = state[0];
        point.longitude = state[1];
    }
}

/// Reindex a trajectory to a fixed cadence between its first and last
/// timestamp.
///
/// Numeric fields are averaged within each bucket. Empty buckets are filled
/// by forward fill, except latitude/longitude whose interior gaps are
/// linearly interpolated between the surrounding occupied buckets; the
/// first and last bucket always contain data, so no interior lat/lon gap
/// survives. Returns an empty vector for empty input.
pub fn resample(points: &[TrajectoryPoint], interval_s: f64) -> Vec<TrajectoryPoint> {
    if points.is_empty() {
        return Vec::new();
    }
    if interval_s <= 0.0 {
        return points.to_vec();
    }

    let t0 = points[0].timestamp;
    let t_end = points[points.len() - 1].timestamp;
    let bucket_count = ((t_end - t0) / interval_s).floor() as usize + 1;

    #[derive(Default, Clone)]
    struct Accumulator {
        count: usize,
        lat: f64,
        lon: f64,
        elevation: MeanField,
        distance: MeanField,
        time_delta: MeanField,
        speed: MeanField,
    }

    let mut buckets = vec![Accumulator::default(); bucket_count];
    for point in points {
        let index = (((point.timestamp - t0) / interval_s).floor() as usize).min(bucket_count - 1);
        let acc = &mut buckets[index];
        acc.count += 1;
        acc.lat += point.latitude;
        acc.lon += point.longitude;
        acc.elevation.add(point.elevation);
        acc.distance.add(point.distance_m);
        acc.time_delta.add(point.time_delta_s);
        acc.speed.add(point.speed_ms);
    }

    let mut latitudes: Vec<Option<f64>> = Vec::with_capacity(bucket_count);
    let mut longitudes: Vec<Option<f64>> = Vec::with_capacity(bucket_count);
    for acc in &buckets {
        if acc.count > 0 {
            latitudes.push(Some(acc.lat / acc.count as f64));
            longitudes.push(Some(acc.lon / acc.count as f64));
        } else {
            latitudes.push(None);
            longitudes.push(None);
        }
    }
    interpolate_gaps(&mut latitudes);
    interpolate_gaps(&mut longitudes);

    let mut output = Vec::with_capacity(bucket_count);
    let mut last_elevation = None;
    let mut last_distance = None;
    let mut last_time_delta = None;
    let mut last_speed = None;
    for (k, acc) in buckets.iter().enumerate() {
        // interpolate_gaps filled every bucket; the fallback is unreachable
        // while the first bucket holds the first point
        let lat = latitudes[k].unwrap_or(points[0].latitude);
        let lon = longitudes[k].unwrap_or(points[0].longitude);

        let mut point = TrajectoryPoint::new(t0 + k as f64 * interval_s, lat, lon);
        if acc.count > 0 {
            last_elevation = acc.elevation.mean().or(last_elevation);
            last_distance = acc.distance.mean().or(last_distance);
            last_time_delta = acc.time_delta.mean().or(last_time_delta);
            last_speed = acc.speed.mean().or(last_speed);
        }
        point.elevation = last_elevation;
        point.distance_m = last_distance;
        point.time_delta_s = last_time_delta;
        point.speed_ms = last_speed;
        point.reliability = Reliability::Reliable;
        output.push(point);
    }

    output
}

#[derive(Default, Clone, Copy)]
struct MeanField {
    sum: f64,
    count: usize,
}

impl MeanField {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<f64> {
        if self.count > 0 {
            Some(self.sum / self.count as f64)
        } else {
            None
        }
    }
}

/// Linearly interpolate interior runs of `None` between known values and
/// forward-fill anything left at the trailing edge. Leading gaps stay empty
/// since there is nothing to anchor them.
fn interpolate_gaps(values: &mut [Option<f64>]) {
    let mut last_known: Option<(usize, f64)> = None;
    let mut i = 0;
    while i < values.len() {
        match values[i] {
            Some(v) => {
                last_known = Some((i, v));
                i += 1;
            }
            None => {
                let gap_start = i;
                let mut j = i;
                while j < values.len() && values[j].is_none() {
                    j += 1;
                }
                match (last_known, values.get(j).copied().flatten()) {
                    (Some((left_index, left)), Some(right)) => {
                        let span = (j - left_index) as f64;
                        for (offset, slot) in values[gap_start..j].iter_mut().enumerate() {
                            let fraction = (gap_start + offset - left_index) as f64 / span;
                            *slot = Some(left + (right - left) * fraction);
                        }
                    }
                    (Some((_, left)), None) => {
                        for slot in values[gap_start..j].iter_mut() {
                            *slot = Some(left);
                        }
                    }
                    (None, _) => {}
                }
                i = j;
            }
        }
    }
}
