//! Road-network snapping through an external map-matching service.
//!
//! Snapping corrects small-scale lateral drift by pulling fixes onto the
//! road network. It is a best-effort enhancement: any service failure falls
//! back to the unmodified input trajectory, and callers can tell which
//! happened from the returned [`SnapStatus`].

use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::trajectory::{recompute_derived, TrajectoryPoint};

/// Per-request point limit of the matching service, minus headroom.
pub const DEFAULT_BATCH_SIZE: usize = 90;

/// Traces longer than this are uniformly subsampled before batching to
/// stay inside daily quota limits.
pub const DEFAULT_MAX_POINTS: usize = 500;

/// Errors from the road-matching service.
#[derive(Debug, Clone)]
pub enum SnapError {
    /// No API credential was supplied. Not retryable; surfaced immediately.
    MissingApiKey,
    Http(u16),
    Network(String),
    Decode(String),
}

impl Display for SnapError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            SnapError::MissingApiKey => write!(f, "road-matching API key is missing"),
            SnapError::Http(code) => write!(f, "HTTP error: {}", code),
            SnapError::Network(msg) => write!(f, "network error: {}", msg),
            SnapError::Decode(msg) => write!(f, "response decode error: {}", msg),
        }
    }
}

impl std::error::Error for SnapError {}

/// How the snap stage resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapStatus {
    /// The trajectory was replaced with road-snapped points
    Snapped,
    /// The service failed; the input passed through unchanged
    Fallback,
    /// No matcher was configured, or there was nothing to snap
    Skipped,
}

/// Contract for an external road-matching service: an ordered batch of
/// (lat, lon) pairs in, an ordered snapped batch out, possibly with
/// interpolated points inserted along the matched path.
#[async_trait]
pub trait RoadMatcher: Send + Sync {
    async fn snap(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, SnapError>;
}

/// Google Roads API client (`snapToRoads` endpoint).
pub struct GoogleRoadsClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GoogleRoadsClient {
    /// Build a client. An empty or whitespace key is a configuration error
    /// and fails here rather than on the first request.
    pub fn new(api_key: impl Into<String>) -> Result<Self, SnapError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SnapError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SnapError::Network(e.to_string()))?;

        Ok(GoogleRoadsClient {
            client,
            base_url: "https://roads.googleapis.com/v1/snapToRoads".to_string(),
            api_key,
        })
    }

    /// Override the endpoint, mainly for tests against a local stub.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Deserialize)]
struct SnapResponse {
    #[serde(default, rename = "snappedPoints")]
    snapped_points: Vec<SnappedPoint>,
}

#[derive(Deserialize)]
struct SnappedPoint {
    location: SnapLocation,
}

#[derive(Deserialize)]
struct SnapLocation {
    latitude: f64,
    longitude: f64,
}

#[async_trait]
impl RoadMatcher for GoogleRoadsClient {
    async fn snap(&self, points: &[(f64, f64)]) -> Result<Vec<(f64, f64)>, SnapError> {
        let path = points
            .iter()
            .map(|(lat, lon)| format!("{},{}", lat, lon))
            .collect::<Vec<_>>()
            .join("|");

        let response = self
            .client
            .get(&self.base_url)
            .query(&[
                ("path", path.as_str()),
                ("interpolate", "true"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SnapError::Network("request timed out".to_string())
                } else {
                    SnapError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SnapError::Http(status.as_u16()));
        }

        let body: SnapResponse = response
            .json()
            .await
            .map_err(|e| SnapError::Decode(e.to_string()))?;

        Ok(body
            .snapped_points
            .into_iter()
            .map(|p| (p.location.latitude, p.location.longitude))
            .collect())
    }
}

/// Result of the snap stage.
#[derive(Clone, Debug)]
pub struct SnapOutput {
    pub trajectory: Vec<TrajectoryPoint>,
    pub status: SnapStatus,
}

/// Snap a trajectory to the road network.
///
/// Traces longer than `max_points` are uniformly subsampled first; the
/// survivors go to the matcher in batches of `batch_size`. On success the
/// snapped points replace the input, with timestamps linearly re-spread
/// across the original start-to-end span (the service returns no timing)
/// and per-step fields recomputed. On any service error the input comes
/// back unchanged with [`SnapStatus::Fallback`].
pub async fn snap_to_roads(
    points: Vec<TrajectoryPoint>,
    matcher: &dyn RoadMatcher,
    batch_size: usize,
    max_points: usize,
) -> SnapOutput {
    if points.is_empty() {
        return SnapOutput {
            trajectory: points,
            status: SnapStatus::Skipped,
        };
    }

    let start_time = points[0].timestamp;
    let end_time = points[points.len() - 1].timestamp;

    let coords = subsample_coords(&points, max_points);
    if coords.len() < points.len() {
        log::info!(
            "subsampled {} points down to {} before road matching",
            points.len(),
            coords.len()
        );
    }

    let batch_size = batch_size.max(1);
    let mut snapped: Vec<(f64, f64)> = Vec::new();
    for batch in coords.chunks(batch_size) {
        match matcher.snap(batch).await {
            Ok(result) => {
                log::debug!("snapped batch of {} points ({} returned)", batch.len(), result.len());
                snapped.extend(result);
            }
            Err(e) => {
                log::warn!("map matching unavailable ({}), using raw-cleaned trace", e);
                return SnapOutput {
                    trajectory: points,
                    status: SnapStatus::Fallback,
                };
            }
        }
    }

    if snapped.is_empty() {
        log::warn!("map matching returned no points, using raw-cleaned trace");
        return SnapOutput {
            trajectory: points,
            status: SnapStatus::Fallback,
        };
    }

    // The service reports no timing, so spread the original span evenly
    // across the snapped sequence.
    let duration = end_time - start_time;
    let count = snapped.len();
    let mut trajectory: Vec<TrajectoryPoint> = snapped
        .into_iter()
        .enumerate()
        .map(|(i, (lat, lon))| {
            let fraction = if count > 1 {
                i as f64 / (count - 1) as f64
            } else {
                0.0
            };
            TrajectoryPoint::new(start_time + duration * fraction, lat, lon)
        })
        .collect();
    recompute_derived(&mut trajectory);

    log::info!("snapped trajectory to {} road points", trajectory.len());
    SnapOutput {
        trajectory,
        status: SnapStatus::Snapped,
    }
}

/// Evenly spaced coordinate subsample, capped at `max_points`.
fn subsample_coords(points: &[TrajectoryPoint], max_points: usize) -> Vec<(f64, f64)> {
    let n = points.len();
    if max_points == 0 || n <= max_points {
        return points.iter().map(|p| p.coords()).collect();
    }
    if max_points == 1 {
        return vec![points[0].coords()];
    }
    (0..max_points)
        .map(|i| {
            let index = (i as f64 * (n - 1) as f64 / (max_points - 1) as f64) as usize;
            points[index].coords()
        })
        .collect()
}
