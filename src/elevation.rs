//! Batched elevation enrichment and ascent/descent analysis.
//!
//! Elevation lookups go to an external service in capped batches at a
//! capped request rate, with retry and exponential backoff per batch. A
//! batch that exhausts its retries defaults to 0.0 and the run continues;
//! elevation is an enrichment, never a reason to abort a trace.

use std::fmt::{Display, Formatter};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::trajectory::TrajectoryPoint;

/// Public Open-Elevation lookup endpoint.
pub const DEFAULT_ELEVATION_URL: &str = "https://api.open-elevation.com/api/v1/lookup";

/// Errors from the elevation service or elevation analysis.
#[derive(Debug, Clone)]
pub enum ElevationError {
    Http(u16),
    Network(String),
    Decode(String),
    /// No point in the trajectory carries elevation data
    MissingData,
}

impl Display for ElevationError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            ElevationError::Http(code) => write!(f, "HTTP error: {}", code),
            ElevationError::Network(msg) => write!(f, "network error: {}", msg),
            ElevationError::Decode(msg) => write!(f, "response decode error: {}", msg),
            ElevationError::MissingData => write!(f, "no elevation data on any point"),
        }
    }
}

impl std::error::Error for ElevationError {}

/// Contract for an external elevation service: one elevation in meters per
/// input (lat, lon), in input order.
#[async_trait]
pub trait ElevationProvider: Send + Sync {
    async fn lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError>;
}

/// Batching, pacing and retry settings for the enricher.
#[derive(Clone, Debug)]
pub struct EnricherConfig {
    /// Points per request
    pub batch_size: usize,
    /// Request rate cap, enforced by sleeping between batches
    pub requests_per_second: f64,
    /// Attempts per batch before defaulting to 0.0
    pub max_retries: u32,
}

impl Default for EnricherConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            requests_per_second: 15.0,
            max_retries: 3,
        }
    }
}

/// What the enricher managed to do, so callers can tell a fully enriched
/// trajectory from one carrying defaulted batches.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub batches: usize,
    pub failed_batches: usize,
}

impl EnrichmentReport {
    pub fn is_degraded(&self) -> bool {
        self.failed_batches > 0
    }
}

/// Open-Elevation API client.
pub struct OpenElevationClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenElevationClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ElevationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ElevationError::Network(e.to_string()))?;

        Ok(OpenElevationClient {
            client,
            base_url: base_url.into(),
        })
    }
}

#[derive(Serialize)]
struct LookupRequest {
    locations: Vec<LocationEntry>,
}

#[derive(Serialize)]
struct LocationEntry {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct LookupResponse {
    results: Vec<ElevationEntry>,
}

#[derive(Deserialize)]
struct ElevationEntry {
    elevation: f64,
}

#[async_trait]
impl ElevationProvider for OpenElevationClient {
    async fn lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
        let request = LookupRequest {
            locations: points
                .iter()
                .map(|&(latitude, longitude)| LocationEntry {
                    latitude,
                    longitude,
                })
                .collect(),
        };

        let response = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ElevationError::Network("request timed out".to_string())
                } else {
                    ElevationError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ElevationError::Http(status.as_u16()));
        }

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| ElevationError::Decode(e.to_string()))?;

        if body.results.len() != points.len() {
            return Err(ElevationError::Decode(format!(
                "expected {} elevations, got {}",
                points.len(),
                body.results.len()
            )));
        }

        Ok(body.results.into_iter().map(|r| r.elevation).collect())
    }
}

/// Attach an elevation to every point.
///
/// Batches of `config.batch_size` points go to the provider with up to
/// `config.max_retries` attempts each, backing off 1 s, 2 s, 4 s between
/// attempts. A batch that exhausts its retries is defaulted to 0.0 and
/// counted in the report. Between batches the enricher sleeps
/// `1 / requests_per_second` to respect the service's rate cap.
pub async fn enrich_with_elevation(
    points: &mut [TrajectoryPoint],
    provider: &dyn ElevationProvider,
    config: &EnricherConfig,
) -> EnrichmentReport {
    let total = points.len();
    let batch_size = config.batch_size.max(1);
    let mut report = EnrichmentReport::default();

    let mut start = 0;
    while start < total {
        let end = (start + batch_size).min(total);
        let coords: Vec<(f64, f64)> = points[start..end].iter().map(|p| p.coords()).collect();
        report.batches += 1;

        let mut success = false;
        for attempt in 0..config.max_retries.max(1) {
            match provider.lookup(&coords).await {
                Ok(elevations) => {
                    for (point, elevation) in points[start..end].iter_mut().zip(elevations) {
                        point.elevation = Some(elevation);
                    }
                    log::debug!("elevation enriched {}/{} points", end, total);
                    success = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "elevation batch {} attempt {}/{} failed: {}",
                        report.batches,
                        attempt + 1,
                        config.max_retries,
                        e
                    );
                    if attempt + 1 < config.max_retries {
                        tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
                    }
                }
            }
        }

        if !success {
            report.failed_batches += 1;
            log::warn!(
                "elevation batch {} exhausted retries, defaulting to 0.0",
                report.batches
            );
            for point in points[start..end].iter_mut() {
                point.elevation = Some(0.0);
            }
        }

        start = end;
        if start < total && config.requests_per_second > 0.0 {
            tokio::time::sleep(Duration::from_secs_f64(1.0 / config.requests_per_second)).await;
        }
    }

    report
}

/// Ascent/descent profile of an elevation-enriched trajectory. Meters,
/// rounded to 2 decimal places.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ElevationProfile {
    pub total_ascent: f64,
    pub total_descent: f64,
    pub max_elevation: f64,
    pub min_elevation: f64,
}

/// Aggregate consecutive elevation deltas in timestamp order.
///
/// The first delta is defined as 0. Positive deltas sum into ascent,
/// the magnitudes of negative deltas into descent. Points without an
/// elevation are skipped; if no point has one, this is a domain error.
pub fn analyze_elevation(points: &[TrajectoryPoint]) -> Result<ElevationProfile, ElevationError> {
    let mut ordered: Vec<&TrajectoryPoint> = points.iter().collect();
    ordered.sort_by(|a, b| {
        a.timestamp
            .partial_cmp(&b.timestamp)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let elevations: Vec<f64> = ordered.iter().filter_map(|p| p.elevation).collect();
    if elevations.is_empty() {
        return Err(ElevationError::MissingData);
    }

    let mut ascent = 0.0;
    let mut descent = 0.0;
    let mut max_elevation = f64::NEG_INFINITY;
    let mut min_elevation = f64::INFINITY;
    let mut previous: Option<f64> = None;
    for &elevation in &elevations {
        if let Some(prev) = previous {
            let delta = elevation - prev;
            if delta > 0.0 {
                ascent += delta;
            } else {
                descent += -delta;
            }
        }
        max_elevation = max_elevation.max(elevation);
        min_elevation = min_elevation.min(elevation);
        previous = Some(elevation);
    }

    Ok(ElevationProfile {
        total_ascent: round2(ascent),
        total_descent: round2(descent),
        max_elevation: round2(max_elevation),
        min_elevation: round2(min_elevation),
    })
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider {
        elevation: f64,
    }

    #[async_trait]
    impl ElevationProvider for FixedProvider {
        async fn lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
            Ok(vec![self.elevation; points.len()])
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl ElevationProvider for FailingProvider {
        async fn lookup(&self, _points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
            Err(ElevationError::Network("connection refused".to_string()))
        }
    }

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyProvider {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ElevationProvider for FlakyProvider {
        async fn lookup(&self, points: &[(f64, f64)]) -> Result<Vec<f64>, ElevationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(ElevationError::Http(503))
            } else {
                Ok(vec![7.0; points.len()])
            }
        }
    }

    fn trace(n: usize) -> Vec<TrajectoryPoint> {
        (0..n)
            .map(|i| TrajectoryPoint::new(i as f64 * 5.0, 22.3, 114.1 + i as f64 * 1e-5))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_enrich_fills_every_point() {
        let mut points = trace(120);
        let provider = FixedProvider { elevation: 31.0 };
        let report =
            enrich_with_elevation(&mut points, &provider, &EnricherConfig::default()).await;

        assert_eq!(report.batches, 3); // 50 + 50 + 20
        assert_eq!(report.failed_batches, 0);
        assert!(!report.is_degraded());
        assert!(points.iter().all(|p| p.elevation == Some(31.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_defaults_to_zero_and_continues() {
        let mut points = trace(60);
        let report =
            enrich_with_elevation(&mut points, &FailingProvider, &EnricherConfig::default()).await;

        assert_eq!(report.batches, 2);
        assert_eq!(report.failed_batches, 2);
        assert!(report.is_degraded());
        assert!(points.iter().all(|p| p.elevation == Some(0.0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_succeed() {
        let mut points = trace(10);
        let provider = FlakyProvider {
            failures: 2,
            calls: AtomicUsize::new(0),
        };
        let report =
            enrich_with_elevation(&mut points, &provider, &EnricherConfig::default()).await;

        assert_eq!(report.failed_batches, 0);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert!(points.iter().all(|p| p.elevation == Some(7.0)));
    }

    #[test]
    fn test_analyze_elevation_known_sequence() {
        let mut points = trace(4);
        for (point, elevation) in points.iter_mut().zip([100.0, 150.0, 120.0, 170.0]) {
            point.elevation = Some(elevation);
        }

        let profile = analyze_elevation(&points).unwrap();
        assert_eq!(profile.total_ascent, 100.0);
        assert_eq!(profile.total_descent, 30.0);
        assert_eq!(profile.max_elevation, 170.0);
        assert_eq!(profile.min_elevation, 100.0);
    }

    #[test]
    fn test_analyze_elevation_sorts_by_timestamp() {
        let mut points = trace(3);
        points[0].elevation = Some(100.0);
        points[1].elevation = Some(200.0);
        points[2].elevation = Some(150.0);
        // Shuffle the slice order; analysis must follow timestamps
        points.swap(0, 2);

        let profile = analyze_elevation(&points).unwrap();
        assert_eq!(profile.total_ascent, 100.0);
        assert_eq!(profile.total_descent, 50.0);
    }

    #[test]
    fn test_analyze_elevation_missing_data() {
        let points = trace(5);
        assert!(matches!(
            analyze_elevation(&points),
            Err(ElevationError::MissingData)
        ));
    }

    // Integration test (requires network, disabled by default)
    #[tokio::test]
    #[ignore]
    async fn test_open_elevation_lookup_integration() {
        let client = OpenElevationClient::new(DEFAULT_ELEVATION_URL).unwrap();
        // Khumbu region, should be well above 4000 m
        let elevations = client.lookup(&[(27.9881, 86.9250)]).await.unwrap();
        assert_eq!(elevations.len(), 1);
        assert!(elevations[0] > 4000.0);
    }

    #[test]
    fn test_analyze_elevation_single_point() {
        let mut points = trace(1);
        points[0].elevation = Some(88.0);
        let profile = analyze_elevation(&points).unwrap();
        assert_eq!(profile.total_ascent, 0.0);
        assert_eq!(profile.total_descent, 0.0);
        assert_eq!(profile.max_elevation, 88.0);
        assert_eq!(profile.min_elevation, 88.0);
    }
}
