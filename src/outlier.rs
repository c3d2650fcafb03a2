//! Density-based outlier rejection over the (lat, lon) point cloud.
//!
//! An isolation forest scores every point by how quickly random axis-aligned
//! splits isolate it from the rest of the trace. Spatially isolated noise
//! spikes, the single wild jumps that survive the angle filter because they
//! never form a sharp triple, isolate in a handful of splits and score high.
//! The `contamination` fraction of highest-scoring points is dropped.
//!
//! This is a batch, order-independent operation: the forest is fitted fresh
//! on every trace and holds no state between runs.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::trajectory::TrajectoryPoint;

/// Euler-Mascheroni constant, used by the average path length estimate.
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Isolation forest settings.
#[derive(Clone, Debug)]
pub struct ForestConfig {
    /// Number of trees in the forest
    pub num_trees: usize,
    /// Per-tree training subsample size (without replacement)
    pub sample_size: usize,
    /// Expected fraction of anomalous points
    pub contamination: f64,
    /// RNG seed; a fixed seed makes a trace's verdicts reproducible
    pub seed: u64,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            num_trees: 100,
            sample_size: 256,
            contamination: 0.05,
            seed: 42,
        }
    }
}

enum Node {
    Internal {
        feature: usize,
        split: f64,
        left: usize,
        right: usize,
    },
    External {
        size: usize,
    },
}

struct IsolationTree {
    nodes: Vec<Node>,
}

impl IsolationTree {
    fn fit(samples: &[[f64; 2]], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut nodes = Vec::new();
        Self::build(&mut nodes, samples, 0, max_depth, rng);
        IsolationTree { nodes }
    }

    fn build(
        nodes: &mut Vec<Node>,
        samples: &[[f64; 2]],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let index = nodes.len();

        if depth >= max_depth || samples.len() <= 1 {
            nodes.push(Node::External {
                size: samples.len(),
            });
            return index;
        }

        let split = match Self::select_split(samples, rng) {
            Some(s) => s,
            // No feature has spread: all samples identical
            None => {
                nodes.push(Node::External {
                    size: samples.len(),
                });
                return index;
            }
        };

        let (feature, split_value) = split;
        let mut left_samples = Vec::new();
        let mut right_samples = Vec::new();
        for sample in samples {
            if sample[feature] < split_value {
                left_samples.push(*sample);
            } else {
                right_samples.push(*sample);
            }
        }

        if left_samples.is_empty() || right_samples.is_empty() {
            nodes.push(Node::External {
                size: samples.len(),
            });
            return index;
        }

        // Reserve this slot, then fill it in once the children exist
        nodes.push(Node::External { size: 0 });
        let left = Self::build(nodes, &left_samples, depth + 1, max_depth, rng);
        let right = Self::build(nodes, &right_samples, depth + 1, max_depth, rng);
        nodes[index] = Node::Internal {
            feature,
            split: split_value,
            left,
            right,
        };

        index
    }

    /// Pick a random feature with spread and a random split inside its range.
    fn select_split(samples: &[[f64; 2]], rng: &mut StdRng) -> Option<(usize, f64)> {
        let first = rng.gen_range(0..2usize);
        for feature in [first, 1 - first] {
            let mut min_val = f64::INFINITY;
            let mut max_val = f64::NEG_INFINITY;
            for sample in samples {
                min_val = min_val.min(sample[feature]);
                max_val = max_val.max(sample[feature]);
            }
            if max_val - min_val > f64::EPSILON {
                return Some((feature, rng.gen_range(min_val..max_val)));
            }
        }
        None
    }

    fn path_length(&self, sample: &[f64; 2]) -> f64 {
        let mut index = 0usize;
        let mut depth = 0.0;
        loop {
            match &self.nodes[index] {
                Node::External { size } => return depth + average_path_length(*size),
                Node::Internal {
                    feature,
                    split,
                    left,
                    right,
                } => {
                    depth += 1.0;
                    index = if sample[*feature] < *split { *left } else { *right };
                }
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points.
/// Normalizes raw path lengths so scores are comparable across trace sizes.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted isolation forest over 2-D samples.
pub struct IsolationForest {
    trees: Vec<IsolationTree>,
    subsample: usize,
}

impl IsolationForest {
    /// Fit the forest on the given samples.
    ///
    /// Each tree trains on a random subsample (Fisher-Yates, without
    /// replacement) capped at `config.sample_size`; tree depth is capped at
    /// `ceil(log2(subsample))`, past which isolation adds no signal.
    pub fn fit(samples: &[[f64; 2]], config: &ForestConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let subsample = config.sample_size.min(samples.len()).max(1);
        let max_depth = (subsample as f64).log2().ceil().max(1.0) as usize;

        let trees = (0..config.num_trees)
            .map(|_| {
                let subset = sample_subset(samples, subsample, &mut rng);
                IsolationTree::fit(&subset, max_depth, &mut rng)
            })
            .collect();

        IsolationForest { trees, subsample }
    }

    /// Anomaly score in (0, 1): `2^(-E(h(x)) / c(n))`. Scores near 1 mean
    /// the sample isolates quickly; ~0.5 is unremarkable.
    pub fn score(&self, sample: &[f64; 2]) -> f64 {
        if self.trees.is_empty() {
            return 0.5;
        }
        let total: f64 = self.trees.iter().map(|t| t.path_length(sample)).sum();
        let avg = total / self.trees.len() as f64;
        let normalizer = average_path_length(self.subsample);
        if normalizer <= 0.0 {
            return 0.5;
        }
        2f64.powf(-avg / normalizer)
    }
}

fn sample_subset(samples: &[[f64; 2]], count: usize, rng: &mut StdRng) -> Vec<[f64; 2]> {
    if count >= samples.len() {
        return samples.to_vec();
    }
    let mut indices: Vec<usize> = (0..samples.len()).collect();
    for i in 0..count {
        let j = i + rng.gen_range(0..samples.len() - i);
        indices.swap(i, j);
    }
    indices[..count].iter().map(|&i| samples[i]).collect()
}

/// Drop the `floor(contamination * n)` highest-scoring points.
///
/// Traces too short for that product to reach 1 pass through untouched, so
/// a clean handful of fixes is never thinned just to satisfy the fraction.
/// Order is preserved.
pub fn remove_outliers(points: Vec<TrajectoryPoint>, config: &ForestConfig) -> Vec<TrajectoryPoint> {
    let n = points.len();
    let drop_count = (n as f64 * config.contamination).floor() as usize;
    if drop_count == 0 {
        return points;
    }

    let samples: Vec<[f64; 2]> = points.iter().map(|p| [p.latitude, p.longitude]).collect();
    let forest = IsolationForest::fit(&samples, config);

    let mut scored: Vec<(usize, f64)> = samples
        .iter()
        .enumerate()
        .map(|(i, s)| (i, forest.score(s)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut dropped = vec![false; n];
    for &(index, _) in scored.iter().take(drop_count) {
        dropped[index] = true;
    }

    log::info!("outlier detector removed {} of {} points", drop_count, n);

    points
        .into_iter()
        .enumerate()
        .filter(|(i, _)| !dropped[*i])
        .map(|(_, p)| p)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trajectory::TrajectoryPoint;

    /// A tight cluster of fixes along a street plus one planted spike.
    fn clustered_points(n: usize, spike_at: usize) -> Vec<TrajectoryPoint> {
        (0..n)
            .map(|i| {
                let mut point = TrajectoryPoint::new(
                    i as f64 * 5.0,
                    22.3193 + i as f64 * 1e-5,
                    114.1694 + i as f64 * 1e-5,
                );
                if i == spike_at {
                    point.latitude += 0.05;
                    point.longitude -= 0.05;
                }
                point
            })
            .collect()
    }

    #[test]
    fn test_planted_spike_scores_highest() {
        let points = clustered_points(100, 40);
        let samples: Vec<[f64; 2]> = points.iter().map(|p| [p.latitude, p.longitude]).collect();
        let forest = IsolationForest::fit(&samples, &ForestConfig::default());

        let spike_score = forest.score(&samples[40]);
        let typical_score = forest.score(&samples[10]);
        assert!(
            spike_score > typical_score,
            "spike {} should outscore typical {}",
            spike_score,
            typical_score
        );
    }

    #[test]
    fn test_remove_outliers_drops_spike() {
        let points = clustered_points(100, 40);
        let cleaned = remove_outliers(points, &ForestConfig::default());

        assert_eq!(cleaned.len(), 95, "5% of 100 points dropped");
        assert!(
            !cleaned.iter().any(|p| p.latitude > 22.35),
            "the planted spike should be among the dropped points"
        );
    }

    #[test]
    fn test_small_trace_passes_through() {
        let points = clustered_points(5, 2);
        let cleaned = remove_outliers(points.clone(), &ForestConfig::default());
        assert_eq!(cleaned.len(), points.len());
    }

    #[test]
    fn test_deterministic_under_fixed_seed() {
        let points = clustered_points(80, 17);
        let first = remove_outliers(points.clone(), &ForestConfig::default());
        let second = remove_outliers(points, &ForestConfig::default());

        let a: Vec<f64> = first.iter().map(|p| p.timestamp).collect();
        let b: Vec<f64> = second.iter().map(|p| p.timestamp).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_order_preserved() {
        let points = clustered_points(60, 30);
        let cleaned = remove_outliers(points, &ForestConfig::default());
        for pair in cleaned.windows(2) {
            assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn test_identical_points_do_not_panic() {
        let points: Vec<TrajectoryPoint> = (0..40)
            .map(|i| TrajectoryPoint::new(i as f64, 22.3193, 114.1694))
            .collect();
        let cleaned = remove_outliers(points, &ForestConfig::default());
        assert_eq!(cleaned.len(), 38);
    }

    #[test]
    fn test_average_path_length_growth() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        assert!(average_path_length(256) > average_path_length(16));
    }
}
