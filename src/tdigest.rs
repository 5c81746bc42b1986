//! Streaming quantile estimation with a t-digest.
//!
//! The digest summarises an unbounded stream of values in bounded memory as
//! a sorted list of weighted clusters (centroids). Insertion uses the weight
//! limit `W(q) = 4 · compression · q · (1 − q)`, which keeps centroids small
//! near the distribution tails and lets them grow toward the middle, the
//! shape that makes extreme quantiles accurate. When the list grows past
//! `2 · compression` entries, a compression pass re-clusters it with the
//! arcsine scale function, which hard-bounds the list at `2 · compression`
//! centroids no matter how many values have been added.
//!
//! # Example
//!
//! ```
//! use median_stream::TDigest;
//!
//! let mut digest = TDigest::new(100);
//! for i in 1..=1000 {
//!     digest.add(i as f64);
//! }
//!
//! let median = digest.median().unwrap();
//! assert!((median - 500.5).abs() < 25.0);
//! ```

use crate::error::{MedianStreamError, Result};

/// Default compression parameter when none is configured.
pub const DEFAULT_COMPRESSION: usize = 25;

/// Scale constant in the maximum-weight function `W(q)`.
const WEIGHT_MULTIPLIER: f64 = 4.0;

/// A weighted cluster of nearby values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    /// Weighted mean of the clustered values
    pub mean: f64,

    /// Number of values in the cluster; always ≥ 1
    pub count: u64,
}

impl Centroid {
    fn new(mean: f64, count: u64) -> Self {
        Self { mean, count }
    }

    /// Fold a single value into the cluster, updating the mean incrementally.
    fn add(&mut self, x: f64) {
        self.mean = (self.mean * self.count as f64 + x) / (self.count as f64 + 1.0);
        self.count += 1;
    }

    /// Merge another cluster into this one.
    fn merge(&mut self, other: &Centroid) {
        let combined = self.count + other.count;
        self.mean = (self.mean * self.count as f64 + other.mean * other.count as f64)
            / combined as f64;
        self.count = combined;
    }
}

/// Streaming quantile summary with bounded memory.
#[derive(Debug, Clone)]
pub struct TDigest {
    compression: usize,
    centroids: Vec<Centroid>,
    total_count: u64,
    min_value: f64,
    max_value: f64,
}

impl TDigest {
    /// Create an empty digest.
    ///
    /// `compression` is clamped to at least 1; larger values trade memory
    /// for accuracy.
    pub fn new(compression: usize) -> Self {
        Self {
            compression: compression.max(1),
            centroids: Vec::new(),
            total_count: 0,
            min_value: f64::INFINITY,
            max_value: f64::NEG_INFINITY,
        }
    }

    /// Number of values added so far.
    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    /// Whether no value has been added yet.
    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Current number of centroids; never exceeds `2 · compression` after a
    /// compression pass.
    pub fn centroid_count(&self) -> usize {
        self.centroids.len()
    }

    /// Smallest value added so far.
    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    /// Largest value added so far.
    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    /// Maximum permissible centroid weight at quantile position `q`.
    /// Unbounded outside (0, 1).
    fn max_weight(&self, q: f64) -> f64 {
        if q <= 0.0 || q >= 1.0 {
            return f64::INFINITY;
        }
        WEIGHT_MULTIPLIER * self.compression as f64 * q * (1.0 - q)
    }

    /// Add a value to the digest. Never fails.
    pub fn add(&mut self, x: f64) {
        if x < self.min_value {
            self.min_value = x;
        }
        if x > self.max_value {
            self.max_value = x;
        }

        if self.centroids.is_empty() {
            self.centroids.push(Centroid::new(x, 1));
            self.total_count += 1;
            return;
        }

        // Nearest centroid: lower bound on mean, then compare against the
        // left neighbour; ties prefer the left.
        let pos = self.centroids.partition_point(|c| c.mean < x);
        let best_idx = if pos == self.centroids.len() {
            pos - 1
        } else if pos == 0 {
            0
        } else {
            let left = (self.centroids[pos - 1].mean - x).abs();
            let right = (self.centroids[pos].mean - x).abs();
            if left <= right {
                pos - 1
            } else {
                pos
            }
        };

        let cumulative: u64 = self.centroids[..best_idx].iter().map(|c| c.count).sum();
        let q = (cumulative as f64 + self.centroids[best_idx].count as f64 / 2.0)
            / (self.total_count as f64 + 1.0);

        if self.centroids[best_idx].count as f64 + 1.0 <= self.max_weight(q) {
            self.centroids[best_idx].add(x);
        } else {
            self.centroids.push(Centroid::new(x, 1));
            self.centroids
                .sort_unstable_by(|a, b| a.mean.total_cmp(&b.mean));
        }

        self.total_count += 1;

        if self.centroids.len() > self.compression * 2 {
            self.compress();
        }
    }

    /// Arcsine scale function used by the compression pass.
    ///
    /// Maps a quantile position to a cluster-size coordinate; one unit of
    /// k-distance is the largest span a single cluster may cover. The total
    /// k-range is `compression`, so a greedy pass emits at most
    /// `2 · compression` clusters.
    fn k_scale(&self, q: f64) -> f64 {
        let delta = (2 * self.compression) as f64;
        delta / (2.0 * std::f64::consts::PI) * (2.0 * q.clamp(0.0, 1.0) - 1.0).asin()
    }

    /// Re-cluster the centroid list down to the configured bound.
    ///
    /// Single forward pass over the sorted centroids: each one is merged
    /// into the previously emitted cluster while the merged cluster stays
    /// within one k-unit, and emitted as a new cluster otherwise.
    fn compress(&mut self) {
        if self.centroids.len() <= 1 {
            return;
        }

        self.centroids
            .sort_unstable_by(|a, b| a.mean.total_cmp(&b.mean));

        let total = self.total_count as f64;
        let mut sorted = std::mem::take(&mut self.centroids).into_iter();
        let mut compressed: Vec<Centroid> = Vec::with_capacity(2 * self.compression);

        if let Some(first) = sorted.next() {
            compressed.push(first);
        }
        // Count of records in clusters emitted before the currently open one
        let mut cumulative: u64 = 0;
        let mut k_start = self.k_scale(0.0);

        for c in sorted {
            let mut emit_new = false;
            if let Some(open) = compressed.last_mut() {
                let q_right = (cumulative + open.count + c.count) as f64 / total;
                if self.k_scale(q_right) - k_start <= 1.0 {
                    open.merge(&c);
                } else {
                    cumulative += open.count;
                    k_start = self.k_scale(cumulative as f64 / total);
                    emit_new = true;
                }
            }
            if emit_new {
                compressed.push(c);
            }
        }

        self.centroids = compressed;
    }

    /// Estimate the value at quantile `q ∈ [0, 1]`.
    ///
    /// # Errors
    ///
    /// * [`MedianStreamError::QuantileOutOfRange`] if `q` is outside [0, 1]
    /// * [`MedianStreamError::EmptyDigest`] if no value has been added
    pub fn quantile(&self, q: f64) -> Result<f64> {
        if !(0.0..=1.0).contains(&q) {
            return Err(MedianStreamError::QuantileOutOfRange(q));
        }
        if self.total_count == 0 {
            return Err(MedianStreamError::EmptyDigest);
        }
        Ok(self.quantile_unchecked(q))
    }

    /// Quantile lookup with domain and emptiness already validated.
    fn quantile_unchecked(&self, q: f64) -> f64 {
        if q <= 0.0 {
            return self.min_value;
        }
        if q >= 1.0 {
            return self.max_value;
        }

        let total = self.total_count as f64;
        let target = q * total;
        let mut cumulative = 0.0;

        for (i, c) in self.centroids.iter().enumerate() {
            let next = cumulative + c.count as f64;

            if target < next {
                if c.count == 1 {
                    return c.mean;
                }

                let left_bound = if i > 0 {
                    self.centroids[i - 1].mean
                } else {
                    self.min_value
                };
                let right_bound = if i < self.centroids.len() - 1 {
                    self.centroids[i + 1].mean
                } else {
                    self.max_value
                };

                let q_left = cumulative / total;
                let q_right = next / total;
                let t = (q - q_left) / (q_right - q_left);
                return left_bound + (right_bound - left_bound) * t;
            }
            cumulative = next;
        }

        // target == total can fall through on floating-point edge cases
        self.centroids[self.centroids.len() - 1].mean
    }

    /// Estimate the median. Equivalent to `quantile(0.5)`.
    pub fn median(&self) -> Result<f64> {
        self.quantile(0.5)
    }

    /// Arithmetic mean of all inserted values, computed from the centroids.
    fn mean(&self) -> f64 {
        let weighted: f64 = self
            .centroids
            .iter()
            .map(|c| c.mean * c.count as f64)
            .sum();
        weighted / self.total_count as f64
    }

    /// Evaluate the recognized extra statistics by name.
    ///
    /// Recognized names are `mean`, `p90`, `p95` and `p99`; anything else is
    /// silently ignored. Returns an empty list on an empty digest.
    pub fn extra_values(&self, names: &[String]) -> Vec<(String, f64)> {
        if self.total_count == 0 {
            return Vec::new();
        }

        let mut values = Vec::with_capacity(names.len());
        for name in names {
            let value = match name.as_str() {
                "mean" => self.mean(),
                "p90" => self.quantile_unchecked(0.90),
                "p95" => self.quantile_unchecked(0.95),
                "p99" => self.quantile_unchecked(0.99),
                _ => continue,
            };
            values.push((name.clone(), value));
        }
        values
    }

    /// Whether `name` maps to a statistic `extra_values` can produce.
    pub fn is_recognized_extra(name: &str) -> bool {
        matches!(name, "mean" | "p90" | "p95" | "p99")
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let sum: u64 = self.centroids.iter().map(|c| c.count).sum();
        assert_eq!(sum, self.total_count, "centroid counts must sum to total");

        for pair in self.centroids.windows(2) {
            assert!(pair[0].mean <= pair[1].mean, "centroids must stay sorted");
        }

        if let (Some(first), Some(last)) = (self.centroids.first(), self.centroids.last()) {
            assert!(self.min_value <= first.mean);
            assert!(last.mean <= self.max_value);
        }
    }
}

impl Default for TDigest {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION)
    }
}
