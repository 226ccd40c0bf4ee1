//! Summary statistics over a sequence of per-run measurements.
//!
//! A direct generalization of the teacher's `monitor::regression` trend
//! analysis into a scenario-keyed descriptive-statistics tracker: mean,
//! median, sample stddev, percentiles via linear interpolation,
//! coefficient of variation, and a Student's-t confidence interval.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunStatistics {
    pub sample_size: usize,
    pub mean: f64,
    pub median: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub p50: f64,
    pub p95: f64,
    pub p99: f64,
    pub coefficient_of_variation: f64,
    pub confidence_interval_95: (f64, f64),
}

impl RunStatistics {
    /// `None` for an empty sample; statistics are undefined.
    pub fn compute(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let mut sorted = samples.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN sample"));

        let n = sorted.len();
        let mean = sorted.iter().sum::<f64>() / n as f64;
        let median = percentile(&sorted, 50.0);
        let stddev = sample_stddev(&sorted, mean);
        let cv = if mean.abs() > f64::EPSILON { (stddev / mean) * 100.0 } else { 0.0 };
        let t = t_value(n, 0.95);
        let margin = t * stddev / (n as f64).sqrt();

        Some(Self {
            sample_size: n,
            mean,
            median,
            stddev,
            min: sorted[0],
            max: sorted[n - 1],
            p50: percentile(&sorted, 50.0),
            p95: percentile(&sorted, 95.0),
            p99: percentile(&sorted, 99.0),
            coefficient_of_variation: cv,
            confidence_interval_95: (mean - margin, mean + margin),
        })
    }

    /// Whether this run's stats qualify as a statistically valid baseline:
    /// CV within `cv_tolerance_pct`, at least `min_runs` samples, and CI
    /// width no wider than 20% of the mean.
    pub fn is_statistically_valid(&self, cv_tolerance_pct: f64, min_runs: usize) -> bool {
        if self.sample_size < min_runs {
            return false;
        }
        if self.coefficient_of_variation > cv_tolerance_pct {
            return false;
        }
        let ci_width = self.confidence_interval_95.1 - self.confidence_interval_95.0;
        let mean_fraction = if self.mean.abs() > f64::EPSILON { ci_width / self.mean } else { f64::INFINITY };
        mean_fraction <= 0.20
    }
}

/// |z-score| > threshold flags a sample as an outlier relative to the
/// sample's own mean/stddev.
pub fn outliers<'a>(samples: &'a [f64], mean: f64, stddev: f64, z_threshold: f64) -> Vec<(usize, &'a f64)> {
    if stddev <= f64::EPSILON {
        return Vec::new();
    }
    samples
        .iter()
        .enumerate()
        .filter(|(_, &value)| ((value - mean) / stddev).abs() > z_threshold)
        .collect()
}

fn sample_stddev(sorted: &[f64], mean: f64) -> f64 {
    let n = sorted.len();
    if n < 2 {
        return 0.0;
    }
    let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    variance.sqrt()
}

/// Linear-interpolation percentile on an already-sorted sample.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let rank = (pct / 100.0) * (n - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = rank - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Student's-t approximation per the table in the component design: only
/// two sample-size buckets are modeled (n=10, n>=30) at two confidence
/// levels, which is all the tracker needs.
fn t_value(n: usize, confidence: f64) -> f64 {
    match (n >= 30, confidence >= 0.99) {
        (true, false) => 1.96,
        (false, false) => 2.262,
        (true, true) => 2.576,
        (false, true) => 3.250,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_monotonicity() {
        let samples: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        let stats = RunStatistics::compute(&samples).unwrap();
        assert!(stats.p50 <= stats.p95);
        assert!(stats.p95 <= stats.p99);
        assert!(stats.p99 <= stats.max);
    }

    #[test]
    fn idempotent_recomputation() {
        let samples = vec![10.0, 12.0, 11.0, 9.0, 13.0];
        let a = RunStatistics::compute(&samples).unwrap();
        let b = RunStatistics::compute(&samples).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn flags_outliers_past_z_threshold() {
        let samples = vec![10.0, 10.2, 9.8, 10.1, 9.9, 50.0];
        let stats = RunStatistics::compute(&samples).unwrap();
        let flagged = outliers(&samples, stats.mean, stats.stddev, 2.0);
        assert_eq!(flagged.len(), 1);
        assert_eq!(*flagged[0].1, 50.0);
    }

    #[test]
    fn empty_sample_is_none() {
        assert!(RunStatistics::compute(&[]).is_none());
    }
}
