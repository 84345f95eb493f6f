//! Bootstrap resampling - point estimates with percentile CIs
//!
//! Resamples with replacement, computes the estimator on each resample, and
//! takes empirical percentiles of the resulting distribution as the CI.
//! Degenerate input (all values identical) collapses the interval to a single
//! point; that is the mathematically honest answer and is never smoothed into
//! a false appearance of uncertainty.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{mean, median, percentile_of_sorted};

/// Estimator applied to each resample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Estimator {
    /// Arithmetic mean.
    Mean,
    /// Median.
    Median,
}

impl Estimator {
    fn apply(self, samples: &[f64]) -> f64 {
        match self {
            Self::Mean => mean(samples),
            Self::Median => median(samples),
        }
    }
}

/// Point estimate with a percentile bootstrap confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapEstimate {
    /// Estimator applied to the original sample.
    pub point: f64,
    /// Lower CI bound.
    pub ci_lower: f64,
    /// Upper CI bound.
    pub ci_upper: f64,
    /// Confidence level of the interval.
    pub confidence: f64,
    /// True when fewer than two samples were available; all three values are
    /// then the raw input (or zero for an empty sample) and the interval
    /// carries no meaning.
    pub insufficient_samples: bool,
}

impl BootstrapEstimate {
    /// CI half-width.
    #[must_use]
    pub fn half_width(&self) -> f64 {
        (self.ci_upper - self.ci_lower) / 2.0
    }

    /// True when the interval collapsed to a single point. Expected for
    /// degenerate (constant) input; downstream reporting flags it rather
    /// than treating it as a defect.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.ci_lower == self.ci_upper
    }
}

/// Bootstrap aggregator with a deterministic seeded RNG.
#[derive(Debug, Clone)]
pub struct BootstrapAggregator {
    n_resamples: usize,
    confidence: f64,
    seed: u64,
}

impl BootstrapAggregator {
    /// Create an aggregator.
    ///
    /// `n_resamples` and `confidence` are validated by the owning
    /// configuration; the same seed always reproduces the same intervals.
    #[must_use]
    pub const fn new(n_resamples: usize, confidence: f64, seed: u64) -> Self {
        Self {
            n_resamples,
            confidence,
            seed,
        }
    }

    /// Point estimate and percentile CI for `estimator` over `samples`.
    ///
    /// Fewer than two samples cannot support an interval: the raw value is
    /// returned as all three outputs with `insufficient_samples` set.
    #[must_use]
    pub fn aggregate(&self, samples: &[f64], estimator: Estimator) -> BootstrapEstimate {
        if samples.len() < 2 {
            let value = samples.first().copied().unwrap_or(0.0);
            return BootstrapEstimate {
                point: value,
                ci_lower: value,
                ci_upper: value,
                confidence: self.confidence,
                insufficient_samples: true,
            };
        }

        let point = estimator.apply(samples);
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut resample = vec![0.0; samples.len()];
        let mut stats = Vec::with_capacity(self.n_resamples);
        for _ in 0..self.n_resamples {
            for slot in &mut resample {
                *slot = samples[rng.gen_range(0..samples.len())];
            }
            stats.push(estimator.apply(&resample));
        }
        stats.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        let alpha = 1.0 - self.confidence;
        let ci_lower = percentile_of_sorted(&stats, alpha / 2.0 * 100.0);
        let ci_upper = percentile_of_sorted(&stats, (1.0 - alpha / 2.0) * 100.0);

        BootstrapEstimate {
            point,
            ci_lower,
            ci_upper,
            confidence: self.confidence,
            insufficient_samples: false,
        }
    }
}
