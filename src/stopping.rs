//! Sequential stopping rule - decide when a framework has enough runs
//!
//! ## Decision Order
//!
//! 1. Fewer than `min_runs` samples: continue, no matter how tight the
//!    interval happens to look. Tiny samples produce accidentally narrow
//!    bootstrap intervals.
//! 2. Bootstrap CI half-width within the configured precision target:
//!    stop, converged.
//! 3. At or past `max_runs`: stop at the ceiling and report the precision
//!    actually achieved, rather than sampling forever on a noisy metric.
//! 4. Otherwise: continue.
//!
//! Precision is relative (half-width as a percentage of the point estimate)
//! except when the point estimate is zero, where the rule falls back to the
//! absolute half-width threshold and flags that convergence was judged on
//! the absolute scale.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::StoppingConfig;
use crate::error::Result;
use crate::metrics::MetricDistribution;
use crate::stats::bootstrap::{BootstrapAggregator, BootstrapEstimate, Estimator};

/// The verdict of the stopping rule for one framework x metric cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// More runs are needed.
    Continue,
    /// The precision target was met.
    StopConverged,
    /// The run ceiling was hit before the precision target.
    StopMaxRuns,
}

impl Decision {
    /// Whether this decision halts sampling.
    #[must_use]
    pub const fn is_stop(self) -> bool {
        matches!(self, Self::StopConverged | Self::StopMaxRuns)
    }
}

/// Full stopping evaluation for one framework x metric cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppingDecision {
    /// Framework evaluated.
    pub framework: String,
    /// Metric evaluated.
    pub metric_name: String,
    /// Number of eligible runs in the sample.
    pub n_runs: usize,
    /// Bootstrap estimate of the mean for this cell.
    pub estimate: BootstrapEstimate,
    /// CI half-width as a percentage of the point estimate, `None` when the
    /// point estimate is zero.
    pub ci_half_width_pct_of_mean: Option<f64>,
    /// True when the point estimate was zero and convergence was judged on
    /// the absolute half-width instead of the relative one.
    pub used_absolute_fallback: bool,
    /// The verdict.
    pub decision: Decision,
}

/// Evaluates the stopping rule from a metric distribution.
#[derive(Debug, Clone)]
pub struct StoppingRuleEvaluator {
    config: StoppingConfig,
    aggregator: BootstrapAggregator,
}

impl StoppingRuleEvaluator {
    /// Create an evaluator, validating the config up front.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an invalid config.
    pub fn new(config: StoppingConfig, bootstrap_seed: u64) -> Result<Self> {
        config.validate()?;
        let aggregator =
            BootstrapAggregator::new(config.bootstrap_resamples, config.confidence, bootstrap_seed);
        Ok(Self { config, aggregator })
    }

    /// Stopping config in force.
    #[must_use]
    pub const fn config(&self) -> &StoppingConfig {
        &self.config
    }

    /// Evaluate the stopping rule for one distribution.
    #[must_use]
    pub fn evaluate(&self, dist: &MetricDistribution) -> StoppingDecision {
        let n_runs = dist.n();
        let estimate = self.aggregator.aggregate(&dist.samples, Estimator::Mean);
        let half_width = estimate.half_width();

        let (ci_half_width_pct_of_mean, used_absolute_fallback, precise_enough) =
            if estimate.point == 0.0 {
                (
                    None,
                    true,
                    half_width <= self.config.max_half_width_abs,
                )
            } else {
                let pct = 100.0 * half_width / estimate.point.abs();
                (Some(pct), false, pct <= self.config.max_half_width_pct)
            };

        let decision = if n_runs < self.config.min_runs {
            Decision::Continue
        } else if precise_enough && !estimate.insufficient_samples {
            Decision::StopConverged
        } else if n_runs >= self.config.max_runs {
            Decision::StopMaxRuns
        } else {
            Decision::Continue
        };

        debug!(
            framework = %dist.framework,
            metric = %dist.metric_name,
            n_runs,
            half_width,
            ?decision,
            "stopping rule evaluated"
        );

        StoppingDecision {
            framework: dist.framework.clone(),
            metric_name: dist.metric_name.clone(),
            n_runs,
            estimate,
            ci_half_width_pct_of_mean,
            used_absolute_fallback,
            decision,
        }
    }
}
