//! Metric distributions - samples plus shape statistics per framework
//!
//! Rebuilt from scratch whenever the underlying run set changes, never
//! mutated in place. The degeneracy check is deliberately *relative*: an
//! absolute SD threshold once flagged fractional-dollar cost metrics as
//! "zero variance" while they varied by 20%, because their absolute scale
//! was small. `cv < threshold && iqr/median < threshold` is scale-invariant.

use serde::{Deserialize, Serialize};

use super::registry::MetricRegistry;
use super::MetricSample;
use crate::config::SamplePolicy;
use crate::error::Result;
use crate::run::{ReconciliationStatus, RunRecord};
use crate::stats::{coefficient_of_variation, iqr, mean, median, percentile, skewness, std_dev};

/// One Tukey-fence outlier, reported but never removed from the sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outlier {
    /// Run the outlying sample came from.
    pub run_id: String,
    /// The outlying value.
    pub value: f64,
}

/// Distribution of one metric across one framework's eligible runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDistribution {
    /// Framework the distribution describes.
    pub framework: String,
    /// Metric name.
    pub metric_name: String,
    /// Raw sample values, one per eligible run, in run-ID order.
    pub samples: Vec<f64>,
    /// Run IDs aligned with `samples`.
    pub run_ids: Vec<String>,
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Sample standard deviation.
    pub sd: f64,
    /// Interquartile range.
    pub iqr: f64,
    /// Moment-based skewness.
    pub skewness: f64,
    /// Coefficient of variation `sd / mean`; `None` when the mean is zero.
    pub cv: Option<f64>,
    /// True when both relative spread measures fall under the configured
    /// threshold. Standardized effect sizes are invalid for such groups.
    pub has_degenerate_variance: bool,
    /// Tukey 1.5-IQR outliers, reported only.
    pub outliers: Vec<Outlier>,
    /// True when pending runs contributed samples (preliminary mode).
    pub includes_pending_runs: bool,
}

impl MetricDistribution {
    /// Number of contributing runs.
    #[must_use]
    pub fn n(&self) -> usize {
        self.samples.len()
    }

    /// Samples as [`MetricSample`] records.
    #[must_use]
    pub fn metric_samples(&self) -> Vec<MetricSample> {
        self.run_ids
            .iter()
            .zip(self.samples.iter())
            .map(|(run_id, &value)| MetricSample {
                framework: self.framework.clone(),
                metric_name: self.metric_name.clone(),
                run_id: run_id.clone(),
                value,
            })
            .collect()
    }
}

/// Builds [`MetricDistribution`]s from run records.
#[derive(Debug, Clone)]
pub struct DistributionBuilder {
    registry: MetricRegistry,
    policy: SamplePolicy,
    degenerate_cv_threshold: f64,
    degenerate_rel_iqr_threshold: f64,
}

impl DistributionBuilder {
    /// Create a builder over a resolved registry.
    #[must_use]
    pub const fn new(
        registry: MetricRegistry,
        policy: SamplePolicy,
        degenerate_cv_threshold: f64,
        degenerate_rel_iqr_threshold: f64,
    ) -> Self {
        Self {
            registry,
            policy,
            degenerate_cv_threshold,
            degenerate_rel_iqr_threshold,
        }
    }

    /// Get the sample policy in force.
    #[must_use]
    pub const fn policy(&self) -> SamplePolicy {
        self.policy
    }

    /// Build the distribution of `metric_name` over `framework`'s runs.
    ///
    /// Runs are filtered by the sample policy; runs that cannot provide the
    /// metric are skipped. The metric name is resolved through the registry,
    /// so an unknown name fails fast.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an unregistered metric.
    pub fn build(
        &self,
        framework: &str,
        metric_name: &str,
        runs: &[RunRecord],
    ) -> Result<MetricDistribution> {
        let extractor = self.registry.resolve(metric_name)?;

        let mut samples = Vec::new();
        let mut run_ids = Vec::new();
        let mut includes_pending_runs = false;
        for run in runs {
            if run.framework() != framework {
                continue;
            }
            let status = run.reconciliation().status();
            let eligible = match self.policy {
                SamplePolicy::VerifiedOnly => status == ReconciliationStatus::Verified,
                SamplePolicy::IncludePending => matches!(
                    status,
                    ReconciliationStatus::Verified | ReconciliationStatus::Pending
                ),
            };
            if !eligible {
                continue;
            }
            if status != ReconciliationStatus::Verified {
                includes_pending_runs = true;
            }
            if let Some(value) = extractor(run) {
                samples.push(value);
                run_ids.push(run.run_id().to_string());
            }
        }

        Ok(self.finish(framework, metric_name, samples, run_ids, includes_pending_runs))
    }

    pub(crate) fn finish(
        &self,
        framework: &str,
        metric_name: &str,
        samples: Vec<f64>,
        run_ids: Vec<String>,
        includes_pending_runs: bool,
    ) -> MetricDistribution {
        let sample_mean = mean(&samples);
        let sample_median = median(&samples);
        let sample_sd = std_dev(&samples);
        let sample_iqr = iqr(&samples);
        let sample_skewness = skewness(&samples);
        let cv = coefficient_of_variation(&samples);

        let rel_sd = relative_spread(sample_sd, sample_mean);
        let rel_iqr = relative_spread(sample_iqr, sample_median);
        let has_degenerate_variance = !samples.is_empty()
            && rel_sd < self.degenerate_cv_threshold
            && rel_iqr < self.degenerate_rel_iqr_threshold;

        let outliers = tukey_outliers(&samples, &run_ids);

        MetricDistribution {
            framework: framework.to_string(),
            metric_name: metric_name.to_string(),
            samples,
            run_ids,
            mean: sample_mean,
            median: sample_median,
            sd: sample_sd,
            iqr: sample_iqr,
            skewness: sample_skewness,
            cv,
            has_degenerate_variance,
            outliers,
            includes_pending_runs,
        }
    }
}

/// Relative spread `|spread / center|`.
///
/// Zero spread is zero relative spread regardless of center; nonzero spread
/// around a zero center is infinite relative spread (never degenerate).
fn relative_spread(spread: f64, center: f64) -> f64 {
    if spread == 0.0 {
        0.0
    } else if center == 0.0 {
        f64::INFINITY
    } else {
        (spread / center).abs()
    }
}

/// Tukey 1.5-IQR fence outliers.
fn tukey_outliers(samples: &[f64], run_ids: &[String]) -> Vec<Outlier> {
    if samples.len() < 4 {
        return Vec::new();
    }
    let q1 = percentile(samples, 25.0);
    let q3 = percentile(samples, 75.0);
    let fence = 1.5 * (q3 - q1);
    let (lo, hi) = (q1 - fence, q3 + fence);
    samples
        .iter()
        .zip(run_ids.iter())
        .filter(|(&value, _)| value < lo || value > hi)
        .map(|(&value, run_id)| Outlier {
            run_id: run_id.clone(),
            value,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    use crate::run::{ReconciliationAttempt, StepWindow};
    use crate::usage::UsageTotals;

    fn builder(policy: SamplePolicy) -> DistributionBuilder {
        DistributionBuilder::new(
            MetricRegistry::with_builtins(None).unwrap(),
            policy,
            0.01,
            0.01,
        )
    }

    fn verified_run(run_id: &str, framework: &str, tokens_in: u64) -> RunRecord {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut run = RunRecord::new(run_id, framework);
        run.push_step(StepWindow::new(
            0,
            start,
            start + Duration::minutes(2),
            UsageTotals::default(),
        ));
        let totals = UsageTotals {
            tokens_in,
            tokens_out: 0,
            api_calls: 1,
            cached_tokens: 0,
        };
        for minutes in [60i64, 120] {
            run.reconciliation_mut().append_attempt(
                ReconciliationAttempt::new(start + Duration::minutes(minutes), totals, 1, 1),
                2,
                Duration::minutes(60),
                5,
            );
        }
        assert!(run.reconciliation().is_verified());
        run
    }

    #[test]
    fn test_only_verified_runs_contribute_by_default() {
        let runs = vec![
            verified_run("run-1", "fw", 100),
            verified_run("run-2", "fw", 110),
            RunRecord::new("run-3", "fw"),
        ];
        let dist = builder(SamplePolicy::VerifiedOnly)
            .build("fw", "tokens_in", &runs)
            .unwrap();
        assert_eq!(dist.n(), 2);
        assert!(!dist.includes_pending_runs);
        assert_eq!(dist.run_ids, vec!["run-1", "run-2"]);
    }

    #[test]
    fn test_relative_degeneracy_flags_tight_spread_at_any_scale() {
        // ~0.05% spread, flagged at the original scale and scaled down 100x.
        for scale in [1.0, 0.01] {
            let dist = builder(SamplePolicy::VerifiedOnly).finish(
                "fw",
                "cost_usd",
                vec![1.049 * scale, 1.050 * scale, 1.049 * scale],
                vec!["a".into(), "b".into(), "c".into()],
                false,
            );
            assert!(
                dist.has_degenerate_variance,
                "scale {scale} should be degenerate"
            );
        }
    }

    #[test]
    fn test_small_absolute_sd_with_real_spread_not_degenerate() {
        // ~20% relative spread; absolute SD is tiny but this is not degenerate.
        let dist = builder(SamplePolicy::VerifiedOnly).finish(
            "fw",
            "cost_usd",
            vec![0.010_49, 0.011_52, 0.012_60],
            vec!["a".into(), "b".into(), "c".into()],
            false,
        );
        assert!(!dist.has_degenerate_variance);
    }

    #[test]
    fn test_pending_runs_included_only_with_optin() {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let mut pending = RunRecord::new("run-p", "fw");
        pending.push_step(StepWindow::new(
            0,
            start,
            start + Duration::minutes(1),
            UsageTotals {
                tokens_in: 500,
                tokens_out: 0,
                api_calls: 1,
                cached_tokens: 0,
            },
        ));
        pending.reconciliation_mut().append_attempt(
            ReconciliationAttempt::new(
                start + Duration::minutes(60),
                UsageTotals {
                    tokens_in: 480,
                    tokens_out: 0,
                    api_calls: 1,
                    cached_tokens: 0,
                },
                1,
                1,
            ),
            2,
            Duration::minutes(60),
            5,
        );
        let runs = vec![pending, verified_run("run-v", "fw", 100)];

        let strict = builder(SamplePolicy::VerifiedOnly)
            .build("fw", "tokens_in", &runs)
            .unwrap();
        assert_eq!(strict.n(), 1);

        let relaxed = builder(SamplePolicy::IncludePending)
            .build("fw", "tokens_in", &runs)
            .unwrap();
        assert_eq!(relaxed.n(), 2);
        assert!(relaxed.includes_pending_runs);
        // Pending run contributes its latest successful attempt, not the
        // adapter's preliminary estimate.
        assert!(relaxed.samples.contains(&480.0));
    }

    #[test]
    fn test_outliers_reported_not_removed() {
        let dist = builder(SamplePolicy::VerifiedOnly).finish(
            "fw",
            "tokens_in",
            vec![10.0, 11.0, 9.0, 10.5, 1000.0],
            vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
            false,
        );
        assert_eq!(dist.outliers.len(), 1);
        assert_eq!(dist.outliers[0].run_id, "e");
        // The sample itself keeps all five values.
        assert_eq!(dist.n(), 5);
    }

    #[test]
    fn test_unknown_metric_fails_fast() {
        let err = builder(SamplePolicy::VerifiedOnly)
            .build("fw", "no_such_metric", &[])
            .unwrap_err();
        assert!(matches!(err, crate::Error::Configuration(_)));
    }

    #[test]
    fn test_metric_samples_align() {
        let dist = builder(SamplePolicy::VerifiedOnly).finish(
            "fw",
            "tokens_in",
            vec![1.0, 2.0],
            vec!["a".into(), "b".into()],
            false,
        );
        let samples = dist.metric_samples();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].run_id, "b");
        assert!((samples[1].value - 2.0).abs() < f64::EPSILON);
    }
}
