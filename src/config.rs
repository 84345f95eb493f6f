//! Configuration for reconciliation, stopping rules, and comparison
//!
//! Every tunable is a named field with fail-fast validation. A missing or
//! nonsensical value is a [`crate::Error::Configuration`] at load time, never
//! a silently substituted default discovered weeks later in a report.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which runs may contribute metric samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePolicy {
    /// Only runs whose reconciliation status is `Verified` (default).
    #[default]
    VerifiedOnly,
    /// Also accept `Pending` runs. Every downstream distribution and
    /// comparison carries an explicit "preliminary" caveat.
    IncludePending,
}

/// Reconciliation tunables: minimum run age, attempt spacing, streak length.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Earliest step must be at least this old before the first query; the
    /// billing upstream is known not to have propagated before this.
    pub min_run_age_minutes: i64,
    /// Minimum spacing between attempts that may extend the stable streak.
    pub min_attempt_spacing_minutes: i64,
    /// Consecutive identical, sufficiently spaced attempts required for
    /// verification. Development profiles use 1, publication profiles 3-4.
    pub required_stable_attempts: u32,
    /// Consecutive failed sweeps before the run is flagged `Warning`.
    pub failure_alert_threshold: u32,
    /// Timeout applied to each upstream query.
    pub query_timeout_secs: u64,
    /// Model filter passed to the usage upstream.
    pub model_filter: String,
}

impl ReconcileConfig {
    /// Profile used by local development: single stable attempt, short age
    /// gate.
    #[must_use]
    pub fn development(model_filter: impl Into<String>) -> Self {
        Self {
            min_run_age_minutes: 1,
            min_attempt_spacing_minutes: 1,
            required_stable_attempts: 1,
            failure_alert_threshold: 5,
            query_timeout_secs: 30,
            model_filter: model_filter.into(),
        }
    }

    /// Profile used for publication-grade experiments.
    #[must_use]
    pub fn publication(model_filter: impl Into<String>) -> Self {
        Self {
            min_run_age_minutes: 30,
            min_attempt_spacing_minutes: 60,
            required_stable_attempts: 3,
            failure_alert_threshold: 5,
            query_timeout_secs: 30,
            model_filter: model_filter.into(),
        }
    }

    /// Minimum run age as a [`Duration`].
    #[must_use]
    pub fn min_run_age(&self) -> Duration {
        Duration::minutes(self.min_run_age_minutes)
    }

    /// Minimum attempt spacing as a [`Duration`].
    #[must_use]
    pub fn min_attempt_spacing(&self) -> Duration {
        Duration::minutes(self.min_attempt_spacing_minutes)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.required_stable_attempts == 0 {
            return Err(Error::Configuration(
                "required_stable_attempts must be >= 1".to_string(),
            ));
        }
        if self.min_attempt_spacing_minutes <= 0 {
            return Err(Error::Configuration(
                "min_attempt_spacing_minutes must be positive".to_string(),
            ));
        }
        if self.min_run_age_minutes < 0 {
            return Err(Error::Configuration(
                "min_run_age_minutes must not be negative".to_string(),
            ));
        }
        if self.failure_alert_threshold == 0 {
            return Err(Error::Configuration(
                "failure_alert_threshold must be >= 1".to_string(),
            ));
        }
        if self.query_timeout_secs == 0 {
            return Err(Error::Configuration(
                "query_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self.model_filter.is_empty() {
            return Err(Error::Configuration(
                "model_filter must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_run_age_minutes: 30,
            min_attempt_spacing_minutes: 60,
            required_stable_attempts: 2,
            failure_alert_threshold: 5,
            query_timeout_secs: 30,
            model_filter: String::new(),
        }
    }
}

/// Stopping rule tunables: run-count floor and ceiling plus the CI
/// convergence threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoppingConfig {
    /// Floor: never stop before this many runs.
    pub min_runs: usize,
    /// Ceiling: stop regardless of CI width at this many runs.
    pub max_runs: usize,
    /// Convergence threshold: CI half-width as a percentage of the mean.
    pub max_half_width_pct: f64,
    /// Absolute half-width fallback used when the mean is zero.
    pub max_half_width_abs: f64,
    /// Bootstrap resamples used for the CI.
    pub bootstrap_resamples: usize,
    /// Confidence level for the CI.
    pub confidence: f64,
}

impl StoppingConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.min_runs == 0 {
            return Err(Error::Configuration("min_runs must be >= 1".to_string()));
        }
        if self.max_runs < self.min_runs {
            return Err(Error::Configuration(format!(
                "max_runs ({}) must be >= min_runs ({})",
                self.max_runs, self.min_runs
            )));
        }
        if !(self.max_half_width_pct > 0.0) {
            return Err(Error::Configuration(
                "max_half_width_pct must be positive".to_string(),
            ));
        }
        if !(self.max_half_width_abs > 0.0) {
            return Err(Error::Configuration(
                "max_half_width_abs must be positive".to_string(),
            ));
        }
        validate_confidence(self.confidence)?;
        if self.bootstrap_resamples < 100 {
            return Err(Error::Configuration(
                "bootstrap_resamples must be >= 100".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for StoppingConfig {
    fn default() -> Self {
        Self {
            min_runs: 3,
            max_runs: 25,
            max_half_width_pct: 10.0,
            max_half_width_abs: 1.0,
            bootstrap_resamples: 10_000,
            confidence: 0.95,
        }
    }
}

/// Pre-specified effect size for an a-priori power estimate.
///
/// Observed ("post-hoc") power is never computed: it is near-tautological
/// with the p-value and adds no information. The effect size here must come
/// from the literature or a pre-registered analysis plan, not from the sample
/// at hand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerConfig {
    /// Pre-specified standardized effect size (Cohen's d scale).
    pub prespecified_effect_size: f64,
    /// Significance level the power estimate assumes.
    pub alpha: f64,
}

/// Comparator tunables: significance level, degeneracy thresholds, and
/// bootstrap parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparatorConfig {
    /// Significance level for all hypothesis tests.
    pub alpha: f64,
    /// Relative CV threshold below which variance is degenerate.
    pub degenerate_cv_threshold: f64,
    /// Relative IQR/median threshold below which variance is degenerate.
    pub degenerate_rel_iqr_threshold: f64,
    /// Bootstrap resamples for effect-size confidence intervals.
    pub bootstrap_resamples: usize,
    /// Confidence level for effect-size confidence intervals.
    pub confidence: f64,
    /// Seed for deterministic bootstrap resampling.
    pub bootstrap_seed: u64,
    /// Optional a-priori power section; `None` omits the section entirely.
    pub power: Option<PowerConfig>,
    /// Which runs contribute samples.
    pub sample_policy: SamplePolicy,
}

impl ComparatorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any field is out of range.
    pub fn validate(&self) -> Result<()> {
        if !(self.alpha > 0.0 && self.alpha < 1.0) {
            return Err(Error::Configuration(
                "alpha must be strictly between 0 and 1".to_string(),
            ));
        }
        if !(self.degenerate_cv_threshold > 0.0) || !(self.degenerate_rel_iqr_threshold > 0.0) {
            return Err(Error::Configuration(
                "degenerate variance thresholds must be positive".to_string(),
            ));
        }
        if self.bootstrap_resamples < 100 {
            return Err(Error::Configuration(
                "bootstrap_resamples must be >= 100".to_string(),
            ));
        }
        validate_confidence(self.confidence)?;
        if let Some(power) = &self.power {
            if !(power.alpha > 0.0 && power.alpha < 1.0) {
                return Err(Error::Configuration(
                    "power.alpha must be strictly between 0 and 1".to_string(),
                ));
            }
            if !power.prespecified_effect_size.is_finite()
                || power.prespecified_effect_size == 0.0
            {
                return Err(Error::Configuration(
                    "power.prespecified_effect_size must be finite and nonzero".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl Default for ComparatorConfig {
    fn default() -> Self {
        Self {
            alpha: 0.05,
            degenerate_cv_threshold: 0.01,
            degenerate_rel_iqr_threshold: 0.01,
            bootstrap_resamples: 10_000,
            confidence: 0.95,
            bootstrap_seed: 0x5eed,
            power: None,
            sample_policy: SamplePolicy::VerifiedOnly,
        }
    }
}

/// Per-model token pricing in USD per million tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPricing {
    /// Price per million input tokens.
    pub input_per_mtok: f64,
    /// Price per million output tokens.
    pub output_per_mtok: f64,
    /// Price per million cached input tokens.
    pub cached_per_mtok: f64,
}

impl ModelPricing {
    /// Validate the pricing table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if any rate is negative or non-finite.
    pub fn validate(&self) -> Result<()> {
        for (name, rate) in [
            ("input_per_mtok", self.input_per_mtok),
            ("output_per_mtok", self.output_per_mtok),
            ("cached_per_mtok", self.cached_per_mtok),
        ] {
            if !rate.is_finite() || rate < 0.0 {
                return Err(Error::Configuration(format!(
                    "pricing rate {name} must be finite and non-negative, got {rate}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_confidence(confidence: f64) -> Result<()> {
    if !(confidence > 0.5 && confidence < 1.0) {
        return Err(Error::Configuration(format!(
            "confidence must be in (0.5, 1.0), got {confidence}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_reconcile_config_needs_model_filter() {
        let config = ReconcileConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_publication_profile_validates() {
        let config = ReconcileConfig::publication("claude-*");
        config.validate().expect("publication profile is valid");
        assert_eq!(config.required_stable_attempts, 3);
        assert_eq!(config.min_attempt_spacing_minutes, 60);
    }

    #[test]
    fn test_zero_stable_attempts_rejected() {
        let config = ReconcileConfig {
            required_stable_attempts: 0,
            model_filter: "m".to_string(),
            ..ReconcileConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(format!("{err}").contains("required_stable_attempts"));
    }

    #[test]
    fn test_stopping_config_ceiling_below_floor_rejected() {
        let config = StoppingConfig {
            min_runs: 10,
            max_runs: 5,
            ..StoppingConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_stopping_config_validates() {
        StoppingConfig::default().validate().expect("valid");
    }

    #[test]
    fn test_comparator_config_rejects_zero_power_effect() {
        let config = ComparatorConfig {
            power: Some(PowerConfig {
                prespecified_effect_size: 0.0,
                alpha: 0.05,
            }),
            ..ComparatorConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sample_policy_default_is_strict() {
        assert_eq!(SamplePolicy::default(), SamplePolicy::VerifiedOnly);
    }

    #[test]
    fn test_pricing_rejects_negative_rate() {
        let pricing = ModelPricing {
            input_per_mtok: 3.0,
            output_per_mtok: -15.0,
            cached_per_mtok: 0.3,
        };
        assert!(pricing.validate().is_err());
    }
}
