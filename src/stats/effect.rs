//! Effect sizes - Cohen's d and Cliff's delta with bootstrap CIs
//!
//! Cohen's d divides by the pooled standard deviation and is meaningless (or
//! explosive) near zero variance; callers intercept that case and use
//! Cliff's delta, which is rank-based and stays well-defined. The two are
//! different units and are never mixed within one comparison family.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::{mean, percentile_of_sorted, variance};
use crate::error::{Error, Result};

/// Which effect size a value is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectSizeKind {
    /// Standardized mean difference (parametric family).
    CohensD,
    /// Dominance probability difference in `[-1, 1]` (rank-based family).
    CliffsDelta,
}

/// Magnitude label for an effect size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Magnitude {
    /// Below the smallest conventional threshold.
    Negligible,
    /// Small effect.
    Small,
    /// Medium effect.
    Medium,
    /// Large effect.
    Large,
}

/// An effect size with its bootstrap confidence interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectSize {
    /// Unit of the value.
    pub kind: EffectSizeKind,
    /// Point value.
    pub value: f64,
    /// Bootstrap CI lower bound.
    pub ci_lower: f64,
    /// Bootstrap CI upper bound.
    pub ci_upper: f64,
}

impl EffectSize {
    /// Conventional magnitude label for the point value.
    ///
    /// Cohen's d uses 0.2 / 0.5 / 0.8; Cliff's delta uses the Romano et al.
    /// 0.147 / 0.33 / 0.474 thresholds.
    #[must_use]
    pub fn magnitude(&self) -> Magnitude {
        let abs = self.value.abs();
        let (small, medium, large) = match self.kind {
            EffectSizeKind::CohensD => (0.2, 0.5, 0.8),
            EffectSizeKind::CliffsDelta => (0.147, 0.33, 0.474),
        };
        if abs < small {
            Magnitude::Negligible
        } else if abs < medium {
            Magnitude::Small
        } else if abs < large {
            Magnitude::Medium
        } else {
            Magnitude::Large
        }
    }

    /// True when the CI collapsed to a point. Expected under degenerate
    /// input; flagged, not treated as an error.
    #[must_use]
    pub fn ci_is_degenerate(&self) -> bool {
        self.ci_lower == self.ci_upper
    }
}

/// Cohen's d point value with pooled standard deviation.
///
/// # Errors
///
/// Returns [`Error::DegenerateVariance`] when the pooled SD is zero; the
/// caller must have routed degenerate pairs to Cliff's delta before getting
/// here, so this is a second line of defense against a divide-by-zero.
pub fn cohens_d_point(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() < 2 || b.len() < 2 {
        return Err(Error::InsufficientData {
            context: "Cohen's d".to_string(),
            required: 2,
            actual: a.len().min(b.len()),
        });
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let pooled_var = ((na - 1.0) * variance(a) + (nb - 1.0) * variance(b)) / (na + nb - 2.0);
    if pooled_var <= 0.0 {
        return Err(Error::DegenerateVariance(
            "pooled standard deviation is zero".to_string(),
        ));
    }
    Ok((mean(a) - mean(b)) / pooled_var.sqrt())
}

/// Cliff's delta point value: `P(a > b) - P(a < b)` over all pairs.
#[must_use]
pub fn cliffs_delta_point(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let mut more = 0i64;
    let mut less = 0i64;
    for x in a {
        for y in b {
            if x > y {
                more += 1;
            } else if x < y {
                less += 1;
            }
        }
    }
    (more - less) as f64 / (a.len() * b.len()) as f64
}

/// Cohen's d with a percentile bootstrap CI.
///
/// # Errors
///
/// Propagates [`Error::DegenerateVariance`] / [`Error::InsufficientData`]
/// from the point computation.
pub fn cohens_d(a: &[f64], b: &[f64], resamples: usize, confidence: f64, seed: u64) -> Result<EffectSize> {
    let value = cohens_d_point(a, b)?;
    let (ci_lower, ci_upper) = bootstrap_ci(
        a,
        b,
        resamples,
        confidence,
        seed,
        value,
        |ra, rb| cohens_d_point(ra, rb).ok(),
    );
    Ok(EffectSize {
        kind: EffectSizeKind::CohensD,
        value,
        ci_lower,
        ci_upper,
    })
}

/// Cliff's delta with a percentile bootstrap CI.
#[must_use]
pub fn cliffs_delta(a: &[f64], b: &[f64], resamples: usize, confidence: f64, seed: u64) -> EffectSize {
    let value = cliffs_delta_point(a, b);
    let (ci_lower, ci_upper) = bootstrap_ci(
        a,
        b,
        resamples,
        confidence,
        seed,
        value,
        |ra, rb| Some(cliffs_delta_point(ra, rb)),
    );
    EffectSize {
        kind: EffectSizeKind::CliffsDelta,
        value,
        ci_lower,
        ci_upper,
    }
}

/// Percentile bootstrap over independently resampled groups.
///
/// Resamples whose statistic is undefined (degenerate resample under Cohen's
/// d) are dropped rather than polluting the percentiles with NaN; if every
/// resample is undefined the CI honestly collapses to the point value.
fn bootstrap_ci(
    a: &[f64],
    b: &[f64],
    resamples: usize,
    confidence: f64,
    seed: u64,
    point: f64,
    stat: impl Fn(&[f64], &[f64]) -> Option<f64>,
) -> (f64, f64) {
    if a.len() < 2 || b.len() < 2 {
        return (point, point);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut resample_a = vec![0.0; a.len()];
    let mut resample_b = vec![0.0; b.len()];
    let mut stats = Vec::with_capacity(resamples);
    for _ in 0..resamples {
        for slot in &mut resample_a {
            *slot = a[rng.gen_range(0..a.len())];
        }
        for slot in &mut resample_b {
            *slot = b[rng.gen_range(0..b.len())];
        }
        if let Some(value) = stat(&resample_a, &resample_b) {
            if value.is_finite() {
                stats.push(value);
            }
        }
    }
    if stats.is_empty() {
        return (point, point);
    }
    stats.sort_by(|x, y| x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal));
    let alpha = 1.0 - confidence;
    (
        percentile_of_sorted(&stats, alpha / 2.0 * 100.0),
        percentile_of_sorted(&stats, (1.0 - alpha / 2.0) * 100.0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cohens_d_known_shift() {
        // Unit-variance-ish groups shifted by 2.
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [3.0, 4.0, 5.0, 6.0, 7.0];
        let d = cohens_d_point(&a, &b).unwrap();
        assert!((d + 2.0 / 2.5f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_cohens_d_rejects_zero_variance() {
        let err = cohens_d_point(&[5.0; 4], &[5.0; 4]).unwrap_err();
        assert!(matches!(err, Error::DegenerateVariance(_)));
    }

    #[test]
    fn test_cliffs_delta_complete_separation() {
        let a = [10.0, 11.0, 12.0];
        let b = [1.0, 2.0, 3.0];
        assert!((cliffs_delta_point(&a, &b) - 1.0).abs() < 1e-12);
        assert!((cliffs_delta_point(&b, &a) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_cliffs_delta_identical_groups_zero() {
        let g = [1.0, 2.0, 3.0];
        assert!(cliffs_delta_point(&g, &g).abs() < 1e-12);
    }

    #[test]
    fn test_cliffs_delta_well_defined_for_constant_group() {
        // The zero-variance case Cohen's d cannot handle.
        let constant = [5.0; 5];
        let varied = [1.0, 2.0, 3.0, 4.0, 6.0];
        let delta = cliffs_delta_point(&constant, &varied);
        assert!(delta.is_finite());
        assert!((delta - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_cliffs_delta_ci_brackets_point() {
        let a = [50.0, 800.0, 1200.0, 60.0, 900.0];
        let b = [100.0, 102.0, 98.0, 101.0, 99.0];
        let effect = cliffs_delta(&a, &b, 2000, 0.95, 7);
        assert!(effect.ci_lower <= effect.value);
        assert!(effect.value <= effect.ci_upper);
        assert!(!effect.ci_is_degenerate());
    }

    #[test]
    fn test_degenerate_input_collapses_effect_ci() {
        let effect = cliffs_delta(&[2.0; 5], &[1.0; 5], 500, 0.95, 7);
        assert!((effect.value - 1.0).abs() < 1e-12);
        assert!(effect.ci_is_degenerate());
    }

    #[test]
    fn test_magnitude_thresholds_differ_by_kind() {
        let d = EffectSize {
            kind: EffectSizeKind::CohensD,
            value: 0.4,
            ci_lower: 0.1,
            ci_upper: 0.7,
        };
        let delta = EffectSize {
            kind: EffectSizeKind::CliffsDelta,
            value: 0.4,
            ci_lower: 0.1,
            ci_upper: 0.7,
        };
        assert_eq!(d.magnitude(), Magnitude::Small);
        assert_eq!(delta.magnitude(), Magnitude::Medium);
    }
}
