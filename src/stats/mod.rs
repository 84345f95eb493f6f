//! Statistics - descriptive measures, bootstrap, hypothesis tests, effects
//!
//! Everything in this module is a pure, stateless computation over immutable
//! sample slices, safe to run in parallel across metrics and frameworks.
//!
//! ## Module structure
//!
//! - [`bootstrap`] - resampling point estimates and percentile CIs
//! - [`correction`] - Holm-Bonferroni step-down adjustment
//! - [`effect`] - Cohen's d and Cliff's delta with bootstrap CIs
//! - [`hypothesis`] - normality, variance homogeneity, omnibus and pairwise tests
//! - [`special`] - numerical kernels (erf, incomplete gamma/beta)

pub mod bootstrap;
pub mod correction;
pub mod effect;
pub mod hypothesis;
pub mod special;

/// Arithmetic mean. Zero for an empty slice.
#[must_use]
pub fn mean(samples: &[f64]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Unbiased sample variance (n-1 denominator). Zero below two samples.
#[must_use]
pub fn variance(samples: &[f64]) -> f64 {
    if samples.len() < 2 {
        return 0.0;
    }
    let m = mean(samples);
    samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (samples.len() - 1) as f64
}

/// Sample standard deviation.
#[must_use]
pub fn std_dev(samples: &[f64]) -> f64 {
    variance(samples).sqrt()
}

/// Percentile with linear interpolation between order statistics.
///
/// `p` is in `[0, 100]`. Returns zero for an empty slice.
#[must_use]
pub fn percentile(samples: &[f64], p: f64) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    percentile_of_sorted(&sorted, p)
}

/// Percentile over an already sorted slice, linear interpolation.
#[must_use]
pub fn percentile_of_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = rank - lo as f64;
    sorted[lo].mul_add(1.0 - weight, sorted[hi] * weight)
}

/// Median (50th percentile).
#[must_use]
pub fn median(samples: &[f64]) -> f64 {
    percentile(samples, 50.0)
}

/// Interquartile range, 75th minus 25th percentile.
#[must_use]
pub fn iqr(samples: &[f64]) -> f64 {
    percentile(samples, 75.0) - percentile(samples, 25.0)
}

/// Moment-based sample skewness. Zero when the spread is zero.
#[must_use]
pub fn skewness(samples: &[f64]) -> f64 {
    let n = samples.len();
    if n < 3 {
        return 0.0;
    }
    let m = mean(samples);
    let m2 = samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / n as f64;
    if m2 <= 0.0 {
        return 0.0;
    }
    let m3 = samples.iter().map(|x| (x - m).powi(3)).sum::<f64>() / n as f64;
    m3 / m2.powf(1.5)
}

/// Coefficient of variation, `sd / mean`. `None` when the mean is zero:
/// relative spread is undefined there and must not be faked with a default.
#[must_use]
pub fn coefficient_of_variation(samples: &[f64]) -> Option<f64> {
    let m = mean(samples);
    if m == 0.0 {
        return None;
    }
    Some(std_dev(samples) / m)
}

/// Number of distinct values in the sample.
///
/// Used to short-circuit variance-ratio tests: those are undefined for a
/// group with zero *true* variance, which is a different condition from
/// "variance close to zero".
#[must_use]
pub fn distinct_count(samples: &[f64]) -> usize {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted.dedup_by(|a, b| (*a - *b).abs() <= f64::EPSILON);
    sorted.len()
}
