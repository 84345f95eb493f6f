//! Hypothesis tests - normality, variance homogeneity, omnibus and pairwise
//!
//! Parametric tests (`t`, ANOVA) and their rank-based counterparts
//! (Mann-Whitney U, Kruskal-Wallis H) with tie handling, plus the
//! assumption checks that drive test selection. All p-values are two-sided.

use serde::{Deserialize, Serialize};

use super::special::{chi_squared_sf, f_sf, normal_sf, student_t_two_sided_p};
use super::{distinct_count, mean, median, variance};

/// A named test statistic with its p-value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    /// Test name as it appears in reports.
    pub name: String,
    /// Test statistic.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
}

/// Normality assessment for one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalityAssessment {
    /// True when the sample is consistent with normality at the given alpha.
    /// False either on rejection or when the sample is too small to assess;
    /// `p_value` distinguishes the two.
    pub plausibly_normal: bool,
    /// K-squared p-value; `None` when the sample was too small or constant,
    /// in which case normality is simply not established.
    pub p_value: Option<f64>,
}

/// Smallest sample the moment-based normality test accepts. Below this the
/// skewness/kurtosis null approximations are unreliable and normality is
/// treated as not established, routing selection to the rank-based family.
pub const MIN_NORMALITY_SAMPLES: usize = 8;

/// D'Agostino-Pearson K-squared omnibus normality test.
///
/// Combines standardized skewness (D'Agostino 1970) and kurtosis
/// (Anscombe-Glynn 1983) into a chi-squared statistic with 2 degrees of
/// freedom.
#[must_use]
pub fn assess_normality(samples: &[f64], alpha: f64) -> NormalityAssessment {
    let n = samples.len();
    if n < MIN_NORMALITY_SAMPLES {
        return NormalityAssessment {
            plausibly_normal: false,
            p_value: None,
        };
    }
    let m = mean(samples);
    let nf = n as f64;
    let m2 = samples.iter().map(|x| (x - m).powi(2)).sum::<f64>() / nf;
    if m2 <= 0.0 {
        // Constant sample: normality is meaningless, not established.
        return NormalityAssessment {
            plausibly_normal: false,
            p_value: None,
        };
    }
    let m3 = samples.iter().map(|x| (x - m).powi(3)).sum::<f64>() / nf;
    let m4 = samples.iter().map(|x| (x - m).powi(4)).sum::<f64>() / nf;
    let g1 = m3 / m2.powf(1.5);
    let b2 = m4 / (m2 * m2);

    let z_skew = skewness_z(g1, nf);
    let z_kurt = kurtosis_z(b2, nf);
    let k_squared = z_skew.mul_add(z_skew, z_kurt * z_kurt);
    let p = chi_squared_sf(k_squared, 2.0);

    NormalityAssessment {
        plausibly_normal: p > alpha,
        p_value: Some(p),
    }
}

/// Standardized skewness (D'Agostino 1970 transformation).
fn skewness_z(g1: f64, n: f64) -> f64 {
    let y = g1 * ((n + 1.0) * (n + 3.0) / (6.0 * (n - 2.0))).sqrt();
    let beta2 = 3.0 * (n * n + 27.0 * n - 70.0) * (n + 1.0) * (n + 3.0)
        / ((n - 2.0) * (n + 5.0) * (n + 7.0) * (n + 9.0));
    let w_squared = (2.0 * (beta2 - 1.0)).sqrt() - 1.0;
    let delta = 1.0 / (0.5 * w_squared.ln()).sqrt();
    let alpha = (2.0 / (w_squared - 1.0)).sqrt();
    let ratio = y / alpha;
    delta * (ratio + ratio.mul_add(ratio, 1.0).sqrt()).ln()
}

/// Standardized kurtosis (Anscombe-Glynn 1983 transformation).
fn kurtosis_z(b2: f64, n: f64) -> f64 {
    let e_b2 = 3.0 * (n - 1.0) / (n + 1.0);
    let var_b2 =
        24.0 * n * (n - 2.0) * (n - 3.0) / ((n + 1.0) * (n + 1.0) * (n + 3.0) * (n + 5.0));
    let x = (b2 - e_b2) / var_b2.sqrt();
    let sqrt_beta1 = 6.0 * (n * n - 5.0 * n + 2.0) / ((n + 7.0) * (n + 9.0))
        * (6.0 * (n + 3.0) * (n + 5.0) / (n * (n - 2.0) * (n - 3.0))).sqrt();
    let a = 6.0 + 8.0 / sqrt_beta1 * (2.0 / sqrt_beta1 + (1.0 + 4.0 / (sqrt_beta1 * sqrt_beta1)).sqrt());
    let term = (1.0 - 2.0 / a) / x.mul_add((2.0 / (a - 4.0)).sqrt(), 1.0);
    ((1.0 - 2.0 / (9.0 * a)) - term.cbrt()) / (2.0 / (9.0 * a)).sqrt()
}

/// Brown-Forsythe variant of Levene's test for homogeneity of variance.
///
/// Centers on group medians, then runs a one-way ANOVA on the absolute
/// deviations. Returns `None` when any group has a single distinct value:
/// variance-ratio tests are undefined for zero true variance (a different
/// condition from variance merely close to zero), so the caller short-
/// circuits instead of getting a garbage number.
#[must_use]
pub fn levene_brown_forsythe(groups: &[&[f64]]) -> Option<TestOutcome> {
    if groups.len() < 2 || groups.iter().any(|g| g.len() < 2) {
        return None;
    }
    if groups.iter().any(|g| distinct_count(g) == 1) {
        return None;
    }
    let deviations: Vec<Vec<f64>> = groups
        .iter()
        .map(|g| {
            let med = median(g);
            g.iter().map(|x| (x - med).abs()).collect()
        })
        .collect();
    let deviation_slices: Vec<&[f64]> = deviations.iter().map(Vec::as_slice).collect();
    one_way_anova(&deviation_slices).map(|outcome| TestOutcome {
        name: "Levene (Brown-Forsythe)".to_string(),
        ..outcome
    })
}

/// One-way ANOVA omnibus F-test across 2+ groups.
///
/// Returns `None` when group sizes cannot support the test or the within-
/// group mean square is zero (all groups internally constant).
#[must_use]
pub fn one_way_anova(groups: &[&[f64]]) -> Option<TestOutcome> {
    let k = groups.len();
    if k < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let n_total: usize = groups.iter().map(|g| g.len()).sum();
    if n_total <= k {
        return None;
    }
    let all: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let grand_mean = mean(&all);

    let ss_between: f64 = groups
        .iter()
        .map(|g| g.len() as f64 * (mean(g) - grand_mean).powi(2))
        .sum();
    let ss_within: f64 = groups
        .iter()
        .map(|g| {
            let gm = mean(g);
            g.iter().map(|x| (x - gm).powi(2)).sum::<f64>()
        })
        .sum();

    let df_between = (k - 1) as f64;
    let df_within = (n_total - k) as f64;
    let ms_within = ss_within / df_within;
    if ms_within <= 0.0 {
        return None;
    }
    let f = (ss_between / df_between) / ms_within;
    Some(TestOutcome {
        name: "one-way ANOVA".to_string(),
        statistic: f,
        p_value: f_sf(f, df_between, df_within),
    })
}

/// Welch's t-test: unequal variances, Welch-Satterthwaite df.
#[must_use]
pub fn welch_t_test(a: &[f64], b: &[f64]) -> Option<TestOutcome> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (ma, mb) = (mean(a), mean(b));
    let (va, vb) = (variance(a), variance(b));
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let se_squared = va / na + vb / nb;
    if se_squared <= 0.0 {
        // Both groups constant: no standard error to scale by.
        let statistic = if ma == mb { 0.0 } else { f64::INFINITY };
        return Some(TestOutcome {
            name: "Welch t-test".to_string(),
            statistic,
            p_value: if ma == mb { 1.0 } else { 0.0 },
        });
    }
    let t = (ma - mb) / se_squared.sqrt();
    let df = se_squared * se_squared
        / ((va / na).powi(2) / (na - 1.0) + (vb / nb).powi(2) / (nb - 1.0));
    Some(TestOutcome {
        name: "Welch t-test".to_string(),
        statistic: t,
        p_value: student_t_two_sided_p(t, df),
    })
}

/// Student's pooled-variance t-test.
#[must_use]
pub fn student_t_test(a: &[f64], b: &[f64]) -> Option<TestOutcome> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let (ma, mb) = (mean(a), mean(b));
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let df = na + nb - 2.0;
    let pooled_var = ((na - 1.0) * variance(a) + (nb - 1.0) * variance(b)) / df;
    if pooled_var <= 0.0 {
        let statistic = if ma == mb { 0.0 } else { f64::INFINITY };
        return Some(TestOutcome {
            name: "Student t-test".to_string(),
            statistic,
            p_value: if ma == mb { 1.0 } else { 0.0 },
        });
    }
    let t = (ma - mb) / (pooled_var * (1.0 / na + 1.0 / nb)).sqrt();
    Some(TestOutcome {
        name: "Student t-test".to_string(),
        statistic: t,
        p_value: student_t_two_sided_p(t, df),
    })
}

/// Midranks of the pooled sample, with average ranks for ties. Also returns
/// the tie-correction term `sum(t^3 - t)` over tie groups.
fn midranks(pooled: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..pooled.len()).collect();
    order.sort_by(|&i, &j| {
        pooled[i]
            .partial_cmp(&pooled[j])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut ranks = vec![0.0; pooled.len()];
    let mut tie_term = 0.0;
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && (pooled[order[j + 1]] - pooled[order[i]]).abs() <= f64::EPSILON
        {
            j += 1;
        }
        let tie_len = (j - i + 1) as f64;
        // Average rank for the tie group, 1-based.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = avg_rank;
        }
        tie_term += tie_len.powi(3) - tie_len;
        i = j + 1;
    }
    (ranks, tie_term)
}

/// Mann-Whitney U test, tie-corrected normal approximation with continuity
/// correction.
#[must_use]
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Option<TestOutcome> {
    if a.is_empty() || b.is_empty() {
        return None;
    }
    let (na, nb) = (a.len() as f64, b.len() as f64);
    let n = na + nb;
    let pooled: Vec<f64> = a.iter().chain(b.iter()).copied().collect();
    let (ranks, tie_term) = midranks(&pooled);
    let rank_sum_a: f64 = ranks[..a.len()].iter().sum();
    let u_a = na.mul_add(nb, na * (na + 1.0) / 2.0) - rank_sum_a;
    let u = u_a.min(na * nb - u_a);

    let mu = na * nb / 2.0;
    let sigma_squared = na * nb / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if sigma_squared <= 0.0 {
        // Every pooled value tied: the groups are indistinguishable.
        return Some(TestOutcome {
            name: "Mann-Whitney U".to_string(),
            statistic: u,
            p_value: 1.0,
        });
    }
    let z = ((u - mu).abs() - 0.5).max(0.0) / sigma_squared.sqrt();
    Some(TestOutcome {
        name: "Mann-Whitney U".to_string(),
        statistic: u,
        p_value: (2.0 * normal_sf(z)).clamp(0.0, 1.0),
    })
}

/// Kruskal-Wallis H omnibus test across 2+ groups, tie-corrected.
#[must_use]
pub fn kruskal_wallis(groups: &[&[f64]]) -> Option<TestOutcome> {
    let k = groups.len();
    if k < 2 || groups.iter().any(|g| g.is_empty()) {
        return None;
    }
    let pooled: Vec<f64> = groups.iter().flat_map(|g| g.iter().copied()).collect();
    let n = pooled.len() as f64;
    if n < 3.0 {
        return None;
    }
    let (ranks, tie_term) = midranks(&pooled);

    let mut h = 0.0;
    let mut offset = 0;
    for group in groups {
        let rank_sum: f64 = ranks[offset..offset + group.len()].iter().sum();
        h += rank_sum * rank_sum / group.len() as f64;
        offset += group.len();
    }
    h = 12.0 / (n * (n + 1.0)) * h - 3.0 * (n + 1.0);

    let tie_correction = 1.0 - tie_term / (n.powi(3) - n);
    if tie_correction <= 0.0 {
        // Every pooled value tied.
        return Some(TestOutcome {
            name: "Kruskal-Wallis H".to_string(),
            statistic: 0.0,
            p_value: 1.0,
        });
    }
    h /= tie_correction;
    Some(TestOutcome {
        name: "Kruskal-Wallis H".to_string(),
        statistic: h,
        p_value: chi_squared_sf(h, (k - 1) as f64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near_normal_sample() -> Vec<f64> {
        // Symmetric, light-tailed.
        vec![
            9.8, 10.1, 9.9, 10.2, 10.0, 9.7, 10.3, 10.0, 9.9, 10.1, 10.05, 9.95, 10.15, 9.85,
            10.0, 9.9, 10.1, 10.0, 9.95, 10.05,
        ]
    }

    fn skewed_sample() -> Vec<f64> {
        vec![
            1.0, 1.1, 1.0, 1.2, 1.1, 1.0, 1.3, 1.1, 1.0, 1.2, 9.0, 14.0, 22.0, 1.1, 1.0, 30.0,
            1.2, 1.0, 45.0, 1.1,
        ]
    }

    #[test]
    fn test_normality_small_sample_not_established() {
        let assessment = assess_normality(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.05);
        assert!(!assessment.plausibly_normal);
        assert!(assessment.p_value.is_none());
    }

    #[test]
    fn test_normality_accepts_near_normal() {
        let assessment = assess_normality(&near_normal_sample(), 0.05);
        assert!(assessment.plausibly_normal, "p = {:?}", assessment.p_value);
    }

    #[test]
    fn test_normality_rejects_heavy_skew() {
        let assessment = assess_normality(&skewed_sample(), 0.05);
        assert!(!assessment.plausibly_normal, "p = {:?}", assessment.p_value);
        assert!(assessment.p_value.unwrap() < 0.05);
    }

    #[test]
    fn test_normality_constant_sample_not_established() {
        let assessment = assess_normality(&[4.0; 20], 0.05);
        assert!(!assessment.plausibly_normal);
        assert!(assessment.p_value.is_none());
    }

    #[test]
    fn test_levene_skipped_for_constant_group() {
        let constant = [5.0; 5];
        let varied = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(levene_brown_forsythe(&[&constant, &varied]).is_none());
    }

    #[test]
    fn test_levene_detects_unequal_spread() {
        let tight: Vec<f64> = (0..15).map(|i| 10.0 + f64::from(i % 3) * 0.1).collect();
        let wide: Vec<f64> = (0..15).map(|i| 10.0 + f64::from(i) * 8.0).collect();
        let outcome = levene_brown_forsythe(&[&tight, &wide]).unwrap();
        assert!(outcome.p_value < 0.05, "p = {}", outcome.p_value);
    }

    #[test]
    fn test_anova_identical_groups_high_p() {
        let g = [1.0, 2.0, 3.0, 4.0, 5.0];
        let outcome = one_way_anova(&[&g, &g, &g]).unwrap();
        assert!(outcome.statistic.abs() < 1e-9);
        assert!(outcome.p_value > 0.99);
    }

    #[test]
    fn test_anova_separated_groups_low_p() {
        let a = [1.0, 1.1, 0.9, 1.05, 0.95];
        let b = [5.0, 5.1, 4.9, 5.05, 4.95];
        let c = [9.0, 9.1, 8.9, 9.05, 8.95];
        let outcome = one_way_anova(&[&a, &b, &c]).unwrap();
        assert!(outcome.p_value < 1e-6);
    }

    #[test]
    fn test_welch_known_separation() {
        let a = [10.0, 11.0, 9.0, 10.5, 9.5, 10.2];
        let b = [20.0, 21.0, 19.0, 22.0, 18.0, 20.5];
        let outcome = welch_t_test(&a, &b).unwrap();
        assert!(outcome.statistic < 0.0);
        assert!(outcome.p_value < 0.001);
    }

    #[test]
    fn test_welch_both_constant_equal_means() {
        let outcome = welch_t_test(&[2.0, 2.0, 2.0], &[2.0, 2.0]).unwrap();
        assert!((outcome.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_student_t_matches_direction() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [3.0, 4.0, 5.0, 6.0, 7.0];
        let outcome = student_t_test(&a, &b).unwrap();
        assert!(outcome.statistic < 0.0);
        assert!(outcome.p_value < 0.05);
    }

    #[test]
    fn test_mann_whitney_identical_groups() {
        let g = [1.0, 2.0, 3.0, 4.0, 5.0];
        let outcome = mann_whitney_u(&g, &g).unwrap();
        assert!(outcome.p_value > 0.9);
    }

    #[test]
    fn test_mann_whitney_disjoint_groups() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let b = [101.0, 102.0, 103.0, 104.0, 105.0, 106.0, 107.0, 108.0];
        let outcome = mann_whitney_u(&a, &b).unwrap();
        // Complete separation: U = 0.
        assert!(outcome.statistic.abs() < 1e-12);
        assert!(outcome.p_value < 0.01);
    }

    #[test]
    fn test_mann_whitney_all_tied() {
        let outcome = mann_whitney_u(&[3.0; 5], &[3.0; 5]).unwrap();
        assert!((outcome.p_value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_kruskal_wallis_separated_groups() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [10.0, 11.0, 12.0, 13.0, 14.0];
        let c = [20.0, 21.0, 22.0, 23.0, 24.0];
        let outcome = kruskal_wallis(&[&a, &b, &c]).unwrap();
        assert!(outcome.p_value < 0.01);
    }

    #[test]
    fn test_kruskal_wallis_all_tied() {
        let outcome = kruskal_wallis(&[&[2.0; 4][..], &[2.0; 4][..]]).unwrap();
        assert!((outcome.p_value - 1.0).abs() < 1e-12);
        assert!(outcome.statistic.abs() < 1e-12);
    }

    #[test]
    fn test_midranks_average_ties() {
        let (ranks, tie_term) = midranks(&[1.0, 2.0, 2.0, 3.0]);
        assert!((ranks[0] - 1.0).abs() < 1e-12);
        assert!((ranks[1] - 2.5).abs() < 1e-12);
        assert!((ranks[2] - 2.5).abs() < 1e-12);
        assert!((ranks[3] - 4.0).abs() < 1e-12);
        assert!((tie_term - 6.0).abs() < 1e-12);
    }
}
