//! Statistical comparison engine - test selection, effect sizes, correction
//!
//! ## Test Selection
//!
//! The comparator matches the test family to the data's actual properties
//! instead of defaulting to one test for everything:
//!
//! 1. Assess normality per group (D'Agostino-Pearson K-squared) and variance
//!    homogeneity across groups (Brown-Forsythe Levene). Levene is skipped
//!    when any group is truly constant, because variance-ratio tests are
//!    undefined at zero true variance.
//! 2. All groups plausibly normal, variances homogeneous: one-way ANOVA
//!    omnibus, Student t pairwise, Cohen's d.
//! 3. All groups plausibly normal, variances heterogeneous: Welch t pairwise
//!    (no equal-variance assumption); the equal-variance ANOVA omnibus is
//!    withheld with an explanation.
//! 4. Any group departs from normality (or is too small to assess):
//!    Kruskal-Wallis omnibus, Mann-Whitney U pairwise, Cliff's delta.
//!
//! A zero-variance override applies per pair: when either group has
//! degenerate variance, Cohen's d is never computed (it divides by a pooled
//! SD that is meaningless near zero) and the pair falls back to the
//! rank-based test and Cliff's delta, with a warning attached.
//!
//! Pairwise p-values within one metric's family are Holm-Bonferroni
//! corrected; a single-pair family is exempt. Outliers are reported upstream
//! by the distribution builder but never removed, so every test here runs on
//! the full retained sample.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{ComparatorConfig, PowerConfig};
use crate::error::{Error, Result};
use crate::metrics::MetricDistribution;
use crate::stats::correction::holm_bonferroni;
use crate::stats::effect::{cliffs_delta, cohens_d, EffectSize, EffectSizeKind, Magnitude};
use crate::stats::hypothesis::{
    assess_normality, kruskal_wallis, levene_brown_forsythe, mann_whitney_u, one_way_anova,
    student_t_test, welch_t_test, TestOutcome,
};
use crate::stats::special::{inverse_normal_cdf, normal_cdf};

/// Which family of tests the selection matrix chose for a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestFamily {
    /// Normal groups with homogeneous variances: ANOVA, Student t, Cohen's d.
    Parametric,
    /// Normal groups with heterogeneous variances: Welch t, Cohen's d.
    ParametricUnequalVariance,
    /// At least one non-normal (or unassessable) group: Kruskal-Wallis,
    /// Mann-Whitney U, Cliff's delta.
    RankBased,
}

/// One pairwise comparison between two frameworks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseResult {
    /// First framework of the pair.
    pub group_a: String,
    /// Second framework of the pair.
    pub group_b: String,
    /// Name of the pairwise test applied.
    pub test_name: String,
    /// Uncorrected p-value.
    pub p_raw: f64,
    /// Holm-Bonferroni adjusted p-value. Equal to `p_raw` for a single-pair
    /// family. Significance decisions must use this field.
    pub p_adjusted: f64,
    /// Matching effect size with bootstrap CI.
    pub effect_size: EffectSize,
    /// Caveats specific to this pair.
    pub warnings: Vec<String>,
}

impl PairwiseResult {
    /// Whether the pair is significant at `alpha` after correction.
    #[must_use]
    pub fn is_significant(&self, alpha: f64) -> bool {
        self.p_adjusted < alpha
    }
}

/// A priori power for one pair, from a pre-specified effect size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairPower {
    /// First framework of the pair.
    pub group_a: String,
    /// Second framework of the pair.
    pub group_b: String,
    /// Estimated power at the current sample sizes.
    pub power: f64,
}

/// Optional a priori power section.
///
/// Post-hoc "observed" power is never reported: it is near-tautological with
/// the p-value and adds no information. This section exists only when the
/// config carries a pre-specified, literature-derived effect size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerSection {
    /// The pre-specified standardized effect size the calculation assumed.
    pub prespecified_effect_size: f64,
    /// Significance level the calculation assumed.
    pub alpha: f64,
    /// Power per pair at the observed sample sizes.
    pub pairs: Vec<PairPower>,
}

/// Complete, self-describing comparison of 2+ frameworks on one metric.
///
/// Built fresh per analysis run, never persisted incrementally. Carries
/// enough methodology detail (family, correction method, warnings, withheld
/// sections) that a reporting layer never re-derives decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonResult {
    /// Metric compared.
    pub metric_name: String,
    /// Test family the selection matrix chose.
    pub family: TestFamily,
    /// Omnibus test across all groups; `None` when withheld, with the reason
    /// in `withheld`.
    pub omnibus_test: Option<TestOutcome>,
    /// All pairwise comparisons, in sorted framework order.
    pub pairwise: Vec<PairwiseResult>,
    /// Name of the multiple-comparison correction applied.
    pub correction: String,
    /// Metric-level caveats.
    pub warnings: Vec<String>,
    /// Plain-language explanations for every section that was not computed.
    pub withheld: Vec<String>,
    /// A priori power section, present only when configured.
    pub power: Option<PowerSection>,
}

impl ComparisonResult {
    /// Hedged, descriptive prose summary of the result.
    ///
    /// The language deliberately avoids causal claims: differences "tend"
    /// one way with an estimated probability, they do not make one framework
    /// "better".
    #[must_use]
    pub fn narrative(&self, alpha: f64) -> String {
        let mut out = String::new();
        if let Some(omnibus) = &self.omnibus_test {
            let verdict = if omnibus.p_value < alpha {
                "is consistent with at least one group differing"
            } else {
                "does not establish a difference between groups"
            };
            let _ = writeln!(
                out,
                "{} (statistic = {:.3}, p = {:.4}) {} on {}.",
                omnibus.name, omnibus.statistic, omnibus.p_value, verdict, self.metric_name
            );
        }
        for pair in &self.pairwise {
            let _ = writeln!(out, "{}", pair_sentence(pair, alpha, &self.metric_name));
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "Note: {warning}");
        }
        for reason in &self.withheld {
            let _ = writeln!(out, "Not computed: {reason}");
        }
        out
    }
}

fn magnitude_label(magnitude: Magnitude) -> &'static str {
    match magnitude {
        Magnitude::Negligible => "negligible",
        Magnitude::Small => "small",
        Magnitude::Medium => "medium",
        Magnitude::Large => "large",
    }
}

fn pair_sentence(pair: &PairwiseResult, alpha: f64, metric_name: &str) -> String {
    let effect = &pair.effect_size;
    let (lower, higher) = if effect.value >= 0.0 {
        (&pair.group_b, &pair.group_a)
    } else {
        (&pair.group_a, &pair.group_b)
    };
    let mut sentence = if pair.is_significant(alpha) {
        format!(
            "{higher} tended to show higher {metric_name} than {lower} \
             ({}, adjusted p = {:.4}; {} effect, {:?} = {:.3}, 95% CI [{:.3}, {:.3}])",
            pair.test_name,
            pair.p_adjusted,
            magnitude_label(effect.magnitude()),
            effect.kind,
            effect.value,
            effect.ci_lower,
            effect.ci_upper,
        )
    } else {
        format!(
            "{} and {} did not show an established difference in {metric_name} \
             ({}, adjusted p = {:.4})",
            pair.group_a, pair.group_b, pair.test_name, pair.p_adjusted,
        )
    };
    if effect.kind == EffectSizeKind::CliffsDelta {
        let dominance = 100.0 * (effect.value + 1.0) / 2.0;
        let _ = write!(
            sentence,
            "; estimated probability a {} run exceeds a {} run is about {:.0}%",
            pair.group_a, pair.group_b, dominance
        );
    }
    sentence.push('.');
    sentence
}

/// Selects tests, computes effect sizes, and corrects pairwise p-values.
#[derive(Debug, Clone)]
pub struct StatisticalComparator {
    config: ComparatorConfig,
}

impl StatisticalComparator {
    /// Create a comparator, validating the config up front.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an invalid config.
    pub fn new(config: ComparatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Comparator config in force.
    #[must_use]
    pub const fn config(&self) -> &ComparatorConfig {
        &self.config
    }

    /// Compare 2+ frameworks' distributions of the same metric.
    ///
    /// Groups with fewer than 2 samples are excluded, with an explanation in
    /// the result; at least two usable groups must remain.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] when the distributions do not
    /// all describe the same metric, and [`crate::Error::InsufficientData`]
    /// when fewer than two groups have 2+ samples.
    pub fn compare(&self, distributions: &[MetricDistribution]) -> Result<ComparisonResult> {
        let metric_name = match distributions.first() {
            Some(first) => first.metric_name.clone(),
            None => {
                return Err(Error::InsufficientData {
                    context: "comparison groups".to_string(),
                    required: 2,
                    actual: 0,
                })
            }
        };
        if distributions
            .iter()
            .any(|d| d.metric_name != metric_name)
        {
            return Err(Error::Configuration(format!(
                "all compared distributions must describe the same metric, got a mix with {metric_name}"
            )));
        }

        let mut withheld = Vec::new();
        let mut groups: Vec<&MetricDistribution> = Vec::new();
        for dist in distributions {
            if dist.n() < 2 {
                withheld.push(format!(
                    "{} was excluded from the {metric_name} comparison: {} sample(s) \
                     is too few for any two-sample statistic (2 required)",
                    dist.framework,
                    dist.n()
                ));
            } else {
                groups.push(dist);
            }
        }
        groups.sort_by(|a, b| a.framework.cmp(&b.framework));
        if groups.len() < 2 {
            return Err(Error::InsufficientData {
                context: format!("comparison groups for {metric_name}"),
                required: 2,
                actual: groups.len(),
            });
        }

        let mut warnings = Vec::new();
        if groups.iter().any(|g| g.includes_pending_runs) {
            warnings.push(
                "some groups include pending (unverified) runs; results are preliminary"
                    .to_string(),
            );
        }

        let family = self.select_family(&groups, &metric_name);
        let samples: Vec<&[f64]> = groups.iter().map(|g| g.samples.as_slice()).collect();

        let omnibus_test = match family {
            TestFamily::Parametric => one_way_anova(&samples),
            TestFamily::ParametricUnequalVariance => {
                withheld.push(format!(
                    "the one-way ANOVA omnibus on {metric_name} assumes equal variances, \
                     which the data contradicts; only pairwise Welch t-tests are reported"
                ));
                None
            }
            TestFamily::RankBased => kruskal_wallis(&samples),
        };

        let (pairwise, power) = self.compare_pairs(&groups, family, &mut warnings, &mut withheld);

        let correction = if pairwise.len() > 1 {
            "holm-bonferroni".to_string()
        } else {
            "none (single-pair family is exempt)".to_string()
        };

        Ok(ComparisonResult {
            metric_name,
            family,
            omnibus_test,
            pairwise,
            correction,
            warnings,
            withheld,
            power,
        })
    }

    fn select_family(&self, groups: &[&MetricDistribution], metric_name: &str) -> TestFamily {
        let all_normal = groups.iter().all(|g| {
            let assessment = assess_normality(&g.samples, self.config.alpha);
            debug!(
                framework = %g.framework,
                metric = %metric_name,
                plausibly_normal = assessment.plausibly_normal,
                p_value = ?assessment.p_value,
                "normality assessed"
            );
            assessment.plausibly_normal
        });
        if !all_normal {
            debug!(metric = %metric_name, "selected rank-based family");
            return TestFamily::RankBased;
        }

        let samples: Vec<&[f64]> = groups.iter().map(|g| g.samples.as_slice()).collect();
        // Levene is None when some group is truly constant; a constant group
        // never assesses as normal, so this arm is unreachable here and
        // conservatively treated as heterogeneous.
        let homogeneous = levene_brown_forsythe(&samples)
            .map_or(false, |outcome| outcome.p_value >= self.config.alpha);
        let family = if homogeneous {
            TestFamily::Parametric
        } else {
            TestFamily::ParametricUnequalVariance
        };
        debug!(metric = %metric_name, ?family, "selected parametric family");
        family
    }

    fn compare_pairs(
        &self,
        groups: &[&MetricDistribution],
        family: TestFamily,
        warnings: &mut Vec<String>,
        withheld: &mut Vec<String>,
    ) -> (Vec<PairwiseResult>, Option<PowerSection>) {
        struct PendingPair {
            group_a: String,
            group_b: String,
            test_name: String,
            p_raw: f64,
            effect_size: EffectSize,
            warnings: Vec<String>,
        }

        let mut pending: Vec<PendingPair> = Vec::new();
        let mut power_pairs: Vec<PairPower> = Vec::new();
        let mut pair_index: u64 = 0;

        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                let seed = self.config.bootstrap_seed.wrapping_add(pair_index);
                pair_index += 1;

                let degenerate = a.has_degenerate_variance || b.has_degenerate_variance;
                let mut pair_warnings = Vec::new();

                let (test, effect_size) = if degenerate || family == TestFamily::RankBased {
                    if degenerate {
                        pair_warnings.push(format!(
                            "near-deterministic separation: {} shows degenerate \
                             variance, so a standardized mean difference is undefined \
                             and a rank-based comparison is reported instead",
                            if a.has_degenerate_variance {
                                &a.framework
                            } else {
                                &b.framework
                            }
                        ));
                    }
                    let effect = cliffs_delta(
                        &a.samples,
                        &b.samples,
                        self.config.bootstrap_resamples,
                        self.config.confidence,
                        seed,
                    );
                    if degenerate && effect.ci_is_degenerate() {
                        pair_warnings.push(
                            "the effect-size CI collapsed to a point; this is expected \
                             for degenerate input, not an error"
                                .to_string(),
                        );
                    }
                    (mann_whitney_u(&a.samples, &b.samples), effect)
                } else {
                    let effect = match cohens_d(
                        &a.samples,
                        &b.samples,
                        self.config.bootstrap_resamples,
                        self.config.confidence,
                        seed,
                    ) {
                        Ok(effect) => effect,
                        Err(err) => {
                            withheld.push(format!(
                                "{} vs {}: {err}",
                                a.framework, b.framework
                            ));
                            continue;
                        }
                    };
                    let test = match family {
                        TestFamily::Parametric => student_t_test(&a.samples, &b.samples),
                        _ => welch_t_test(&a.samples, &b.samples),
                    };
                    (test, effect)
                };

                let Some(test) = test else {
                    withheld.push(format!(
                        "{} vs {}: the pairwise test statistic is undefined for \
                         these samples",
                        a.framework, b.framework
                    ));
                    continue;
                };

                if let Some(power_config) = &self.config.power {
                    power_pairs.push(PairPower {
                        group_a: a.framework.clone(),
                        group_b: b.framework.clone(),
                        power: a_priori_power(power_config, a.n(), b.n()),
                    });
                }

                pending.push(PendingPair {
                    group_a: a.framework.clone(),
                    group_b: b.framework.clone(),
                    test_name: test.name.clone(),
                    p_raw: test.p_value,
                    effect_size,
                    warnings: pair_warnings,
                });
            }
        }

        let p_raws: Vec<f64> = pending.iter().map(|pair| pair.p_raw).collect();
        let adjusted = holm_bonferroni(&p_raws);

        let pairwise = pending
            .into_iter()
            .zip(adjusted)
            .map(|(pair, p_adjusted)| PairwiseResult {
                group_a: pair.group_a,
                group_b: pair.group_b,
                test_name: pair.test_name,
                p_raw: pair.p_raw,
                p_adjusted,
                effect_size: pair.effect_size,
                warnings: pair.warnings,
            })
            .collect();

        let power = self.config.power.as_ref().map(|config| PowerSection {
            prespecified_effect_size: config.prespecified_effect_size,
            alpha: config.alpha,
            pairs: power_pairs,
        });
        if power.is_some() {
            warnings.push(
                "power figures are a priori, from the pre-specified effect size; \
                 observed power is never reported"
                    .to_string(),
            );
        }

        (pairwise, power)
    }
}

/// Normal-approximation a priori power for a two-sample comparison at the
/// pre-specified standardized effect size.
fn a_priori_power(config: &PowerConfig, n_a: usize, n_b: usize) -> f64 {
    let d = config.prespecified_effect_size.abs();
    let n_a = n_a as f64;
    let n_b = n_b as f64;
    let noncentrality = d * (n_a * n_b / (n_a + n_b)).sqrt();
    let z_crit = inverse_normal_cdf(1.0 - config.alpha / 2.0);
    normal_cdf(noncentrality - z_crit).clamp(0.0, 1.0)
}
