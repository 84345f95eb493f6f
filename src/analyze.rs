//! Analysis orchestration - distributions, stopping rules, comparisons
//!
//! Ties the pipeline together for a set of metrics over a run store: build
//! one distribution per framework x metric cell, evaluate the stopping rule
//! for each cell, then compare frameworks per metric. Every stage is a pure
//! computation over immutable snapshots, so metrics fan out across rayon
//! workers with no shared mutable state.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::compare::{ComparisonResult, StatisticalComparator};
use crate::config::{ComparatorConfig, StoppingConfig};
use crate::error::{Error, Result};
use crate::metrics::{DistributionBuilder, MetricRegistry};
use crate::run::{RunRecord, RunStore};
use crate::stopping::{StoppingDecision, StoppingRuleEvaluator};

/// Everything the reporting layer needs for one analysis pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// When the analysis ran.
    pub generated_at: DateTime<Utc>,
    /// Frameworks found in the store, sorted.
    pub frameworks: Vec<String>,
    /// One stopping decision per framework x metric cell.
    pub stopping: Vec<StoppingDecision>,
    /// One comparison per metric with enough data.
    pub comparisons: Vec<ComparisonResult>,
    /// Plain-language explanations for metrics that could not be compared.
    pub skipped: Vec<String>,
}

/// Per-metric analysis output, merged into the report in metric order.
struct MetricAnalysis {
    stopping: Vec<StoppingDecision>,
    comparison: Option<ComparisonResult>,
    skipped: Option<String>,
}

/// Runs the full distribution / stopping / comparison pipeline.
#[derive(Debug, Clone)]
pub struct AnalysisEngine {
    builder: DistributionBuilder,
    stopping: StoppingRuleEvaluator,
    comparator: StatisticalComparator,
}

impl AnalysisEngine {
    /// Create an engine over a metric registry and validated configs.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] when either config is invalid.
    pub fn new(
        registry: MetricRegistry,
        comparator_config: ComparatorConfig,
        stopping_config: StoppingConfig,
    ) -> Result<Self> {
        let builder = DistributionBuilder::new(
            registry,
            comparator_config.sample_policy,
            comparator_config.degenerate_cv_threshold,
            comparator_config.degenerate_rel_iqr_threshold,
        );
        let stopping = StoppingRuleEvaluator::new(stopping_config, comparator_config.bootstrap_seed)?;
        let comparator = StatisticalComparator::new(comparator_config)?;
        Ok(Self {
            builder,
            stopping,
            comparator,
        })
    }

    /// Analyze every requested metric over a snapshot of the store.
    ///
    /// Metrics whose comparison has too little data are reported in
    /// `skipped` rather than failing the whole pass; an unregistered metric
    /// name still fails the pass, because that is a configuration mistake.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Configuration`] for an unregistered metric.
    pub fn analyze(&self, store: &RunStore, metric_names: &[String]) -> Result<AnalysisReport> {
        let frameworks = store.frameworks();
        let runs_by_framework: Vec<(String, Vec<RunRecord>)> = frameworks
            .iter()
            .map(|fw| (fw.clone(), store.runs_for_framework(fw)))
            .collect();

        let analyses: Vec<MetricAnalysis> = metric_names
            .par_iter()
            .map(|metric| self.analyze_metric(metric, &runs_by_framework))
            .collect::<Result<_>>()?;

        let mut stopping = Vec::new();
        let mut comparisons = Vec::new();
        let mut skipped = Vec::new();
        for analysis in analyses {
            stopping.extend(analysis.stopping);
            comparisons.extend(analysis.comparison);
            skipped.extend(analysis.skipped);
        }

        info!(
            frameworks = frameworks.len(),
            metrics = metric_names.len(),
            comparisons = comparisons.len(),
            skipped = skipped.len(),
            "analysis pass complete"
        );

        Ok(AnalysisReport {
            generated_at: Utc::now(),
            frameworks,
            stopping,
            comparisons,
            skipped,
        })
    }

    fn analyze_metric(
        &self,
        metric: &str,
        runs_by_framework: &[(String, Vec<RunRecord>)],
    ) -> Result<MetricAnalysis> {
        let mut distributions = Vec::with_capacity(runs_by_framework.len());
        let mut stopping = Vec::with_capacity(runs_by_framework.len());
        for (framework, runs) in runs_by_framework {
            let dist = self.builder.build(framework, metric, runs)?;
            stopping.push(self.stopping.evaluate(&dist));
            distributions.push(dist);
        }

        match self.comparator.compare(&distributions) {
            Ok(comparison) => Ok(MetricAnalysis {
                stopping,
                comparison: Some(comparison),
                skipped: None,
            }),
            Err(Error::InsufficientData {
                context,
                required,
                actual,
            }) => Ok(MetricAnalysis {
                stopping,
                comparison: None,
                skipped: Some(format!(
                    "{metric}: comparison skipped, {context} needs {required} groups \
                     with 2+ samples but only {actual} qualified"
                )),
            }),
            Err(err) => Err(err),
        }
    }
}
