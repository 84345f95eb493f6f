//! Metric registry - name to extraction strategy, resolved at load time
//!
//! Report code never string-matches on metric names: every metric is looked
//! up here exactly once when an analysis is configured, and an unknown name
//! is a fatal [`crate::Error::Configuration`] at that point, not a silent
//! zero later.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::config::ModelPricing;
use crate::error::{Error, Result};
use crate::run::RunRecord;
use crate::usage::UsageTotals;

/// Extraction function: one scalar per run, `None` when the run cannot
/// provide the metric (e.g. wall-clock for a run with no steps).
pub type MetricExtractor = Arc<dyn Fn(&RunRecord) -> Option<f64> + Send + Sync>;

/// Built-in metric names registered by [`MetricRegistry::with_builtins`].
///
/// `cost_usd` additionally requires pricing and is only present when pricing
/// was supplied.
pub const BUILTIN_METRICS: &[&str] = &[
    "tokens_in",
    "tokens_out",
    "tokens_total",
    "cached_tokens",
    "api_calls",
    "steps",
    "wall_clock_secs",
];

/// Usage totals a metric extractor should read for a run.
///
/// Reconciled counts once verified; otherwise the latest successful attempt;
/// otherwise the adapter's preliminary estimate. Only the verified branch is
/// reachable under the strict sample policy; the fallbacks exist for the
/// explicitly opted-in preliminary mode.
#[must_use]
pub fn effective_totals(run: &RunRecord) -> UsageTotals {
    if let Some(totals) = run.verified_totals() {
        return totals;
    }
    run.reconciliation()
        .attempts()
        .iter()
        .rev()
        .find(|attempt| !attempt.query_failed())
        .map_or_else(|| run.preliminary_totals(), |attempt| attempt.queried())
}

/// Registry mapping metric names to extraction strategies.
#[derive(Clone)]
pub struct MetricRegistry {
    extractors: FxHashMap<String, MetricExtractor>,
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("metrics", &self.metric_names())
            .finish()
    }
}

impl MetricRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: FxHashMap::default(),
        }
    }

    /// Create a registry with the built-in metrics, plus `cost_usd` when
    /// pricing is supplied.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the pricing table is invalid.
    pub fn with_builtins(pricing: Option<ModelPricing>) -> Result<Self> {
        let mut registry = Self::new();
        registry.register("tokens_in", |run| {
            Some(effective_totals(run).tokens_in as f64)
        });
        registry.register("tokens_out", |run| {
            Some(effective_totals(run).tokens_out as f64)
        });
        registry.register("tokens_total", |run| {
            let totals = effective_totals(run);
            Some(totals.tokens_in.saturating_add(totals.tokens_out) as f64)
        });
        registry.register("cached_tokens", |run| {
            Some(effective_totals(run).cached_tokens as f64)
        });
        registry.register("api_calls", |run| {
            Some(effective_totals(run).api_calls as f64)
        });
        registry.register("steps", |run| Some(run.steps().len() as f64));
        registry.register("wall_clock_secs", RunRecord::wall_clock_secs);

        if let Some(pricing) = pricing {
            pricing.validate()?;
            registry.register("cost_usd", move |run| {
                let totals = effective_totals(run);
                let uncached_in = totals.tokens_in.saturating_sub(totals.cached_tokens);
                let cost = (uncached_in as f64 / 1e6) * pricing.input_per_mtok
                    + (totals.cached_tokens as f64 / 1e6) * pricing.cached_per_mtok
                    + (totals.tokens_out as f64 / 1e6) * pricing.output_per_mtok;
                Some(cost)
            });
        }
        Ok(registry)
    }

    /// Register (or replace) an extraction strategy.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        extractor: impl Fn(&RunRecord) -> Option<f64> + Send + Sync + 'static,
    ) {
        self.extractors.insert(name.into(), Arc::new(extractor));
    }

    /// Resolve a metric name to its extractor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unregistered name. This is
    /// the fail-fast point for typos and missing pricing.
    pub fn resolve(&self, metric_name: &str) -> Result<MetricExtractor> {
        self.extractors.get(metric_name).cloned().ok_or_else(|| {
            Error::Configuration(format!(
                "no extraction function registered for metric '{metric_name}' \
                 (registered: {})",
                self.metric_names().join(", ")
            ))
        })
    }

    /// Registered metric names, sorted.
    #[must_use]
    pub fn metric_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.extractors.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}
