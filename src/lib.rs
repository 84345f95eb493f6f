//! # Bakeoff: Metrics Reconciliation & Statistical Comparison Engine
//!
//! Bakeoff ingests per-step usage windows from benchmarked software-generation
//! frameworks, reconciles their preliminary token counts against a billing
//! provider's usage API until the counts are stable, and compares frameworks
//! with assumption-checked statistics.
//!
//! ## Pipeline
//!
//! - **Reconciliation**: preliminary adapter-reported counts become `verified`
//!   only after a streak of identical, time-spaced provider query attempts.
//!   Coverage (steps with nonzero usage) is reported but never gates
//!   verification.
//! - **Distributions**: one [`metrics::MetricDistribution`] per framework x
//!   metric over verified runs, with relative degenerate-variance detection
//!   and Tukey outlier reporting.
//! - **Stopping**: bootstrap CI precision decides when a framework has enough
//!   runs ([`stopping::StoppingRuleEvaluator`]).
//! - **Comparison**: test selection matched to the data's properties, aligned
//!   effect sizes, Holm-Bonferroni correction
//!   ([`compare::StatisticalComparator`]).
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use bakeoff::analyze::AnalysisEngine;
//! use bakeoff::config::{ComparatorConfig, StoppingConfig};
//! use bakeoff::metrics::MetricRegistry;
//! use bakeoff::run::RunStore;
//!
//! let store = RunStore::load_from("runs.json".as_ref())?;
//! let engine = AnalysisEngine::new(
//!     MetricRegistry::with_builtins(None)?,
//!     ComparatorConfig::default(),
//!     StoppingConfig::default(),
//! )?;
//! let report = engine.analyze(&store, &["tokens_total".to_string()])?;
//! for comparison in &report.comparisons {
//!     println!("{}", comparison.narrative(0.05));
//! }
//! # Ok::<(), bakeoff::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analyze;
pub mod compare;
pub mod config;
pub mod error;
pub mod metrics;
pub mod reconcile;
pub mod run;
pub mod stats;
pub mod stopping;
pub mod usage;

pub use error::{Error, Result};
