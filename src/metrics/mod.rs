//! Metric extraction and per-framework distributions
//!
//! ## Module structure
//!
//! - [`registry`] - metric name → extraction strategy, resolved once at
//!   configuration load time (no string dispatch scattered through report
//!   code)
//! - [`distribution`] - per-framework, per-metric sample distributions with
//!   shape statistics and the scale-invariant degeneracy check

pub mod distribution;
pub mod registry;

pub use distribution::{DistributionBuilder, MetricDistribution, Outlier};
pub use registry::{MetricRegistry, BUILTIN_METRICS};

use serde::{Deserialize, Serialize};

/// One scalar observation of one metric from one run.
///
/// Derived on demand from eligible runs, never stored independently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Framework the run benchmarked.
    pub framework: String,
    /// Metric name.
    pub metric_name: String,
    /// Run the sample came from.
    pub run_id: String,
    /// Extracted scalar value.
    pub value: f64,
}
