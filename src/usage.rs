//! Usage billing upstream interface
//!
//! The billing system is an external collaborator queried per step window.
//! Data propagates into it with unknown, variable delay, so a zero or partial
//! response means "not yet available", never an error. Reconciliation keeps
//! re-querying until the numbers stop moving.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One query window against the billing upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageWindow {
    /// Inclusive window start.
    pub start: DateTime<Utc>,
    /// Exclusive window end.
    pub end: DateTime<Utc>,
    /// Model filter forwarded to the upstream (e.g. a model name prefix).
    pub model_filter: String,
}

/// Token and call counts reported by the billing upstream for one window.
///
/// All-zero totals are a valid response meaning the upstream has not yet
/// propagated data for the window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    /// Input (prompt) tokens.
    pub tokens_in: u64,
    /// Output (completion) tokens.
    pub tokens_out: u64,
    /// API calls made in the window.
    pub api_calls: u64,
    /// Cached prompt tokens.
    pub cached_tokens: u64,
}

impl UsageTotals {
    /// True when the upstream reported any usage at all for the window.
    #[must_use]
    pub const fn has_usage(&self) -> bool {
        self.tokens_in > 0 || self.tokens_out > 0 || self.api_calls > 0 || self.cached_tokens > 0
    }

    /// Sum two totals, saturating on overflow.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self {
            tokens_in: self.tokens_in.saturating_add(other.tokens_in),
            tokens_out: self.tokens_out.saturating_add(other.tokens_out),
            api_calls: self.api_calls.saturating_add(other.api_calls),
            cached_tokens: self.cached_tokens.saturating_add(other.cached_tokens),
        }
    }
}

/// Client for the external usage billing system.
///
/// Implementations may block on network I/O; the reconciliation engine wraps
/// every call in a timeout and treats a timeout as a retryable failure.
///
/// # Example
///
/// ```rust
/// use bakeoff::usage::{UsageQueryClient, UsageTotals, UsageWindow};
///
/// struct Flat;
///
/// impl UsageQueryClient for Flat {
///     async fn query(&self, _window: &UsageWindow) -> bakeoff::Result<UsageTotals> {
///         Ok(UsageTotals { tokens_in: 100, tokens_out: 50, api_calls: 1, cached_tokens: 0 })
///     }
/// }
/// ```
pub trait UsageQueryClient: Send + Sync {
    /// Query token/call counts for one window.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::UpstreamUnavailable`] on transport failure.
    /// An empty window is `Ok` with all-zero totals, not an error.
    fn query(
        &self,
        window: &UsageWindow,
    ) -> impl std::future::Future<Output = Result<UsageTotals>> + Send;
}
