//! Error types for the reconciliation and comparison engine
//!
//! The taxonomy separates retryable upstream trouble from statistical edge
//! cases and from fatal configuration mistakes, so the scheduling layer can
//! retry what is retryable and fail fast on what is not.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error types
#[derive(Error, Debug)]
pub enum Error {
    /// The usage billing upstream failed or timed out.
    ///
    /// Retryable: the scheduling layer re-queries on the next sweep. Never
    /// masked inside the core logic.
    #[error("usage upstream unavailable: {0}\nThe run stays pending and will be retried on the next sweep")]
    UpstreamUnavailable(String),

    /// Fewer samples than the statistic requires.
    ///
    /// Degrades to an explicit "undefined" result field, never a crash and
    /// never a silently substituted number.
    #[error("insufficient data: {context} requires at least {required} samples, got {actual}")]
    InsufficientData {
        /// What was being computed
        context: String,
        /// Minimum sample count for the statistic
        required: usize,
        /// Sample count actually available
        actual: usize,
    },

    /// An effect size requiring nonzero variance was requested where variance
    /// is degenerate.
    ///
    /// Intercepted before computation; a divide-by-zero or NaN must never
    /// propagate out of the stats layer.
    #[error("degenerate variance: {0}\nCohen's d is undefined here; use a rank-based effect size")]
    DegenerateVariance(String),

    /// Missing or invalid configuration.
    ///
    /// Fatal and surfaced immediately. Absence of a required parameter is
    /// never papered over with a silent default.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// IO error at the storage boundary
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error at the storage boundary
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// True when the scheduling layer should retry the operation later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_unavailable_is_retryable() {
        let err = Error::UpstreamUnavailable("timeout after 30s".to_string());
        assert!(err.is_retryable());
        assert!(format!("{err}").contains("retried on the next sweep"));
    }

    #[test]
    fn test_configuration_is_fatal() {
        let err = Error::Configuration("no extractor registered for 'latency'".to_string());
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("configuration error"));
    }

    #[test]
    fn test_insufficient_data_message() {
        let err = Error::InsufficientData {
            context: "bootstrap CI".to_string(),
            required: 2,
            actual: 1,
        };
        let msg = format!("{err}");
        assert!(msg.contains("at least 2"));
        assert!(msg.contains("got 1"));
    }
}
