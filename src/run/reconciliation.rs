//! Reconciliation state - append-only attempt log with derived status
//!
//! Status transitions are pure functions of the attempt log, not hidden
//! counters: `stable_streak` and the `Warning` escalation are both recomputed
//! from the log every time an attempt is appended. `Verified` is terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::UsageTotals;

/// Reconciliation status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconciliationStatus {
    /// No attempt recorded yet (run too young or never swept).
    #[default]
    None,
    /// Attempts recorded, counts not yet stable.
    Pending,
    /// Counts stable across enough spaced attempts. Terminal.
    Verified,
    /// Repeated consecutive query failures; operator attention needed.
    /// Still retryable, unlike `Verified`.
    Warning,
}

/// One reconciliation attempt against the billing upstream.
///
/// Appended, never mutated or removed. Timestamp ordering within the log is
/// an invariant the engine maintains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationAttempt {
    timestamp: DateTime<Utc>,
    queried: UsageTotals,
    steps_with_nonzero_usage: u32,
    total_steps: u32,
    query_failed: bool,
}

impl ReconciliationAttempt {
    /// Record a successful query sweep over all step windows of a run.
    #[must_use]
    pub const fn new(
        timestamp: DateTime<Utc>,
        queried: UsageTotals,
        steps_with_nonzero_usage: u32,
        total_steps: u32,
    ) -> Self {
        Self {
            timestamp,
            queried,
            steps_with_nonzero_usage,
            total_steps,
            query_failed: false,
        }
    }

    /// Record a failed query sweep. Counts are zero and the attempt never
    /// extends a stable streak.
    #[must_use]
    pub const fn failed(timestamp: DateTime<Utc>, total_steps: u32) -> Self {
        Self {
            timestamp,
            queried: UsageTotals {
                tokens_in: 0,
                tokens_out: 0,
                api_calls: 0,
                cached_tokens: 0,
            },
            steps_with_nonzero_usage: 0,
            total_steps,
            query_failed: true,
        }
    }

    /// Get the attempt timestamp.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Get the queried totals summed across all step windows.
    #[must_use]
    pub const fn queried(&self) -> UsageTotals {
        self.queried
    }

    /// Get the number of steps whose window showed any usage.
    #[must_use]
    pub const fn steps_with_nonzero_usage(&self) -> u32 {
        self.steps_with_nonzero_usage
    }

    /// Get the total number of steps queried.
    #[must_use]
    pub const fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// True when the upstream query failed for this sweep.
    #[must_use]
    pub const fn query_failed(&self) -> bool {
        self.query_failed
    }

    /// Fraction of steps with nonzero usage.
    ///
    /// Reported for diagnostics only. Coverage never gates verification: a
    /// framework that legitimately makes zero LLM calls on some steps must
    /// still verify once its numbers are stable.
    #[must_use]
    pub fn coverage(&self) -> f64 {
        if self.total_steps == 0 {
            return 0.0;
        }
        f64::from(self.steps_with_nonzero_usage) / f64::from(self.total_steps)
    }
}

/// Length of the trailing stable chain in the attempt log.
///
/// Walks backward from the newest attempt, extending the chain while the
/// previous attempt is at least `min_spacing` older and reports bit-for-bit
/// identical counts. A failed attempt anywhere in the chain ends it. The
/// newest successful attempt alone is a chain of length 1.
#[must_use]
pub fn compute_stable_streak(attempts: &[ReconciliationAttempt], min_spacing: Duration) -> u32 {
    let Some(latest) = attempts.last() else {
        return 0;
    };
    if latest.query_failed {
        return 0;
    }
    let mut streak = 1u32;
    for pair in attempts.windows(2).rev() {
        let (earlier, later) = (&pair[0], &pair[1]);
        if earlier.query_failed {
            break;
        }
        if later.timestamp - earlier.timestamp < min_spacing {
            break;
        }
        if earlier.queried != later.queried {
            break;
        }
        streak += 1;
    }
    streak
}

/// Number of trailing consecutive failed attempts in the log.
fn trailing_failures(attempts: &[ReconciliationAttempt]) -> u32 {
    let mut failures = 0u32;
    for attempt in attempts.iter().rev() {
        if attempt.query_failed() {
            failures += 1;
        } else {
            break;
        }
    }
    failures
}

/// Reconciliation state of one run: status, attempt log, cached streak.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ReconciliationState {
    status: ReconciliationStatus,
    attempts: Vec<ReconciliationAttempt>,
    stable_streak: u32,
}

impl ReconciliationState {
    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> ReconciliationStatus {
        self.status
    }

    /// Get the append-only attempt log, oldest first.
    #[must_use]
    pub fn attempts(&self) -> &[ReconciliationAttempt] {
        &self.attempts
    }

    /// Get the cached stable streak as of the latest attempt.
    #[must_use]
    pub const fn stable_streak(&self) -> u32 {
        self.stable_streak
    }

    /// True once the run is verified; no further attempts may be scheduled.
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == ReconciliationStatus::Verified
    }

    /// Coverage reported by the latest attempt, if any.
    #[must_use]
    pub fn latest_coverage(&self) -> Option<f64> {
        self.attempts.last().map(ReconciliationAttempt::coverage)
    }

    /// Append an attempt and re-derive status from the log.
    ///
    /// `required_stable_attempts` and `min_spacing` come from
    /// [`crate::config::ReconcileConfig`]; `failure_alert_threshold` controls
    /// the `Warning` escalation. The engine serializes attempts per run, so
    /// the log is ordered by construction and this method only debug-asserts
    /// the ordering.
    pub(crate) fn append_attempt(
        &mut self,
        attempt: ReconciliationAttempt,
        required_stable_attempts: u32,
        min_spacing: Duration,
        failure_alert_threshold: u32,
    ) {
        debug_assert!(
            self.attempts
                .last()
                .map_or(true, |last| last.timestamp() <= attempt.timestamp()),
            "attempt log must stay timestamp-ordered"
        );
        self.attempts.push(attempt);
        self.stable_streak = compute_stable_streak(&self.attempts, min_spacing);
        self.status = if self.stable_streak >= required_stable_attempts {
            ReconciliationStatus::Verified
        } else if trailing_failures(&self.attempts) >= failure_alert_threshold {
            ReconciliationStatus::Warning
        } else {
            ReconciliationStatus::Pending
        };
    }
}
