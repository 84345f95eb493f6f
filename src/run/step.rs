//! Step Window - one adapter-reported step of a run

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::usage::UsageTotals;

/// One step of a run as reported by the adapter layer.
///
/// The token counts here are preliminary estimates from the adapter and are
/// treated as untrusted until reconciled against the billing upstream. The
/// core never mutates a step window after the adapter produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWindow {
    step_index: u32,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    preliminary_tokens_in: u64,
    preliminary_tokens_out: u64,
    preliminary_api_calls: u64,
    preliminary_cached_tokens: u64,
}

impl StepWindow {
    /// Create a new step window.
    #[must_use]
    pub const fn new(
        step_index: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        preliminary: UsageTotals,
    ) -> Self {
        Self {
            step_index,
            start,
            end,
            preliminary_tokens_in: preliminary.tokens_in,
            preliminary_tokens_out: preliminary.tokens_out,
            preliminary_api_calls: preliminary.api_calls,
            preliminary_cached_tokens: preliminary.cached_tokens,
        }
    }

    /// Get the step index within the run.
    #[must_use]
    pub const fn step_index(&self) -> u32 {
        self.step_index
    }

    /// Get the step start timestamp.
    #[must_use]
    pub const fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Get the step end timestamp.
    #[must_use]
    pub const fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Get the adapter's preliminary usage estimate for this step.
    #[must_use]
    pub const fn preliminary(&self) -> UsageTotals {
        UsageTotals {
            tokens_in: self.preliminary_tokens_in,
            tokens_out: self.preliminary_tokens_out,
            api_calls: self.preliminary_api_calls,
            cached_tokens: self.preliminary_cached_tokens,
        }
    }

    /// Wall-clock duration of the step in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_step_window_preserves_preliminary_counts() {
        let preliminary = UsageTotals {
            tokens_in: 1200,
            tokens_out: 340,
            api_calls: 3,
            cached_tokens: 800,
        };
        let step = StepWindow::new(0, ts(0), ts(45), preliminary);
        assert_eq!(step.step_index(), 0);
        assert_eq!(step.preliminary(), preliminary);
    }

    #[test]
    fn test_step_duration() {
        let step = StepWindow::new(1, ts(0), ts(90), UsageTotals::default());
        assert!((step.duration_secs() - 90.0).abs() < f64::EPSILON);
    }
}
