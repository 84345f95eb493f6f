//! Run Record - one benchmarked execution of one framework

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ReconciliationState, StepWindow};
use crate::usage::UsageTotals;

/// One experiment execution of one framework.
///
/// Steps are appended by the adapter layer while the run progresses. Once
/// archived the record is immutable except for the reconciliation state,
/// which only the reconciliation engine mutates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    run_id: String,
    framework: String,
    steps: Vec<StepWindow>,
    reconciliation: ReconciliationState,
}

impl RunRecord {
    /// Create a new run record with no steps.
    #[must_use]
    pub fn new(run_id: impl Into<String>, framework: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            framework: framework.into(),
            steps: Vec::new(),
            reconciliation: ReconciliationState::default(),
        }
    }

    /// Get the run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the framework this run benchmarked.
    #[must_use]
    pub fn framework(&self) -> &str {
        &self.framework
    }

    /// Get the ordered step windows.
    #[must_use]
    pub fn steps(&self) -> &[StepWindow] {
        &self.steps
    }

    /// Get the reconciliation state.
    #[must_use]
    pub const fn reconciliation(&self) -> &ReconciliationState {
        &self.reconciliation
    }

    pub(crate) fn reconciliation_mut(&mut self) -> &mut ReconciliationState {
        &mut self.reconciliation
    }

    /// Append a step window. Steps arrive in index order from the adapter.
    pub fn push_step(&mut self, step: StepWindow) {
        debug_assert!(
            self.steps
                .last()
                .map_or(true, |last| last.step_index() < step.step_index()),
            "steps must arrive in index order"
        );
        self.steps.push(step);
    }

    /// Start of the earliest step, if any step was recorded.
    #[must_use]
    pub fn earliest_step_start(&self) -> Option<DateTime<Utc>> {
        self.steps.iter().map(StepWindow::start).min()
    }

    /// End of the latest step, if any step was recorded.
    #[must_use]
    pub fn latest_step_end(&self) -> Option<DateTime<Utc>> {
        self.steps.iter().map(StepWindow::end).max()
    }

    /// Wall-clock duration of the run in seconds, first step start to last
    /// step end.
    #[must_use]
    pub fn wall_clock_secs(&self) -> Option<f64> {
        let start = self.earliest_step_start()?;
        let end = self.latest_step_end()?;
        Some((end - start).num_milliseconds() as f64 / 1000.0)
    }

    /// Adapter-reported preliminary totals summed across steps.
    ///
    /// Untrusted until reconciled.
    #[must_use]
    pub fn preliminary_totals(&self) -> UsageTotals {
        self.steps
            .iter()
            .fold(UsageTotals::default(), |acc, step| {
                acc.saturating_add(step.preliminary())
            })
    }

    /// Reconciled totals from the latest attempt, if the run is verified.
    #[must_use]
    pub fn verified_totals(&self) -> Option<UsageTotals> {
        if !self.reconciliation.is_verified() {
            return None;
        }
        self.reconciliation
            .attempts()
            .last()
            .map(super::ReconciliationAttempt::queried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn step(index: u32, start_secs: i64, end_secs: i64, tokens_in: u64) -> StepWindow {
        StepWindow::new(
            index,
            ts(start_secs),
            ts(end_secs),
            UsageTotals {
                tokens_in,
                tokens_out: tokens_in / 4,
                api_calls: 1,
                cached_tokens: 0,
            },
        )
    }

    #[test]
    fn test_new_run_has_no_reconciliation() {
        let run = RunRecord::new("run-1", "framework-a");
        assert_eq!(run.run_id(), "run-1");
        assert_eq!(run.framework(), "framework-a");
        assert!(run.steps().is_empty());
        assert!(!run.reconciliation().is_verified());
        assert!(run.verified_totals().is_none());
    }

    #[test]
    fn test_preliminary_totals_sum_steps() {
        let mut run = RunRecord::new("run-1", "framework-a");
        run.push_step(step(0, 0, 60, 1000));
        run.push_step(step(1, 60, 150, 2000));
        let totals = run.preliminary_totals();
        assert_eq!(totals.tokens_in, 3000);
        assert_eq!(totals.api_calls, 2);
    }

    #[test]
    fn test_wall_clock_spans_first_to_last_step() {
        let mut run = RunRecord::new("run-1", "framework-a");
        run.push_step(step(0, 0, 60, 100));
        run.push_step(step(1, 90, 300, 100));
        assert!((run.wall_clock_secs().unwrap() - 300.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_wall_clock_none_without_steps() {
        let run = RunRecord::new("run-1", "framework-a");
        assert!(run.wall_clock_secs().is_none());
    }
}
