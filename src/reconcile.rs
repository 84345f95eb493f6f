//! Reconciliation engine - promotes runs from pending to verified
//!
//! Billing data arrives upstream with unknown, variable delay. The engine
//! re-queries each run's step windows on a schedule and promotes a run to
//! `Verified` only once enough consecutive, sufficiently spaced attempts
//! report bit-for-bit identical counts. Unstable numbers are never reported
//! as final.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReconcileConfig;
use crate::error::{Error, Result};
use crate::run::{ReconciliationAttempt, ReconciliationStatus, RunRecord, RunStore, StepWindow};
use crate::usage::{UsageQueryClient, UsageTotals, UsageWindow};

/// Why an attempt was not recorded for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The run is already verified; re-sweeping it is a no-op.
    AlreadyVerified,
    /// The earliest step is younger than the configured minimum run age;
    /// the upstream will not have propagated yet.
    TooYoung,
    /// The run has no recorded steps to query.
    NoSteps,
}

/// Outcome of one reconciliation attempt on one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    /// No attempt was recorded.
    Skipped(SkipReason),
    /// An attempt was appended to the run's log.
    Recorded {
        /// Status after the attempt.
        status: ReconciliationStatus,
        /// Stable streak after the attempt.
        stable_streak: u32,
        /// Fraction of steps with nonzero usage in this attempt. Reported
        /// for diagnostics; never gates verification.
        coverage: f64,
        /// True when the upstream query failed and zero counts were logged.
        query_failed: bool,
    },
}

/// Summary of one sweep over the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Unverified runs examined.
    pub examined: usize,
    /// Runs skipped because they were too young to query.
    pub skipped_young: usize,
    /// Runs that reached `Verified` during this sweep.
    pub newly_verified: usize,
    /// Runs still `Pending` after this sweep.
    pub still_pending: usize,
    /// Runs in `Warning` after this sweep.
    pub warnings: usize,
    /// Attempts that recorded an upstream query failure.
    pub query_failures: usize,
    /// True when the sweep stopped early on a cancellation request.
    pub cancelled: bool,
}

/// Reconciliation engine over a usage billing client.
///
/// Sweeps query the upstream against a snapshot of each run's steps, then
/// re-check the terminal status and append the resulting attempt under the
/// [`RunStore`] per-entry lock. Concurrent sweeps over one store interleave
/// between runs but never lose an append.
pub struct ReconciliationEngine<C: UsageQueryClient> {
    client: C,
    config: ReconcileConfig,
}

impl<C: UsageQueryClient> ReconciliationEngine<C> {
    /// Create an engine, validating the configuration up front.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid.
    pub fn new(client: C, config: ReconcileConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { client, config })
    }

    /// Get the engine configuration.
    #[must_use]
    pub const fn config(&self) -> &ReconcileConfig {
        &self.config
    }

    /// Attempt reconciliation for one run.
    ///
    /// Preconditions from the run itself (already verified, too young, no
    /// steps) surface as [`AttemptOutcome::Skipped`], leaving the state
    /// untouched. An upstream failure is recorded as a zero-count failed
    /// attempt and is not an error at this level.
    pub async fn attempt(&self, run: &mut RunRecord, now: DateTime<Utc>) -> AttemptOutcome {
        if let Some(reason) = self.skip_reason(run, now) {
            return AttemptOutcome::Skipped(reason);
        }

        let attempt = self.build_attempt(run.run_id(), run.steps(), now).await;
        let query_failed = attempt.query_failed();
        let coverage = attempt.coverage();

        let state = run.reconciliation_mut();
        state.append_attempt(
            attempt,
            self.config.required_stable_attempts,
            self.config.min_attempt_spacing(),
            self.config.failure_alert_threshold,
        );

        let status = state.status();
        let stable_streak = state.stable_streak();
        match status {
            ReconciliationStatus::Verified => {
                info!(
                    run_id = run.run_id(),
                    stable_streak, coverage, "run verified"
                );
            }
            ReconciliationStatus::Warning => {
                warn!(
                    run_id = run.run_id(),
                    "repeated upstream failures, run needs operator attention"
                );
            }
            _ => {}
        }

        AttemptOutcome::Recorded {
            status,
            stable_streak,
            coverage,
            query_failed,
        }
    }

    /// Sweep every unverified run in the store once.
    ///
    /// Cancellation is honored between runs, never mid-run: each attempt
    /// append is a complete atomic unit, and partial progress across runs is
    /// a valid intermediate state.
    pub async fn sweep(
        &self,
        store: &RunStore,
        now: DateTime<Utc>,
        cancel: &AtomicBool,
    ) -> SweepReport {
        let mut report = SweepReport::default();
        for run_id in store.unverified_run_ids() {
            if cancel.load(Ordering::Relaxed) {
                report.cancelled = true;
                info!(examined = report.examined, "sweep cancelled between runs");
                break;
            }
            // Query against a snapshot of the steps: the entry lock must not
            // be held across an await.
            let Some(snapshot) = store.get(&run_id) else {
                continue;
            };
            report.examined += 1;
            if let Some(reason) = self.skip_reason(&snapshot, now) {
                if reason == SkipReason::TooYoung {
                    report.skipped_young += 1;
                }
                continue;
            }
            let attempt = self.build_attempt(&run_id, snapshot.steps(), now).await;
            let query_failed = attempt.query_failed();

            // Re-check the terminal status and append under the entry lock:
            // a concurrent sweep may have appended since the snapshot, and a
            // lost append would corrupt the stability evidence.
            let status = store
                .with_run_mut(&run_id, |stored| {
                    if stored.reconciliation().is_verified() {
                        return None;
                    }
                    stored.reconciliation_mut().append_attempt(
                        attempt,
                        self.config.required_stable_attempts,
                        self.config.min_attempt_spacing(),
                        self.config.failure_alert_threshold,
                    );
                    Some(stored.reconciliation().status())
                })
                .flatten();
            let Some(status) = status else {
                continue;
            };
            if query_failed {
                report.query_failures += 1;
            }
            match status {
                ReconciliationStatus::Verified => {
                    report.newly_verified += 1;
                    info!(run_id = %run_id, "run verified");
                }
                ReconciliationStatus::Warning => {
                    report.warnings += 1;
                    warn!(run_id = %run_id, "repeated upstream failures, run needs operator attention");
                }
                _ => report.still_pending += 1,
            }
        }
        info!(
            examined = report.examined,
            newly_verified = report.newly_verified,
            still_pending = report.still_pending,
            query_failures = report.query_failures,
            "sweep complete"
        );
        report
    }

    /// Precondition check shared by [`Self::attempt`] and [`Self::sweep`].
    fn skip_reason(&self, run: &RunRecord, now: DateTime<Utc>) -> Option<SkipReason> {
        if run.reconciliation().is_verified() {
            return Some(SkipReason::AlreadyVerified);
        }
        let Some(earliest) = run.earliest_step_start() else {
            return Some(SkipReason::NoSteps);
        };
        if now - earliest < self.config.min_run_age() {
            debug!(
                run_id = run.run_id(),
                "run younger than minimum age, leaving status untouched"
            );
            return Some(SkipReason::TooYoung);
        }
        None
    }

    /// Query the upstream for every step and wrap the result as an attempt;
    /// a query failure becomes a zero-count failed attempt.
    async fn build_attempt(
        &self,
        run_id: &str,
        steps: &[StepWindow],
        now: DateTime<Utc>,
    ) -> ReconciliationAttempt {
        let total_steps = u32::try_from(steps.len()).unwrap_or(u32::MAX);
        match self.query_all_steps(steps, now).await {
            Ok((totals, nonzero_steps)) => {
                ReconciliationAttempt::new(now, totals, nonzero_steps, total_steps)
            }
            Err(err) => {
                warn!(
                    run_id,
                    error = %err,
                    "usage query failed, recording zero-count attempt"
                );
                ReconciliationAttempt::failed(now, total_steps)
            }
        }
    }

    /// Query usage for every step window and sum the totals.
    async fn query_all_steps(
        &self,
        steps: &[StepWindow],
        now: DateTime<Utc>,
    ) -> Result<(UsageTotals, u32)> {
        let timeout = StdDuration::from_secs(self.config.query_timeout_secs);
        let mut totals = UsageTotals::default();
        let mut nonzero_steps = 0u32;
        for step in steps {
            let window = UsageWindow {
                start: step.start(),
                end: step.end(),
                model_filter: self.config.model_filter.clone(),
            };
            let queried = tokio::time::timeout(timeout, self.client.query(&window))
                .await
                .map_err(|_| {
                    Error::UpstreamUnavailable(format!(
                        "query for step {} timed out after {}s at {now}",
                        step.step_index(),
                        timeout.as_secs()
                    ))
                })??;
            if queried.has_usage() {
                nonzero_steps += 1;
            }
            totals = totals.saturating_add(queried);
        }
        Ok((totals, nonzero_steps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::AtomicUsize;

    /// Client returning a fixed per-step total.
    struct FixedClient {
        per_step: UsageTotals,
        calls: AtomicUsize,
    }

    impl FixedClient {
        fn new(per_step: UsageTotals) -> Self {
            Self {
                per_step,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl UsageQueryClient for FixedClient {
        async fn query(&self, _window: &UsageWindow) -> Result<UsageTotals> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.per_step)
        }
    }

    /// Client that always fails.
    struct DownClient;

    impl UsageQueryClient for DownClient {
        async fn query(&self, _window: &UsageWindow) -> Result<UsageTotals> {
            Err(Error::UpstreamUnavailable("503 from upstream".to_string()))
        }
    }

    fn ts(minutes: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + minutes * 60, 0).unwrap()
    }

    fn run_with_steps(n: u32) -> RunRecord {
        let mut run = RunRecord::new("run-1", "framework-a");
        for i in 0..n {
            run.push_step(StepWindow::new(
                i,
                ts(i64::from(i)),
                ts(i64::from(i) + 1),
                UsageTotals::default(),
            ));
        }
        run
    }

    fn config() -> ReconcileConfig {
        ReconcileConfig {
            min_run_age_minutes: 30,
            min_attempt_spacing_minutes: 60,
            required_stable_attempts: 2,
            failure_alert_threshold: 3,
            query_timeout_secs: 5,
            model_filter: "model-x".to_string(),
        }
    }

    #[tokio::test]
    async fn test_too_young_is_noop() {
        let engine = ReconciliationEngine::new(
            FixedClient::new(UsageTotals::default()),
            config(),
        )
        .unwrap();
        let mut run = run_with_steps(3);
        let outcome = engine.attempt(&mut run, ts(10)).await;
        assert_eq!(outcome, AttemptOutcome::Skipped(SkipReason::TooYoung));
        assert_eq!(run.reconciliation().status(), ReconciliationStatus::None);
        assert!(run.reconciliation().attempts().is_empty());
    }

    #[tokio::test]
    async fn test_two_stable_attempts_verify() {
        let per_step = UsageTotals {
            tokens_in: 500,
            tokens_out: 120,
            api_calls: 2,
            cached_tokens: 0,
        };
        let engine = ReconciliationEngine::new(FixedClient::new(per_step), config()).unwrap();
        let mut run = run_with_steps(4);

        let first = engine.attempt(&mut run, ts(60)).await;
        assert!(matches!(
            first,
            AttemptOutcome::Recorded {
                status: ReconciliationStatus::Pending,
                stable_streak: 1,
                ..
            }
        ));

        let second = engine.attempt(&mut run, ts(121)).await;
        assert!(matches!(
            second,
            AttemptOutcome::Recorded {
                status: ReconciliationStatus::Verified,
                stable_streak: 2,
                ..
            }
        ));
        let expected = UsageTotals {
            tokens_in: 2000,
            tokens_out: 480,
            api_calls: 8,
            cached_tokens: 0,
        };
        assert_eq!(run.verified_totals(), Some(expected));
    }

    #[tokio::test]
    async fn test_verified_run_is_never_requeried() {
        let engine = ReconciliationEngine::new(
            FixedClient::new(UsageTotals {
                tokens_in: 1,
                tokens_out: 1,
                api_calls: 1,
                cached_tokens: 0,
            }),
            ReconcileConfig {
                required_stable_attempts: 1,
                ..config()
            },
        )
        .unwrap();
        let mut run = run_with_steps(2);

        let first = engine.attempt(&mut run, ts(60)).await;
        assert!(matches!(
            first,
            AttemptOutcome::Recorded {
                status: ReconciliationStatus::Verified,
                ..
            }
        ));
        let calls_after_first = engine.client.calls.load(Ordering::SeqCst);

        let second = engine.attempt(&mut run, ts(200)).await;
        assert_eq!(
            second,
            AttemptOutcome::Skipped(SkipReason::AlreadyVerified)
        );
        assert_eq!(engine.client.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test]
    async fn test_failure_records_zero_attempt_and_stays_pending() {
        let engine = ReconciliationEngine::new(DownClient, config()).unwrap();
        let mut run = run_with_steps(2);

        let outcome = engine.attempt(&mut run, ts(60)).await;
        assert!(matches!(
            outcome,
            AttemptOutcome::Recorded {
                status: ReconciliationStatus::Pending,
                stable_streak: 0,
                query_failed: true,
                ..
            }
        ));
        assert_eq!(run.reconciliation().attempts().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_failures_escalate_to_warning() {
        let engine = ReconciliationEngine::new(DownClient, config()).unwrap();
        let mut run = run_with_steps(2);

        for i in 0..3 {
            engine.attempt(&mut run, ts(60 + i * 61)).await;
        }
        assert_eq!(
            run.reconciliation().status(),
            ReconciliationStatus::Warning
        );
    }

    #[tokio::test]
    async fn test_sweep_updates_store_and_reports() {
        let per_step = UsageTotals {
            tokens_in: 10,
            tokens_out: 5,
            api_calls: 1,
            cached_tokens: 0,
        };
        let engine = ReconciliationEngine::new(
            FixedClient::new(per_step),
            ReconcileConfig {
                required_stable_attempts: 1,
                ..config()
            },
        )
        .unwrap();

        let store = RunStore::new();
        let mut old = RunRecord::new("run-old", "fw");
        old.push_step(StepWindow::new(0, ts(0), ts(1), UsageTotals::default()));
        store.insert(old);
        let mut young = RunRecord::new("run-young", "fw");
        young.push_step(StepWindow::new(0, ts(55), ts(56), UsageTotals::default()));
        store.insert(young);

        let cancel = AtomicBool::new(false);
        let report = engine.sweep(&store, ts(60), &cancel).await;

        assert_eq!(report.examined, 2);
        assert_eq!(report.newly_verified, 1);
        assert_eq!(report.skipped_young, 1);
        assert!(!report.cancelled);
        assert!(store.get("run-old").unwrap().reconciliation().is_verified());
        assert_eq!(
            store.get("run-young").unwrap().reconciliation().status(),
            ReconciliationStatus::None
        );
    }

    #[tokio::test]
    async fn test_sweep_honors_cancellation() {
        let engine =
            ReconciliationEngine::new(FixedClient::new(UsageTotals::default()), config()).unwrap();
        let store = RunStore::new();
        store.insert(run_with_steps(1));

        let cancel = AtomicBool::new(true);
        let report = engine.sweep(&store, ts(60), &cancel).await;
        assert!(report.cancelled);
        assert_eq!(report.examined, 0);
    }

    /// Client that yields to the executor before answering, so two
    /// concurrent sweeps both snapshot the run before either appends.
    struct YieldingClient {
        per_step: UsageTotals,
    }

    impl UsageQueryClient for YieldingClient {
        async fn query(&self, _window: &UsageWindow) -> Result<UsageTotals> {
            tokio::task::yield_now().await;
            Ok(self.per_step)
        }
    }

    #[tokio::test]
    async fn test_concurrent_sweeps_never_lose_an_append() {
        let per_step = UsageTotals {
            tokens_in: 500,
            tokens_out: 120,
            api_calls: 2,
            cached_tokens: 0,
        };
        let engine_a =
            ReconciliationEngine::new(YieldingClient { per_step }, config()).unwrap();
        let engine_b =
            ReconciliationEngine::new(YieldingClient { per_step }, config()).unwrap();
        let store = RunStore::new();
        store.insert(run_with_steps(1));
        let cancel = AtomicBool::new(false);

        // Both sweeps snapshot the run with an empty attempt log, then
        // append under the entry lock. Both attempts must survive.
        let (a, b) = tokio::join!(
            engine_a.sweep(&store, ts(60), &cancel),
            engine_b.sweep(&store, ts(60), &cancel),
        );
        assert_eq!(a.examined, 1);
        assert_eq!(b.examined, 1);

        let run = store.get("run-1").unwrap();
        assert_eq!(run.reconciliation().attempts().len(), 2);
        assert_eq!(run.reconciliation().status(), ReconciliationStatus::Pending);
    }
}
