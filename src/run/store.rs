//! Run Store - concurrent in-memory store with a JSON storage boundary
//!
//! Uses a lock-free concurrent map for O(1) lookups by run ID. Mutation goes
//! through [`RunStore::with_run_mut`], whose per-entry lock is what serializes
//! reconciliation attempts for a given run: the stability check depends on
//! the attempt log staying timestamp-ordered, and two concurrent sweeps must
//! never interleave appends for the same run.

use std::path::Path;

use dashmap::DashMap;

use super::{ReconciliationStatus, RunRecord};
use crate::error::Result;

/// Concurrent store of run records keyed by run ID.
#[derive(Debug, Default)]
pub struct RunStore {
    runs: DashMap<String, RunRecord>,
}

impl RunStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of runs in the store.
    #[must_use]
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Insert or replace a run record.
    pub fn insert(&self, run: RunRecord) {
        self.runs.insert(run.run_id().to_string(), run);
    }

    /// Get a clone of a run by ID.
    #[must_use]
    pub fn get(&self, run_id: &str) -> Option<RunRecord> {
        self.runs.get(run_id).map(|entry| entry.value().clone())
    }

    /// Run a closure against a mutable run record under the entry lock.
    ///
    /// Returns `None` when the run does not exist. All reconciliation
    /// mutation for a run flows through here, which serializes writers
    /// per run ID.
    pub fn with_run_mut<T>(&self, run_id: &str, f: impl FnOnce(&mut RunRecord) -> T) -> Option<T> {
        self.runs.get_mut(run_id).map(|mut entry| f(entry.value_mut()))
    }

    /// IDs of runs that are not yet verified, sorted for deterministic sweep
    /// order.
    #[must_use]
    pub fn unverified_run_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .runs
            .iter()
            .filter(|entry| !entry.value().reconciliation().is_verified())
            .map(|entry| entry.key().clone())
            .collect();
        ids.sort();
        ids
    }

    /// Clones of all runs for one framework.
    #[must_use]
    pub fn runs_for_framework(&self, framework: &str) -> Vec<RunRecord> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .iter()
            .filter(|entry| entry.value().framework() == framework)
            .map(|entry| entry.value().clone())
            .collect();
        runs.sort_by(|a, b| a.run_id().cmp(b.run_id()));
        runs
    }

    /// Distinct framework names present in the store, sorted.
    #[must_use]
    pub fn frameworks(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .runs
            .iter()
            .map(|entry| entry.value().framework().to_string())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Count runs in a given reconciliation status.
    #[must_use]
    pub fn count_by_status(&self, status: ReconciliationStatus) -> usize {
        self.runs
            .iter()
            .filter(|entry| entry.value().reconciliation().status() == status)
            .count()
    }

    /// Write all runs to a JSON file at the storage boundary.
    ///
    /// Records are sorted by run ID so rewriting an unchanged store is
    /// byte-identical, which keeps the boundary idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or serialized.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let mut runs: Vec<RunRecord> = self.runs.iter().map(|e| e.value().clone()).collect();
        runs.sort_by(|a, b| a.run_id().cmp(b.run_id()));
        let json = serde_json::to_string_pretty(&runs)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load runs from a JSON file written by [`RunStore::save_to`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let runs: Vec<RunRecord> = serde_json::from_str(&json)?;
        let store = Self::new();
        for run in runs {
            store.insert(run);
        }
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_default_is_empty() {
        let store = RunStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.frameworks().is_empty());
    }

    #[test]
    fn test_insert_and_get() {
        let store = RunStore::new();
        store.insert(RunRecord::new("run-1", "framework-a"));
        store.insert(RunRecord::new("run-2", "framework-b"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("run-1").unwrap().framework(), "framework-a");
        assert!(store.get("run-3").is_none());
    }

    #[test]
    fn test_frameworks_sorted_and_deduped() {
        let store = RunStore::new();
        store.insert(RunRecord::new("run-3", "zeta"));
        store.insert(RunRecord::new("run-1", "alpha"));
        store.insert(RunRecord::new("run-2", "alpha"));

        assert_eq!(store.frameworks(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_unverified_ids_sorted() {
        let store = RunStore::new();
        store.insert(RunRecord::new("run-b", "fw"));
        store.insert(RunRecord::new("run-a", "fw"));

        assert_eq!(store.unverified_run_ids(), vec!["run-a", "run-b"]);
    }

    #[test]
    fn test_with_run_mut_missing_run() {
        let store = RunStore::new();
        assert!(store.with_run_mut("nope", |_| ()).is_none());
    }
}
