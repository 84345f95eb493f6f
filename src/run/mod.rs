//! Run records and reconciliation state
//!
//! ## Schema Overview
//!
//! ```text
//! RunRecord (per framework execution)
//!     ├──< StepWindow (N, append-only, produced by adapters)
//!     └── ReconciliationState
//!             └──< ReconciliationAttempt (N, append-only, timestamp-ordered)
//! ```
//!
//! A run is created when an execution starts, steps are appended as it
//! progresses, and once archived only the reconciliation state still changes,
//! and only through the reconciliation engine.

mod reconciliation;
mod record;
mod step;
mod store;

pub use reconciliation::{
    compute_stable_streak, ReconciliationAttempt, ReconciliationState, ReconciliationStatus,
};
pub use record::RunRecord;
pub use step::StepWindow;
pub use store::RunStore;
