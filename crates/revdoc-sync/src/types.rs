use std::fmt;

use revdoc_log::{ChangeCallback, ChangeOutcome};
use revdoc_types::RevisionNumber;
use serde::{Deserialize, Serialize};

/// A completion callback together with the outcome it is owed. Completions
/// are collected while the document is held and run after it is released.
pub type Completion = (ChangeCallback, ChangeOutcome);

/// What one synchronization round did.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub success: bool,
    pub old_sync_revision: RevisionNumber,
    pub new_sync_revision: RevisionNumber,
    /// Logged entries undone while rolling back.
    pub rolled_back: usize,
    pub replayed_events: usize,
    pub placeholders: usize,
    /// Local changes dropped because the remote peer confirmed them.
    pub confirmed: usize,
    pub reapplied: usize,
    pub no_change: usize,
    pub conflicts: usize,
    pub events_dropped: usize,
    pub events_merged: usize,
    pub orphans_destroyed: usize,
    pub sync_notifications: usize,
    /// Filled in by the document once the round's events were dispatched.
    pub dispatched: usize,
    pub failure: Option<String>,
}

impl SyncReport {
    pub fn new(old_sync_revision: RevisionNumber) -> Self {
        Self {
            old_sync_revision,
            new_sync_revision: old_sync_revision,
            ..Default::default()
        }
    }
}

/// Result of a round: the report and the callbacks still to run.
#[derive(Default)]
pub struct SyncRound {
    pub report: SyncReport,
    pub completions: Vec<Completion>,
}

impl SyncRound {
    pub fn new(old_sync_revision: RevisionNumber) -> Self {
        Self {
            report: SyncReport::new(old_sync_revision),
            completions: Vec::new(),
        }
    }

    /// Run every collected completion callback.
    pub fn complete(self) -> SyncReport {
        for (callback, outcome) in self.completions {
            callback(outcome);
        }
        self.report
    }
}

impl fmt::Debug for SyncRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncRound")
            .field("report", &self.report)
            .field("completions", &self.completions.len())
            .finish()
    }
}
