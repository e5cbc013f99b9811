use revdoc_core::CoreError;
use revdoc_events::EventError;
use revdoc_log::LogError;
use revdoc_types::RevisionNumber;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    #[error("remote event at revision {revision} could not be replayed: {reason}")]
    ReplayMismatch {
        revision: RevisionNumber,
        reason: String,
    },

    #[error("cannot roll back to revision {revision}: allowed range is [{sync_revision}, {current}]")]
    RollbackOutOfRange {
        revision: RevisionNumber,
        sync_revision: RevisionNumber,
        current: RevisionNumber,
    },

    #[error("log could not be truncated to revision {0}")]
    Truncate(RevisionNumber),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("event error: {0}")]
    Event(#[from] EventError),
}

pub type SyncResult<T> = Result<T, SyncError>;
