use revdoc_types::RevisionNumber;

use crate::local_changes::LocalChangeId;

/// Errors produced by log operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    #[error("event revision mismatch: expected {expected}, got {actual}")]
    RevisionMismatch {
        expected: RevisionNumber,
        actual: RevisionNumber,
    },

    #[error("event at revision {revision} is part of a transaction and cannot be logged on its own")]
    TransactionMember { revision: RevisionNumber },

    #[error("revision {revision} outside log range ({base}, {current}]")]
    OutOfRange {
        revision: RevisionNumber,
        base: RevisionNumber,
        current: RevisionNumber,
    },

    #[error("sync revision {sync_revision} outside log range [{base}, {current}]")]
    SyncRevisionOutOfRange {
        sync_revision: RevisionNumber,
        base: RevisionNumber,
        current: RevisionNumber,
    },

    #[error("local change {0} not found")]
    UnknownLocalChange(LocalChangeId),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid frame length: declared {declared}, available {available}")]
    InvalidFrameLength { declared: usize, available: usize },

    #[error("CRC integrity check failed: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch { expected: u32, actual: u32 },
}

/// Convenience alias used throughout the log crate.
pub type LogResult<T> = Result<T, LogError>;
