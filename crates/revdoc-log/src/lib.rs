//! Revision-indexed logs for Revdoc.
//!
//! This crate provides:
//! - `ChangeLogReader` / `ChangeLogWriter` trait boundaries
//! - `ChangeLog`, mapping revision → event with placeholder slots
//! - `SyncLog`, which also keeps producing commands and a sync revision
//! - `LocalChangeQueue`, the FIFO of not yet confirmed local changes
//! - Log validation (positions, transaction structure, sync revision)
//! - CRC-framed bincode encoding of log state

pub mod change_log;
pub mod error;
pub mod local_changes;
pub mod persist;
pub mod sync_log;
pub mod traits;
pub mod validation;

pub use change_log::{ChangeLog, ChangeLogState};
pub use error::{LogError, LogResult};
pub use local_changes::{
    ChangeCallback, ChangeOutcome, LocalChange, LocalChangeId, LocalChangeQueue, RevisionRemap,
};
pub use sync_log::{SyncLog, SyncLogEntry, SyncLogState};
pub use traits::{ChangeLogReader, ChangeLogWriter};
pub use validation::{LogValidator, ValidationReport, Violation, ViolationKind};
