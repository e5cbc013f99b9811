use revdoc_diff::DiffError;
use revdoc_events::EventError;
use revdoc_log::LogError;
use revdoc_types::{Address, TypeError};

/// Errors produced by the document core.
///
/// A rejected command is not an error; it is reported as
/// `CommandOutcome::Failed`. These variants are structural violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("type error: {0}")]
    Type(#[from] TypeError),

    #[error("log error: {0}")]
    Log(#[from] LogError),

    #[error("event error: {0}")]
    Event(#[from] EventError),

    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    #[error("no entity at {0}")]
    MissingEntity(Address),

    #[error("entity already exists at {0}")]
    EntityExists(Address),

    #[error("parent of {0} does not exist")]
    MissingParent(Address),

    #[error("{0} is already registered as an orphan")]
    DuplicateOrphan(Address),

    #[error("stale entity handle")]
    StaleHandle,

    #[error("event cannot be applied: {0}")]
    InvalidEvent(String),

    #[error("replay diverged at revision {revision}: {reason}")]
    ReplayDiverged { revision: i64, reason: String },
}

/// Convenience alias used throughout the core crate.
pub type CoreResult<T> = Result<T, CoreError>;
