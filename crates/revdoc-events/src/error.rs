use revdoc_log::LogError;
use revdoc_types::Address;

/// Errors produced by the event queue and the reducer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    /// Logging an enqueued event failed.
    #[error("log error: {0}")]
    Log(#[from] LogError),

    /// Two events picked for merging cannot be merged.
    #[error("cannot merge event on {first} with event on {last}: {reason}")]
    Unmergeable {
        first: Address,
        last: Address,
        reason: String,
    },
}

/// Convenience alias used throughout the events crate.
pub type EventResult<T> = Result<T, EventError>;
