use revdoc_types::Address;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("entity not found: {0}")]
    EntityNotFound(Address),

    #[error("unknown replica: {0}")]
    UnknownReplica(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    #[error("type error: {0}")]
    Type(#[from] revdoc_types::TypeError),

    #[error("log error: {0}")]
    Log(#[from] revdoc_log::LogError),

    #[error("core error: {0}")]
    Core(#[from] revdoc_core::CoreError),

    #[error("sync error: {0}")]
    Sync(#[from] revdoc_sync::SyncError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
