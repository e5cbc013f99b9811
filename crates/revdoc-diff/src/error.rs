//! Error types for the diff crate.

use revdoc_types::Address;

/// Errors that can occur during diff operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiffError {
    /// The two snapshots describe different models.
    #[error("cannot diff {old} against {new}: different models")]
    ModelMismatch { old: Address, new: Address },
}

/// Convenience alias for diff results.
pub type DiffResult<T> = Result<T, DiffError>;
