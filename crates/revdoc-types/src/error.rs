use thiserror::Error;

use crate::address::Address;

/// Errors produced by type construction and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid id {0:?}: must start with a letter or '_' and contain only [A-Za-z0-9_.-]")]
    InvalidId(String),

    #[error("id too long: {length} characters (max {max})")]
    IdTooLong { length: usize, max: usize },

    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    #[error("address {changed} is not a valid change of {target}")]
    AddressMismatch { target: Address, changed: Address },

    #[error("malformed command: {0}")]
    MalformedCommand(String),

    #[error("malformed transaction event: {0}")]
    MalformedTransaction(String),
}
