//! Foundation types for Revdoc.
//!
//! This crate provides the identity, addressing, value and change types used
//! throughout the Revdoc workspace. Every other Revdoc crate depends on
//! `revdoc-types`.
//!
//! # Key Types
//!
//! - [`Id`]: Validated entity / actor identifier
//! - [`Address`]: Hierarchical `model/object/field` path
//! - [`Value`]: Field payload
//! - [`RevisionNumber`]: Per-scope version counter, `-1` for "never existed"
//! - [`Command`]: Requested mutation (atomic or transaction)
//! - [`Event`]: Logged fact produced by a successful command
//! - [`CommandOutcome`]: Applied revision, no-op or failure
//! - [`DocumentSnapshot`]: Detached copy of a document

pub mod address;
pub mod command;
pub mod error;
pub mod event;
pub mod id;
pub mod revision;
pub mod snapshot;
pub mod value;

pub use address::{Address, AddressKind};
pub use command::{AtomicCommand, ChangeKind, Command, Intent, TransactionCommand};
pub use error::TypeError;
pub use event::{AtomicEvent, Event, TransactionEvent};
pub use id::{ActorId, Id, InstanceId, MAX_ID_LENGTH};
pub use revision::{CommandOutcome, RevisionNumber, FAILED, NEVER_EXISTED, NOCHANGE};
pub use snapshot::{DocumentSnapshot, FieldSnapshot, ObjectSnapshot};
pub use value::Value;

/// Result alias for type construction.
pub type TypeResult<T> = Result<T, TypeError>;
