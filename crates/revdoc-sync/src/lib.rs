//! Optimistic synchronization for Revdoc documents.
//!
//! A replica executes commands locally and keeps them as local changes until
//! the authority confirms them. A synchronization round rolls the replica back
//! to its last synchronized revision, replays the authority's events, and
//! re-applies whatever local changes are still pending.
//!
//! # Key Types
//!
//! - [`Synchronizer`]: runs one round over a `DocumentCore`
//! - [`SyncConfig`]: round behavior (atomic rounds, reduction, notifications)
//! - [`SyncReport`] / [`SyncRound`]: what a round did and the callbacks it owes
//! - [`rollback`]: discard local history above a revision

pub mod config;
pub mod error;
pub mod rollback;
pub mod synchronizer;
pub mod types;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use rollback::{rollback, undo_to};
pub use synchronizer::Synchronizer;
pub use types::{Completion, SyncReport, SyncRound};
