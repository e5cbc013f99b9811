//! Document core for Revdoc.
//!
//! Holds the live document and everything that mutates it locally: the arena
//! tree, precondition checks, the command executor, the event generator that
//! expands tree diffs into ordered atomic events, and the orphan registry
//! that keeps entity identity across rollback.
//!
//! # Key Types
//!
//! - [`DocumentCore`]: Tree, sync log, event queue, local changes and listeners of one document
//! - [`DocumentTree`]: Arena of objects and fields with index-linked parents
//! - [`StateView`]: Read access shared by the tree and detached snapshots
//! - [`Execution`]: Outcome and event of one executed command
//! - [`Orphans`]: Entities parked during a rollback episode
//! - [`ReplayEngine`]: Re-derives a snapshot from a base snapshot and a log

pub mod core;
pub mod error;
pub mod executor;
pub mod generator;
pub mod orphans;
pub mod precondition;
pub mod replay;
pub mod tree;
pub mod view;

pub use crate::core::DocumentCore;
pub use error::{CoreError, CoreResult};
pub use executor::{bump_scopes, Execution};
pub use generator::{generate, old_revisions, value_change_kind};
pub use orphans::Orphans;
pub use precondition::{check, Verdict};
pub use replay::{ConvergenceReport, ReplayEngine, ReplayResult};
pub use tree::{DocumentTree, EntityHandle};
pub use view::StateView;
