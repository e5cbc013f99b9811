//! High-level SDK for Revdoc.
//!
//! Provides [`Document`], a replica of a revisioned document that applies
//! local edits at once and reconciles them with an authoritative history
//! later, plus persistence and an in-process [`Simulation`] of several
//! replicas. This is the main entry point for applications embedding Revdoc.

pub mod config;
pub mod document;
pub mod error;
pub mod persist;
pub mod sim;

pub use config::DocumentConfig;
pub use document::{Document, LocalChangeInfo};
pub use error::{SdkError, SdkResult};
pub use persist::PersistedDocument;
pub use sim::{PushReport, ReplicaState, Scenario, Simulation, Step, StepOutcome, AUTHORITY};

// Re-export key types
pub use revdoc_core::ConvergenceReport;
pub use revdoc_events::{Delivery, EventCategory, ListenerId, SyncNotification};
pub use revdoc_log::{ChangeOutcome, LocalChangeId, ValidationReport};
pub use revdoc_sync::{SyncConfig, SyncReport};
pub use revdoc_types::{
    Address, AtomicCommand, ChangeKind, Command, CommandOutcome, DocumentSnapshot, Event, Id,
    Intent, RevisionNumber, TransactionCommand, Value,
};
