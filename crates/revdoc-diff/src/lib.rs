//! Diff engine for Revdoc.
//!
//! Compares two document snapshots of the same model and reports what has
//! to happen to get from the first to the second: whole removed and added
//! object subtrees, removed and added fields inside surviving objects, and
//! value changes of surviving fields.
//!
//! # Key Types
//!
//! - [`DocumentDiff`]: Structural diff of two snapshots
//! - [`ValueChange`]: Old and new value of one surviving field

pub mod document_diff;
pub mod error;

pub use document_diff::{diff_snapshots, DocumentDiff, ValueChange};
pub use error::{DiffError, DiffResult};
