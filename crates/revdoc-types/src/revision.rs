use std::fmt;

use serde::{Deserialize, Serialize};

/// Per-scope version counter.
///
/// `-1` ([`NEVER_EXISTED`]) marks a scope that does not exist; every
/// successful change moves the touched scopes to the document's next
/// revision.
pub type RevisionNumber = i64;

/// Revision of a scope that does not (or did not) exist.
pub const NEVER_EXISTED: RevisionNumber = -1;

/// Wire encoding of [`CommandOutcome::Failed`].
pub const FAILED: i64 = -1;

/// Wire encoding of [`CommandOutcome::NoChange`].
pub const NOCHANGE: i64 = -2;

/// Result of executing a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CommandOutcome {
    /// The command changed the document; carries the new document revision.
    Applied(RevisionNumber),
    /// The command's postcondition already held.
    NoChange,
    /// The command's precondition did not hold.
    Failed,
}

impl CommandOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub fn revision(&self) -> Option<RevisionNumber> {
        match self {
            Self::Applied(rev) => Some(*rev),
            _ => None,
        }
    }

    /// Numeric encoding: the revision, [`FAILED`] or [`NOCHANGE`].
    pub fn code(&self) -> i64 {
        match self {
            Self::Applied(rev) => *rev,
            Self::NoChange => NOCHANGE,
            Self::Failed => FAILED,
        }
    }

    /// Decode the numeric encoding produced by [`code`](Self::code).
    pub fn from_code(code: i64) -> Self {
        match code {
            NOCHANGE => Self::NoChange,
            c if c < 0 => Self::Failed,
            rev => Self::Applied(rev),
        }
    }
}

impl fmt::Display for CommandOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied(rev) => write!(f, "applied@{rev}"),
            Self::NoChange => f.write_str("nochange"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_roundtrip() {
        for outcome in [
            CommandOutcome::Applied(0),
            CommandOutcome::Applied(17),
            CommandOutcome::NoChange,
            CommandOutcome::Failed,
        ] {
            assert_eq!(CommandOutcome::from_code(outcome.code()), outcome);
        }
        assert_eq!(CommandOutcome::Failed.code(), -1);
        assert_eq!(CommandOutcome::NoChange.code(), -2);
    }
}
