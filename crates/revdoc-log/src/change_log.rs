use revdoc_types::{Command, Event, RevisionNumber};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LogError, LogResult};
use crate::traits::{ChangeLogReader, ChangeLogWriter};

/// Append-only, revision-indexed event store.
///
/// A fresh log starts at base revision 0. Each appended event must carry the
/// revision right after the current one; `None` entries are placeholders for
/// revisions with no locally observable event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeLog {
    base_revision: RevisionNumber,
    events: Vec<Option<Event>>,
}

/// Serialized layout of a [`ChangeLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogState {
    pub base_revision: RevisionNumber,
    pub events: Vec<Option<Event>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log whose first entry will be `base_revision + 1`.
    pub fn with_base(base_revision: RevisionNumber) -> Self {
        Self {
            base_revision,
            events: Vec::new(),
        }
    }

    /// Rebuild a log from its serialized layout, re-checking every position.
    pub fn from_state(state: ChangeLogState) -> LogResult<Self> {
        let mut log = Self::with_base(state.base_revision);
        for event in state.events {
            log.push(event)?;
        }
        Ok(log)
    }

    pub fn to_state(&self) -> ChangeLogState {
        ChangeLogState {
            base_revision: self.base_revision,
            events: self.events.clone(),
        }
    }

    /// Every entry, oldest first, paired with its revision.
    pub fn iter(&self) -> impl Iterator<Item = (RevisionNumber, Option<&Event>)> + '_ {
        self.events
            .iter()
            .enumerate()
            .map(|(i, e)| (self.base_revision + 1 + i as RevisionNumber, e.as_ref()))
    }

    pub(crate) fn push(&mut self, event: Option<Event>) -> LogResult<RevisionNumber> {
        let expected = self.current_revision() + 1;
        if let Some(event) = &event {
            if event.revision() != expected {
                return Err(LogError::RevisionMismatch {
                    expected,
                    actual: event.revision(),
                });
            }
            if event.in_transaction() {
                return Err(LogError::TransactionMember { revision: expected });
            }
        }
        self.events.push(event);
        Ok(expected)
    }

    fn index_of(&self, revision: RevisionNumber) -> LogResult<usize> {
        let current = self.current_revision();
        if revision <= self.base_revision || revision > current {
            return Err(LogError::OutOfRange {
                revision,
                base: self.base_revision,
                current,
            });
        }
        Ok((revision - self.base_revision - 1) as usize)
    }
}

impl ChangeLogReader for ChangeLog {
    fn base_revision(&self) -> RevisionNumber {
        self.base_revision
    }

    fn current_revision(&self) -> RevisionNumber {
        self.base_revision + self.events.len() as RevisionNumber
    }

    fn event_at(&self, revision: RevisionNumber) -> LogResult<Option<&Event>> {
        let index = self.index_of(revision)?;
        Ok(self.events[index].as_ref())
    }
}

impl ChangeLogWriter for ChangeLog {
    fn append(
        &mut self,
        _command: Option<Command>,
        event: Option<Event>,
    ) -> LogResult<RevisionNumber> {
        let revision = self.push(event)?;
        debug!(revision, "change log append");
        Ok(revision)
    }

    fn truncate_to_revision(&mut self, revision: RevisionNumber) -> bool {
        if revision < self.base_revision || revision > self.current_revision() {
            return false;
        }
        let keep = (revision - self.base_revision) as usize;
        self.events.truncate(keep);
        debug!(revision, "change log truncated");
        true
    }
}
