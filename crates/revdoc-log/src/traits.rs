use revdoc_types::{Command, Event, RevisionNumber};

use crate::error::{LogError, LogResult};

/// Read boundary of a revision-indexed log.
///
/// Positions run from `base_revision() + 1` to `current_revision()`; every
/// position holds either an event whose revision equals the position or an
/// empty placeholder.
pub trait ChangeLogReader {
    fn base_revision(&self) -> RevisionNumber;

    fn current_revision(&self) -> RevisionNumber;

    /// The entry at `revision`; `Ok(None)` for a placeholder.
    fn event_at(&self, revision: RevisionNumber) -> LogResult<Option<&Event>>;

    /// Entries in `(from, current]`, oldest first.
    fn events_since(
        &self,
        from: RevisionNumber,
    ) -> LogResult<Vec<(RevisionNumber, Option<&Event>)>> {
        let base = self.base_revision();
        let current = self.current_revision();
        if from < base || from > current {
            return Err(LogError::OutOfRange {
                revision: from,
                base,
                current,
            });
        }
        ((from + 1)..=current)
            .map(|revision| Ok((revision, self.event_at(revision)?)))
            .collect()
    }

    fn len(&self) -> usize {
        (self.current_revision() - self.base_revision()) as usize
    }

    fn is_empty(&self) -> bool {
        self.current_revision() == self.base_revision()
    }
}

/// Write boundary of a revision-indexed log.
pub trait ChangeLogWriter {
    /// Append `event` at the next revision, or an empty placeholder when
    /// `event` is `None`. Logs that keep commands store `command` alongside.
    fn append(
        &mut self,
        command: Option<Command>,
        event: Option<Event>,
    ) -> LogResult<RevisionNumber>;

    /// Discard every entry above `revision`. Returns `false` (and leaves the
    /// log untouched) if `revision` is outside the truncatable range.
    fn truncate_to_revision(&mut self, revision: RevisionNumber) -> bool;
}
