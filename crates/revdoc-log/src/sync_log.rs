use revdoc_types::{Command, Event, RevisionNumber};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::change_log::ChangeLog;
use crate::error::{LogError, LogResult};
use crate::traits::{ChangeLogReader, ChangeLogWriter};

/// One logged position of a [`SyncLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub command: Option<Command>,
    pub event: Option<Event>,
}

/// Serialized layout of a [`SyncLog`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogState {
    pub base_revision: RevisionNumber,
    pub sync_revision: RevisionNumber,
    pub entries: Vec<SyncLogEntry>,
}

/// Change log that also keeps the producing command of every entry and a
/// sync revision: the last revision known to be shared with the remote peer.
///
/// The log can never be truncated below its sync revision.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncLog {
    log: ChangeLog,
    commands: Vec<Option<Command>>,
    sync_revision: RevisionNumber,
}

impl SyncLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// An empty log starting after `base_revision`, synchronized up to it.
    pub fn with_base(base_revision: RevisionNumber) -> Self {
        Self {
            log: ChangeLog::with_base(base_revision),
            commands: Vec::new(),
            sync_revision: base_revision,
        }
    }

    pub fn from_state(state: SyncLogState) -> LogResult<Self> {
        let mut log = Self::with_base(state.base_revision);
        for entry in state.entries {
            log.append(entry.command, entry.event)?;
        }
        log.set_sync_revision(state.sync_revision)?;
        Ok(log)
    }

    pub fn to_state(&self) -> SyncLogState {
        SyncLogState {
            base_revision: self.log.base_revision(),
            sync_revision: self.sync_revision,
            entries: self
                .commands
                .iter()
                .zip(self.log.iter())
                .map(|(command, (_, event))| SyncLogEntry {
                    command: command.clone(),
                    event: event.cloned(),
                })
                .collect(),
        }
    }

    pub fn sync_revision(&self) -> RevisionNumber {
        self.sync_revision
    }

    /// Move the sync revision anywhere inside `[base, current]`.
    pub fn set_sync_revision(&mut self, revision: RevisionNumber) -> LogResult<()> {
        let base = self.log.base_revision();
        let current = self.log.current_revision();
        if revision < base || revision > current {
            return Err(LogError::SyncRevisionOutOfRange {
                sync_revision: revision,
                base,
                current,
            });
        }
        debug!(from = self.sync_revision, to = revision, "sync revision moved");
        self.sync_revision = revision;
        Ok(())
    }

    /// The command that produced the entry at `revision`.
    pub fn command_at(&self, revision: RevisionNumber) -> LogResult<Option<&Command>> {
        self.log.event_at(revision)?;
        let index = (revision - self.log.base_revision() - 1) as usize;
        Ok(self.commands[index].as_ref())
    }

    /// Entries above the sync revision, oldest first.
    pub fn unsynchronized(&self) -> Vec<(RevisionNumber, Option<&Event>)> {
        self.log
            .iter()
            .filter(|(revision, _)| *revision > self.sync_revision)
            .collect()
    }

    /// The plain change log view.
    pub fn change_log(&self) -> &ChangeLog {
        &self.log
    }

    pub fn iter(&self) -> impl Iterator<Item = (RevisionNumber, Option<&Event>)> + '_ {
        self.log.iter()
    }
}

impl ChangeLogReader for SyncLog {
    fn base_revision(&self) -> RevisionNumber {
        self.log.base_revision()
    }

    fn current_revision(&self) -> RevisionNumber {
        self.log.current_revision()
    }

    fn event_at(&self, revision: RevisionNumber) -> LogResult<Option<&Event>> {
        self.log.event_at(revision)
    }
}

impl ChangeLogWriter for SyncLog {
    fn append(
        &mut self,
        command: Option<Command>,
        event: Option<Event>,
    ) -> LogResult<RevisionNumber> {
        let revision = self.log.push(event)?;
        self.commands.push(command);
        debug!(revision, "sync log append");
        Ok(revision)
    }

    fn truncate_to_revision(&mut self, revision: RevisionNumber) -> bool {
        if revision < self.sync_revision {
            return false;
        }
        if !self.log.truncate_to_revision(revision) {
            return false;
        }
        self.commands.truncate((revision - self.log.base_revision()) as usize);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change_log::tests::value_event;

    fn filled(n: RevisionNumber) -> SyncLog {
        let mut log = SyncLog::new();
        for rev in 0..n {
            let event = value_event(rev, rev + 1);
            let command = event.to_forced_command();
            log.append(Some(command), Some(event)).unwrap();
        }
        log
    }

    #[test]
    fn keeps_commands_alongside_events() {
        let log = filled(3);
        assert_eq!(log.current_revision(), 3);
        let command = log.command_at(2).unwrap().unwrap();
        assert_eq!(
            Some(command.clone()),
            log.event_at(2).unwrap().map(Event::to_forced_command)
        );
        assert!(log.command_at(4).is_err());
    }

    #[test]
    fn truncation_stops_at_sync_revision() {
        let mut log = filled(5);
        log.set_sync_revision(3).unwrap();
        assert!(!log.truncate_to_revision(2));
        assert!(log.truncate_to_revision(3));
        assert_eq!(log.current_revision(), 3);
        assert_eq!(log.to_state().entries.len(), 3);
        assert!(log.unsynchronized().is_empty());
    }

    #[test]
    fn sync_revision_must_lie_inside_log() {
        let mut log = filled(2);
        assert!(log.set_sync_revision(3).is_err());
        assert!(log.set_sync_revision(-1).is_err());
        log.set_sync_revision(1).unwrap();
        assert_eq!(log.unsynchronized().len(), 1);
    }

    #[test]
    fn state_roundtrip() {
        let mut log = filled(4);
        log.append(None, None).unwrap();
        log.set_sync_revision(2).unwrap();
        let restored = SyncLog::from_state(log.to_state()).unwrap();
        assert_eq!(restored, log);
        assert_eq!(restored.sync_revision(), 2);
    }
}
