use std::collections::HashMap;
use std::fmt;

use revdoc_types::{
    ActorId, AtomicCommand, Command, Event, Intent, RevisionNumber, TransactionCommand,
};
use tracing::debug;

use crate::error::{LogError, LogResult};

/// Stable handle of a local change, unique within one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalChangeId(u64);

impl LocalChangeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LocalChangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lc#{}", self.0)
    }
}

/// How a local change ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// The remote peer accepted the change at this revision.
    Confirmed(RevisionNumber),
    /// Re-applying the change had no effect any more.
    NoChange,
    /// Re-applying the change failed against the rebased state.
    Conflict,
    /// The change was rolled back locally without being synchronized.
    Discarded,
}

/// Completion callback attached to a local change.
pub type ChangeCallback = Box<dyn FnOnce(ChangeOutcome) + Send>;

/// A locally executed command that the remote peer has not confirmed yet.
pub struct LocalChange {
    id: LocalChangeId,
    pub actor: ActorId,
    pub command: Command,
    pub event: Event,
    pub applied: bool,
    pub remote_revision: Option<RevisionNumber>,
    callback: Option<ChangeCallback>,
}

impl LocalChange {
    pub fn id(&self) -> LocalChangeId {
        self.id
    }

    /// The local revision the change currently occupies.
    pub fn revision(&self) -> RevisionNumber {
        self.event.revision()
    }

    pub fn is_confirmed(&self) -> bool {
        self.remote_revision.is_some()
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    /// Hand the outcome to the callback, if any. The callback fires at most
    /// once.
    pub fn complete(&mut self, outcome: ChangeOutcome) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }

    /// Detach the callback together with the outcome it should receive, so
    /// the caller can invoke it later.
    pub fn into_completion(
        mut self,
        outcome: ChangeOutcome,
    ) -> Option<(ChangeCallback, ChangeOutcome)> {
        self.callback.take().map(|callback| (callback, outcome))
    }
}

impl fmt::Debug for LocalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalChange")
            .field("id", &self.id)
            .field("actor", &self.actor)
            .field("revision", &self.revision())
            .field("applied", &self.applied)
            .field("remote_revision", &self.remote_revision)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Ordered queue of local changes awaiting confirmation.
///
/// Order is the original execution order and is preserved by every
/// operation; re-application replays changes in queue order.
#[derive(Default)]
pub struct LocalChangeQueue {
    next_id: u64,
    changes: Vec<LocalChange>,
}

impl LocalChangeQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly applied change.
    pub fn append(
        &mut self,
        actor: ActorId,
        command: Command,
        event: Event,
        callback: Option<ChangeCallback>,
    ) -> LocalChangeId {
        self.next_id += 1;
        let id = LocalChangeId(self.next_id);
        debug!(%id, revision = event.revision(), "local change recorded");
        self.changes.push(LocalChange {
            id,
            actor,
            command,
            event,
            applied: true,
            remote_revision: None,
            callback,
        });
        id
    }

    pub fn get(&self, id: LocalChangeId) -> Option<&LocalChange> {
        self.changes.iter().find(|c| c.id == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LocalChange> {
        self.changes.iter()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Record the remote revision a change was accepted at.
    pub fn mark_confirmed(
        &mut self,
        id: LocalChangeId,
        remote_revision: RevisionNumber,
    ) -> LogResult<()> {
        let change = self
            .changes
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or(LogError::UnknownLocalChange(id))?;
        change.remote_revision = Some(remote_revision);
        debug!(%id, remote_revision, "local change confirmed");
        Ok(())
    }

    /// Remove and return every change confirmed at or below `remote_revision`.
    pub fn drop_confirmed_up_to(&mut self, remote_revision: RevisionNumber) -> Vec<LocalChange> {
        let (confirmed, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.changes)
            .into_iter()
            .partition(|c| matches!(c.remote_revision, Some(r) if r <= remote_revision));
        self.changes = pending;
        confirmed
    }

    /// Remove and return every change whose local revision is above
    /// `revision`.
    pub fn drop_above(&mut self, revision: RevisionNumber) -> Vec<LocalChange> {
        let (dropped, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.changes)
            .into_iter()
            .partition(|c| c.applied && c.revision() > revision);
        self.changes = kept;
        dropped
    }

    pub fn count_unapplied(&self) -> usize {
        self.changes.iter().filter(|c| !c.applied).count()
    }

    pub fn mark_all_unapplied(&mut self) {
        for change in &mut self.changes {
            change.applied = false;
        }
    }

    /// Take the whole queue out, e.g. to re-apply it.
    pub fn take_all(&mut self) -> Vec<LocalChange> {
        std::mem::take(&mut self.changes)
    }

    /// Put back a change taken with [`take_all`](Self::take_all), keeping
    /// order.
    pub fn restore(&mut self, change: LocalChange) {
        self.changes.push(change);
    }
}

impl fmt::Debug for LocalChangeQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.changes.iter()).finish()
    }
}

/// Translates safe revisions that referred to local, not yet synchronized
/// revisions into the revisions those changes landed at after rebasing.
///
/// Revisions at or below `floor` are shared with the remote peer and are
/// never rewritten.
#[derive(Clone, Debug, Default)]
pub struct RevisionRemap {
    floor: RevisionNumber,
    moved: HashMap<RevisionNumber, RevisionNumber>,
}

impl RevisionRemap {
    pub fn new(floor: RevisionNumber) -> Self {
        Self {
            floor,
            moved: HashMap::new(),
        }
    }

    pub fn record(&mut self, from: RevisionNumber, to: RevisionNumber) {
        if from > self.floor {
            self.moved.insert(from, to);
        }
    }

    pub fn translate_revision(&self, revision: RevisionNumber) -> RevisionNumber {
        if revision <= self.floor {
            return revision;
        }
        self.moved.get(&revision).copied().unwrap_or(revision)
    }

    pub fn translate(&self, command: &Command) -> Command {
        match command {
            Command::Atomic(c) => Command::Atomic(self.translate_atomic(c)),
            Command::Transaction(t) => Command::Transaction(TransactionCommand {
                target: t.target.clone(),
                commands: t.commands.iter().map(|c| self.translate_atomic(c)).collect(),
            }),
        }
    }

    fn translate_atomic(&self, command: &AtomicCommand) -> AtomicCommand {
        let mut command = command.clone();
        if let Intent::Safe(revision) = command.intent {
            command.intent = Intent::Safe(self.translate_revision(revision));
        }
        command
    }
}
