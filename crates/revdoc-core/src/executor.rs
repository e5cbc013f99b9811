//! Command execution against the live document.
//!
//! A command is checked, applied to the tree, turned into one event (or one
//! transaction event), logged through the event queue and routed for
//! dispatch. Entity removals with content and transactions go through a
//! scratch snapshot and the event generator so their effect is recorded as
//! the same ordered list of atomic events on every replica.

use revdoc_diff::diff_snapshots;
use revdoc_log::{ChangeCallback, LocalChangeId};
use revdoc_types::{
    ActorId, Address, AddressKind, AtomicCommand, AtomicEvent, ChangeKind, Command, CommandOutcome,
    DocumentSnapshot, Event, RevisionNumber, TransactionCommand, TransactionEvent,
};
use tracing::debug;

use crate::core::DocumentCore;
use crate::error::{CoreError, CoreResult};
use crate::generator::{self, atomic_event, value_change_kind};
use crate::precondition::{self, Verdict};
use crate::tree::DocumentTree;
use crate::view::StateView;

/// What executing one command did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Execution {
    pub outcome: CommandOutcome,
    /// The logged event, when the command was applied.
    pub event: Option<Event>,
    /// The local change recorded for the command, if any.
    pub local_change: Option<LocalChangeId>,
}

impl Execution {
    fn failed() -> Self {
        Self {
            outcome: CommandOutcome::Failed,
            event: None,
            local_change: None,
        }
    }

    fn no_change() -> Self {
        Self {
            outcome: CommandOutcome::NoChange,
            event: None,
            local_change: None,
        }
    }
}

impl DocumentCore {
    /// Execute `command` on behalf of `actor` without recording a local
    /// change. Used for replaying remote events and for authoritative
    /// replicas.
    pub fn execute(&mut self, command: &Command, actor: &ActorId) -> CoreResult<Execution> {
        command.validate()?;
        let execution = match command {
            Command::Atomic(atomic) => self.execute_atomic(atomic, actor)?,
            Command::Transaction(txn) => self.execute_transaction(txn, actor)?,
        };
        debug!(
            address = %command.target(),
            actor = %actor,
            outcome = execution.outcome.code(),
            "command executed"
        );
        Ok(execution)
    }

    /// Execute a command of the local actor and queue it as a local change.
    ///
    /// The callback is handed back when no local change was recorded, so the
    /// caller can complete it once it no longer holds the document.
    pub fn execute_local(
        &mut self,
        command: &Command,
        callback: Option<ChangeCallback>,
    ) -> CoreResult<(Execution, Option<ChangeCallback>)> {
        let actor = self.actor.clone();
        let mut execution = self.execute(command, &actor)?;
        let Some(event) = execution.event.clone() else {
            return Ok((execution, callback));
        };
        let id = self.local_changes.append(actor, command.clone(), event, callback);
        execution.local_change = Some(id);
        Ok((execution, None))
    }

    fn execute_atomic(
        &mut self,
        command: &AtomicCommand,
        actor: &ActorId,
    ) -> CoreResult<Execution> {
        match precondition::check(&self.tree, command) {
            Verdict::Failed => return Ok(Execution::failed()),
            Verdict::NoChange => return Ok(Execution::no_change()),
            Verdict::Proceed => {}
        }

        if command.kind == ChangeKind::Remove
            && !command.is_value_command()
            && self.tree.has_content(&command.changed)
        {
            let before = self.tree.snapshot();
            let mut after = before.clone();
            after.remove(&command.changed);
            let diff = diff_snapshots(&before, &after)?;
            let events = generator::generate(&diff, &before, actor);
            return self.commit(Command::Atomic(command.clone()), &command.target, events, actor);
        }

        let (old_value, new_value) = if command.is_value_command() {
            let new_value = match command.kind {
                ChangeKind::Remove => None,
                ChangeKind::Add | ChangeKind::Change => command.value.clone(),
            };
            (self.tree.value_of(&command.changed).cloned(), new_value)
        } else {
            (None, None)
        };
        let kind = if command.is_value_command() {
            value_change_kind(old_value.as_ref(), new_value.as_ref())
        } else {
            command.kind
        };
        let event = atomic_event(
            &self.tree,
            actor,
            kind,
            command.target.clone(),
            command.changed.clone(),
            old_value,
            new_value,
        );
        self.commit(Command::Atomic(command.clone()), &command.target, vec![event], actor)
    }

    fn execute_transaction(
        &mut self,
        txn: &TransactionCommand,
        actor: &ActorId,
    ) -> CoreResult<Execution> {
        let before = self.tree.snapshot();
        let mut scratch = before.clone();
        let revision = before.revision + 1;
        for (index, member) in txn.commands.iter().enumerate() {
            match precondition::check(&scratch, member) {
                Verdict::Failed => {
                    debug!(index, changed = %member.changed, "transaction member failed");
                    return Ok(Execution::failed());
                }
                Verdict::NoChange => continue,
                Verdict::Proceed => apply_to_snapshot(&mut scratch, member, revision),
            }
        }
        let diff = diff_snapshots(&before, &scratch)?;
        let events = generator::generate(&diff, &before, actor);
        self.commit(Command::Transaction(txn.clone()), &txn.target, events, actor)
    }

    /// Apply generated events to the tree, log and queue the resulting event.
    ///
    /// No events means no change. One event is logged as is; more are
    /// wrapped into a transaction event targeting `target`.
    fn commit(
        &mut self,
        command: Command,
        target: &Address,
        mut events: Vec<AtomicEvent>,
        actor: &ActorId,
    ) -> CoreResult<Execution> {
        if events.is_empty() {
            return Ok(Execution::no_change());
        }
        let revision = self.tree.model_revision() + 1;
        let old_target_revision = self.tree.revision_of(target);
        let transaction = events.len() > 1;
        if transaction {
            for event in &mut events {
                event.in_transaction = true;
            }
        }

        for event in &events {
            self.apply_structure(event, revision)?;
        }
        bump_scopes(&mut self.tree, transaction.then_some(target), &events, revision);

        let event = if transaction {
            Event::Transaction(TransactionEvent::new(
                actor.clone(),
                target.clone(),
                old_target_revision,
                events,
            )?)
        } else {
            Event::Atomic(events.remove(0))
        };
        let queued = self.route_event(&event);
        self.queue.enqueue(&mut self.log, Some(command), queued)?;
        debug!(revision, event = %event, "event committed");
        Ok(Execution {
            outcome: CommandOutcome::Applied(revision),
            event: Some(event),
            local_change: None,
        })
    }

    fn apply_structure(&mut self, event: &AtomicEvent, revision: RevisionNumber) -> CoreResult<()> {
        if event.is_value_event() {
            return self.tree.set_value(&event.changed, event.new_value.clone());
        }
        match event.kind {
            ChangeKind::Add => self.create_entity(&event.changed, revision).map(|_| ()),
            ChangeKind::Remove => self.remove_entity(&event.changed),
            ChangeKind::Change => Err(CoreError::InvalidEvent(format!(
                "CHANGE of entity {}",
                event.changed
            ))),
        }
    }
}

/// Move every scope touched by `events` to `revision`: the lineage of each
/// event's target and changed entity, plus the transaction target if any.
pub fn bump_scopes(
    tree: &mut DocumentTree,
    transaction_target: Option<&Address>,
    events: &[AtomicEvent],
    revision: RevisionNumber,
) {
    if let Some(target) = transaction_target {
        tree.bump(target, revision);
    }
    for event in events {
        tree.bump(&event.target, revision);
        tree.bump(&event.changed, revision);
    }
    tree.set_model_revision(revision);
}

fn apply_to_snapshot(
    snapshot: &mut DocumentSnapshot,
    command: &AtomicCommand,
    revision: RevisionNumber,
) {
    let changed = &command.changed;
    if command.is_value_command() {
        let value = match command.kind {
            ChangeKind::Remove => None,
            ChangeKind::Add | ChangeKind::Change => command.value.clone(),
        };
        snapshot.set_value(changed, value);
        return;
    }
    match (command.kind, changed.kind()) {
        (ChangeKind::Add, AddressKind::Object) => {
            snapshot.insert_object(changed, revision);
        }
        (ChangeKind::Add, AddressKind::Field) => {
            snapshot.insert_field(changed, revision);
        }
        (ChangeKind::Remove, _) => {
            snapshot.remove(changed);
        }
        _ => {}
    }
}
