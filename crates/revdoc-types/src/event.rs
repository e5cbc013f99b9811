use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressKind};
use crate::command::{AtomicCommand, ChangeKind, Command, Intent, TransactionCommand};
use crate::error::TypeError;
use crate::id::ActorId;
use crate::revision::{RevisionNumber, NEVER_EXISTED};
use crate::value::Value;

/// An atomic fact about one entity of the document.
///
/// The three `old_*_revision` fields record the revisions of the model, the
/// object and the field *before* the change, [`NEVER_EXISTED`] where the scope
/// was absent or does not apply. The event's own revision is derived from
/// the model's: every change moves the model to its next revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicEvent {
    pub kind: ChangeKind,
    pub target: Address,
    pub changed: Address,
    pub actor: ActorId,
    pub old_model_revision: RevisionNumber,
    pub old_object_revision: RevisionNumber,
    pub old_field_revision: RevisionNumber,
    pub in_transaction: bool,
    pub old_value: Option<Value>,
    pub new_value: Option<Value>,
}

impl AtomicEvent {
    /// The document revision this event produced.
    pub fn revision(&self) -> RevisionNumber {
        self.old_model_revision + 1
    }

    /// The listener scope of this event: the level of its target.
    pub fn scope(&self) -> AddressKind {
        self.target.kind()
    }

    /// `true` for events about a field's value, `false` for events about an
    /// entity's existence.
    pub fn is_value_event(&self) -> bool {
        self.target.kind() == AddressKind::Field
    }

    /// The old revision recorded for the scope at `kind`.
    pub fn old_revision_at(&self, kind: AddressKind) -> RevisionNumber {
        match kind {
            AddressKind::Model => self.old_model_revision,
            AddressKind::Object => self.old_object_revision,
            AddressKind::Field => self.old_field_revision,
        }
    }

    /// The old revision of the changed entity itself.
    pub fn old_changed_revision(&self) -> RevisionNumber {
        self.old_revision_at(self.changed.kind())
    }

    /// The forced command that reproduces this event from its pre-state.
    pub fn to_forced_command(&self) -> AtomicCommand {
        AtomicCommand {
            kind: self.kind,
            target: self.target.clone(),
            changed: self.changed.clone(),
            intent: Intent::Forced,
            value: match self.kind {
                ChangeKind::Remove => None,
                ChangeKind::Add | ChangeKind::Change => self.new_value.clone(),
            },
        }
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        self.to_forced_command().validate()?;
        if self.is_value_event() {
            let consistent = match self.kind {
                ChangeKind::Add => self.old_value.is_none() && self.new_value.is_some(),
                ChangeKind::Change => self.old_value.is_some() && self.new_value.is_some(),
                ChangeKind::Remove => self.old_value.is_some() && self.new_value.is_none(),
            };
            if !consistent {
                return Err(TypeError::MalformedCommand(format!(
                    "{} event on {} has inconsistent values",
                    self.kind, self.changed
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for AtomicEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{} {} {}", self.revision(), self.kind, self.changed)?;
        if self.is_value_event() {
            match (&self.old_value, &self.new_value) {
                (Some(old), Some(new)) => write!(f, " {old} -> {new}")?,
                (None, Some(new)) => write!(f, " = {new}")?,
                (Some(old), None) => write!(f, " (was {old})")?,
                (None, None) => {}
            }
        }
        if self.in_transaction {
            f.write_str(" [txn]")?;
        }
        Ok(())
    }
}

/// An immutable ordered batch of atomic events sharing one revision bump.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionEvent {
    actor: ActorId,
    target: Address,
    old_model_revision: RevisionNumber,
    old_object_revision: RevisionNumber,
    events: Vec<AtomicEvent>,
}

impl TransactionEvent {
    /// Wrap at least two atomic events, all flagged `in_transaction`, all
    /// produced from the same model revision and lying inside `target`.
    pub fn new(
        actor: ActorId,
        target: Address,
        old_object_revision: RevisionNumber,
        events: Vec<AtomicEvent>,
    ) -> Result<Self, TypeError> {
        if events.len() < 2 {
            return Err(TypeError::MalformedTransaction(format!(
                "a transaction needs at least two events, got {}",
                events.len()
            )));
        }
        if target.kind() == AddressKind::Field {
            return Err(TypeError::MalformedTransaction(format!(
                "transaction target {target} must be a model or object"
            )));
        }
        let old_model_revision = events[0].old_model_revision;
        for event in &events {
            if !event.in_transaction {
                return Err(TypeError::MalformedTransaction(format!(
                    "member event on {} is not flagged in_transaction",
                    event.changed
                )));
            }
            if event.old_model_revision != old_model_revision {
                return Err(TypeError::MalformedTransaction(format!(
                    "member event on {} starts at model revision {}, expected {}",
                    event.changed, event.old_model_revision, old_model_revision
                )));
            }
            if !target.equals_or_contains(&event.target) {
                return Err(TypeError::AddressMismatch {
                    target: target.clone(),
                    changed: event.changed.clone(),
                });
            }
        }
        let old_object_revision = if target.kind() == AddressKind::Object {
            old_object_revision
        } else {
            NEVER_EXISTED
        };
        Ok(Self {
            actor,
            target,
            old_model_revision,
            old_object_revision,
            events,
        })
    }

    pub fn actor(&self) -> &ActorId {
        &self.actor
    }

    pub fn target(&self) -> &Address {
        &self.target
    }

    pub fn old_model_revision(&self) -> RevisionNumber {
        self.old_model_revision
    }

    pub fn old_object_revision(&self) -> RevisionNumber {
        self.old_object_revision
    }

    pub fn revision(&self) -> RevisionNumber {
        self.old_model_revision + 1
    }

    pub fn events(&self) -> &[AtomicEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtomicEvent> {
        self.events.iter()
    }

    pub fn into_events(self) -> Vec<AtomicEvent> {
        self.events
    }
}

impl<'a> IntoIterator for &'a TransactionEvent {
    type Item = &'a AtomicEvent;
    type IntoIter = std::slice::Iter<'a, AtomicEvent>;

    fn into_iter(self) -> Self::IntoIter {
        self.events.iter()
    }
}

/// Anything that can be logged at one revision.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Event {
    Atomic(AtomicEvent),
    Transaction(TransactionEvent),
}

impl Event {
    pub fn revision(&self) -> RevisionNumber {
        match self {
            Self::Atomic(e) => e.revision(),
            Self::Transaction(t) => t.revision(),
        }
    }

    pub fn old_model_revision(&self) -> RevisionNumber {
        match self {
            Self::Atomic(e) => e.old_model_revision,
            Self::Transaction(t) => t.old_model_revision,
        }
    }

    pub fn actor(&self) -> &ActorId {
        match self {
            Self::Atomic(e) => &e.actor,
            Self::Transaction(t) => &t.actor,
        }
    }

    pub fn target(&self) -> &Address {
        match self {
            Self::Atomic(e) => &e.target,
            Self::Transaction(t) => &t.target,
        }
    }

    /// `true` for atomic events that belong to an enclosing transaction.
    pub fn in_transaction(&self) -> bool {
        match self {
            Self::Atomic(e) => e.in_transaction,
            Self::Transaction(_) => false,
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }

    pub fn as_atomic(&self) -> Option<&AtomicEvent> {
        match self {
            Self::Atomic(e) => Some(e),
            Self::Transaction(_) => None,
        }
    }

    /// The atomic events this event consists of, in order.
    pub fn atomic_events(&self) -> &[AtomicEvent] {
        match self {
            Self::Atomic(e) => std::slice::from_ref(e),
            Self::Transaction(t) => t.events(),
        }
    }

    /// The forced command that reproduces this event from its pre-state.
    pub fn to_forced_command(&self) -> Command {
        match self {
            Self::Atomic(e) => Command::Atomic(e.to_forced_command()),
            Self::Transaction(t) => Command::Transaction(TransactionCommand {
                target: t.target.clone(),
                commands: t.iter().map(AtomicEvent::to_forced_command).collect(),
            }),
        }
    }
}

impl From<AtomicEvent> for Event {
    fn from(event: AtomicEvent) -> Self {
        Self::Atomic(event)
    }
}

impl From<TransactionEvent> for Event {
    fn from(event: TransactionEvent) -> Self {
        Self::Transaction(event)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Atomic(e) => write!(f, "{e}"),
            Self::Transaction(t) => {
                write!(f, "r{} TRANSACTION {} ({} events)", t.revision(), t.target, t.len())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::Id;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn actor() -> ActorId {
        Id::new("alice").unwrap()
    }

    fn value_event(
        kind: ChangeKind,
        old: Option<i64>,
        new: Option<i64>,
        in_txn: bool,
    ) -> AtomicEvent {
        AtomicEvent {
            kind,
            target: addr("/m/o/f"),
            changed: addr("/m/o/f"),
            actor: actor(),
            old_model_revision: 4,
            old_object_revision: 3,
            old_field_revision: 2,
            in_transaction: in_txn,
            old_value: old.map(Value::from),
            new_value: new.map(Value::from),
        }
    }

    #[test]
    fn revision_follows_model() {
        let event = value_event(ChangeKind::Change, Some(1), Some(2), false);
        assert_eq!(event.revision(), 5);
        assert_eq!(event.old_changed_revision(), 2);
        assert!(event.is_value_event());
        event.validate().unwrap();
    }

    #[test]
    fn inconsistent_values_are_rejected() {
        assert!(value_event(ChangeKind::Add, Some(1), Some(2), false).validate().is_err());
        assert!(value_event(ChangeKind::Remove, Some(1), Some(2), false).validate().is_err());
    }

    #[test]
    fn forced_command_mirrors_event() {
        let event = value_event(ChangeKind::Remove, Some(1), None, false);
        let command = event.to_forced_command();
        assert_eq!(command.kind, ChangeKind::Remove);
        assert_eq!(command.intent, Intent::Forced);
        assert!(command.value.is_none());
    }

    #[test]
    fn transaction_requires_two_flagged_members() {
        let a = value_event(ChangeKind::Change, Some(1), Some(2), true);
        let b = value_event(ChangeKind::Change, Some(2), Some(3), true);
        assert!(
            TransactionEvent::new(actor(), addr("/m"), NEVER_EXISTED, vec![a.clone()]).is_err()
        );

        let unflagged = value_event(ChangeKind::Change, Some(2), Some(3), false);
        let members = vec![a.clone(), unflagged];
        assert!(TransactionEvent::new(actor(), addr("/m"), NEVER_EXISTED, members).is_err());

        let txn = TransactionEvent::new(actor(), addr("/m/o"), 3, vec![a, b]).unwrap();
        assert_eq!(txn.revision(), 5);
        assert_eq!(txn.old_object_revision(), 3);
        let event = Event::from(txn);
        assert_eq!(event.atomic_events().len(), 2);
        assert!(!event.in_transaction());
        assert!(matches!(event.to_forced_command(), Command::Transaction(t) if t.len() == 2));
    }

    #[test]
    fn transaction_members_share_model_revision() {
        let a = value_event(ChangeKind::Change, Some(1), Some(2), true);
        let mut b = value_event(ChangeKind::Change, Some(2), Some(3), true);
        b.old_model_revision = 5;
        assert!(TransactionEvent::new(actor(), addr("/m"), NEVER_EXISTED, vec![a, b]).is_err());
    }
}
