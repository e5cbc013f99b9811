use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressKind};
use crate::error::TypeError;
use crate::revision::RevisionNumber;
use crate::value::Value;

/// What an atomic command or event does to its changed entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Add,
    Remove,
    Change,
}

impl ChangeKind {
    /// The kind that undoes this one.
    pub fn inverse(self) -> Self {
        match self {
            Self::Add => Self::Remove,
            Self::Remove => Self::Add,
            Self::Change => Self::Change,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Add => "ADD",
            Self::Remove => "REMOVE",
            Self::Change => "CHANGE",
        };
        f.write_str(s)
    }
}

/// Precondition semantics of a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Postcondition-only: succeed if the requested state can be reached,
    /// report no change if it already holds.
    Forced,
    /// Require the affected entity to be at exactly this revision.
    Safe(RevisionNumber),
}

/// A single requested mutation of one entity.
///
/// Container commands target the parent (`target` = model for objects,
/// object for fields) and name the added or removed child in `changed`.
/// Value commands target the field itself (`target == changed`).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AtomicCommand {
    pub kind: ChangeKind,
    pub target: Address,
    pub changed: Address,
    pub intent: Intent,
    #[serde(default)]
    pub value: Option<Value>,
}

impl AtomicCommand {
    /// Build and validate a command.
    pub fn new(
        kind: ChangeKind,
        target: Address,
        changed: Address,
        intent: Intent,
        value: Option<Value>,
    ) -> Result<Self, TypeError> {
        let command = Self {
            kind,
            target,
            changed,
            intent,
            value,
        };
        command.validate()?;
        Ok(command)
    }

    /// Add the object or field at `address`.
    pub fn add_entity(address: Address, intent: Intent) -> Result<Self, TypeError> {
        let target = parent_of(&address)?;
        Self::new(ChangeKind::Add, target, address, intent, None)
    }

    /// Remove the object or field at `address` (with everything below it).
    pub fn remove_entity(address: Address, intent: Intent) -> Result<Self, TypeError> {
        let target = parent_of(&address)?;
        Self::new(ChangeKind::Remove, target, address, intent, None)
    }

    /// Set the value of a field that currently has none.
    pub fn add_value(field: Address, value: Value, intent: Intent) -> Result<Self, TypeError> {
        Self::new(ChangeKind::Add, field.clone(), field, intent, Some(value))
    }

    /// Replace the value of a field.
    pub fn change_value(field: Address, value: Value, intent: Intent) -> Result<Self, TypeError> {
        Self::new(ChangeKind::Change, field.clone(), field, intent, Some(value))
    }

    /// Clear the value of a field.
    pub fn remove_value(field: Address, intent: Intent) -> Result<Self, TypeError> {
        Self::new(ChangeKind::Remove, field.clone(), field, intent, None)
    }

    pub fn is_forced(&self) -> bool {
        matches!(self.intent, Intent::Forced)
    }

    /// `true` for commands acting on a field's value rather than on an
    /// entity's existence.
    pub fn is_value_command(&self) -> bool {
        self.target.kind() == AddressKind::Field
    }

    /// Check the structural consistency of target, changed entity, kind and
    /// value.
    pub fn validate(&self) -> Result<(), TypeError> {
        match self.target.kind() {
            AddressKind::Model | AddressKind::Object => {
                if !self.target.is_parent_of(&self.changed) {
                    return Err(TypeError::AddressMismatch {
                        target: self.target.clone(),
                        changed: self.changed.clone(),
                    });
                }
                if self.kind == ChangeKind::Change {
                    return Err(TypeError::MalformedCommand(format!(
                        "CHANGE is only defined for field values, not {}",
                        self.changed
                    )));
                }
                if self.value.is_some() {
                    return Err(TypeError::MalformedCommand(format!(
                        "{} of {} must not carry a value",
                        self.kind, self.changed
                    )));
                }
            }
            AddressKind::Field => {
                if self.target != self.changed {
                    return Err(TypeError::AddressMismatch {
                        target: self.target.clone(),
                        changed: self.changed.clone(),
                    });
                }
                let wants_value = self.kind != ChangeKind::Remove;
                if wants_value != self.value.is_some() {
                    return Err(TypeError::MalformedCommand(format!(
                        "value {} of {} {} a value",
                        self.kind,
                        self.changed,
                        if wants_value { "requires" } else { "must not carry" }
                    )));
                }
            }
        }
        Ok(())
    }
}

fn parent_of(address: &Address) -> Result<Address, TypeError> {
    address
        .parent()
        .ok_or_else(|| TypeError::InvalidAddress(format!("{address} has no parent container")))
}

/// An ordered batch of atomic commands executed all-or-nothing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionCommand {
    pub target: Address,
    pub commands: Vec<AtomicCommand>,
}

impl TransactionCommand {
    pub fn new(target: Address, commands: Vec<AtomicCommand>) -> Result<Self, TypeError> {
        let txn = Self { target, commands };
        txn.validate()?;
        Ok(txn)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        if self.target.kind() == AddressKind::Field {
            return Err(TypeError::MalformedCommand(format!(
                "transaction target {} must be a model or object",
                self.target
            )));
        }
        if self.commands.is_empty() {
            return Err(TypeError::MalformedCommand("empty transaction".into()));
        }
        for command in &self.commands {
            command.validate()?;
            if !self.target.equals_or_contains(&command.target) {
                return Err(TypeError::AddressMismatch {
                    target: self.target.clone(),
                    changed: command.changed.clone(),
                });
            }
        }
        Ok(())
    }
}

/// A requested mutation of the document.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Atomic(AtomicCommand),
    Transaction(TransactionCommand),
}

impl Command {
    pub fn target(&self) -> &Address {
        match self {
            Self::Atomic(c) => &c.target,
            Self::Transaction(t) => &t.target,
        }
    }

    pub fn validate(&self) -> Result<(), TypeError> {
        match self {
            Self::Atomic(c) => c.validate(),
            Self::Transaction(t) => t.validate(),
        }
    }

    pub fn is_transaction(&self) -> bool {
        matches!(self, Self::Transaction(_))
    }
}

impl From<AtomicCommand> for Command {
    fn from(command: AtomicCommand) -> Self {
        Self::Atomic(command)
    }
}

impl From<TransactionCommand> for Command {
    fn from(command: TransactionCommand) -> Self {
        Self::Transaction(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn entity_commands_derive_their_target() {
        let add = AtomicCommand::add_entity(addr("/m/o"), Intent::Forced).unwrap();
        assert_eq!(add.target, addr("/m"));
        let remove = AtomicCommand::remove_entity(addr("/m/o/f"), Intent::Safe(3)).unwrap();
        assert_eq!(remove.target, addr("/m/o"));
        assert!(!remove.is_value_command());
        assert!(AtomicCommand::add_entity(addr("/m"), Intent::Forced).is_err());
    }

    #[test]
    fn value_commands_require_matching_value() {
        let field = addr("/m/o/f");
        assert!(AtomicCommand::add_value(field.clone(), Value::from(1), Intent::Forced)
            .unwrap()
            .is_value_command());
        assert!(AtomicCommand::new(
            ChangeKind::Change,
            field.clone(),
            field.clone(),
            Intent::Forced,
            None
        )
        .is_err());
        assert!(AtomicCommand::new(
            ChangeKind::Remove,
            field.clone(),
            field,
            Intent::Forced,
            Some(Value::from(1))
        )
        .is_err());
    }

    #[test]
    fn container_commands_reject_mismatched_addresses() {
        let err = AtomicCommand::new(
            ChangeKind::Add,
            addr("/m"),
            addr("/m/o/f"),
            Intent::Forced,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, TypeError::AddressMismatch { .. }));
        assert!(AtomicCommand::new(
            ChangeKind::Change,
            addr("/m"),
            addr("/m/o"),
            Intent::Forced,
            None
        )
        .is_err());
    }

    #[test]
    fn transaction_members_must_lie_inside_target() {
        let inside = AtomicCommand::add_entity(addr("/m/o/f"), Intent::Forced).unwrap();
        let outside = AtomicCommand::add_entity(addr("/m/p/f"), Intent::Forced).unwrap();
        assert!(TransactionCommand::new(addr("/m/o"), vec![inside.clone()]).is_ok());
        assert!(TransactionCommand::new(addr("/m/o"), vec![inside, outside]).is_err());
        assert!(TransactionCommand::new(addr("/m"), vec![]).is_err());
    }

    #[test]
    fn inverse_kinds() {
        assert_eq!(ChangeKind::Add.inverse(), ChangeKind::Remove);
        assert_eq!(ChangeKind::Change.inverse(), ChangeKind::Change);
    }
}
