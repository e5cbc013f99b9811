//! Precondition checks for atomic commands.
//!
//! A check never mutates state. It decides whether a command can run, would
//! be redundant, or must be rejected, against any [`StateView`].

use revdoc_types::{AtomicCommand, ChangeKind, Intent};

use crate::view::StateView;

/// Result of checking a command against the current state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// The command changes the document.
    Proceed,
    /// The requested state already holds.
    NoChange,
    /// The command is rejected.
    Failed,
}

pub fn check<S: StateView + ?Sized>(state: &S, command: &AtomicCommand) -> Verdict {
    if command.is_value_command() {
        check_value(state, command)
    } else {
        check_entity(state, command)
    }
}

fn check_entity<S: StateView + ?Sized>(state: &S, command: &AtomicCommand) -> Verdict {
    let exists = state.exists(&command.changed);
    match command.kind {
        ChangeKind::Add => {
            if !state.exists(&command.target) {
                return Verdict::Failed;
            }
            match (exists, command.intent) {
                (false, _) => Verdict::Proceed,
                (true, Intent::Forced) => Verdict::NoChange,
                (true, Intent::Safe(_)) => Verdict::Failed,
            }
        }
        ChangeKind::Remove => match (exists, command.intent) {
            (false, Intent::Forced) => Verdict::NoChange,
            (false, Intent::Safe(_)) => Verdict::Failed,
            (true, Intent::Forced) => Verdict::Proceed,
            (true, Intent::Safe(revision)) if revision == state.revision_of(&command.changed) => {
                Verdict::Proceed
            }
            (true, Intent::Safe(_)) => Verdict::Failed,
        },
        // Rejected by command validation.
        ChangeKind::Change => Verdict::Failed,
    }
}

fn check_value<S: StateView + ?Sized>(state: &S, command: &AtomicCommand) -> Verdict {
    let field = &command.changed;
    if !state.exists(field) {
        return Verdict::Failed;
    }
    if let Intent::Safe(revision) = command.intent {
        if revision != state.revision_of(field) {
            return Verdict::Failed;
        }
    }
    let current = state.value_of(field);
    let forced = command.is_forced();
    match command.kind {
        ChangeKind::Remove => match (current, forced) {
            (Some(_), _) => Verdict::Proceed,
            (None, true) => Verdict::NoChange,
            (None, false) => Verdict::Failed,
        },
        ChangeKind::Add => match (current, forced) {
            (None, _) => Verdict::Proceed,
            (Some(_), false) => Verdict::Failed,
            (Some(value), true) if Some(value) == command.value.as_ref() => Verdict::NoChange,
            (Some(_), true) => Verdict::Proceed,
        },
        ChangeKind::Change => match (current, forced) {
            (None, true) => Verdict::Proceed,
            (None, false) => Verdict::Failed,
            (Some(value), _) if Some(value) == command.value.as_ref() => Verdict::NoChange,
            (Some(_), _) => Verdict::Proceed,
        },
    }
}

#[cfg(test)]
mod tests {
    use revdoc_types::{Address, DocumentSnapshot, Id, Value};

    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn state() -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::empty(Id::new("m").unwrap());
        snapshot.insert_object(&addr("/m/o"), 3);
        snapshot.insert_field(&addr("/m/o/f"), 5);
        snapshot.set_value(&addr("/m/o/f"), Some(Value::from("a")));
        snapshot.insert_field(&addr("/m/o/empty"), 2);
        snapshot.revision = 5;
        snapshot
    }

    #[test]
    fn entity_add() {
        let s = state();
        let add = |a: &str, intent| AtomicCommand::add_entity(addr(a), intent).unwrap();
        assert_eq!(check(&s, &add("/m/p", Intent::Forced)), Verdict::Proceed);
        assert_eq!(check(&s, &add("/m/o", Intent::Forced)), Verdict::NoChange);
        assert_eq!(check(&s, &add("/m/o", Intent::Safe(-1))), Verdict::Failed);
        assert_eq!(check(&s, &add("/m/x/f", Intent::Forced)), Verdict::Failed);
    }

    #[test]
    fn entity_remove() {
        let s = state();
        let remove = |a: &str, intent| AtomicCommand::remove_entity(addr(a), intent).unwrap();
        assert_eq!(check(&s, &remove("/m/o", Intent::Safe(3))), Verdict::Proceed);
        assert_eq!(check(&s, &remove("/m/o", Intent::Safe(2))), Verdict::Failed);
        assert_eq!(check(&s, &remove("/m/p", Intent::Forced)), Verdict::NoChange);
        assert_eq!(check(&s, &remove("/m/p", Intent::Safe(0))), Verdict::Failed);
    }

    #[test]
    fn safe_value_commands_check_the_field_revision_first() {
        let s = state();
        let f = addr("/m/o/f");
        let same =
            AtomicCommand::change_value(f.clone(), Value::from("a"), Intent::Safe(4)).unwrap();
        assert_eq!(check(&s, &same), Verdict::Failed);
        let same =
            AtomicCommand::change_value(f.clone(), Value::from("a"), Intent::Safe(5)).unwrap();
        assert_eq!(check(&s, &same), Verdict::NoChange);
        let other = AtomicCommand::change_value(f, Value::from("b"), Intent::Safe(5)).unwrap();
        assert_eq!(check(&s, &other), Verdict::Proceed);
    }

    #[test]
    fn value_presence_rules() {
        let s = state();
        let f = addr("/m/o/f");
        let empty = addr("/m/o/empty");
        let cases = [
            (
                AtomicCommand::add_value(f.clone(), Value::from("a"), Intent::Forced),
                Verdict::NoChange,
            ),
            (
                AtomicCommand::add_value(f.clone(), Value::from("z"), Intent::Forced),
                Verdict::Proceed,
            ),
            (
                AtomicCommand::add_value(f.clone(), Value::from("z"), Intent::Safe(5)),
                Verdict::Failed,
            ),
            (
                AtomicCommand::change_value(empty.clone(), Value::from(1), Intent::Forced),
                Verdict::Proceed,
            ),
            (
                AtomicCommand::change_value(empty.clone(), Value::from(1), Intent::Safe(2)),
                Verdict::Failed,
            ),
            (AtomicCommand::remove_value(empty.clone(), Intent::Forced), Verdict::NoChange),
            (AtomicCommand::remove_value(empty, Intent::Safe(2)), Verdict::Failed),
            (AtomicCommand::remove_value(addr("/m/o/missing"), Intent::Forced), Verdict::Failed),
        ];
        for (command, expected) in cases {
            let command = command.unwrap();
            assert_eq!(check(&s, &command), expected, "{command:?}");
        }
    }
}
