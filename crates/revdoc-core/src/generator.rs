//! Expansion of a document diff into an ordered list of atomic events.
//!
//! Removals come first, deepest first: a field's value, then the field, then
//! its object. Additions follow, shallowest first: an object, then its
//! fields, then their values. Value changes of fields that exist on both
//! sides come last.

use revdoc_diff::{DocumentDiff, ValueChange};
use revdoc_types::{
    ActorId, Address, AtomicEvent, ChangeKind, FieldSnapshot, ObjectSnapshot, RevisionNumber, Value,
    NEVER_EXISTED,
};

use crate::view::StateView;

/// Revisions of the model, of the object and of the field around `changed`
/// as seen in `state`. Scopes that are absent or do not apply are
/// [`NEVER_EXISTED`].
pub fn old_revisions<S: StateView + ?Sized>(
    state: &S,
    changed: &Address,
) -> (RevisionNumber, RevisionNumber, RevisionNumber) {
    let model = state.revision_of(state.model_address());
    let object = changed
        .object_address()
        .map_or(NEVER_EXISTED, |object| state.revision_of(&object));
    let field = if changed.field_id().is_some() {
        state.revision_of(changed)
    } else {
        NEVER_EXISTED
    };
    (model, object, field)
}

/// The kind of a value event moving a field from `old` to `new`.
pub fn value_change_kind(old: Option<&Value>, new: Option<&Value>) -> ChangeKind {
    match (old, new) {
        (None, _) => ChangeKind::Add,
        (Some(_), Some(_)) => ChangeKind::Change,
        (Some(_), None) => ChangeKind::Remove,
    }
}

/// Build one atomic event whose old revisions are read from `before`.
pub fn atomic_event<S: StateView + ?Sized>(
    before: &S,
    actor: &ActorId,
    kind: ChangeKind,
    target: Address,
    changed: Address,
    old_value: Option<Value>,
    new_value: Option<Value>,
) -> AtomicEvent {
    let (old_model_revision, old_object_revision, old_field_revision) =
        old_revisions(before, &changed);
    AtomicEvent {
        kind,
        target,
        changed,
        actor: actor.clone(),
        old_model_revision,
        old_object_revision,
        old_field_revision,
        in_transaction: false,
        old_value,
        new_value,
    }
}

struct Generator<'a, S: StateView + ?Sized> {
    before: &'a S,
    actor: &'a ActorId,
    events: Vec<AtomicEvent>,
}

impl<S: StateView + ?Sized> Generator<'_, S> {
    fn push(
        &mut self,
        kind: ChangeKind,
        target: Address,
        changed: Address,
        old_value: Option<Value>,
        new_value: Option<Value>,
    ) {
        let event = atomic_event(
            self.before,
            self.actor,
            kind,
            target,
            changed,
            old_value,
            new_value,
        );
        self.events.push(event);
    }

    fn remove_field(&mut self, field: &FieldSnapshot) {
        if let Some(value) = &field.value {
            self.push(
                ChangeKind::Remove,
                field.address.clone(),
                field.address.clone(),
                Some(value.clone()),
                None,
            );
        }
        if let Some(object) = field.address.parent() {
            self.push(ChangeKind::Remove, object, field.address.clone(), None, None);
        }
    }

    fn add_field(&mut self, field: &FieldSnapshot) {
        if let Some(object) = field.address.parent() {
            self.push(ChangeKind::Add, object, field.address.clone(), None, None);
        }
        if let Some(value) = &field.value {
            self.push(
                ChangeKind::Add,
                field.address.clone(),
                field.address.clone(),
                None,
                Some(value.clone()),
            );
        }
    }

    fn remove_object(&mut self, object: &ObjectSnapshot) {
        for field in object.fields.values() {
            self.remove_field(field);
        }
        let model = object.address.model_address();
        self.push(ChangeKind::Remove, model, object.address.clone(), None, None);
    }

    fn add_object(&mut self, object: &ObjectSnapshot) {
        let model = object.address.model_address();
        self.push(ChangeKind::Add, model, object.address.clone(), None, None);
        for field in object.fields.values() {
            self.add_field(field);
        }
    }

    fn change_value(&mut self, change: &ValueChange) {
        let kind = value_change_kind(change.old.as_ref(), change.new.as_ref());
        self.push(
            kind,
            change.field.clone(),
            change.field.clone(),
            change.old.clone(),
            change.new.clone(),
        );
    }
}

/// Expand `diff` into atomic events, reading old revisions from `before`.
///
/// Every event is produced with `in_transaction == false`; the caller flags
/// them when it wraps more than one into a transaction.
pub fn generate<S: StateView + ?Sized>(
    diff: &DocumentDiff,
    before: &S,
    actor: &ActorId,
) -> Vec<AtomicEvent> {
    let mut generator = Generator {
        before,
        actor,
        events: Vec::with_capacity(diff.change_count()),
    };
    for field in &diff.removed_fields {
        generator.remove_field(field);
    }
    for object in &diff.removed_objects {
        generator.remove_object(object);
    }
    for object in &diff.added_objects {
        generator.add_object(object);
    }
    for field in &diff.added_fields {
        generator.add_field(field);
    }
    for change in &diff.changed_values {
        generator.change_value(change);
    }
    generator.events
}
