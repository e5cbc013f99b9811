//! Snapshot-level diff: compare two versions of one document.
//!
//! Objects present only in the old snapshot are reported as removed
//! subtrees, objects present only in the new one as added subtrees. Inside
//! objects present in both, fields are compared the same way, and fields
//! present in both report a value change when their values differ.
//! Revisions are not compared.

use revdoc_types::{Address, DocumentSnapshot, FieldSnapshot, ObjectSnapshot, Value};

use crate::error::{DiffError, DiffResult};

/// Old and new value of a field that exists on both sides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueChange {
    pub field: Address,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

/// The result of comparing two snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentDiff {
    pub model: Address,
    /// Objects gone in the new snapshot, with their old fields.
    pub removed_objects: Vec<ObjectSnapshot>,
    /// Objects new in the new snapshot, with their new fields.
    pub added_objects: Vec<ObjectSnapshot>,
    /// Fields gone from objects that survive.
    pub removed_fields: Vec<FieldSnapshot>,
    /// Fields new in objects that survive.
    pub added_fields: Vec<FieldSnapshot>,
    pub changed_values: Vec<ValueChange>,
}

impl DocumentDiff {
    /// An empty diff for `model`.
    pub fn new(model: Address) -> Self {
        Self {
            model,
            removed_objects: Vec::new(),
            added_objects: Vec::new(),
            removed_fields: Vec::new(),
            added_fields: Vec::new(),
            changed_values: Vec::new(),
        }
    }

    /// Returns `true` if the snapshots are structurally equal.
    pub fn is_empty(&self) -> bool {
        self.removed_objects.is_empty()
            && self.added_objects.is_empty()
            && self.removed_fields.is_empty()
            && self.added_fields.is_empty()
            && self.changed_values.is_empty()
    }

    /// Number of atomic changes needed to apply this diff: one per entity
    /// added or removed and one per value set, cleared or replaced.
    pub fn change_count(&self) -> usize {
        let subtree = |object: &ObjectSnapshot| {
            1 + object
                .fields
                .values()
                .map(|f| 1 + usize::from(f.value.is_some()))
                .sum::<usize>()
        };
        let field = |f: &FieldSnapshot| 1 + usize::from(f.value.is_some());
        self.removed_objects.iter().map(subtree).sum::<usize>()
            + self.added_objects.iter().map(subtree).sum::<usize>()
            + self.removed_fields.iter().map(field).sum::<usize>()
            + self.added_fields.iter().map(field).sum::<usize>()
            + self.changed_values.len()
    }
}

/// Compute the diff between two snapshots of the same model.
///
/// Every list is ordered by address.
pub fn diff_snapshots(old: &DocumentSnapshot, new: &DocumentSnapshot) -> DiffResult<DocumentDiff> {
    if old.address != new.address {
        return Err(DiffError::ModelMismatch {
            old: old.address.clone(),
            new: new.address.clone(),
        });
    }
    let mut diff = DocumentDiff::new(old.address.clone());

    // Removed objects and changes inside surviving objects.
    for (id, old_object) in &old.objects {
        let Some(new_object) = new.objects.get(id) else {
            diff.removed_objects.push(old_object.clone());
            continue;
        };
        for (field_id, old_field) in &old_object.fields {
            match new_object.fields.get(field_id) {
                Some(new_field) => {
                    if old_field.value != new_field.value {
                        diff.changed_values.push(ValueChange {
                            field: old_field.address.clone(),
                            old: old_field.value.clone(),
                            new: new_field.value.clone(),
                        });
                    }
                }
                None => diff.removed_fields.push(old_field.clone()),
            }
        }
        for (field_id, new_field) in &new_object.fields {
            if !old_object.fields.contains_key(field_id) {
                diff.added_fields.push(new_field.clone());
            }
        }
    }

    // Added objects.
    for (id, new_object) in &new.objects {
        if !old.objects.contains_key(id) {
            diff.added_objects.push(new_object.clone());
        }
    }

    Ok(diff)
}

#[cfg(test)]
mod tests {
    use revdoc_types::Id;

    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn base() -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::empty(Id::new("m").unwrap());
        snapshot.insert_object(&addr("/m/a"), 1);
        snapshot.insert_field(&addr("/m/a/x"), 1);
        snapshot.set_value(&addr("/m/a/x"), Some(Value::from(1)));
        snapshot.insert_field(&addr("/m/a/y"), 1);
        snapshot.insert_object(&addr("/m/b"), 1);
        snapshot
    }

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let diff = diff_snapshots(&base(), &base()).unwrap();
        assert!(diff.is_empty());
        assert_eq!(diff.change_count(), 0);
    }

    #[test]
    fn revisions_are_ignored() {
        let mut new = base();
        new.set_revision(&addr("/m/a/x"), 9);
        assert!(diff_snapshots(&base(), &new).unwrap().is_empty());
    }

    #[test]
    fn object_subtrees() {
        let mut new = base();
        new.remove(&addr("/m/a"));
        new.insert_object(&addr("/m/c"), 2);
        new.insert_field(&addr("/m/c/z"), 2);

        let diff = diff_snapshots(&base(), &new).unwrap();
        assert_eq!(diff.removed_objects.len(), 1);
        assert_eq!(diff.removed_objects[0].fields.len(), 2);
        assert_eq!(diff.added_objects.len(), 1);
        assert!(diff.removed_fields.is_empty());
        // object a: 1 + x(field + value) + y(field); object c: 1 + z(field)
        assert_eq!(diff.change_count(), 4 + 2);
    }

    #[test]
    fn fields_and_values_in_surviving_objects() {
        let mut new = base();
        new.set_value(&addr("/m/a/x"), Some(Value::from(2)));
        new.set_value(&addr("/m/a/y"), Some(Value::from("set")));
        new.insert_field(&addr("/m/b/n"), 2);
        new.remove(&addr("/m/a/y"));

        let diff = diff_snapshots(&base(), &new).unwrap();
        assert_eq!(diff.changed_values.len(), 1);
        assert_eq!(diff.changed_values[0].old, Some(Value::from(1)));
        assert_eq!(diff.removed_fields.len(), 1);
        assert_eq!(diff.added_fields.len(), 1);
        assert_eq!(diff.added_fields[0].address, addr("/m/b/n"));
    }

    #[test]
    fn different_models_are_rejected() {
        let other = DocumentSnapshot::empty(Id::new("n").unwrap());
        assert!(matches!(
            diff_snapshots(&base(), &other),
            Err(DiffError::ModelMismatch { .. })
        ));
    }
}
