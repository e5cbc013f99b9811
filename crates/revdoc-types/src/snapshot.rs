use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::address::{Address, AddressKind};
use crate::id::Id;
use crate::revision::{RevisionNumber, NEVER_EXISTED};
use crate::value::Value;

/// Plain, detached copy of a field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub address: Address,
    pub revision: RevisionNumber,
    pub value: Option<Value>,
}

/// Plain, detached copy of an object and its fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSnapshot {
    pub address: Address,
    pub revision: RevisionNumber,
    pub fields: BTreeMap<Id, FieldSnapshot>,
}

impl ObjectSnapshot {
    pub fn new(address: Address, revision: RevisionNumber) -> Self {
        Self {
            address,
            revision,
            fields: BTreeMap::new(),
        }
    }

    pub fn field(&self, id: &Id) -> Option<&FieldSnapshot> {
        self.fields.get(id)
    }
}

/// Plain, detached copy of a whole document.
///
/// Snapshots are what transactions execute against, what the tree diff
/// compares and what gets persisted. They carry revisions but no listener
/// state or instance identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub address: Address,
    pub revision: RevisionNumber,
    pub objects: BTreeMap<Id, ObjectSnapshot>,
}

impl DocumentSnapshot {
    /// An empty model at revision 0.
    pub fn empty(model: Id) -> Self {
        Self {
            address: Address::model(model),
            revision: 0,
            objects: BTreeMap::new(),
        }
    }

    pub fn model_id(&self) -> &Id {
        self.address.model_id()
    }

    pub fn object(&self, address: &Address) -> Option<&ObjectSnapshot> {
        if address.model_id() != self.model_id() {
            return None;
        }
        self.objects.get(address.object_id()?)
    }

    pub fn object_mut(&mut self, address: &Address) -> Option<&mut ObjectSnapshot> {
        if address.model_id() != self.address.model_id() {
            return None;
        }
        self.objects.get_mut(address.object_id()?)
    }

    pub fn field(&self, address: &Address) -> Option<&FieldSnapshot> {
        self.object(address)?.fields.get(address.field_id()?)
    }

    pub fn field_mut(&mut self, address: &Address) -> Option<&mut FieldSnapshot> {
        let field_id = address.field_id()?.clone();
        self.object_mut(address)?.fields.get_mut(&field_id)
    }

    /// `true` if an entity exists at `address`.
    pub fn exists(&self, address: &Address) -> bool {
        self.revision_of(address) != NEVER_EXISTED
    }

    /// Revision of the entity at `address`, [`NEVER_EXISTED`] if absent.
    pub fn revision_of(&self, address: &Address) -> RevisionNumber {
        match address.kind() {
            AddressKind::Model if *address == self.address => self.revision,
            AddressKind::Model => NEVER_EXISTED,
            AddressKind::Object => self.object(address).map_or(NEVER_EXISTED, |o| o.revision),
            AddressKind::Field => self.field(address).map_or(NEVER_EXISTED, |f| f.revision),
        }
    }

    /// Value of the field at `address`.
    pub fn value_of(&self, address: &Address) -> Option<&Value> {
        self.field(address)?.value.as_ref()
    }

    /// Add an empty object; returns `false` if it already exists or lies
    /// outside this model.
    pub fn insert_object(&mut self, address: &Address, revision: RevisionNumber) -> bool {
        if address.kind() != AddressKind::Object || address.model_id() != self.model_id() {
            return false;
        }
        let Some(id) = address.object_id() else {
            return false;
        };
        if self.objects.contains_key(id) {
            return false;
        }
        self.objects
            .insert(id.clone(), ObjectSnapshot::new(address.clone(), revision));
        true
    }

    /// Add a field without value; returns `false` if it already exists or its
    /// object is missing.
    pub fn insert_field(&mut self, address: &Address, revision: RevisionNumber) -> bool {
        let Some(field_id) = address.field_id().cloned() else {
            return false;
        };
        let Some(object) = self.object_mut(address) else {
            return false;
        };
        if object.fields.contains_key(&field_id) {
            return false;
        }
        object.fields.insert(
            field_id,
            FieldSnapshot {
                address: address.clone(),
                revision,
                value: None,
            },
        );
        true
    }

    /// Remove the object or field at `address` with everything below it.
    pub fn remove(&mut self, address: &Address) -> bool {
        match address.kind() {
            AddressKind::Model => false,
            AddressKind::Object => match address.object_id() {
                Some(id) if address.model_id() == self.model_id() => {
                    self.objects.remove(id).is_some()
                }
                _ => false,
            },
            AddressKind::Field => {
                let Some(field_id) = address.field_id().cloned() else {
                    return false;
                };
                self.object_mut(address)
                    .is_some_and(|object| object.fields.remove(&field_id).is_some())
            }
        }
    }

    /// Set the revision of an existing entity.
    pub fn set_revision(&mut self, address: &Address, revision: RevisionNumber) -> bool {
        match address.kind() {
            AddressKind::Model if *address == self.address => {
                self.revision = revision;
                true
            }
            AddressKind::Model => false,
            AddressKind::Object => self
                .object_mut(address)
                .map(|o| o.revision = revision)
                .is_some(),
            AddressKind::Field => self
                .field_mut(address)
                .map(|f| f.revision = revision)
                .is_some(),
        }
    }

    /// Replace the value of an existing field.
    pub fn set_value(&mut self, address: &Address, value: Option<Value>) -> bool {
        self.field_mut(address).map(|f| f.value = value).is_some()
    }

    /// Addresses of every entity below the model, containers first.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        for object in self.objects.values() {
            out.push(object.address.clone());
            out.extend(object.fields.values().map(|f| f.address.clone()));
        }
        out
    }

    /// Number of objects plus fields.
    pub fn entity_count(&self) -> usize {
        self.objects.values().map(|o| 1 + o.fields.len()).sum()
    }
}
