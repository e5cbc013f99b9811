use revdoc_types::{Address, AddressKind, DocumentSnapshot, RevisionNumber, Value, NEVER_EXISTED};

use crate::tree::DocumentTree;

/// Read access to document state, shared by the live tree and by detached
/// snapshots so preconditions and event generation work on either.
pub trait StateView {
    fn model_address(&self) -> &Address;

    /// Revision of the entity at `address`, [`NEVER_EXISTED`] if absent.
    fn revision_of(&self, address: &Address) -> RevisionNumber;

    fn value_of(&self, address: &Address) -> Option<&Value>;

    /// Number of direct children of the entity at `address`.
    fn child_count(&self, address: &Address) -> usize;

    fn exists(&self, address: &Address) -> bool {
        self.revision_of(address) != NEVER_EXISTED
    }

    /// `true` if removing the entity also removes something below it: child
    /// entities, or the value of a field.
    fn has_content(&self, address: &Address) -> bool {
        match address.kind() {
            AddressKind::Field => self.value_of(address).is_some(),
            AddressKind::Model | AddressKind::Object => self.child_count(address) > 0,
        }
    }
}

impl StateView for DocumentSnapshot {
    fn model_address(&self) -> &Address {
        &self.address
    }

    fn revision_of(&self, address: &Address) -> RevisionNumber {
        DocumentSnapshot::revision_of(self, address)
    }

    fn value_of(&self, address: &Address) -> Option<&Value> {
        DocumentSnapshot::value_of(self, address)
    }

    fn child_count(&self, address: &Address) -> usize {
        match address.kind() {
            AddressKind::Model if *address == self.address => self.objects.len(),
            AddressKind::Object => self.object(address).map_or(0, |o| o.fields.len()),
            _ => 0,
        }
    }
}

impl StateView for DocumentTree {
    fn model_address(&self) -> &Address {
        DocumentTree::model_address(self)
    }

    fn revision_of(&self, address: &Address) -> RevisionNumber {
        DocumentTree::revision_of(self, address)
    }

    fn value_of(&self, address: &Address) -> Option<&Value> {
        DocumentTree::value_of(self, address)
    }

    fn child_count(&self, address: &Address) -> usize {
        DocumentTree::child_count(self, address)
    }
}
