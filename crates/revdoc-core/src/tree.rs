//! Arena-backed document tree.
//!
//! Entities live in a slot vector and refer to their parent and children by
//! slot index. Revision propagation walks the address lineage through the
//! index instead of following back-references.

use std::collections::{BTreeMap, HashMap};

use revdoc_types::{
    Address, AddressKind, DocumentSnapshot, Id, InstanceId, RevisionNumber, Value, NEVER_EXISTED,
};

use crate::error::{CoreError, CoreResult};

#[derive(Clone, Debug)]
struct Entity {
    address: Address,
    instance: InstanceId,
    revision: RevisionNumber,
    value: Option<Value>,
    parent: Option<usize>,
    children: BTreeMap<Id, usize>,
}

/// A detached entity, kept alive in the arena until it is attached again or
/// destroyed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntityHandle(usize);

/// The live document: one model with its objects and fields.
#[derive(Clone, Debug)]
pub struct DocumentTree {
    slots: Vec<Option<Entity>>,
    free: Vec<usize>,
    index: HashMap<Address, usize>,
    root: usize,
    next_instance: u64,
}

impl DocumentTree {
    /// An empty model at revision 0.
    pub fn new(model: Id) -> Self {
        let address = Address::model(model);
        let mut tree = Self {
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            root: 0,
            next_instance: 0,
        };
        let instance = tree.next_instance();
        tree.slots.push(Some(Entity {
            address: address.clone(),
            instance,
            revision: 0,
            value: None,
            parent: None,
            children: BTreeMap::new(),
        }));
        tree.index.insert(address, 0);
        tree
    }

    /// Build a tree holding the contents of `snapshot`, with fresh instances.
    pub fn from_snapshot(snapshot: &DocumentSnapshot) -> CoreResult<Self> {
        let mut tree = Self::new(snapshot.model_id().clone());
        tree.set_model_revision(snapshot.revision);
        for object in snapshot.objects.values() {
            tree.create(&object.address, object.revision)?;
            for field in object.fields.values() {
                tree.create(&field.address, field.revision)?;
                tree.set_value(&field.address, field.value.clone())?;
            }
        }
        Ok(tree)
    }

    /// Detached copy of the current contents.
    pub fn snapshot(&self) -> DocumentSnapshot {
        let mut snapshot = DocumentSnapshot::empty(self.model_address().model_id().clone());
        snapshot.revision = self.model_revision();
        for &object_slot in self.entity(self.root).children.values() {
            let object = self.entity(object_slot);
            snapshot.insert_object(&object.address, object.revision);
            for &field_slot in object.children.values() {
                let field = self.entity(field_slot);
                snapshot.insert_field(&field.address, field.revision);
                snapshot.set_value(&field.address, field.value.clone());
            }
        }
        snapshot
    }

    pub fn model_address(&self) -> &Address {
        &self.entity(self.root).address
    }

    pub fn model_revision(&self) -> RevisionNumber {
        self.entity(self.root).revision
    }

    pub fn set_model_revision(&mut self, revision: RevisionNumber) {
        let root = self.root;
        self.entity_mut(root).revision = revision;
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.index.contains_key(address)
    }

    pub fn instance_at(&self, address: &Address) -> Option<InstanceId> {
        self.lookup(address).map(|e| e.instance)
    }

    /// Revision of the entity at `address`, [`NEVER_EXISTED`] if absent.
    pub fn revision_of(&self, address: &Address) -> RevisionNumber {
        self.lookup(address).map_or(NEVER_EXISTED, |e| e.revision)
    }

    pub fn value_of(&self, address: &Address) -> Option<&Value> {
        self.lookup(address)?.value.as_ref()
    }

    /// Addresses of the direct children of `address`, ordered by id.
    pub fn children(&self, address: &Address) -> Vec<Address> {
        self.lookup(address)
            .map(|e| {
                e.children
                    .values()
                    .map(|&slot| self.entity(slot).address.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn child_count(&self, address: &Address) -> usize {
        self.lookup(address).map_or(0, |e| e.children.len())
    }

    /// Addresses of every entity below the model, containers first.
    pub fn addresses(&self) -> Vec<Address> {
        let mut out = Vec::new();
        for object in self.children(self.model_address()) {
            let fields = self.children(&object);
            out.push(object);
            out.extend(fields);
        }
        out
    }

    /// Create a fresh object or field at `address`.
    pub fn create(
        &mut self,
        address: &Address,
        revision: RevisionNumber,
    ) -> CoreResult<InstanceId> {
        let parent = self.parent_slot(address)?;
        let instance = self.next_instance();
        let slot = self.allocate(Entity {
            address: address.clone(),
            instance,
            revision,
            value: None,
            parent: Some(parent),
            children: BTreeMap::new(),
        });
        self.link(parent, slot);
        Ok(instance)
    }

    /// Re-attach a detached entity at its address. The entity keeps its
    /// instance; its revision is set to `revision` and a field's value is
    /// cleared.
    pub fn attach(
        &mut self,
        handle: EntityHandle,
        revision: RevisionNumber,
    ) -> CoreResult<InstanceId> {
        let address = self.detached(handle)?.address.clone();
        let parent = self.parent_slot(&address)?;
        let entity = self.entity_mut(handle.0);
        entity.revision = revision;
        entity.value = None;
        entity.parent = Some(parent);
        let instance = entity.instance;
        self.link(parent, handle.0);
        self.reindex(handle.0);
        Ok(instance)
    }

    /// Unlink the entity at `address` and everything below it from the tree.
    /// The subtree stays in the arena until destroyed.
    pub fn detach(&mut self, address: &Address) -> CoreResult<EntityHandle> {
        if address.kind() == AddressKind::Model {
            return Err(CoreError::InvalidEvent(format!("cannot detach model {address}")));
        }
        let slot = *self
            .index
            .get(address)
            .ok_or_else(|| CoreError::MissingEntity(address.clone()))?;
        let entity = self.entity_mut(slot);
        let parent = entity.parent.take();
        let id = entity.address.id().clone();
        if let Some(parent) = parent {
            self.entity_mut(parent).children.remove(&id);
        }
        self.unindex(slot);
        Ok(EntityHandle(slot))
    }

    /// Free a detached subtree, returning the addresses and instances that
    /// ceased to exist.
    pub fn destroy(&mut self, handle: EntityHandle) -> Vec<(Address, InstanceId)> {
        let mut gone = Vec::new();
        let mut stack = vec![handle.0];
        while let Some(slot) = stack.pop() {
            let Some(entity) = self.slots.get_mut(slot).and_then(Option::take) else {
                continue;
            };
            stack.extend(entity.children.values().copied());
            gone.push((entity.address, entity.instance));
            self.free.push(slot);
        }
        gone
    }

    pub fn handle_instance(&self, handle: EntityHandle) -> Option<InstanceId> {
        self.slot(handle.0).map(|e| e.instance)
    }

    pub fn handle_address(&self, handle: EntityHandle) -> Option<&Address> {
        self.slot(handle.0).map(|e| &e.address)
    }

    pub fn set_revision(&mut self, address: &Address, revision: RevisionNumber) -> CoreResult<()> {
        let slot = self.slot_of(address)?;
        self.entity_mut(slot).revision = revision;
        Ok(())
    }

    pub fn set_value(&mut self, address: &Address, value: Option<Value>) -> CoreResult<()> {
        if address.kind() != AddressKind::Field {
            return Err(CoreError::InvalidEvent(format!("{address} cannot hold a value")));
        }
        let slot = self.slot_of(address)?;
        self.entity_mut(slot).value = value;
        Ok(())
    }

    /// Set `revision` on every existing entity from the model down to
    /// `address`.
    pub fn bump(&mut self, address: &Address, revision: RevisionNumber) {
        for scope in address.lineage() {
            if let Some(&slot) = self.index.get(&scope) {
                self.entity_mut(slot).revision = revision;
            }
        }
    }

    fn next_instance(&mut self) -> InstanceId {
        self.next_instance += 1;
        InstanceId::new(self.next_instance)
    }

    fn lookup(&self, address: &Address) -> Option<&Entity> {
        self.index.get(address).map(|&slot| self.entity(slot))
    }

    fn slot_of(&self, address: &Address) -> CoreResult<usize> {
        self.index
            .get(address)
            .copied()
            .ok_or_else(|| CoreError::MissingEntity(address.clone()))
    }

    fn parent_slot(&self, address: &Address) -> CoreResult<usize> {
        if self.exists(address) {
            return Err(CoreError::EntityExists(address.clone()));
        }
        address
            .parent()
            .and_then(|parent| self.index.get(&parent).copied())
            .ok_or_else(|| CoreError::MissingParent(address.clone()))
    }

    fn detached(&self, handle: EntityHandle) -> CoreResult<&Entity> {
        match self.slot(handle.0) {
            Some(entity) if entity.parent.is_none() && handle.0 != self.root => Ok(entity),
            Some(entity) => Err(CoreError::EntityExists(entity.address.clone())),
            None => Err(CoreError::StaleHandle),
        }
    }

    fn allocate(&mut self, entity: Entity) -> usize {
        let address = entity.address.clone();
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entity);
                slot
            }
            None => {
                self.slots.push(Some(entity));
                self.slots.len() - 1
            }
        };
        self.index.insert(address, slot);
        slot
    }

    fn link(&mut self, parent: usize, child: usize) {
        let id = self.entity(child).address.id().clone();
        self.entity_mut(parent).children.insert(id, child);
    }

    fn reindex(&mut self, slot: usize) {
        let mut stack = vec![slot];
        while let Some(slot) = stack.pop() {
            let entity = self.entity(slot);
            stack.extend(entity.children.values().copied());
            let address = entity.address.clone();
            self.index.insert(address, slot);
        }
    }

    fn unindex(&mut self, slot: usize) {
        let mut stack = vec![slot];
        while let Some(slot) = stack.pop() {
            let entity = self.entity(slot);
            stack.extend(entity.children.values().copied());
            let address = entity.address.clone();
            self.index.remove(&address);
        }
    }

    fn slot(&self, slot: usize) -> Option<&Entity> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    // Slots reached through the index or through child links are always
    // occupied; a vacant one means the arena is corrupt.
    fn entity(&self, slot: usize) -> &Entity {
        match self.slot(slot) {
            Some(entity) => entity,
            None => unreachable!("vacant arena slot {slot} is still linked"),
        }
    }

    fn entity_mut(&mut self, slot: usize) -> &mut Entity {
        match self.slots.get_mut(slot).and_then(Option::as_mut) {
            Some(entity) => entity,
            None => unreachable!("vacant arena slot {slot} is still linked"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn sample() -> DocumentTree {
        let mut tree = DocumentTree::new(Id::new("m").unwrap());
        tree.create(&addr("/m/o"), 1).unwrap();
        tree.create(&addr("/m/o/f"), 2).unwrap();
        tree.set_value(&addr("/m/o/f"), Some(Value::from(7))).unwrap();
        tree.set_model_revision(2);
        tree
    }

    #[test]
    fn create_requires_parent_and_rejects_duplicates() {
        let mut tree = sample();
        assert!(matches!(tree.create(&addr("/m/x/f"), 3), Err(CoreError::MissingParent(_))));
        assert!(matches!(tree.create(&addr("/m/o"), 3), Err(CoreError::EntityExists(_))));
        assert_eq!(tree.child_count(&addr("/m/o")), 1);
    }

    #[test]
    fn bump_walks_the_lineage() {
        let mut tree = sample();
        tree.bump(&addr("/m/o/f"), 5);
        assert_eq!(tree.model_revision(), 5);
        assert_eq!(tree.revision_of(&addr("/m/o")), 5);
        assert_eq!(tree.revision_of(&addr("/m/o/f")), 5);
    }

    #[test]
    fn detach_and_attach_keep_the_instance() {
        let mut tree = sample();
        let instance = tree.instance_at(&addr("/m/o/f")).unwrap();
        let handle = tree.detach(&addr("/m/o/f")).unwrap();
        assert!(!tree.exists(&addr("/m/o/f")));
        assert_eq!(tree.handle_instance(handle), Some(instance));

        assert_eq!(tree.attach(handle, 9).unwrap(), instance);
        assert_eq!(tree.revision_of(&addr("/m/o/f")), 9);
        assert_eq!(tree.value_of(&addr("/m/o/f")), None);
    }

    #[test]
    fn destroy_frees_the_subtree() {
        let mut tree = sample();
        let handle = tree.detach(&addr("/m/o")).unwrap();
        assert!(!tree.exists(&addr("/m/o/f")));
        let gone = tree.destroy(handle);
        assert_eq!(gone.len(), 2);
        let fresh = tree.create(&addr("/m/o"), 3).unwrap();
        assert!(gone.iter().all(|(_, instance)| *instance != fresh));
    }

    #[test]
    fn snapshot_roundtrip() {
        let tree = sample();
        let snapshot = tree.snapshot();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.value_of(&addr("/m/o/f")), Some(&Value::from(7)));
        let rebuilt = DocumentTree::from_snapshot(&snapshot).unwrap();
        assert_eq!(rebuilt.snapshot(), snapshot);
        assert_eq!(rebuilt.addresses(), vec![addr("/m/o"), addr("/m/o/f")]);
    }
}
