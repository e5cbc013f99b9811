use std::collections::BTreeMap;

use revdoc_types::Address;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::tree::EntityHandle;

/// Entities detached during one rollback episode.
///
/// An entity removed while orphans are collected is parked here instead of
/// being destroyed. Re-creating it at the same address reuses the parked
/// instance, so listeners registered on it survive a remove/re-create cycle.
/// Whatever is left when the episode ends is destroyed.
#[derive(Debug, Default)]
pub struct Orphans {
    entries: BTreeMap<Address, EntityHandle>,
}

impl Orphans {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park a detached entity. Parking a second entity at the same address
    /// is a structural error.
    pub fn put(&mut self, address: Address, handle: EntityHandle) -> CoreResult<()> {
        if self.entries.contains_key(&address) {
            return Err(CoreError::DuplicateOrphan(address));
        }
        debug!(address = %address, "entity orphaned");
        self.entries.insert(address, handle);
        Ok(())
    }

    /// Reclaim the entity parked at `address`.
    pub fn take(&mut self, address: &Address) -> Option<EntityHandle> {
        self.entries.remove(address)
    }

    pub fn get(&self, address: &Address) -> Option<EntityHandle> {
        self.entries.get(address).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every parked entity.
    pub fn drain(&mut self) -> Vec<(Address, EntityHandle)> {
        std::mem::take(&mut self.entries).into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use revdoc_types::Id;

    use super::*;
    use crate::tree::DocumentTree;

    #[test]
    fn duplicates_are_rejected() {
        let mut tree = DocumentTree::new(Id::new("m").unwrap());
        let a = Address::parse("/m/a").unwrap();
        tree.create(&a, 1).unwrap();
        let first = tree.detach(&a).unwrap();
        tree.create(&a, 2).unwrap();
        let second = tree.detach(&a).unwrap();

        let mut orphans = Orphans::new();
        orphans.put(a.clone(), first).unwrap();
        assert_eq!(orphans.put(a.clone(), second), Err(CoreError::DuplicateOrphan(a.clone())));
        assert_eq!(orphans.take(&a), Some(first));
        assert!(orphans.is_empty());
    }
}
