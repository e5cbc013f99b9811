use std::collections::HashMap;
use std::fmt;

use revdoc_events::{EventQueue, ListenerRegistry, QueuedEvent};
use revdoc_log::{ChangeLogReader, LocalChangeQueue, LogError, SyncLog};
use revdoc_types::{ActorId, Address, Event, Id, InstanceId, RevisionNumber};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::orphans::Orphans;
use crate::tree::{DocumentTree, EntityHandle};

/// Everything one document owns, behind the document's root lock.
///
/// The fields are public so the synchronization layer can drive rollback
/// and replay directly; structural mutations go through
/// [`create_entity`](Self::create_entity) and
/// [`remove_entity`](Self::remove_entity) so orphans and retired instances
/// are tracked.
pub struct DocumentCore {
    pub tree: DocumentTree,
    pub log: SyncLog,
    pub queue: EventQueue,
    pub local_changes: LocalChangeQueue,
    pub listeners: ListenerRegistry,
    /// Present while a rollback episode collects detached entities.
    pub orphans: Option<Orphans>,
    /// Actor recorded on locally executed commands.
    pub actor: ActorId,
    retired: Vec<InstanceId>,
    retired_routes: HashMap<Address, InstanceId>,
}

impl DocumentCore {
    /// A fresh, empty document at revision 0.
    pub fn new(model: Id, actor: ActorId) -> Self {
        Self::assemble(DocumentTree::new(model), SyncLog::new(), actor)
    }

    /// Assemble a document from a restored tree and log. The log must end at
    /// the tree's revision.
    pub fn from_parts(tree: DocumentTree, log: SyncLog, actor: ActorId) -> CoreResult<Self> {
        if tree.model_revision() != log.current_revision() {
            return Err(CoreError::Log(LogError::RevisionMismatch {
                expected: log.current_revision(),
                actual: tree.model_revision(),
            }));
        }
        Ok(Self::assemble(tree, log, actor))
    }

    fn assemble(tree: DocumentTree, log: SyncLog, actor: ActorId) -> Self {
        Self {
            tree,
            log,
            queue: EventQueue::new(),
            local_changes: LocalChangeQueue::new(),
            listeners: ListenerRegistry::new(),
            orphans: None,
            actor,
            retired: Vec::new(),
            retired_routes: HashMap::new(),
        }
    }

    pub fn model_address(&self) -> &Address {
        self.tree.model_address()
    }

    pub fn current_revision(&self) -> RevisionNumber {
        self.tree.model_revision()
    }

    pub fn sync_revision(&self) -> RevisionNumber {
        self.log.sync_revision()
    }

    /// Create an object or field. While orphans are collected, an entity
    /// parked at the same address is re-attached instead of built anew.
    pub fn create_entity(
        &mut self,
        address: &Address,
        revision: RevisionNumber,
    ) -> CoreResult<InstanceId> {
        if let Some(handle) = self.orphans.as_mut().and_then(|o| o.take(address)) {
            let instance = self.tree.attach(handle, revision)?;
            debug!(address = %address, %instance, "orphan resurrected");
            return Ok(instance);
        }
        self.tree.create(address, revision)
    }

    /// Remove an object or field with everything below it. While orphans
    /// are collected, every removed entity is parked individually, children
    /// first; otherwise the subtree is destroyed and its instances retired.
    pub fn remove_entity(&mut self, address: &Address) -> CoreResult<()> {
        if self.orphans.is_some() {
            for child in self.tree.children(address) {
                self.remove_entity(&child)?;
            }
            let handle = self.tree.detach(address)?;
            if let Some(orphans) = self.orphans.as_mut() {
                orphans.put(address.clone(), handle)?;
            }
            return Ok(());
        }
        let handle = self.tree.detach(address)?;
        self.retire(handle);
        Ok(())
    }

    /// Start collecting orphans for a rollback episode.
    pub fn begin_orphans(&mut self) -> CoreResult<()> {
        if self.orphans.is_some() {
            return Err(CoreError::InvalidEvent("orphan collection already running".into()));
        }
        self.orphans = Some(Orphans::new());
        Ok(())
    }

    /// End the rollback episode: destroy every orphan that was not
    /// resurrected. Returns how many were destroyed.
    pub fn resolve_orphans(&mut self) -> usize {
        let Some(mut orphans) = self.orphans.take() else {
            return 0;
        };
        let leftover = orphans.drain();
        let count = leftover.len();
        for (_, handle) in leftover {
            self.retire(handle);
        }
        if count > 0 {
            debug!(count, "orphans destroyed");
        }
        count
    }

    /// Instances destroyed since the last call. Their listeners should be
    /// dropped once the pending events have been dispatched.
    pub fn take_retired(&mut self) -> Vec<InstanceId> {
        self.retired_routes.clear();
        std::mem::take(&mut self.retired)
    }

    /// The instance currently standing for `address`: live, parked, or
    /// destroyed during the running operation.
    pub fn resolve(&self, address: &Address) -> Option<InstanceId> {
        self.tree
            .instance_at(address)
            .or_else(|| {
                let orphans = self.orphans.as_ref()?;
                self.tree.handle_instance(orphans.get(address)?)
            })
            .or_else(|| self.retired_routes.get(address).copied())
    }

    /// Instances from the model down to `address`.
    pub fn route(&self, address: &Address) -> Vec<InstanceId> {
        address
            .lineage()
            .iter()
            .filter_map(|scope| self.resolve(scope))
            .collect()
    }

    /// Resolve the delivery routes of an event against the current tree.
    pub fn route_event(&self, event: &Event) -> QueuedEvent {
        let member_routes = match event {
            Event::Atomic(_) => Vec::new(),
            Event::Transaction(txn) => txn.iter().map(|e| self.route(&e.target)).collect(),
        };
        QueuedEvent {
            event: event.clone(),
            route: self.route(event.target()),
            member_routes,
        }
    }

    fn retire(&mut self, handle: EntityHandle) {
        for (address, instance) in self.tree.destroy(handle) {
            self.retired_routes.insert(address, instance);
            self.retired.push(instance);
        }
    }
}

impl fmt::Debug for DocumentCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentCore")
            .field("model", self.model_address())
            .field("revision", &self.current_revision())
            .field("sync_revision", &self.sync_revision())
            .field("local_changes", &self.local_changes.len())
            .field("queued", &self.queue.len())
            .field("listeners", &self.listeners)
            .field("orphans", &self.orphans.as_ref().map(Orphans::len))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn core() -> DocumentCore {
        let mut core = DocumentCore::new(Id::new("m").unwrap(), Id::new("alice").unwrap());
        core.create_entity(&addr("/m/o"), 1).unwrap();
        core.create_entity(&addr("/m/o/f"), 1).unwrap();
        core
    }

    #[test]
    fn removal_under_orphans_parks_every_entity() {
        let mut core = core();
        let object = core.tree.instance_at(&addr("/m/o")).unwrap();
        let field = core.tree.instance_at(&addr("/m/o/f")).unwrap();

        core.begin_orphans().unwrap();
        core.remove_entity(&addr("/m/o")).unwrap();
        assert_eq!(core.orphans.as_ref().map(Orphans::len), Some(2));
        assert_eq!(core.resolve(&addr("/m/o/f")), Some(field));

        assert_eq!(core.create_entity(&addr("/m/o"), 4).unwrap(), object);
        assert_eq!(core.resolve_orphans(), 1);
        assert_eq!(core.take_retired(), vec![field]);
        assert!(!core.tree.exists(&addr("/m/o/f")));
    }

    #[test]
    fn removal_without_orphans_retires_the_subtree() {
        let mut core = core();
        let field = core.tree.instance_at(&addr("/m/o/f")).unwrap();
        core.remove_entity(&addr("/m/o")).unwrap();
        assert_eq!(core.resolve(&addr("/m/o/f")), Some(field));
        assert_eq!(core.route(&addr("/m/o/f")).len(), 3);
        assert_eq!(core.take_retired().len(), 2);
        assert_eq!(core.resolve(&addr("/m/o/f")), None);
    }

    #[test]
    fn parts_must_agree_on_revision() {
        let mut tree = DocumentTree::new(Id::new("m").unwrap());
        tree.set_model_revision(3);
        let actor = Id::new("alice").unwrap();
        assert!(DocumentCore::from_parts(tree, SyncLog::new(), actor).is_err());
    }
}
