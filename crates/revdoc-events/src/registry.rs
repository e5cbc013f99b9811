use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use revdoc_types::{Address, AddressKind, Event, InstanceId, RevisionNumber};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::queue::{Outgoing, QueuedEvent};

/// What kind of deliveries a listener subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// Objects added to or removed from a model.
    Model,
    /// Fields added to or removed from an object.
    Object,
    /// Field values added, changed or removed.
    Field,
    /// Transaction events as a whole.
    Transaction,
    /// Changes of an entity's synchronized status.
    Sync,
}

impl EventCategory {
    /// The category of atomic events whose target has the given level.
    pub fn for_target(kind: AddressKind) -> Self {
        match kind {
            AddressKind::Model => Self::Model,
            AddressKind::Object => Self::Object,
            AddressKind::Field => Self::Field,
        }
    }
}

/// Notification that an entity crossed the sync boundary in either direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncNotification {
    pub address: Address,
    pub revision: RevisionNumber,
    /// `true` if the entity's revision is now at or below the sync revision.
    pub synchronized: bool,
}

/// What a listener receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Event(Event),
    Sync(SyncNotification),
}

/// Callback invoked for every matching delivery.
pub type Listener = Arc<dyn Fn(&Delivery) + Send + Sync>;

/// Handle returned by [`ListenerRegistry::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

struct Registration {
    id: ListenerId,
    category: EventCategory,
    listener: Listener,
}

enum PendingMutation {
    Register(InstanceId, Registration),
    Deregister(ListenerId),
    DropInstances(Vec<InstanceId>),
}

/// Listener registrations keyed by entity instance.
///
/// While a dispatch is running, registrations, deregistrations and instance
/// drops are queued and applied once the outermost dispatch has finished.
#[derive(Default)]
pub struct ListenerRegistry {
    next_id: u64,
    by_instance: HashMap<InstanceId, Vec<Registration>>,
    owners: HashMap<ListenerId, InstanceId>,
    depth: usize,
    pending: Vec<PendingMutation>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `listener` on `instance` for `category`.
    pub fn register(
        &mut self,
        instance: InstanceId,
        category: EventCategory,
        listener: Listener,
    ) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        let registration = Registration {
            id,
            category,
            listener,
        };
        if self.depth > 0 {
            debug!(%id, %instance, "listener registration deferred");
            self.pending.push(PendingMutation::Register(instance, registration));
        } else {
            self.insert(instance, registration);
        }
        id
    }

    /// Remove a listener. Returns `false` if it is unknown.
    pub fn deregister(&mut self, id: ListenerId) -> bool {
        let known = self.owners.contains_key(&id)
            || self
                .pending
                .iter()
                .any(|m| matches!(m, PendingMutation::Register(_, r) if r.id == id));
        if !known {
            return false;
        }
        if self.depth > 0 {
            self.pending.push(PendingMutation::Deregister(id));
        } else {
            self.remove(id);
        }
        true
    }

    /// Drop every registration bound to the given instances.
    pub fn drop_instances(&mut self, instances: Vec<InstanceId>) {
        if instances.is_empty() {
            return;
        }
        if self.depth > 0 {
            self.pending.push(PendingMutation::DropInstances(instances));
        } else {
            self.drop_now(&instances);
        }
    }

    pub fn begin_dispatch(&mut self) {
        self.depth += 1;
    }

    /// Leave a dispatch; at depth zero the deferred mutations are applied
    /// in the order they were requested.
    pub fn end_dispatch(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        if self.depth > 0 || self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        debug!(count = pending.len(), "applying deferred listener mutations");
        for mutation in pending {
            match mutation {
                PendingMutation::Register(instance, registration) => {
                    self.insert(instance, registration)
                }
                PendingMutation::Deregister(id) => {
                    self.remove(id);
                }
                PendingMutation::DropInstances(instances) => self.drop_now(&instances),
            }
        }
    }

    pub fn is_dispatching(&self) -> bool {
        self.depth > 0
    }

    /// Number of active registrations.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }

    /// Number of active registrations on `instance`.
    pub fn count_for(&self, instance: InstanceId) -> usize {
        self.by_instance.get(&instance).map_or(0, Vec::len)
    }

    /// Listeners of `category` on any instance of `route`, deepest first.
    pub fn listeners_on(&self, route: &[InstanceId], category: EventCategory) -> Vec<Listener> {
        route
            .iter()
            .rev()
            .filter_map(|instance| self.by_instance.get(instance))
            .flatten()
            .filter(|r| r.category == category)
            .map(|r| r.listener.clone())
            .collect()
    }

    /// Resolve a dequeued item into the calls to make.
    ///
    /// A transaction goes to `Transaction` listeners first, then each of its
    /// members to the listeners of the member's own category.
    pub fn deliveries(&self, outgoing: &Outgoing) -> Vec<(Listener, Delivery)> {
        match outgoing {
            Outgoing::Event(QueuedEvent {
                event,
                route,
                member_routes,
            }) => match event {
                Event::Atomic(atomic) => {
                    let category = EventCategory::for_target(atomic.target.kind());
                    self.listeners_on(route, category)
                        .into_iter()
                        .map(|l| (l, Delivery::Event(event.clone())))
                        .collect()
                }
                Event::Transaction(txn) => {
                    let mut out: Vec<(Listener, Delivery)> = self
                        .listeners_on(route, EventCategory::Transaction)
                        .into_iter()
                        .map(|l| (l, Delivery::Event(event.clone())))
                        .collect();
                    for (member, member_route) in txn.events().iter().zip(member_routes) {
                        let category = EventCategory::for_target(member.target.kind());
                        let delivery = Delivery::Event(Event::Atomic(member.clone()));
                        out.extend(
                            self.listeners_on(member_route, category)
                                .into_iter()
                                .map(|l| (l, delivery.clone())),
                        );
                    }
                    out
                }
            },
            Outgoing::Sync { notification, route } => self
                .listeners_on(route, EventCategory::Sync)
                .into_iter()
                .map(|l| (l, Delivery::Sync(notification.clone())))
                .collect(),
        }
    }

    fn insert(&mut self, instance: InstanceId, registration: Registration) {
        self.owners.insert(registration.id, instance);
        self.by_instance.entry(instance).or_default().push(registration);
    }

    fn remove(&mut self, id: ListenerId) -> bool {
        let Some(instance) = self.owners.remove(&id) else {
            return false;
        };
        if let Some(list) = self.by_instance.get_mut(&instance) {
            list.retain(|r| r.id != id);
            if list.is_empty() {
                self.by_instance.remove(&instance);
            }
        }
        true
    }

    fn drop_now(&mut self, instances: &[InstanceId]) {
        for instance in instances {
            if let Some(list) = self.by_instance.remove(instance) {
                debug!(%instance, count = list.len(), "listeners dropped with instance");
                for registration in list {
                    self.owners.remove(&registration.id);
                }
            }
        }
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.owners.len())
            .field("depth", &self.depth)
            .field("pending", &self.pending.len())
            .finish()
    }
}
