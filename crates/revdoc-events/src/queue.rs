use std::collections::VecDeque;

use revdoc_log::ChangeLogWriter;
use revdoc_types::{AtomicEvent, Command, Event, InstanceId};
use tracing::debug;

use crate::error::EventResult;
use crate::reducer::{self, ReductionStats};
use crate::registry::SyncNotification;

/// An event waiting for dispatch, together with the entity instances it is
/// delivered to.
///
/// Routes are resolved when the event is enqueued, root first, so an event
/// still reaches the listeners of an entity that is gone by the time the
/// queue is drained.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedEvent {
    pub event: Event,
    /// Instances from the model down to the event's target.
    pub route: Vec<InstanceId>,
    /// Per member route of a transaction event; empty for atomic events.
    pub member_routes: Vec<Vec<InstanceId>>,
}

impl QueuedEvent {
    pub fn atomic(event: AtomicEvent, route: Vec<InstanceId>) -> Self {
        Self {
            event: Event::Atomic(event),
            route,
            member_routes: Vec::new(),
        }
    }
}

/// An item leaving the queue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    Event(QueuedEvent),
    Sync {
        notification: SyncNotification,
        route: Vec<InstanceId>,
    },
}

/// Buffer of events produced by the running operation.
///
/// Enqueuing logs eagerly unless logging is suspended or the event belongs to
/// a transaction. Dispatch drains events first, then sync notifications.
/// Only one drain can be in progress at a time; [`begin_send`] returns
/// `false` for a nested attempt.
///
/// [`begin_send`]: EventQueue::begin_send
#[derive(Debug, Default)]
pub struct EventQueue {
    events: VecDeque<QueuedEvent>,
    notifications: VecDeque<(SyncNotification, Vec<InstanceId>)>,
    logging_suspended: bool,
    dispatch_suspended: bool,
    sending: bool,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log (when allowed) and buffer an event.
    pub fn enqueue<W: ChangeLogWriter + ?Sized>(
        &mut self,
        log: &mut W,
        command: Option<Command>,
        queued: QueuedEvent,
    ) -> EventResult<()> {
        if !self.logging_suspended && !queued.event.in_transaction() {
            log.append(command, Some(queued.event.clone()))?;
        }
        self.events.push_back(queued);
        Ok(())
    }

    /// Buffer an event without logging it.
    pub fn enqueue_unlogged(&mut self, queued: QueuedEvent) {
        self.events.push_back(queued);
    }

    pub fn push_notification(&mut self, notification: SyncNotification, route: Vec<InstanceId>) {
        self.notifications.push_back((notification, route));
    }

    /// Set whether enqueued events are logged; returns the previous setting.
    pub fn set_logging_suspended(&mut self, suspended: bool) -> bool {
        std::mem::replace(&mut self.logging_suspended, suspended)
    }

    pub fn is_logging_suspended(&self) -> bool {
        self.logging_suspended
    }

    /// Set whether draining is allowed; returns the previous setting.
    pub fn set_dispatch_suspended(&mut self, suspended: bool) -> bool {
        std::mem::replace(&mut self.dispatch_suspended, suspended)
    }

    pub fn is_dispatch_suspended(&self) -> bool {
        self.dispatch_suspended
    }

    /// Current end of the event buffer, for a later [`clean_events`].
    ///
    /// [`clean_events`]: EventQueue::clean_events
    pub fn position(&self) -> usize {
        self.events.len()
    }

    /// Reduce the events buffered at or after `since`.
    pub fn clean_events(&mut self, since: usize) -> EventResult<ReductionStats> {
        reducer::clean_events(&mut self.events, since)
    }

    /// Drop buffered events after `position`, e.g. when an operation aborts.
    pub fn truncate(&mut self, position: usize) {
        if position < self.events.len() {
            debug!(from = self.events.len(), to = position, "event queue truncated");
            self.events.truncate(position);
        }
    }

    /// Start draining. Returns `false` if a drain is already running or
    /// dispatch is suspended.
    pub fn begin_send(&mut self) -> bool {
        if self.sending || self.dispatch_suspended {
            return false;
        }
        self.sending = true;
        true
    }

    pub fn end_send(&mut self) {
        self.sending = false;
    }

    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Next item to dispatch.
    pub fn pop(&mut self) -> Option<Outgoing> {
        if let Some(event) = self.events.pop_front() {
            return Some(Outgoing::Event(event));
        }
        self.notifications
            .pop_front()
            .map(|(notification, route)| Outgoing::Sync { notification, route })
    }

    pub fn len(&self) -> usize {
        self.events.len() + self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.notifications.is_empty()
    }

    /// The buffered events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().map(|q| &q.event)
    }
}

#[cfg(test)]
mod tests {
    use revdoc_log::{ChangeLog, ChangeLogReader};
    use revdoc_types::{Address, ChangeKind, Id, Value};

    use super::*;

    fn event(old_model_revision: i64, in_transaction: bool) -> QueuedEvent {
        let field = Address::parse("/m/o/f").unwrap();
        QueuedEvent::atomic(
            AtomicEvent {
                kind: ChangeKind::Change,
                target: field.clone(),
                changed: field,
                actor: Id::new("alice").unwrap(),
                old_model_revision,
                old_object_revision: 0,
                old_field_revision: 0,
                in_transaction,
                old_value: Some(Value::from(old_model_revision)),
                new_value: Some(Value::from(old_model_revision + 1)),
            },
            Vec::new(),
        )
    }

    #[test]
    fn enqueue_logs_eagerly() {
        let mut log = ChangeLog::new();
        let mut queue = EventQueue::new();
        queue.enqueue(&mut log, None, event(0, false)).unwrap();
        assert_eq!(log.current_revision(), 1);
        assert_eq!(queue.position(), 1);
    }

    #[test]
    fn suspended_logging_and_transaction_members_skip_the_log() {
        let mut log = ChangeLog::new();
        let mut queue = EventQueue::new();
        queue.enqueue(&mut log, None, event(0, true)).unwrap();
        let previous = queue.set_logging_suspended(true);
        queue.enqueue(&mut log, None, event(0, false)).unwrap();
        queue.set_logging_suspended(previous);
        assert_eq!(log.current_revision(), 0);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn log_errors_leave_queue_untouched() {
        let mut log = ChangeLog::new();
        let mut queue = EventQueue::new();
        assert!(queue.enqueue(&mut log, None, event(4, false)).is_err());
        assert!(queue.is_empty());
    }

    #[test]
    fn send_guard_is_exclusive() {
        let mut queue = EventQueue::new();
        assert!(queue.begin_send());
        assert!(!queue.begin_send());
        queue.end_send();
        queue.set_dispatch_suspended(true);
        assert!(!queue.begin_send());
    }

    #[test]
    fn events_drain_before_notifications() {
        let mut queue = EventQueue::new();
        queue.push_notification(
            SyncNotification {
                address: Address::parse("/m").unwrap(),
                revision: 1,
                synchronized: true,
            },
            Vec::new(),
        );
        queue.enqueue_unlogged(event(0, false));
        assert!(matches!(queue.pop(), Some(Outgoing::Event(_))));
        assert!(matches!(queue.pop(), Some(Outgoing::Sync { .. })));
        assert!(queue.pop().is_none());
    }
}
