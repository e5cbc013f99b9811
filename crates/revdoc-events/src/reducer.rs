//! Event reduction.
//!
//! Collapses chains of events on the same address into their net effect
//! before they are dispatched. Logged history is never touched; only the
//! queue of pending notifications is.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};

use revdoc_types::{Address, AtomicEvent, ChangeKind, Event};
use tracing::debug;

use crate::error::{EventError, EventResult};
use crate::queue::QueuedEvent;

/// What a reduction pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReductionStats {
    pub examined: usize,
    pub dropped: usize,
    pub merged: usize,
}

/// Reduce queued events at positions `since..`.
///
/// Atomic events are grouped by changed address, value events apart from
/// existence events. Of each group only the first and the latest event are
/// kept while scanning. For value events the two are merged with
/// [`merge_field_events`]; for existence events both are dropped if their
/// kinds differ, otherwise only the first is. A transaction event is dropped
/// only together with the atomic events it exactly undoes (see
/// [`cancel_transactions`]); otherwise it is left alone.
pub fn clean_events(
    queue: &mut VecDeque<QueuedEvent>,
    since: usize,
) -> EventResult<ReductionStats> {
    if since >= queue.len() {
        return Ok(ReductionStats::default());
    }
    let mut tail: Vec<Option<QueuedEvent>> = queue.drain(since..).map(Some).collect();
    let mut stats = ReductionStats {
        examined: tail.len(),
        dropped: cancel_transactions(&mut tail),
        ..ReductionStats::default()
    };

    let mut values: HashMap<Address, (usize, Option<usize>)> = HashMap::new();
    let mut entities: HashMap<Address, (usize, Option<usize>)> = HashMap::new();
    let mut superseded = Vec::new();
    for (index, slot) in tail.iter().enumerate() {
        let Some(Event::Atomic(event)) = slot.as_ref().map(|q| &q.event) else {
            continue;
        };
        let groups = if event.is_value_event() {
            &mut values
        } else {
            &mut entities
        };
        match groups.entry(event.changed.clone()) {
            Entry::Vacant(entry) => {
                entry.insert((index, None));
            }
            Entry::Occupied(mut entry) => {
                if let Some(previous) = entry.get_mut().1.replace(index) {
                    superseded.push(previous);
                }
            }
        }
    }
    for index in superseded {
        tail[index] = None;
        stats.dropped += 1;
    }

    for (first, last) in values.into_values().filter_map(|(f, l)| Some((f, l?))) {
        let merged = match (atomic(&tail[first]), atomic(&tail[last])) {
            (Some(a), Some(b)) => merge_field_events(a, b)?,
            _ => continue,
        };
        tail[first] = None;
        let route = tail[last].take().map(|q| q.route).unwrap_or_default();
        match merged {
            Some(event) => {
                tail[last] = Some(QueuedEvent::atomic(event, route));
                stats.dropped += 1;
                stats.merged += 1;
            }
            None => stats.dropped += 2,
        }
    }

    for (first, last) in entities.into_values().filter_map(|(f, l)| Some((f, l?))) {
        let kinds_differ = match (atomic(&tail[first]), atomic(&tail[last])) {
            (Some(a), Some(b)) => a.kind != b.kind,
            _ => continue,
        };
        if kinds_differ {
            tail[last] = None;
            stats.dropped += 1;
        }
        tail[first] = None;
        stats.dropped += 1;
    }

    queue.extend(tail.into_iter().flatten());
    debug!(
        examined = stats.examined,
        dropped = stats.dropped,
        merged = stats.merged,
        "events reduced"
    );
    Ok(stats)
}

fn atomic(slot: &Option<QueuedEvent>) -> Option<&AtomicEvent> {
    slot.as_ref().and_then(|q| q.event.as_atomic())
}

/// Drop every transaction event whose members each cancel the latest
/// earlier atomic event on the same address, together with those events.
///
/// Undoing a transaction leaves one inverse atomic event per member; when
/// the same transaction is applied again the whole group has no net effect.
/// Returns the number of events dropped.
pub fn cancel_transactions(tail: &mut [Option<QueuedEvent>]) -> usize {
    let mut dropped = 0;
    for index in 0..tail.len() {
        let Some(Event::Transaction(transaction)) = tail[index].as_ref().map(|q| &q.event) else {
            continue;
        };
        let members = transaction.events();
        let mut partners = Vec::with_capacity(members.len());
        for member in members {
            let latest = (0..index).rev().find(|&i| {
                tail[i]
                    .as_ref()
                    .is_some_and(|q| q.event.atomic_events().iter().any(|e| same_slot(e, member)))
            });
            let cancelling = latest.filter(|i| {
                !partners.contains(i) && atomic(&tail[*i]).is_some_and(|e| cancels(e, member))
            });
            match cancelling {
                Some(i) => partners.push(i),
                None => break,
            }
        }
        if partners.len() != members.len() {
            continue;
        }
        tail[index] = None;
        dropped += 1 + partners.len();
        for i in partners {
            tail[i] = None;
        }
    }
    if dropped > 0 {
        debug!(dropped, "transaction cancelled against its inverse");
    }
    dropped
}

fn same_slot(a: &AtomicEvent, b: &AtomicEvent) -> bool {
    a.changed == b.changed && a.is_value_event() == b.is_value_event()
}

/// Whether `last` takes the address back to where it was before `first`.
fn cancels(first: &AtomicEvent, last: &AtomicEvent) -> bool {
    if first.is_value_event() {
        first.old_value == last.new_value
    } else {
        first.kind != last.kind
    }
}

/// Merge an earlier and a later value event on the same field.
///
/// Returns `None` when the two cancel out (the field ends with the value it
/// started with). A merged event keeps the later event's actor and the
/// earlier event's old revisions.
pub fn merge_field_events(
    first: &AtomicEvent,
    last: &AtomicEvent,
) -> EventResult<Option<AtomicEvent>> {
    let unmergeable = |reason: &str| EventError::Unmergeable {
        first: first.changed.clone(),
        last: last.changed.clone(),
        reason: reason.to_string(),
    };
    if first.changed != last.changed {
        return Err(unmergeable("different fields"));
    }
    if !first.is_value_event() || !last.is_value_event() {
        return Err(unmergeable("not value events"));
    }
    if first.old_value == last.new_value {
        return Ok(None);
    }

    let net = |kind: ChangeKind| AtomicEvent {
        kind,
        target: last.target.clone(),
        changed: last.changed.clone(),
        actor: last.actor.clone(),
        old_model_revision: first.old_model_revision,
        old_object_revision: first.old_object_revision,
        old_field_revision: first.old_field_revision,
        in_transaction: false,
        old_value: if kind == ChangeKind::Add {
            None
        } else {
            first.old_value.clone()
        },
        new_value: if kind == ChangeKind::Remove {
            None
        } else {
            last.new_value.clone()
        },
    };

    let merged = match (first.kind, last.kind) {
        (ChangeKind::Add, ChangeKind::Add) | (ChangeKind::Remove, ChangeKind::Remove) => {
            last.clone()
        }
        (ChangeKind::Add, ChangeKind::Change) => net(ChangeKind::Add),
        (ChangeKind::Change, ChangeKind::Remove) => net(ChangeKind::Remove),
        (ChangeKind::Remove, ChangeKind::Add) | (ChangeKind::Change, ChangeKind::Change) => {
            net(ChangeKind::Change)
        }
        // Only reachable with discarded events in between.
        (ChangeKind::Change, ChangeKind::Add) | (ChangeKind::Remove, ChangeKind::Change) => {
            net(ChangeKind::Change)
        }
        (ChangeKind::Add, ChangeKind::Remove) => {
            return Err(unmergeable("ADD followed by REMOVE must cancel"));
        }
    };
    Ok(Some(merged))
}

#[cfg(test)]
mod tests {
    use revdoc_types::{Id, InstanceId, TransactionEvent, Value, NEVER_EXISTED};

    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn value(
        kind: ChangeKind,
        path: &str,
        old: Option<i64>,
        new: Option<i64>,
        rev: i64,
    ) -> QueuedEvent {
        let field = addr(path);
        QueuedEvent::atomic(
            AtomicEvent {
                kind,
                target: field.clone(),
                changed: field,
                actor: Id::new(format!("actor{rev}")).unwrap(),
                old_model_revision: rev,
                old_object_revision: rev,
                old_field_revision: rev,
                in_transaction: false,
                old_value: old.map(Value::from),
                new_value: new.map(Value::from),
            },
            vec![InstanceId::new(rev as u64)],
        )
    }

    fn entity(kind: ChangeKind, path: &str, rev: i64) -> QueuedEvent {
        let changed = addr(path);
        QueuedEvent::atomic(
            AtomicEvent {
                kind,
                target: changed.parent().unwrap(),
                changed,
                actor: Id::new("alice").unwrap(),
                old_model_revision: rev,
                old_object_revision: NEVER_EXISTED,
                old_field_revision: NEVER_EXISTED,
                in_transaction: false,
                old_value: None,
                new_value: None,
            },
            vec![],
        )
    }

    fn reduce(events: Vec<QueuedEvent>) -> Vec<AtomicEvent> {
        let mut queue: VecDeque<_> = events.into();
        clean_events(&mut queue, 0).unwrap();
        queue
            .into_iter()
            .map(|q| q.event.as_atomic().unwrap().clone())
            .collect()
    }

    #[test]
    fn add_then_remove_cancels() {
        let out = reduce(vec![
            value(ChangeKind::Add, "/m/o/f", None, Some(1), 1),
            value(ChangeKind::Remove, "/m/o/f", Some(1), None, 2),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn add_then_change_becomes_add() {
        let out = reduce(vec![
            value(ChangeKind::Add, "/m/o/f", None, Some(1), 1),
            value(ChangeKind::Change, "/m/o/f", Some(1), Some(2), 2),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Add);
        assert_eq!(out[0].old_value, None);
        assert_eq!(out[0].new_value, Some(Value::from(2)));
        assert_eq!(out[0].old_model_revision, 1);
        assert_eq!(out[0].actor, Id::new("actor2").unwrap());
    }

    #[test]
    fn change_chain_collapses() {
        let out = reduce(vec![
            value(ChangeKind::Change, "/m/o/f", Some(1), Some(2), 1),
            value(ChangeKind::Change, "/m/o/f", Some(2), Some(3), 2),
            value(ChangeKind::Change, "/m/o/f", Some(3), Some(4), 3),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Change);
        assert_eq!(out[0].old_value, Some(Value::from(1)));
        assert_eq!(out[0].new_value, Some(Value::from(4)));
    }

    #[test]
    fn change_back_to_start_cancels() {
        let out = reduce(vec![
            value(ChangeKind::Change, "/m/o/f", Some(1), Some(2), 1),
            value(ChangeKind::Change, "/m/o/f", Some(2), Some(1), 2),
        ]);
        assert!(out.is_empty());
    }

    #[test]
    fn remove_then_add_becomes_change() {
        let out = reduce(vec![
            value(ChangeKind::Remove, "/m/o/f", Some(1), None, 1),
            value(ChangeKind::Add, "/m/o/f", None, Some(5), 2),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, ChangeKind::Change);
    }

    #[test]
    fn merged_event_sits_at_last_position() {
        let out = reduce(vec![
            value(ChangeKind::Change, "/m/o/f", Some(1), Some(2), 1),
            value(ChangeKind::Add, "/m/o/g", None, Some(7), 2),
            value(ChangeKind::Change, "/m/o/f", Some(2), Some(3), 3),
        ]);
        let order: Vec<_> = out.iter().map(|e| e.changed.to_string()).collect();
        assert_eq!(order, vec!["/m/o/g", "/m/o/f"]);
    }

    #[test]
    fn entity_add_remove_cancels_and_repeat_keeps_last() {
        let out = reduce(vec![
            entity(ChangeKind::Add, "/m/a", 1),
            entity(ChangeKind::Remove, "/m/a", 2),
            entity(ChangeKind::Remove, "/m/b", 3),
            entity(ChangeKind::Add, "/m/b", 4),
            entity(ChangeKind::Remove, "/m/b", 5),
        ]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].changed, addr("/m/b"));
        assert_eq!(out[0].old_model_revision, 5);
    }

    #[test]
    fn positions_before_since_are_untouched() {
        let mut queue: VecDeque<_> = vec![
            value(ChangeKind::Add, "/m/o/f", None, Some(1), 1),
            value(ChangeKind::Remove, "/m/o/f", Some(1), None, 2),
        ]
        .into();
        let stats = clean_events(&mut queue, 1).unwrap();
        assert_eq!(stats.examined, 1);
        assert_eq!(queue.len(), 2);
    }

    fn member(kind: ChangeKind, path: &str) -> AtomicEvent {
        let mut event = entity(kind, path, 3).event.as_atomic().unwrap().clone();
        event.in_transaction = true;
        event
    }

    fn transaction(members: Vec<AtomicEvent>) -> QueuedEvent {
        let count = members.len();
        let actor = Id::new("alice").unwrap();
        let event = TransactionEvent::new(actor, addr("/m"), NEVER_EXISTED, members).unwrap();
        QueuedEvent {
            event: Event::Transaction(event),
            route: vec![],
            member_routes: vec![vec![]; count],
        }
    }

    #[test]
    fn reapplied_transaction_cancels_its_inverse() {
        let mut queue: VecDeque<_> = vec![
            entity(ChangeKind::Remove, "/m/q/y", 2),
            entity(ChangeKind::Remove, "/m/q", 1),
            transaction(vec![member(ChangeKind::Add, "/m/q"), member(ChangeKind::Add, "/m/q/y")]),
        ]
        .into();
        let stats = clean_events(&mut queue, 0).unwrap();
        assert!(queue.is_empty());
        assert_eq!(stats.dropped, 3);
    }

    #[test]
    fn transaction_with_net_effect_is_kept() {
        let mut queue: VecDeque<_> = vec![
            entity(ChangeKind::Remove, "/m/q", 1),
            transaction(vec![member(ChangeKind::Add, "/m/q"), member(ChangeKind::Add, "/m/r")]),
        ]
        .into();
        clean_events(&mut queue, 0).unwrap();
        assert_eq!(queue.len(), 2);
        assert!(queue[1].event.is_transaction());
    }

    #[test]
    fn mismatched_fields_do_not_merge() {
        let a = value(ChangeKind::Change, "/m/o/f", Some(1), Some(2), 1);
        let b = value(ChangeKind::Change, "/m/o/g", Some(2), Some(3), 2);
        let (a, b) = (a.event.as_atomic().unwrap(), b.event.as_atomic().unwrap());
        assert!(merge_field_events(a, b).is_err());
    }

    proptest::proptest! {
        /// Any valid history of one field reduces to at most one event that
        /// describes the net change.
        #[test]
        fn reduction_preserves_net_effect(
            steps in proptest::collection::vec(proptest::option::of(0i64..4), 1..12)
        ) {
            let mut current: Option<i64> = None;
            let start = current;
            let mut events = Vec::new();
            for (rev, next) in steps.into_iter().enumerate() {
                if next == current {
                    continue;
                }
                let kind = match (current, next) {
                    (None, Some(_)) => ChangeKind::Add,
                    (Some(_), None) => ChangeKind::Remove,
                    _ => ChangeKind::Change,
                };
                events.push(value(kind, "/m/o/f", current, next, rev as i64));
                current = next;
            }
            let out = reduce(events);
            if start == current {
                proptest::prop_assert!(out.is_empty());
            } else {
                proptest::prop_assert_eq!(out.len(), 1);
                proptest::prop_assert_eq!(out[0].new_value.clone(), current.map(Value::from));
            }
        }
    }
}
