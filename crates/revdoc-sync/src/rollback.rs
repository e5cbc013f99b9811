//! Undoing logged events.
//!
//! Every undone event leaves behind its inverse in the event queue, so
//! listeners see the document move back. The inverse events are never
//! logged.

use revdoc_core::{old_revisions, value_change_kind, DocumentCore};
use revdoc_log::{ChangeLogReader, ChangeLogWriter, ChangeOutcome};
use revdoc_types::{AddressKind, AtomicEvent, ChangeKind, Event, RevisionNumber, NEVER_EXISTED};
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};
use crate::types::Completion;

/// Undo every logged entry above `revision`, newest first. Transaction
/// members are undone in reverse order. The log itself is left untouched.
///
/// Returns the number of entries undone.
pub fn undo_to(core: &mut DocumentCore, revision: RevisionNumber) -> SyncResult<usize> {
    let entries: Vec<(RevisionNumber, Option<Event>)> = core
        .log
        .events_since(revision)?
        .into_iter()
        .map(|(r, e)| (r, e.cloned()))
        .collect();
    let count = entries.len();
    let logging = core.queue.set_logging_suspended(true);
    let result = entries.into_iter().rev().try_for_each(|(r, entry)| {
        if let Some(event) = entry {
            for member in event.atomic_events().iter().rev() {
                undo_atomic(core, member)?;
            }
        }
        core.tree.set_model_revision(r - 1);
        Ok::<(), SyncError>(())
    });
    core.queue.set_logging_suspended(logging);
    result?;
    debug!(to = revision, undone = count, "events undone");
    Ok(count)
}

fn undo_atomic(core: &mut DocumentCore, event: &AtomicEvent) -> SyncResult<()> {
    let (model, object, field) = old_revisions(&core.tree, &event.changed);
    let changed = &event.changed;

    if event.is_value_event() {
        core.tree.set_value(changed, event.old_value.clone())?;
    } else {
        match event.kind {
            ChangeKind::Add => core.remove_entity(changed)?,
            ChangeKind::Remove => {
                core.create_entity(changed, event.old_changed_revision())?;
            }
            ChangeKind::Change => {}
        }
    }

    core.tree.set_model_revision(event.old_model_revision);
    if let Some(object_address) = changed.object_address() {
        if event.old_object_revision != NEVER_EXISTED && core.tree.exists(&object_address) {
            core.tree.set_revision(&object_address, event.old_object_revision)?;
        }
    }
    if changed.kind() == AddressKind::Field
        && event.old_field_revision != NEVER_EXISTED
        && core.tree.exists(changed)
    {
        core.tree.set_revision(changed, event.old_field_revision)?;
    }

    let kind = if event.is_value_event() {
        value_change_kind(event.new_value.as_ref(), event.old_value.as_ref())
    } else {
        event.kind.inverse()
    };
    let inverse = AtomicEvent {
        kind,
        target: event.target.clone(),
        changed: changed.clone(),
        actor: event.actor.clone(),
        old_model_revision: model,
        old_object_revision: object,
        old_field_revision: field,
        in_transaction: false,
        old_value: event.new_value.clone(),
        new_value: event.old_value.clone(),
    };
    let queued = core.route_event(&Event::Atomic(inverse));
    core.queue.enqueue(&mut core.log, None, queued)?;
    Ok(())
}

/// Discard local history above `revision`.
///
/// `revision` must lie between the sync revision and the current revision.
/// Entities removed while undoing are parked as orphans, so one that is
/// re-created keeps its instance and listeners. Local changes above it are
/// dropped; their callbacks are owed [`ChangeOutcome::Discarded`]. The
/// inverse events stay queued, reduced to their net effect.
pub fn rollback(core: &mut DocumentCore, revision: RevisionNumber) -> SyncResult<Vec<Completion>> {
    let sync_revision = core.sync_revision();
    let current = core.current_revision();
    if revision < sync_revision || revision > current {
        return Err(SyncError::RollbackOutOfRange {
            revision,
            sync_revision,
            current,
        });
    }
    if revision == current {
        return Ok(Vec::new());
    }

    let position = core.queue.position();
    core.begin_orphans()?;
    let undone = undo_to(core, revision).and_then(|_| {
        if core.log.truncate_to_revision(revision) {
            Ok(())
        } else {
            Err(SyncError::Truncate(revision))
        }
    });
    let destroyed = core.resolve_orphans();
    undone?;
    let completions: Vec<Completion> = core
        .local_changes
        .drop_above(revision)
        .into_iter()
        .filter_map(|change| change.into_completion(ChangeOutcome::Discarded))
        .collect();
    let stats = core.queue.clean_events(position)?;
    info!(
        from = current,
        to = revision,
        discarded = completions.len(),
        destroyed,
        dropped = stats.dropped,
        "rolled back"
    );
    Ok(completions)
}
