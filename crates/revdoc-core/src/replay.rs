use revdoc_diff::diff_snapshots;
use revdoc_log::ChangeLogReader;
use revdoc_types::{AtomicEvent, ChangeKind, DocumentSnapshot, Event, RevisionNumber};

use crate::error::{CoreError, CoreResult};
use crate::executor::bump_scopes;
use crate::tree::DocumentTree;

/// Result of replaying a log onto a base snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayResult {
    pub snapshot: DocumentSnapshot,
    pub applied_events: u64,
    pub placeholders: u64,
}

/// Outcome of comparing a live snapshot with a replayed one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    pub converged: bool,
    pub differences: Vec<String>,
}

/// Deterministic re-derivation of document state from logged events.
pub struct ReplayEngine;

impl ReplayEngine {
    /// Apply every entry of `log` to `base`, which must be the state at the
    /// log's base revision. Each event is checked against the state it is
    /// applied to; a placeholder only advances the model revision.
    pub fn replay<R: ChangeLogReader + ?Sized>(
        base: &DocumentSnapshot,
        log: &R,
    ) -> CoreResult<ReplayResult> {
        if base.revision != log.base_revision() {
            return Err(CoreError::ReplayDiverged {
                revision: log.base_revision(),
                reason: format!("base snapshot is at revision {}", base.revision),
            });
        }
        let mut tree = DocumentTree::from_snapshot(base)?;
        let mut applied_events = 0u64;
        let mut placeholders = 0u64;

        for (revision, entry) in log.events_since(log.base_revision())? {
            match entry {
                Some(event) => {
                    Self::apply(&mut tree, event)?;
                    applied_events += 1;
                }
                None => {
                    tree.set_model_revision(revision);
                    placeholders += 1;
                }
            }
        }

        Ok(ReplayResult {
            snapshot: tree.snapshot(),
            applied_events,
            placeholders,
        })
    }

    /// Apply one event to `tree`.
    pub fn apply(tree: &mut DocumentTree, event: &Event) -> CoreResult<()> {
        let revision = event.revision();
        if event.old_model_revision() != tree.model_revision() {
            return Err(diverged(
                revision,
                format!(
                    "event starts at {}, tree is at {}",
                    event.old_model_revision(),
                    tree.model_revision()
                ),
            ));
        }
        for member in event.atomic_events() {
            apply_atomic(tree, member, revision)?;
        }
        let transaction_target = match event {
            Event::Transaction(txn) => Some(txn.target()),
            Event::Atomic(_) => None,
        };
        bump_scopes(tree, transaction_target, event.atomic_events(), revision);
        Ok(())
    }

    /// Compare two snapshots entity by entity, including revisions.
    pub fn verify_convergence(
        live: &DocumentSnapshot,
        replayed: &DocumentSnapshot,
    ) -> CoreResult<ConvergenceReport> {
        let mut differences = Vec::new();
        if live.revision != replayed.revision {
            differences.push(format!(
                "model revision {} != {}",
                live.revision, replayed.revision
            ));
        }
        let diff = diff_snapshots(live, replayed)?;
        for object in &diff.removed_objects {
            differences.push(format!("{} missing after replay", object.address));
        }
        for object in &diff.added_objects {
            differences.push(format!("{} only present after replay", object.address));
        }
        for field in &diff.removed_fields {
            differences.push(format!("{} missing after replay", field.address));
        }
        for field in &diff.added_fields {
            differences.push(format!("{} only present after replay", field.address));
        }
        for change in &diff.changed_values {
            differences.push(format!("{} value differs", change.field));
        }
        for address in live.addresses() {
            let (a, b) = (live.revision_of(&address), replayed.revision_of(&address));
            if replayed.exists(&address) && a != b {
                differences.push(format!("{address} revision {a} != {b}"));
            }
        }
        Ok(ConvergenceReport {
            converged: differences.is_empty(),
            differences,
        })
    }
}

fn apply_atomic(
    tree: &mut DocumentTree,
    event: &AtomicEvent,
    revision: RevisionNumber,
) -> CoreResult<()> {
    if event.is_value_event() {
        let prior = tree.value_of(&event.changed);
        if !tree.exists(&event.changed) || prior != event.old_value.as_ref() {
            return Err(diverged(revision, format!("unexpected prior value at {}", event.changed)));
        }
        return tree.set_value(&event.changed, event.new_value.clone());
    }
    match event.kind {
        ChangeKind::Add => {
            tree.create(&event.changed, revision)?;
        }
        ChangeKind::Remove => {
            let handle = tree.detach(&event.changed)?;
            tree.destroy(handle);
        }
        ChangeKind::Change => {
            return Err(diverged(revision, format!("CHANGE of entity {}", event.changed)));
        }
    }
    Ok(())
}

fn diverged(revision: RevisionNumber, reason: String) -> CoreError {
    CoreError::ReplayDiverged { revision, reason }
}
