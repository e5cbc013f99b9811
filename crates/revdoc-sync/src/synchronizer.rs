//! One synchronization round.
//!
//! The document is rolled back to the sync revision, the remote events are
//! replayed as forced commands under their original actors, the sync
//! revision advances, and the pending local changes are re-applied on top.
//! Dispatch stays suspended for the whole round; the caller drains the
//! reduced event queue afterwards.

use std::collections::HashMap;

use revdoc_core::DocumentCore;
use revdoc_events::SyncNotification;
use revdoc_log::{ChangeLogWriter, ChangeOutcome, RevisionRemap};
use revdoc_types::{Address, CommandOutcome, Event, RevisionNumber};
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::rollback::undo_to;
use crate::types::SyncRound;

/// Drives synchronization rounds over a [`DocumentCore`].
pub struct Synchronizer;

impl Synchronizer {
    /// Run one round with `remote`, the authoritative entries following the
    /// current sync revision (`None` for a revision without an observable
    /// event).
    ///
    /// A replay mismatch is reported through the round's report, not as an
    /// error; errors are structural violations.
    pub fn synchronize(
        core: &mut DocumentCore,
        remote: &[Option<Event>],
        config: &SyncConfig,
    ) -> SyncResult<SyncRound> {
        let old_sync = core.sync_revision();
        let mut round = SyncRound::new(old_sync);
        info!(
            sync_revision = old_sync,
            current = core.current_revision(),
            remote = remote.len(),
            local = core.local_changes.len(),
            "synchronization started"
        );

        let dispatch = core.queue.set_dispatch_suspended(true);
        let position = core.queue.position();
        let statuses = sync_statuses(core);
        let result = core
            .begin_orphans()
            .map_err(SyncError::from)
            .and_then(|()| Self::run(core, remote, &mut round))
            .or_else(|err| match err {
                SyncError::ReplayMismatch { revision, reason } => {
                    warn!(revision, reason = %reason, "remote event could not be replayed");
                    round.report.failure = Some(format!("revision {revision}: {reason}"));
                    if config.atomic_rounds {
                        Self::recover(core, old_sync, &mut round)
                    } else {
                        Ok(())
                    }
                }
                other => Err(other),
            })
            .and_then(|()| Self::finish(core, position, &statuses, config, &mut round));

        if core.orphans.is_some() {
            core.resolve_orphans();
        }
        core.queue.set_dispatch_suspended(dispatch);
        result?;

        let report = &round.report;
        info!(
            success = report.success,
            sync_revision = report.new_sync_revision,
            replayed = report.replayed_events,
            confirmed = report.confirmed,
            reapplied = report.reapplied,
            conflicts = report.conflicts,
            "synchronization finished"
        );
        Ok(round)
    }

    fn run(
        core: &mut DocumentCore,
        remote: &[Option<Event>],
        round: &mut SyncRound,
    ) -> SyncResult<()> {
        let old_sync = round.report.old_sync_revision;

        round.report.rolled_back = undo_to(core, old_sync)?;
        if !core.log.truncate_to_revision(old_sync) {
            return Err(SyncError::Truncate(old_sync));
        }
        core.local_changes.mark_all_unapplied();
        debug!(
            sync_revision = old_sync,
            undone = round.report.rolled_back,
            "rolled back to sync revision"
        );

        for (offset, entry) in remote.iter().enumerate() {
            let expected = old_sync + 1 + offset as RevisionNumber;
            match entry {
                None => {
                    core.log.append(None, None)?;
                    core.tree.set_model_revision(expected);
                    round.report.placeholders += 1;
                }
                Some(event) => {
                    Self::replay(core, event, expected)?;
                    round.report.replayed_events += 1;
                }
            }
        }

        let new_sync = core.current_revision();
        core.log.set_sync_revision(new_sync)?;
        for change in core.local_changes.drop_confirmed_up_to(new_sync) {
            let remote_revision = change.remote_revision.unwrap_or(new_sync);
            round.report.confirmed += 1;
            round
                .completions
                .extend(change.into_completion(ChangeOutcome::Confirmed(remote_revision)));
        }
        round.report.new_sync_revision = new_sync;
        debug!(
            sync_revision = new_sync,
            confirmed = round.report.confirmed,
            "sync revision advanced"
        );

        Self::reapply(core, old_sync, round)
    }

    /// Replay one remote event and check that it is reproduced exactly.
    fn replay(core: &mut DocumentCore, event: &Event, expected: RevisionNumber) -> SyncResult<()> {
        let mismatch = |reason: String| SyncError::ReplayMismatch {
            revision: expected,
            reason,
        };
        if event.revision() != expected {
            return Err(mismatch(format!("event carries revision {}", event.revision())));
        }
        let execution = core
            .execute(&event.to_forced_command(), event.actor())
            .map_err(|err| mismatch(err.to_string()))?;
        match execution.event {
            Some(produced) if produced == *event => Ok(()),
            Some(produced) => Err(mismatch(format!("produced {produced} instead of {event}"))),
            None => Err(mismatch(format!(
                "command had no effect (outcome {})",
                execution.outcome.code()
            ))),
        }
    }

    /// Re-apply the queued local changes in order. Safe revisions that
    /// referred to local revisions above `floor` follow the changes they
    /// referred to.
    fn reapply(
        core: &mut DocumentCore,
        floor: RevisionNumber,
        round: &mut SyncRound,
    ) -> SyncResult<()> {
        let mut remap = RevisionRemap::new(floor);
        for mut change in core.local_changes.take_all() {
            let command = remap.translate(&change.command);
            let execution = core.execute(&command, &change.actor)?;
            match (execution.outcome, execution.event) {
                (CommandOutcome::Applied(revision), Some(event)) => {
                    remap.record(change.revision(), revision);
                    change.command = command;
                    change.event = event;
                    change.applied = true;
                    core.local_changes.restore(change);
                    round.report.reapplied += 1;
                }
                (CommandOutcome::NoChange, _) => {
                    debug!(id = %change.id(), "local change became redundant");
                    round.report.no_change += 1;
                    round.completions.extend(change.into_completion(ChangeOutcome::NoChange));
                }
                _ => {
                    debug!(id = %change.id(), "local change conflicts with remote history");
                    round.report.conflicts += 1;
                    round.completions.extend(change.into_completion(ChangeOutcome::Conflict));
                }
            }
        }
        Ok(())
    }

    /// Undo a failed round back to the pre-round sync revision and put the
    /// local changes back on top.
    fn recover(
        core: &mut DocumentCore,
        old_sync: RevisionNumber,
        round: &mut SyncRound,
    ) -> SyncResult<()> {
        let undone = undo_to(core, old_sync)?;
        if !core.log.truncate_to_revision(old_sync) {
            return Err(SyncError::Truncate(old_sync));
        }
        round.report.new_sync_revision = old_sync;
        debug!(undone, "failed round undone");
        Self::reapply(core, old_sync, round)
    }

    fn finish(
        core: &mut DocumentCore,
        position: usize,
        statuses: &HashMap<Address, bool>,
        config: &SyncConfig,
        round: &mut SyncRound,
    ) -> SyncResult<()> {
        if config.reduce_events {
            let stats = core.queue.clean_events(position)?;
            round.report.events_dropped = stats.dropped;
            round.report.events_merged = stats.merged;
        }
        round.report.orphans_destroyed = core.resolve_orphans();
        if config.emit_sync_notifications {
            round.report.sync_notifications = notify_status_changes(core, statuses);
        }
        round.report.success = round.report.failure.is_none();
        Ok(())
    }
}

/// Whether each entity currently sits at or below the sync revision.
fn sync_statuses(core: &DocumentCore) -> HashMap<Address, bool> {
    let sync = core.sync_revision();
    let model = core.model_address().clone();
    std::iter::once(model)
        .chain(core.tree.addresses())
        .map(|address| {
            let synchronized = core.tree.revision_of(&address) <= sync;
            (address, synchronized)
        })
        .collect()
}

/// Queue a sync notification for every entity that existed before the round
/// and whose status changed.
fn notify_status_changes(core: &mut DocumentCore, before: &HashMap<Address, bool>) -> usize {
    let mut count = 0;
    for (address, synchronized) in sync_statuses(core) {
        if before.get(&address).is_some_and(|was| *was != synchronized) {
            let notification = SyncNotification {
                revision: core.tree.revision_of(&address),
                address: address.clone(),
                synchronized,
            };
            let route = core.route(&address);
            core.queue.push_notification(notification, route);
            count += 1;
        }
    }
    count
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use revdoc_log::ChangeLogReader;
    use revdoc_types::{AtomicCommand, Command, Id, Intent, Value};

    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn replica(actor: &str) -> DocumentCore {
        DocumentCore::new(Id::new("m").unwrap(), Id::new(actor).unwrap())
    }

    fn command(c: AtomicCommand) -> Command {
        c.into()
    }

    /// Authority and client sharing /m/o/f at revision 2.
    fn shared() -> (DocumentCore, DocumentCore) {
        let mut authority = replica("server");
        let mut client = replica("client");
        for c in [
            AtomicCommand::add_entity(addr("/m/o"), Intent::Forced).unwrap(),
            AtomicCommand::add_entity(addr("/m/o/f"), Intent::Forced).unwrap(),
        ] {
            authority.execute(&command(c), &Id::new("server").unwrap()).unwrap();
        }
        let events = remote_after(&authority, 0);
        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        assert!(round.report.success);
        (authority, client)
    }

    fn remote_after(authority: &DocumentCore, revision: RevisionNumber) -> Vec<Option<Event>> {
        authority
            .log
            .events_since(revision)
            .unwrap()
            .into_iter()
            .map(|(_, e)| e.cloned())
            .collect()
    }

    fn drain(core: &mut DocumentCore) -> usize {
        let mut count = 0;
        while core.queue.pop().is_some() {
            count += 1;
        }
        count
    }

    #[test]
    fn remote_and_local_changes_both_survive() {
        let (mut authority, mut client) = shared();
        drain(&mut client);
        let server = Id::new("server").unwrap();

        let local = [
            AtomicCommand::add_entity(addr("/m/o/x"), Intent::Forced).unwrap(),
            AtomicCommand::add_value(addr("/m/o/x"), Value::from(1), Intent::Safe(3)).unwrap(),
        ];
        for c in local {
            assert!(client.execute_local(&command(c), None).unwrap().0.outcome.is_applied());
        }
        for c in [
            AtomicCommand::add_entity(addr("/m/o/y"), Intent::Forced).unwrap(),
            AtomicCommand::add_value(addr("/m/o/y"), Value::from(2), Intent::Forced).unwrap(),
        ] {
            authority.execute(&command(c), &server).unwrap();
        }

        let events = remote_after(&authority, 2);
        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        assert!(round.report.success);
        assert_eq!(client.sync_revision(), 4);
        assert_eq!(round.report.reapplied, 2);
        assert_eq!(client.tree.value_of(&addr("/m/o/x")), Some(&Value::from(1)));
        assert_eq!(client.tree.value_of(&addr("/m/o/y")), Some(&Value::from(2)));
        assert_eq!(client.current_revision(), 6);
        assert_eq!(client.log.current_revision(), 6);
        assert_eq!(client.local_changes.count_unapplied(), 0);
    }

    #[test]
    fn conflicting_change_is_rejected() {
        let (mut authority, mut client) = shared();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let local =
            AtomicCommand::add_value(addr("/m/o/f"), Value::from("a"), Intent::Safe(2)).unwrap();
        client
            .execute_local(
                &command(local),
                Some(Box::new(move |o: ChangeOutcome| sink.lock().unwrap().push(o))),
            )
            .unwrap();
        let remote =
            AtomicCommand::add_value(addr("/m/o/f"), Value::from("b"), Intent::Forced).unwrap();
        authority.execute(&command(remote), &Id::new("server").unwrap()).unwrap();

        let events = remote_after(&authority, 2);
        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        assert_eq!(round.report.conflicts, 1);
        round.complete();
        assert_eq!(*seen.lock().unwrap(), vec![ChangeOutcome::Conflict]);
        assert_eq!(client.tree.value_of(&addr("/m/o/f")), Some(&Value::from("b")));
        assert!(client.local_changes.is_empty());
    }

    #[test]
    fn confirmed_changes_are_dropped() {
        let (mut authority, mut client) = shared();
        let local = command(AtomicCommand::add_entity(addr("/m/p"), Intent::Forced).unwrap());
        let (execution, _) = client.execute_local(&local, None).unwrap();
        let id = execution.local_change.unwrap();
        let at = authority.execute(&local, &Id::new("client").unwrap()).unwrap();
        client
            .local_changes
            .mark_confirmed(id, at.outcome.revision().unwrap())
            .unwrap();

        let events = remote_after(&authority, 2);
        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        assert_eq!(round.report.confirmed, 1);
        assert!(client.local_changes.is_empty());
        assert_eq!(client.sync_revision(), client.current_revision());
    }

    #[test]
    fn noop_round_keeps_identity_and_dispatches_nothing() {
        let (_, mut client) = shared();
        drain(&mut client);
        let local = command(AtomicCommand::add_entity(addr("/m/p"), Intent::Forced).unwrap());
        client.execute_local(&local, None).unwrap();
        drain(&mut client);
        let instance = client.tree.instance_at(&addr("/m/p")).unwrap();

        let round = Synchronizer::synchronize(&mut client, &[], &SyncConfig::default()).unwrap();
        assert!(round.report.success);
        assert_eq!(client.tree.instance_at(&addr("/m/p")), Some(instance));
        assert_eq!(round.report.orphans_destroyed, 0);
        assert!(client.take_retired().is_empty());
        assert_eq!(drain(&mut client), 0);
    }

    #[test]
    fn mismatch_rolls_the_round_back() {
        let (mut authority, mut client) = shared();
        let local = command(AtomicCommand::add_entity(addr("/m/p"), Intent::Forced).unwrap());
        client.execute_local(&local, None).unwrap();
        let before = client.tree.snapshot();

        let remote =
            AtomicCommand::add_value(addr("/m/o/f"), Value::from(1), Intent::Forced).unwrap();
        authority.execute(&command(remote), &Id::new("server").unwrap()).unwrap();
        let mut events = remote_after(&authority, 2);
        if let Some(Some(Event::Atomic(e))) = events.first_mut() {
            e.old_value = Some(Value::from(99));
        }

        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        assert!(!round.report.success);
        assert!(round.report.failure.is_some());
        assert_eq!(client.sync_revision(), 2);
        assert_eq!(client.tree.snapshot(), before);
        assert_eq!(client.local_changes.count_unapplied(), 0);
    }

    #[test]
    fn lenient_mismatch_keeps_partial_progress() {
        let (mut authority, mut client) = shared();
        let local = command(AtomicCommand::add_entity(addr("/m/p"), Intent::Forced).unwrap());
        client.execute_local(&local, None).unwrap();
        let server = Id::new("server").unwrap();
        for c in [
            AtomicCommand::add_value(addr("/m/o/f"), Value::from(1), Intent::Forced).unwrap(),
            AtomicCommand::add_entity(addr("/m/q"), Intent::Forced).unwrap(),
        ] {
            authority.execute(&command(c), &server).unwrap();
        }
        let mut events = remote_after(&authority, 2);
        if let Some(Some(Event::Atomic(e))) = events.get_mut(1) {
            e.old_model_revision = 7;
        }

        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::lenient()).unwrap();
        assert!(!round.report.success);
        assert_eq!(client.sync_revision(), 2);
        assert_eq!(client.current_revision(), 3);
        assert_eq!(client.tree.value_of(&addr("/m/o/f")), Some(&Value::from(1)));
        assert_eq!(client.local_changes.count_unapplied(), 1);
        assert!(!client.tree.exists(&addr("/m/p")));
    }

    #[test]
    fn status_changes_are_notified() {
        let (mut authority, mut client) = shared();
        drain(&mut client);
        let local = command(AtomicCommand::add_entity(addr("/m/p"), Intent::Forced).unwrap());
        let (execution, _) = client.execute_local(&local, None).unwrap();
        drain(&mut client);

        // The authority accepts the change; the client pulls it back.
        let at = authority.execute(&local, &Id::new("client").unwrap()).unwrap();
        client
            .local_changes
            .mark_confirmed(execution.local_change.unwrap(), at.outcome.revision().unwrap())
            .unwrap();
        let events = remote_after(&authority, 2);
        let round =
            Synchronizer::synchronize(&mut client, &events, &SyncConfig::default()).unwrap();
        // /m and /m/p moved from local-only to synchronized.
        assert_eq!(round.report.sync_notifications, 2);
    }
}
