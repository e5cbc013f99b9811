use std::cell::RefCell;
use std::fmt;

use parking_lot::ReentrantMutex;
use revdoc_core::{ConvergenceReport, DocumentCore, DocumentTree, ReplayEngine};
use revdoc_events::{Delivery, EventCategory, ListenerId};
use revdoc_log::{
    ChangeLogReader, ChangeOutcome, LocalChangeId, LogValidator, SyncLog, ValidationReport,
};
use revdoc_sync::{rollback, SyncReport, Synchronizer};
use revdoc_types::{
    ActorId, Address, Command, CommandOutcome, DocumentSnapshot, Event, RevisionNumber, Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::DocumentConfig;
use crate::error::{SdkError, SdkResult};

/// Read-only view of a pending local change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalChangeInfo {
    pub id: u64,
    pub revision: RevisionNumber,
    pub command: Command,
    pub applied: bool,
    pub remote_revision: Option<RevisionNumber>,
}

/// A synchronized document replica.
///
/// Every operation takes the document's root lock for its whole duration,
/// including dispatch. The lock is re-entrant: listeners and completion
/// callbacks run on the calling thread with no interior borrow held, so they
/// may call back into the document. A nested operation's events are
/// delivered by the dispatch loop that is already running.
pub struct Document {
    core: ReentrantMutex<RefCell<DocumentCore>>,
    config: DocumentConfig,
}

impl Document {
    /// A fresh, empty document at revision 0.
    pub fn new(model: revdoc_types::Id, config: DocumentConfig) -> Self {
        let core = DocumentCore::new(model, config.actor.clone());
        info!(model = %core.model_address(), actor = %config.actor, "document created");
        Self::from_core(core, config)
    }

    pub(crate) fn from_core(core: DocumentCore, config: DocumentConfig) -> Self {
        Self {
            core: ReentrantMutex::new(RefCell::new(core)),
            config,
        }
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn actor(&self) -> &ActorId {
        &self.config.actor
    }

    // ---- Commands ----

    /// Execute a command as a local change of this replica.
    pub fn execute_command(&self, command: &Command) -> SdkResult<CommandOutcome> {
        self.execute_inner(command, None).map(|(outcome, _)| outcome)
    }

    /// Execute a command as a local change and get told how it ends.
    ///
    /// The callback receives [`ChangeOutcome::Confirmed`] once a
    /// synchronization round confirms the change, or `NoChange` / `Conflict`
    /// when the change is dropped, immediately so if the command does not
    /// apply in the first place.
    pub fn execute_command_with_callback<F>(
        &self,
        command: &Command,
        callback: F,
    ) -> SdkResult<(CommandOutcome, Option<LocalChangeId>)>
    where
        F: FnOnce(ChangeOutcome) + Send + 'static,
    {
        self.execute_inner(command, Some(Box::new(callback)))
    }

    fn execute_inner(
        &self,
        command: &Command,
        callback: Option<revdoc_log::ChangeCallback>,
    ) -> SdkResult<(CommandOutcome, Option<LocalChangeId>)> {
        let guard = self.core.lock();
        let (execution, callback) = {
            let mut core = guard.borrow_mut();
            core.execute_local(command, callback)
                .map_err(|e| fatal("execute", e))?
        };
        self.dispatch();
        if let Some(callback) = callback {
            callback(match execution.outcome {
                CommandOutcome::NoChange => ChangeOutcome::NoChange,
                _ => ChangeOutcome::Conflict,
            });
        }
        Ok((execution.outcome, execution.local_change))
    }

    /// Execute a command on behalf of `actor` without recording a local
    /// change, as the authoritative replica does for commands it receives.
    pub fn execute_remote_command(
        &self,
        command: &Command,
        actor: &ActorId,
    ) -> SdkResult<CommandOutcome> {
        let guard = self.core.lock();
        let outcome = {
            let mut core = guard.borrow_mut();
            core.execute(command, actor)
                .map_err(|e| fatal("execute_remote", e))?
                .outcome
        };
        self.dispatch();
        Ok(outcome)
    }

    /// Record that the remote peer accepted a local change at
    /// `remote_revision`. The change is dropped by the next round that
    /// reaches that revision.
    pub fn confirm_local_change(
        &self,
        id: LocalChangeId,
        remote_revision: RevisionNumber,
    ) -> SdkResult<()> {
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        core.local_changes.mark_confirmed(id, remote_revision)?;
        Ok(())
    }

    // ---- Synchronization ----

    /// Run one synchronization round with the remote entries following the
    /// sync revision. Returns whether every remote entry was replayed.
    pub fn synchronize(&self, remote: &[Option<Event>]) -> SdkResult<bool> {
        self.synchronize_with_report(remote).map(|r| r.success)
    }

    pub fn synchronize_with_report(&self, remote: &[Option<Event>]) -> SdkResult<SyncReport> {
        let guard = self.core.lock();
        let round = {
            let mut core = guard.borrow_mut();
            Synchronizer::synchronize(&mut core, remote, &self.config.sync)
                .map_err(|e| fatal("synchronize", e))?
        };
        let dispatched = self.dispatch();
        let mut report = round.complete();
        report.dispatched = dispatched;
        Ok(report)
    }

    /// Discard local history above `revision`. Discarded local changes
    /// complete with [`ChangeOutcome::Discarded`].
    pub fn rollback(&self, revision: RevisionNumber) -> SdkResult<()> {
        let guard = self.core.lock();
        let completions = {
            let mut core = guard.borrow_mut();
            rollback(&mut core, revision).map_err(|e| fatal("rollback", e))?
        };
        self.dispatch();
        for (callback, outcome) in completions {
            callback(outcome);
        }
        Ok(())
    }

    // ---- Listeners ----

    /// Listen for deliveries of `category` on the entity at `address` and
    /// everything below it. The listener stays bound to the entity instance.
    pub fn add_listener<F>(
        &self,
        address: &Address,
        category: EventCategory,
        listener: F,
    ) -> SdkResult<ListenerId>
    where
        F: Fn(&Delivery) + Send + Sync + 'static,
    {
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        let instance = core
            .tree
            .instance_at(address)
            .ok_or_else(|| SdkError::EntityNotFound(address.clone()))?;
        let id = core.listeners.register(instance, category, std::sync::Arc::new(listener));
        debug!(%id, address = %address, ?category, "listener added");
        Ok(id)
    }

    /// Returns `false` if the listener is unknown or already gone.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let guard = self.core.lock();
        let mut core = guard.borrow_mut();
        core.listeners.deregister(id)
    }

    pub fn listener_count(&self) -> usize {
        let guard = self.core.lock();
        let core = guard.borrow();
        core.listeners.len()
    }

    /// Drain the event queue, calling listeners with no borrow held.
    /// Returns the number of dequeued items; a nested call returns 0.
    fn dispatch(&self) -> usize {
        let guard = self.core.lock();
        {
            let mut core = guard.borrow_mut();
            if !core.queue.begin_send() {
                return 0;
            }
            core.listeners.begin_dispatch();
        }
        let mut count = 0;
        loop {
            let deliveries = {
                let mut core = guard.borrow_mut();
                match core.queue.pop() {
                    Some(outgoing) => core.listeners.deliveries(&outgoing),
                    None => break,
                }
            };
            count += 1;
            for (listener, delivery) in deliveries {
                listener(&delivery);
            }
        }
        let mut core = guard.borrow_mut();
        core.queue.end_send();
        core.listeners.end_dispatch();
        let retired = core.take_retired();
        core.listeners.drop_instances(retired);
        if count > 0 {
            debug!(count, "events dispatched");
        }
        count
    }

    // ---- Reads ----

    pub fn model_address(&self) -> Address {
        self.with_core(|core| core.model_address().clone())
    }

    pub fn current_revision(&self) -> RevisionNumber {
        self.with_core(DocumentCore::current_revision)
    }

    pub fn sync_revision(&self) -> RevisionNumber {
        self.with_core(DocumentCore::sync_revision)
    }

    pub fn exists(&self, address: &Address) -> bool {
        self.with_core(|core| core.tree.exists(address))
    }

    /// `-1` for an entity that does not exist.
    pub fn revision_of(&self, address: &Address) -> RevisionNumber {
        self.with_core(|core| core.tree.revision_of(address))
    }

    pub fn value_of(&self, address: &Address) -> Option<Value> {
        self.with_core(|core| core.tree.value_of(address).cloned())
    }

    pub fn children(&self, address: &Address) -> Vec<Address> {
        self.with_core(|core| core.tree.children(address))
    }

    pub fn snapshot(&self) -> DocumentSnapshot {
        self.with_core(|core| core.tree.snapshot())
    }

    /// Every logged entry, oldest first.
    pub fn change_log(&self) -> Vec<(RevisionNumber, Option<Event>)> {
        self.with_core(|core| {
            core.log
                .iter()
                .map(|(revision, event)| (revision, event.cloned()))
                .collect()
        })
    }

    /// The logged entries above `revision`, as a remote peer consumes them.
    pub fn events_since(&self, revision: RevisionNumber) -> SdkResult<Vec<Option<Event>>> {
        self.with_core(|core| {
            Ok(core
                .log
                .events_since(revision)?
                .into_iter()
                .map(|(_, event)| event.cloned())
                .collect())
        })
    }

    pub fn local_changes(&self) -> Vec<LocalChangeInfo> {
        self.with_core(|core| {
            core.local_changes
                .iter()
                .map(|change| LocalChangeInfo {
                    id: change.id().raw(),
                    revision: change.revision(),
                    command: change.command.clone(),
                    applied: change.applied,
                    remote_revision: change.remote_revision,
                })
                .collect()
        })
    }

    /// Local changes not yet confirmed by the remote peer, with their ids.
    pub fn unconfirmed_local_changes(&self) -> Vec<(LocalChangeId, RevisionNumber, Command)> {
        self.with_core(|core| {
            core.local_changes
                .iter()
                .filter(|change| !change.is_confirmed() && change.applied)
                .map(|change| (change.id(), change.revision(), change.command.clone()))
                .collect()
        })
    }

    pub fn count_unapplied_local_changes(&self) -> usize {
        self.with_core(|core| core.local_changes.count_unapplied())
    }

    // ---- Verification ----

    /// Structural checks of the sync log.
    pub fn validate_log(&self) -> SdkResult<ValidationReport> {
        self.with_core(|core| Ok(LogValidator::validate_sync_log(&core.log)?))
    }

    /// Replay the whole log onto an empty document and compare the result
    /// with the live state.
    pub fn verify_replay(&self) -> SdkResult<ConvergenceReport> {
        self.with_core(|core| {
            let model = core.model_address().id().clone();
            let mut base = DocumentSnapshot::empty(model);
            base.revision = core.log.base_revision();
            let replayed = ReplayEngine::replay(&base, &core.log)?;
            Ok(ReplayEngine::verify_convergence(&core.tree.snapshot(), &replayed.snapshot)?)
        })
    }

    pub(crate) fn with_core<T>(&self, f: impl FnOnce(&DocumentCore) -> T) -> T {
        let guard = self.core.lock();
        let core = guard.borrow();
        f(&core)
    }

    pub(crate) fn parts(&self) -> (DocumentSnapshot, revdoc_log::SyncLogState) {
        self.with_core(|core| (core.tree.snapshot(), core.log.to_state()))
    }

    pub(crate) fn from_parts(
        snapshot: &DocumentSnapshot,
        log: SyncLog,
        config: DocumentConfig,
    ) -> SdkResult<Self> {
        let tree = DocumentTree::from_snapshot(snapshot)?;
        let core = DocumentCore::from_parts(tree, log, config.actor.clone())?;
        Ok(Self::from_core(core, config))
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let guard = self.core.lock();
        let out = match guard.try_borrow() {
            Ok(core) => f.debug_struct("Document").field("core", &*core).finish(),
            Err(_) => f.debug_struct("Document").finish_non_exhaustive(),
        };
        out
    }
}

fn fatal(operation: &'static str, err: impl Into<SdkError>) -> SdkError {
    let err = err.into();
    error!(operation, error = %err, "document operation aborted");
    err
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use revdoc_types::{AtomicCommand, Id, Intent};

    use super::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    fn document() -> Document {
        Document::new(Id::new("m").unwrap(), DocumentConfig::for_actor(Id::new("alice").unwrap()))
    }

    fn add(address: &str) -> Command {
        AtomicCommand::add_entity(addr(address), Intent::Forced).unwrap().into()
    }

    #[test]
    fn listeners_see_events_below_their_entity() {
        let doc = document();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        doc.add_listener(&addr("/m"), EventCategory::Model, move |d| {
            sink.lock().unwrap().push(d.clone());
        })
        .unwrap();

        doc.execute_command(&add("/m/o")).unwrap();
        doc.execute_command(&add("/m/o/f")).unwrap();
        // Field additions are Object-category events.
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn listener_may_call_back_into_the_document() {
        let doc = Arc::new(document());
        let inner = Arc::clone(&doc);
        let revisions = Arc::new(Mutex::new(Vec::new()));
        let sink = revisions.clone();
        doc.add_listener(&addr("/m"), EventCategory::Model, move |_| {
            sink.lock().unwrap().push(inner.current_revision());
            if !inner.exists(&addr("/m/p")) {
                inner.execute_command(&add("/m/p")).unwrap();
            }
        })
        .unwrap();

        doc.execute_command(&add("/m/o")).unwrap();
        assert!(doc.exists(&addr("/m/p")));
        assert_eq!(*revisions.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn immediate_failure_completes_the_callback() {
        let doc = document();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let safe: Command =
            AtomicCommand::add_entity(addr("/m/o"), Intent::Safe(4)).unwrap().into();
        doc.execute_command(&add("/m/o")).unwrap();
        let (outcome, id) = doc
            .execute_command_with_callback(&safe, move |o| sink.lock().unwrap().push(o))
            .unwrap();
        assert_eq!(outcome, CommandOutcome::Failed);
        assert!(id.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![ChangeOutcome::Conflict]);
    }

    #[test]
    fn debug_output_shows_the_core() {
        let doc = document();
        doc.execute_command(&add("/m/o")).unwrap();
        let text = format!("{doc:?}");
        assert!(text.starts_with("Document"));
        assert!(text.contains("DocumentCore"));
    }

    #[test]
    fn listener_on_missing_entity_is_rejected() {
        let doc = document();
        let result = doc.add_listener(&addr("/m/x"), EventCategory::Object, |_| {});
        assert!(matches!(result, Err(SdkError::EntityNotFound(_))));
    }

    #[test]
    fn removed_entity_drops_its_listeners() {
        let doc = document();
        doc.execute_command(&add("/m/o")).unwrap();
        doc.add_listener(&addr("/m/o"), EventCategory::Object, |_| {}).unwrap();
        assert_eq!(doc.listener_count(), 1);
        let remove: Command =
            AtomicCommand::remove_entity(addr("/m/o"), Intent::Forced).unwrap().into();
        doc.execute_command(&remove).unwrap();
        assert_eq!(doc.listener_count(), 0);
    }

    #[test]
    fn live_state_matches_replay() {
        let doc = document();
        doc.execute_command(&add("/m/o")).unwrap();
        doc.execute_command(&add("/m/o/f")).unwrap();
        let set: Command =
            AtomicCommand::change_value(addr("/m/o/f"), Value::from(3), Intent::Forced)
                .unwrap()
                .into();
        doc.execute_command(&set).unwrap();
        assert!(doc.verify_replay().unwrap().converged);
        assert!(doc.validate_log().unwrap().is_valid());
    }
}
