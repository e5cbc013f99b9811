//! In-process replica simulation.
//!
//! One authoritative [`Document`] plus any number of clients. Clients push
//! their pending local changes to the authority and pull the authority's
//! log back through synchronization rounds.

use std::collections::BTreeMap;

use revdoc_log::RevisionRemap;
use revdoc_sync::SyncReport;
use revdoc_types::{
    Address, AtomicCommand, Command, CommandOutcome, DocumentSnapshot, Id, Intent, RevisionNumber,
    Value,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::DocumentConfig;
use crate::document::Document;
use crate::error::{SdkError, SdkResult};

/// Name of the authoritative replica in scenarios.
pub const AUTHORITY: &str = "authority";

/// A scripted run over several replicas.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    pub model: Id,
    pub clients: Vec<Id>,
    pub steps: Vec<Step>,
}

/// One scenario step. Addresses are written `/model/object[/field]`; a
/// command is forced unless `safe` names the expected revision.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    AddEntity {
        replica: String,
        address: String,
        #[serde(default)]
        safe: Option<RevisionNumber>,
    },
    RemoveEntity {
        replica: String,
        address: String,
        #[serde(default)]
        safe: Option<RevisionNumber>,
    },
    SetValue {
        replica: String,
        address: String,
        value: Value,
        #[serde(default)]
        safe: Option<RevisionNumber>,
    },
    ClearValue {
        replica: String,
        address: String,
        #[serde(default)]
        safe: Option<RevisionNumber>,
    },
    Push {
        replica: String,
    },
    Pull {
        replica: String,
    },
    /// Push then pull.
    Sync {
        replica: String,
    },
}

impl Step {
    pub fn replica(&self) -> &str {
        match self {
            Self::AddEntity { replica, .. }
            | Self::RemoveEntity { replica, .. }
            | Self::SetValue { replica, .. }
            | Self::ClearValue { replica, .. }
            | Self::Push { replica }
            | Self::Pull { replica }
            | Self::Sync { replica } => replica,
        }
    }

    /// The command an editing step stands for.
    pub fn command(&self) -> SdkResult<Option<Command>> {
        let intent = |safe: &Option<RevisionNumber>| safe.map_or(Intent::Forced, Intent::Safe);
        let command = match self {
            Self::AddEntity { address, safe, .. } => {
                AtomicCommand::add_entity(Address::parse(address)?, intent(safe))?
            }
            Self::RemoveEntity { address, safe, .. } => {
                AtomicCommand::remove_entity(Address::parse(address)?, intent(safe))?
            }
            Self::SetValue {
                address, value, safe, ..
            } => {
                AtomicCommand::change_value(Address::parse(address)?, value.clone(), intent(safe))?
            }
            Self::ClearValue { address, safe, .. } => {
                AtomicCommand::remove_value(Address::parse(address)?, intent(safe))?
            }
            Self::Push { .. } | Self::Pull { .. } | Self::Sync { .. } => return Ok(None),
        };
        Ok(Some(command.into()))
    }
}

/// What a step did.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepOutcome {
    Executed { outcome: i64 },
    Pushed(PushReport),
    Pulled(SyncReport),
    Synced { push: PushReport, pull: SyncReport },
}

/// Result of pushing a client's pending changes to the authority.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// Final state of one replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaState {
    pub name: String,
    pub revision: RevisionNumber,
    pub sync_revision: RevisionNumber,
    pub pending_changes: usize,
    pub snapshot: DocumentSnapshot,
}

/// The authority and its clients.
pub struct Simulation {
    authority: Document,
    clients: BTreeMap<String, Document>,
}

impl Simulation {
    pub fn new(model: Id) -> SdkResult<Self> {
        let config = DocumentConfig::for_actor(Id::new(AUTHORITY)?);
        Ok(Self {
            authority: Document::new(model, config),
            clients: BTreeMap::new(),
        })
    }

    /// Set up a simulation for `scenario` without running its steps.
    pub fn for_scenario(scenario: &Scenario) -> SdkResult<Self> {
        let mut sim = Self::new(scenario.model.clone())?;
        for client in &scenario.clients {
            sim.add_client(client.clone())?;
        }
        Ok(sim)
    }

    /// Add a client that starts from the authority's current state.
    pub fn add_client(&mut self, actor: Id) -> SdkResult<&Document> {
        let name = actor.as_str().to_string();
        if name == AUTHORITY || self.clients.contains_key(&name) {
            return Err(SdkError::InvalidOperation(format!("replica {name} already exists")));
        }
        let model = self.authority.model_address().id().clone();
        let client = Document::new(model, DocumentConfig::for_actor(actor));
        client.synchronize(&self.authority.events_since(0)?)?;
        info!(client = %name, revision = client.current_revision(), "client joined");
        Ok(self.clients.entry(name).or_insert(client))
    }

    pub fn authority(&self) -> &Document {
        &self.authority
    }

    pub fn client(&self, name: &str) -> SdkResult<&Document> {
        self.clients
            .get(name)
            .ok_or_else(|| SdkError::UnknownReplica(name.to_string()))
    }

    pub fn replica(&self, name: &str) -> SdkResult<&Document> {
        if name == AUTHORITY {
            Ok(&self.authority)
        } else {
            self.client(name)
        }
    }

    /// Execute a command on a replica. The authority's commands are
    /// authoritative at once; a client's become local changes.
    pub fn execute(&self, replica: &str, command: &Command) -> SdkResult<CommandOutcome> {
        if replica == AUTHORITY {
            return self.authority.execute_remote_command(command, self.authority.actor());
        }
        self.client(replica)?.execute_command(command)
    }

    /// Send a client's unconfirmed local changes to the authority, in order.
    /// Accepted changes are confirmed with the authority's revision; safe
    /// revisions are translated as earlier changes land at the authority.
    pub fn push(&self, name: &str) -> SdkResult<PushReport> {
        let client = self.client(name)?;
        let mut remap = RevisionRemap::new(client.sync_revision());
        let mut report = PushReport::default();
        for (id, local_revision, command) in client.unconfirmed_local_changes() {
            let command = remap.translate(&command);
            match self.authority.execute_remote_command(&command, client.actor())? {
                CommandOutcome::Applied(revision) => {
                    remap.record(local_revision, revision);
                    client.confirm_local_change(id, revision)?;
                    report.accepted += 1;
                }
                outcome => {
                    debug!(
                        client = %name,
                        %id,
                        code = outcome.code(),
                        "change rejected by authority"
                    );
                    report.rejected += 1;
                }
            }
        }
        info!(client = %name, accepted = report.accepted, rejected = report.rejected, "pushed");
        Ok(report)
    }

    /// Synchronize a client with everything the authority logged after the
    /// client's sync revision.
    pub fn pull(&self, name: &str) -> SdkResult<SyncReport> {
        let client = self.client(name)?;
        let remote = self.authority.events_since(client.sync_revision())?;
        client.synchronize_with_report(&remote)
    }

    pub fn run_step(&self, step: &Step) -> SdkResult<StepOutcome> {
        let replica = step.replica();
        if let Some(command) = step.command()? {
            let outcome = self.execute(replica, &command)?;
            return Ok(StepOutcome::Executed {
                outcome: outcome.code(),
            });
        }
        if replica == AUTHORITY {
            return Err(SdkError::InvalidOperation("the authority does not push or pull".into()));
        }
        Ok(match step {
            Step::Push { .. } => StepOutcome::Pushed(self.push(replica)?),
            Step::Pull { .. } => StepOutcome::Pulled(self.pull(replica)?),
            _ => StepOutcome::Synced {
                push: self.push(replica)?,
                pull: self.pull(replica)?,
            },
        })
    }

    /// Run every step of `scenario`, stopping at the first error.
    pub fn run(&self, scenario: &Scenario) -> SdkResult<Vec<StepOutcome>> {
        scenario.steps.iter().map(|step| self.run_step(step)).collect()
    }

    /// Every replica's state, authority first.
    pub fn states(&self) -> Vec<ReplicaState> {
        std::iter::once((AUTHORITY, &self.authority))
            .chain(self.clients.iter().map(|(name, doc)| (name.as_str(), doc)))
            .map(|(name, doc)| ReplicaState {
                name: name.to_string(),
                revision: doc.current_revision(),
                sync_revision: doc.sync_revision(),
                pending_changes: doc.local_changes().len(),
                snapshot: doc.snapshot(),
            })
            .collect()
    }

    /// `true` when every client without pending changes holds exactly the
    /// authority's state.
    pub fn converged(&self) -> bool {
        let expected = self.authority.snapshot();
        self.clients
            .values()
            .filter(|doc| doc.local_changes().is_empty())
            .all(|doc| doc.snapshot() == expected)
    }

    pub fn client_names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }
}
