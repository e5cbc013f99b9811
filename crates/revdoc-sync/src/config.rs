use serde::{Deserialize, Serialize};

/// Behaviour of synchronization rounds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Undo a failed round completely, so the document ends where it
    /// started. When `false`, replayed remote events stay applied and the
    /// pending local changes stay unapplied.
    pub atomic_rounds: bool,
    /// Reduce the events of a round to their net effect before dispatch.
    pub reduce_events: bool,
    /// Tell `Sync` listeners which entities crossed the sync boundary.
    pub emit_sync_notifications: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            atomic_rounds: true,
            reduce_events: true,
            emit_sync_notifications: true,
        }
    }
}

impl SyncConfig {
    /// Keep a failed round's partial progress.
    pub fn lenient() -> Self {
        Self {
            atomic_rounds: false,
            ..Default::default()
        }
    }
}
