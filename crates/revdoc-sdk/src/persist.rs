//! Saving and restoring documents.
//!
//! A document is stored as its snapshot plus its sync log, bincode-encoded
//! inside a CRC-checked frame. Pending local changes and listeners are
//! runtime state and are not persisted.

use std::path::Path;

use revdoc_log::{persist, SyncLog, SyncLogState};
use revdoc_types::DocumentSnapshot;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::DocumentConfig;
use crate::document::Document;
use crate::error::SdkResult;

/// On-disk form of a document.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedDocument {
    pub snapshot: DocumentSnapshot,
    pub log: SyncLogState,
}

impl Document {
    pub fn to_bytes(&self) -> SdkResult<Vec<u8>> {
        let (snapshot, log) = self.parts();
        Ok(persist::encode(&PersistedDocument { snapshot, log })?)
    }

    pub fn from_bytes(bytes: &[u8], config: DocumentConfig) -> SdkResult<Self> {
        let persisted: PersistedDocument = persist::decode(bytes)?;
        let log = SyncLog::from_state(persisted.log)?;
        Self::from_parts(&persisted.snapshot, log, config)
    }

    /// Write the document to `path`, replacing any previous content.
    pub fn persist(&self, path: impl AsRef<Path>) -> SdkResult<()> {
        let bytes = self.to_bytes()?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(path = %path.as_ref().display(), len = bytes.len(), "document persisted");
        Ok(())
    }

    pub fn restore(path: impl AsRef<Path>, config: DocumentConfig) -> SdkResult<Self> {
        let bytes = std::fs::read(path.as_ref())?;
        let document = Self::from_bytes(&bytes, config)?;
        info!(
            path = %path.as_ref().display(),
            revision = document.current_revision(),
            "document restored"
        );
        Ok(document)
    }
}
