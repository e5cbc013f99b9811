use revdoc_sync::SyncConfig;
use revdoc_types::{ActorId, Id};
use serde::{Deserialize, Serialize};

use crate::error::{SdkError, SdkResult};

/// Configuration of one [`Document`](crate::Document) replica.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Actor recorded on locally executed commands.
    pub actor: ActorId,
    pub sync: SyncConfig,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            actor: Id::generate(),
            sync: SyncConfig::default(),
        }
    }
}

impl DocumentConfig {
    pub fn for_actor(actor: ActorId) -> Self {
        Self {
            actor,
            sync: SyncConfig::default(),
        }
    }

    /// Parse a TOML document; missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> SdkResult<Self> {
        toml::from_str(s).map_err(|e| SdkError::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_partial_toml() {
        let config = DocumentConfig::from_toml_str(
            r#"
            actor = "alice"

            [sync]
            atomic_rounds = false
            "#,
        )
        .unwrap();
        assert_eq!(config.actor.as_str(), "alice");
        assert!(!config.sync.atomic_rounds);
        assert!(config.sync.reduce_events);
    }

    #[test]
    fn invalid_actor_is_rejected() {
        let err = DocumentConfig::from_toml_str(r#"actor = "1bad""#).unwrap_err();
        assert!(matches!(err, SdkError::Config(_)));
    }

    #[test]
    fn default_actor_is_generated() {
        let a = DocumentConfig::default();
        let b = DocumentConfig::default();
        assert_ne!(a.actor, b.actor);
    }
}
