use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Maximum length of an [`Id`] in characters.
pub const MAX_ID_LENGTH: usize = 100;

/// Validated identifier of a document entity or an actor.
///
/// Ids are short, human-readable names: the first character is an ASCII
/// letter or `_`, the remaining characters are ASCII alphanumerics, `_`,
/// `-` or `.`. Ids compare and order lexicographically.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Id(String);

impl Id {
    /// Validate and wrap a string.
    pub fn new(value: impl Into<String>) -> Result<Self, TypeError> {
        let value = value.into();
        validate(&value)?;
        Ok(Self(value))
    }

    /// Generate a fresh, time-ordered id (UUID v7 based).
    pub fn generate() -> Self {
        Self(format!("u{}", uuid::Uuid::now_v7().simple()))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(value: &str) -> Result<(), TypeError> {
    let length = value.chars().count();
    if length > MAX_ID_LENGTH {
        return Err(TypeError::IdTooLong {
            length,
            max: MAX_ID_LENGTH,
        });
    }
    let mut chars = value.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(TypeError::InvalidId(value.to_string()))
    }
}

impl TryFrom<String> for Id {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Id {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Id> for String {
    fn from(id: Id) -> Self {
        id.0
    }
}

impl std::str::FromStr for Id {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The identity a command is executed under.
pub type ActorId = Id;

/// Identity of one in-memory entity instance.
///
/// Two entities at the same address are the *same* instance only if their
/// instance ids match. Listener registrations are bound to instances, which
/// is what lets an orphaned-then-resurrected entity keep its listeners.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceId(u64);

impl InstanceId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Short hex representation used in logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0.to_be_bytes()[4..])
    }
}

impl fmt::Debug for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceId({})", self.short_hex())
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inst:{}", self.short_hex())
    }
}
