use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifiers found in one archive.
pub type IdentifierSet = FxHashSet<Identifier>;

/// The namespace an identifier was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    Session,
    Profile,
}

impl IdKind {
    pub fn prefix(self) -> &'static str {
        match self {
            IdKind::Session => "sid:",
            IdKind::Profile => "pid:",
        }
    }
}

/// An opaque, namespaced identifier such as `sid:1234` or `pid:abc`.
///
/// Two identifiers of different kinds never compare equal, even when the raw
/// values are textually identical. Blank raw values are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    /// Builds a namespaced identifier, or `None` if `raw` is blank.
    pub fn new(kind: IdKind, raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        Some(Identifier(format!("{}{}", kind.prefix(), trimmed)))
    }

    pub fn session(raw: &str) -> Option<Self> {
        Self::new(IdKind::Session, raw)
    }

    pub fn profile(raw: &str) -> Option<Self> {
        Self::new(IdKind::Profile, raw)
    }

    /// Wraps an already namespaced value, e.g. one read back from a cache file.
    /// Blank values are rejected.
    pub fn from_qualified(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else if trimmed.len() == value.len() {
            Some(Identifier(value))
        } else {
            Some(Identifier(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds an identifier set from already namespaced strings.
pub fn identifier_set<I, S>(values: I) -> IdentifierSet
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .filter_map(Identifier::from_qualified)
        .collect()
}
