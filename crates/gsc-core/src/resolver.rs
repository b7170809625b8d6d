//! Script name resolution.
//!
//! The host asks for scripts either by path-like name (`maps/mp/_load`) or by
//! a numeric token standing in for that name. Tokens are looked up in a
//! [`TokenTable`]; everything else is already canonical.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A script name as requested by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptIdentifier {
    /// The raw requested name.
    pub name: String,
    /// The numeric token, if `name` parses as an integer.
    pub token: Option<i64>,
}

impl ScriptIdentifier {
    /// Build an identifier from a requested name, detecting numeric tokens.
    pub fn parse(name: impl Into<String>) -> Self {
        let name = name.into();
        let token = name.trim().parse::<i64>().ok();
        Self { name, token }
    }
}

impl From<&str> for ScriptIdentifier {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for ScriptIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A resolved, de-aliased script name.
///
/// Used as the cache key and as the file name in compiler diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct CanonicalName(Arc<str>);

impl CanonicalName {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Name resolution failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("unknown script token {0}")]
    UnknownToken(i64),
}

/// Errors raised while loading a token table.
#[derive(Debug, Error)]
pub enum TableError {
    #[error("invalid table: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("token {token} is assigned to both '{first}' and '{second}'")]
    DuplicateToken {
        token: u32,
        first: String,
        second: String,
    },

    #[error("token 0 is reserved (assigned to '{0}')")]
    ReservedToken(String),
}

/// Static mapping between numeric script tokens and canonical names.
///
/// Token `0` is reserved: it never names a script.
#[derive(Debug, Clone, Default)]
pub struct TokenTable {
    version: String,
    by_token: HashMap<u32, CanonicalName>,
    by_name: HashMap<CanonicalName, u32>,
}

#[derive(Deserialize)]
struct TokenTableFile {
    #[serde(default)]
    version: String,
    #[serde(default)]
    tokens: BTreeMap<String, u32>,
}

impl TokenTable {
    /// Create an empty table with a version label.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Self::default()
        }
    }

    /// Parse a table from TOML:
    ///
    /// ```toml
    /// version = "h1"
    /// [tokens]
    /// "maps/mp/gametypes/_playercards" = 1234
    /// ```
    pub fn from_toml(text: &str) -> Result<Self, TableError> {
        let file: TokenTableFile = toml::from_str(text)?;
        let mut table = Self::new(file.version);
        for (name, token) in file.tokens {
            table.insert(token, &name)?;
        }
        Ok(table)
    }

    /// Add a token mapping.
    pub fn insert(&mut self, token: u32, name: &str) -> Result<(), TableError> {
        if token == 0 {
            return Err(TableError::ReservedToken(name.to_string()));
        }
        let name = CanonicalName::new(name);
        if let Some(existing) = self.by_token.get(&token) {
            if *existing != name {
                return Err(TableError::DuplicateToken {
                    token,
                    first: existing.to_string(),
                    second: name.to_string(),
                });
            }
        }
        self.bind(token, name);
        Ok(())
    }

    /// Overlay another table's entries onto this one. Later entries win.
    pub fn merge(&mut self, other: TokenTable) {
        for (token, name) in other.by_token {
            self.bind(token, name);
        }
    }

    // Keeps both maps one-to-one: a rebound token or name drops its old pair
    fn bind(&mut self, token: u32, name: CanonicalName) {
        if let Some(old_name) = self.by_token.insert(token, name.clone()) {
            if old_name != name {
                self.by_name.remove(&old_name);
            }
        }
        if let Some(old_token) = self.by_name.insert(name, token) {
            if old_token != token {
                self.by_token.remove(&old_token);
            }
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self, token: u32) -> Option<&CanonicalName> {
        self.by_token.get(&token)
    }

    pub fn token(&self, name: &str) -> Option<u32> {
        self.by_name.get(&CanonicalName::new(name)).copied()
    }

    pub fn len(&self) -> usize {
        self.by_token.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_token.is_empty()
    }
}

/// Resolve a requested identifier to its canonical name.
///
/// Numeric identifiers go through the token table; a zero, negative, or
/// unmapped token is [`ResolveError::UnknownToken`]. Any other name is
/// returned as-is: existence is checked by the source provider, not here.
pub fn resolve(identifier: &ScriptIdentifier, table: &TokenTable) -> Result<CanonicalName, ResolveError> {
    match identifier.token {
        Some(token) => u32::try_from(token)
            .ok()
            .and_then(|t| table.name(t))
            .cloned()
            .ok_or(ResolveError::UnknownToken(token)),
        None => Ok(CanonicalName::new(&identifier.name)),
    }
}
