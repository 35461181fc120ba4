//! Stable identities for operations in the execution graph.

use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};

/// The stable identity of an [`Operation`](crate::operation::Operation).
///
/// An id always carries a human-readable `name` used in banners and summaries. It may
/// additionally carry a `key`, a planner-supplied logical address such as `project;phase`
/// (e.g. `web;build`) used to distinguish operations that happen to share a display name
/// across different parts of a monorepo. Equality and hashing are driven by the key when
/// present, and by the name otherwise, so planners that don't need keys can use plain names.
#[derive(Clone, Eq)]
pub struct OperationId {
    name: String,
    key: Option<String>,
}

impl OperationId {
    /// Create an id from a plain display name.
    ///
    /// # Error
    /// Errors if `name` is empty.
    pub fn new(name: impl AsRef<str>) -> Result<Self, InvalidId> {
        let name = name.as_ref();
        is_valid_name(name)?;
        Ok(Self {
            name: name.to_string(),
            key: None,
        })
    }

    /// Create an id with a planner-supplied logical key, e.g. `project;phase`.
    pub fn with_key(name: impl AsRef<str>, key: impl AsRef<str>) -> Result<Self, InvalidId> {
        let mut id = Self::new(name)?;
        id.key = Some(key.as_ref().to_string());
        Ok(id)
    }

    /// The human-readable display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The logical key used purely for identity, if the planner supplied one.
    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    fn identity(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.name)
    }
}

impl PartialEq for OperationId {
    fn eq(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }
}

impl Hash for OperationId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity().hash(state)
    }
}

impl Ord for OperationId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.name.cmp(&other.name).then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for OperationId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl Debug for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{:?} ({key})", self.name),
            None => write!(f, "{:?}", self.name),
        }
    }
}

impl From<&str> for OperationId {
    fn from(name: &str) -> Self {
        OperationId::new(name).unwrap_or_else(|_| panic!("invalid operation id {name:?}"))
    }
}

impl From<String> for OperationId {
    fn from(name: String) -> Self {
        OperationId::new(name).unwrap_or_else(|_| panic!("invalid operation id"))
    }
}

fn is_valid_name(name: &str) -> Result<(), InvalidId> {
    static NON_EMPTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S").expect("valid pattern"));
    if NON_EMPTY.is_match(name) {
        Ok(())
    } else {
        Err(InvalidId::new(name))
    }
}

/// A name was rejected while constructing an [`OperationId`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct InvalidId(pub String);

impl InvalidId {
    pub fn new(string: impl AsRef<str>) -> Self {
        Self(string.as_ref().to_string())
    }
}

impl Display for InvalidId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "invalid operation identifier {:?}", self.0)
    }
}

impl Error for InvalidId {}
