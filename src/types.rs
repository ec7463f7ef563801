use serde::{Deserialize, Serialize};
use std::fmt;

/// Target identifier (`PREFIX.NUMBER`, e.g. `CC0F1A42.1`)
///
/// Treated as an opaque string everywhere except the protocol client, which
/// validates it before any I/O.
pub type TargetId = String;

/// Fully namespaced protocol method name (e.g. `mylink.move.up`)
pub type Method = String;

/// Namespace prefix for all myLink methods
pub const METHOD_NAMESPACE: &str = "mylink";

/// Shade movement commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Up,
    Down,
    Stop,
}

impl Command {
    /// The wire method for this command
    pub fn method(self) -> &'static str {
        match self {
            Command::Up => "mylink.move.up",
            Command::Down => "mylink.move.down",
            Command::Stop => "mylink.move.stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.method())
    }
}

/// One composite channel and the targets it moves together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeEntry {
    pub target: TargetId,

    /// Component targets; empty for a leaf
    #[serde(default)]
    pub members: Vec<TargetId>,
}

/// Fixed mapping from each target to the targets it subsumes
///
/// Iteration order is insertion order and is significant: the reducer scans
/// entries in this order and the first eligible composite wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<CompositeEntry>", into = "Vec<CompositeEntry>")]
pub struct CompositeMapping {
    entries: Vec<CompositeEntry>,
}

impl CompositeMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a target with its component targets
    ///
    /// Re-registering a target replaces its members but keeps its position.
    pub fn insert<I, T>(&mut self, target: impl Into<TargetId>, members: I)
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetId>,
    {
        let target = target.into();
        let members: Vec<TargetId> = members.into_iter().map(Into::into).collect();
        match self.entries.iter().position(|e| e.target == target) {
            Some(index) => self.entries[index].members = members,
            None => self.entries.push(CompositeEntry { target, members }),
        }
    }

    /// Builder-style variant of [`insert`](Self::insert)
    pub fn with<I, T>(mut self, target: impl Into<TargetId>, members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TargetId>,
    {
        self.insert(target, members);
        self
    }

    /// Component targets of `target`; `None` if the target is unknown
    pub fn members(&self, target: &str) -> Option<&[TargetId]> {
        self.entries
            .iter()
            .find(|e| e.target == target)
            .map(|e| e.members.as_slice())
    }

    /// Iterate over `(target, members)` in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[TargetId])> {
        self.entries
            .iter()
            .map(|e| (e.target.as_str(), e.members.as_slice()))
    }

    /// Iterate over entries that have at least one member
    pub fn composites(&self) -> impl Iterator<Item = (&str, &[TargetId])> {
        self.iter().filter(|(_, members)| !members.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl From<Vec<CompositeEntry>> for CompositeMapping {
    fn from(entries: Vec<CompositeEntry>) -> Self {
        let mut mapping = Self::new();
        for entry in entries {
            mapping.insert(entry.target, entry.members);
        }
        mapping
    }
}

impl From<CompositeMapping> for Vec<CompositeEntry> {
    fn from(mapping: CompositeMapping) -> Self {
        mapping.entries
    }
}

impl<T, I, M> FromIterator<(T, I)> for CompositeMapping
where
    T: Into<TargetId>,
    I: IntoIterator<Item = M>,
    M: Into<TargetId>,
{
    fn from_iter<It: IntoIterator<Item = (T, I)>>(iter: It) -> Self {
        let mut mapping = Self::new();
        for (target, members) in iter {
            mapping.insert(target, members);
        }
        mapping
    }
}
