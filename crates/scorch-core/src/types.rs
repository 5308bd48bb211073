//! Core types for Scorch

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A named top-level collection in the graph store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionRoot {
    Users,
    Conversations,
    Messages,
    Friendships,
    Profiles,
}

impl CollectionRoot {
    /// All collection roots, in purge order
    pub const ALL: [CollectionRoot; 5] = [
        CollectionRoot::Users,
        CollectionRoot::Conversations,
        CollectionRoot::Messages,
        CollectionRoot::Friendships,
        CollectionRoot::Profiles,
    ];

    /// Path segment used in the store
    pub fn name(&self) -> &'static str {
        match self {
            CollectionRoot::Users => "users",
            CollectionRoot::Conversations => "conversations",
            CollectionRoot::Messages => "messages",
            CollectionRoot::Friendships => "friendships",
            CollectionRoot::Profiles => "profiles",
        }
    }

    /// Capitalized singular noun used in ledger messages ("User", "Conversation")
    pub fn entity_noun(&self) -> &'static str {
        match self {
            CollectionRoot::Users => "User",
            CollectionRoot::Conversations => "Conversation",
            CollectionRoot::Messages => "Message",
            CollectionRoot::Friendships => "Friendship",
            CollectionRoot::Profiles => "Profile",
        }
    }

    /// Path of the root node itself
    pub fn path(&self) -> StorePath {
        StorePath::new(self.name())
    }

    /// Path of one child of this root
    pub fn child(&self, key: &str) -> StorePath {
        self.path().child(key)
    }
}

impl fmt::Display for CollectionRoot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CollectionRoot {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectionRoot::ALL
            .into_iter()
            .find(|root| root.name() == s)
            .ok_or_else(|| format!("unknown collection root '{}'", s))
    }
}

/// Prefix of a per-identity personal root (`~<id>`)
pub const PERSONAL_ROOT_PREFIX: char = '~';

/// A concrete, `/`-separated location in the graph store
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorePath(String);

impl StorePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The personal-identity root for an entity (`~<id>`)
    pub fn personal(id: &str) -> Self {
        Self(format!("{}{}", PERSONAL_ROOT_PREFIX, id))
    }

    pub fn child(&self, key: &str) -> Self {
        Self(format!("{}/{}", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// If this path is a direct child of `parent`, return the child key
    pub fn key_under(&self, parent: &StorePath) -> Option<&str> {
        let rest = self.0.strip_prefix(parent.as_str())?.strip_prefix('/')?;
        if rest.is_empty() || rest.contains('/') {
            None
        } else {
            Some(rest)
        }
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value held at a store path
///
/// Deletion is expressed as [`StoreValue::Tombstone`], the store's
/// distinguished "absent" sentinel, never as physical removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreValue {
    Tombstone,
    Node(Map<String, Value>),
}

impl StoreValue {
    pub fn is_tombstone(&self) -> bool {
        matches!(self, StoreValue::Tombstone)
    }

    /// Build a node value from a JSON object; non-objects are wrapped as `{"value": v}`
    pub fn node(value: Value) -> Self {
        match value {
            Value::Object(map) => StoreValue::Node(map),
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                StoreValue::Node(map)
            }
        }
    }

    pub fn as_node(&self) -> Option<&Map<String, Value>> {
        match self {
            StoreValue::Node(map) => Some(map),
            StoreValue::Tombstone => None,
        }
    }
}

/// Ordered phases of a destruction run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Users,
    Conversations,
    Messages,
    Friendships,
    InternalStoreClear,
    AntiRecoveryOverwrite,
    /// Not part of the ordered run; labels ledger entries written by `quick_reset`
    QuickReset,
}

impl Phase {
    /// The six phases of a full run, in execution order
    pub const ORDERED: [Phase; 6] = [
        Phase::Users,
        Phase::Conversations,
        Phase::Messages,
        Phase::Friendships,
        Phase::InternalStoreClear,
        Phase::AntiRecoveryOverwrite,
    ];

    /// The collection a tombstoning phase enumerates, if any
    pub fn collection(&self) -> Option<CollectionRoot> {
        match self {
            Phase::Users => Some(CollectionRoot::Users),
            Phase::Conversations => Some(CollectionRoot::Conversations),
            Phase::Messages => Some(CollectionRoot::Messages),
            Phase::Friendships => Some(CollectionRoot::Friendships),
            _ => None,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Users => "Users",
            Phase::Conversations => "Conversations",
            Phase::Messages => "Messages",
            Phase::Friendships => "Friendships",
            Phase::InternalStoreClear => "InternalStoreClear",
            Phase::AntiRecoveryOverwrite => "AntiRecoveryOverwrite",
            Phase::QuickReset => "QuickReset",
        };
        f.write_str(name)
    }
}

/// Process-wide state of the destruction run guard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::Running => write!(f, "Running"),
            RunState::Completed => write!(f, "Completed"),
            RunState::Failed => write!(f, "Failed"),
        }
    }
}
