use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::object::ObjectId;

/// Identifier of a domain entity (collection, folder, component, instance).
///
/// Entity ids double as tree entry names in committed snapshots, so they are
/// plain strings. New ids are time-ordered UUID v7 values.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    /// Generate a new time-ordered entity id (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the id can be used as a single tree path component.
    pub fn is_path_safe(&self) -> bool {
        !self.0.is_empty()
            && self.0 != "."
            && self.0 != ".."
            && !self.0.contains(['/', '\0'])
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The kind of a domain entity. Each kind is stored in its own record table
/// and, except for the collection itself, in its own subtree of a commit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Collection,
    Folder,
    Component,
    Instance,
}

impl EntityKind {
    /// Every kind, collection first.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Collection,
        EntityKind::Folder,
        EntityKind::Component,
        EntityKind::Instance,
    ];

    /// The kinds that live under a table subtree of a commit.
    pub const ELEMENTS: [EntityKind; 3] = [
        EntityKind::Folder,
        EntityKind::Component,
        EntityKind::Instance,
    ];

    /// Record table name for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            Self::Collection => "collections",
            Self::Folder => "folders",
            Self::Component => "components",
            Self::Instance => "instances",
        }
    }

    /// Name of the commit subtree holding this kind, if any.
    ///
    /// The collection blob sits at the tree root under the job id.
    pub fn tree_dir(&self) -> Option<&'static str> {
        match self {
            Self::Collection => None,
            other => Some(other.table()),
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Collection => "collection",
            Self::Folder => "folder",
            Self::Component => "component",
            Self::Instance => "instance",
        };
        f.write_str(s)
    }
}

impl FromStr for EntityKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" | "collections" => Ok(Self::Collection),
            "folder" | "folders" => Ok(Self::Folder),
            "component" | "components" => Ok(Self::Component),
            "instance" | "instances" => Ok(Self::Instance),
            other => Err(TypeError::UnknownKind(other.to_string())),
        }
    }
}

/// Lifecycle state of a stored entity version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityState {
    /// Working copy, not yet selected for the next commit.
    #[default]
    Unstaged,
    /// Selected for inclusion in the next commit.
    Staged,
    /// Included in a commit that the ref points at (or once did).
    Committed,
}

impl fmt::Display for EntityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unstaged => "unstaged",
            Self::Staged => "staged",
            Self::Committed => "committed",
        };
        f.write_str(s)
    }
}

impl FromStr for EntityState {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unstaged" => Ok(Self::Unstaged),
            "staged" => Ok(Self::Staged),
            "committed" => Ok(Self::Committed),
            other => Err(TypeError::UnknownState(other.to_string())),
        }
    }
}

/// Storage key of one entity version: the `(hash, id)` pair.
///
/// Several historical versions of the same id coexist under different hashes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub hash: ObjectId,
    pub id: EntityId,
}

impl RecordKey {
    pub fn new(hash: ObjectId, id: EntityId) -> Self {
        Self { hash, id }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.hash.short_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unique_and_path_safe() {
        let a = EntityId::generate();
        let b = EntityId::generate();
        assert_ne!(a, b);
        assert!(a.is_path_safe());
    }

    #[test]
    fn path_safety() {
        assert!(EntityId::new("folder-1").is_path_safe());
        assert!(!EntityId::new("").is_path_safe());
        assert!(!EntityId::new("a/b").is_path_safe());
        assert!(!EntityId::new("..").is_path_safe());
    }

    #[test]
    fn kind_tables_and_dirs() {
        assert_eq!(EntityKind::Folder.table(), "folders");
        assert_eq!(EntityKind::Collection.tree_dir(), None);
        assert_eq!(EntityKind::Instance.tree_dir(), Some("instances"));
    }

    #[test]
    fn kind_parse_accepts_singular_and_table_names() {
        assert_eq!("folder".parse::<EntityKind>().unwrap(), EntityKind::Folder);
        assert_eq!("components".parse::<EntityKind>().unwrap(), EntityKind::Component);
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn state_serde_is_lowercase() {
        let json = serde_json::to_string(&EntityState::Staged).unwrap();
        assert_eq!(json, "\"staged\"");
        assert_eq!(EntityState::default(), EntityState::Unstaged);
    }

    #[test]
    fn entity_id_serializes_transparently() {
        let id = EntityId::new("abc");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"abc\"");
    }
}
