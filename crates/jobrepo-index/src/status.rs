//! Status report types.

use jobrepo_diff::JsonDiff;
use jobrepo_types::{EntityId, EntityKind, ObjectId};
use serde::{Deserialize, Serialize};

/// How a staged or working version relates to the committed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Change {
    /// No committed entry exists for this id.
    Created,
    /// The committed entry has a different hash.
    Modified,
    /// The committed entry has the same hash.
    Unchanged,
}

impl Change {
    /// Classify a version hash against the committed entry id, if any.
    pub fn classify(hash: &ObjectId, committed: Option<&ObjectId>) -> Self {
        match committed {
            None => Self::Created,
            Some(c) if c == hash => Self::Unchanged,
            Some(_) => Self::Modified,
        }
    }

    pub fn is_pending(&self) -> bool {
        !matches!(self, Self::Unchanged)
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Unchanged => "unchanged",
        })
    }
}

/// One staged or working version and its classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    pub hash: ObjectId,
    pub change: Change,
}

/// Three-way status of one entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityStatus {
    pub id: EntityId,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged: Option<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unstaged: Option<Version>,
    /// Entry id in the committed tree.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed: Option<ObjectId>,
    /// Reachable from the job's current containment roots.
    pub attached: bool,
    /// Field-level diff from the committed version to the newest version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<JsonDiff>,
}

impl EntityStatus {
    pub fn is_detached(&self) -> bool {
        !self.attached
    }

    /// The newest classification: working if present, else staged.
    pub fn change(&self) -> Option<Change> {
        self.unstaged.or(self.staged).map(|v| v.change)
    }

    /// Whether anything here differs from the committed tree.
    pub fn is_pending(&self) -> bool {
        self.staged.is_some_and(|v| v.change.is_pending())
            || self.unstaged.is_some_and(|v| v.change.is_pending())
    }
}

/// Per-table status of one job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub job: EntityId,
    /// Commit the comparison was made against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub head: Option<ObjectId>,
    pub collection: Vec<EntityStatus>,
    pub folders: Vec<EntityStatus>,
    pub components: Vec<EntityStatus>,
    pub instances: Vec<EntityStatus>,
}

impl JobStatus {
    pub fn new(job: EntityId, head: Option<ObjectId>) -> Self {
        Self {
            job,
            head,
            collection: Vec::new(),
            folders: Vec::new(),
            components: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn table(&self, kind: EntityKind) -> &[EntityStatus] {
        match kind {
            EntityKind::Collection => &self.collection,
            EntityKind::Folder => &self.folders,
            EntityKind::Component => &self.components,
            EntityKind::Instance => &self.instances,
        }
    }

    pub fn table_mut(&mut self, kind: EntityKind) -> &mut Vec<EntityStatus> {
        match kind {
            EntityKind::Collection => &mut self.collection,
            EntityKind::Folder => &mut self.folders,
            EntityKind::Component => &mut self.components,
            EntityKind::Instance => &mut self.instances,
        }
    }

    pub fn get(&self, kind: EntityKind, id: &EntityId) -> Option<&EntityStatus> {
        self.table(kind).iter().find(|s| &s.id == id)
    }

    /// Every entry, collection first.
    pub fn iter(&self) -> impl Iterator<Item = &EntityStatus> {
        EntityKind::ALL.into_iter().flat_map(|k| self.table(k).iter())
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose newest version has the given classification.
    pub fn with_change(&self, change: Change) -> impl Iterator<Item = &EntityStatus> {
        self.iter().filter(move |s| s.change() == Some(change))
    }

    /// `true` when no entry differs from the committed tree.
    pub fn is_clean(&self) -> bool {
        !self.iter().any(EntityStatus::is_pending)
    }
}
