use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use jobrepo_types::{EntityId, EntityKind, EntityState, ObjectId};
use serde::{Deserialize, Serialize};

use crate::entity::{entity_accessors, Entity, EntityRecord};

/// The folder type every job gets in addition to its declared order.
pub const COMPONENT_ROOT: &str = "component";

/// Declared folder types and the root folder of each.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderLayout {
    /// Folder types in display order, excluding [`COMPONENT_ROOT`].
    pub order: Vec<String>,
    /// Folder type -> root folder id.
    #[serde(default)]
    pub roots: BTreeMap<String, EntityId>,
}

/// A job (or library) root record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: EntityId,
    pub name: String,
    /// URL-safe slug derived from `name`; immutable once set.
    pub shortname: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub owner: String,
    pub group: String,
    #[serde(default)]
    pub folders: FolderLayout,
    #[serde(default = "ObjectId::null")]
    pub hash: ObjectId,
    #[serde(default)]
    pub state: EntityState,
    pub modified: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl Collection {
    /// Build a new, unstaged job collection.
    ///
    /// The shortname is derived from `name`; roots are filled in once the
    /// root folders exist.
    pub fn create(
        name: impl Into<String>,
        owner: impl Into<String>,
        group: impl Into<String>,
        order: Vec<String>,
    ) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: EntityId::generate(),
            shortname: slugify(&name),
            name,
            description: String::new(),
            kind: "job".into(),
            owner: owner.into(),
            group: group.into(),
            folders: FolderLayout {
                order,
                roots: BTreeMap::new(),
            },
            hash: ObjectId::null(),
            state: EntityState::Unstaged,
            modified: now,
            created: now,
        }
    }

    /// Every root folder type: the declared order followed by `component`.
    pub fn root_types(&self) -> impl Iterator<Item = &str> {
        self.folders
            .order
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(COMPONENT_ROOT))
    }

    /// The root folders, defined only once exactly one root exists per
    /// declared type plus the `component` root.
    pub fn folder_roots(&self) -> Option<&BTreeMap<String, EntityId>> {
        let roots = &self.folders.roots;
        let complete = roots.len() == self.folders.order.len() + 1
            && self.root_types().all(|t| roots.contains_key(t));
        complete.then_some(roots)
    }
}

impl Entity for Collection {
    const KIND: EntityKind = EntityKind::Collection;

    entity_accessors!();

    fn job(&self) -> &EntityId {
        &self.id
    }

    fn check(&self) -> Result<(), String> {
        if self.owner.trim().is_empty() {
            return Err("owner must not be empty".into());
        }
        if self.group.trim().is_empty() {
            return Err("group must not be empty".into());
        }
        if !is_safe_shortname(&self.shortname) {
            return Err(format!("unsafe shortname {:?}", self.shortname));
        }
        let mut seen = std::collections::BTreeSet::new();
        for kind in &self.folders.order {
            if kind.is_empty() || kind == COMPONENT_ROOT {
                return Err(format!("invalid folder type {kind:?}"));
            }
            if !seen.insert(kind) {
                return Err(format!("duplicate folder type {kind:?}"));
            }
        }
        if let Some(kind) = self.folders.roots.keys().find(|k| {
            k.as_str() != COMPONENT_ROOT && !self.folders.order.contains(k)
        }) {
            return Err(format!("root for undeclared folder type {kind:?}"));
        }
        Ok(())
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Collection(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Collection(c) => Some(c),
            _ => None,
        }
    }
}

/// Derive a URL-safe shortname: lowercase ASCII letters and digits, runs of
/// anything else collapsed to a single `-`, no leading or trailing dash.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for ch in name.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// `true` for non-empty `[a-z0-9-]` strings without a leading or trailing dash.
pub fn is_safe_shortname(shortname: &str) -> bool {
    !shortname.is_empty()
        && !shortname.starts_with('-')
        && !shortname.ends_with('-')
        && shortname
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}
