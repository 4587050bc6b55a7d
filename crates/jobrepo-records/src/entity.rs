use std::collections::BTreeMap;

use jobrepo_crypto::{canonical_json, ContentHasher};
use jobrepo_dag::ParentLink;
use jobrepo_types::{EntityId, EntityKind, EntityState, ObjectId, RecordKey};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::collection::Collection;
use crate::error::{invalid, RecordResult};

/// JSON keys that never contribute to an entity's content hash.
pub const UNTRACKED_FIELDS: [&str; 5] = ["id", "hash", "state", "modified", "created"];

/// Behaviour shared by every persisted domain entity.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// The table this entity lives in.
    const KIND: EntityKind;

    fn id(&self) -> &EntityId;
    /// The owning job. A collection is its own job.
    fn job(&self) -> &EntityId;
    fn hash(&self) -> ObjectId;
    fn set_hash(&mut self, hash: ObjectId);
    fn state(&self) -> EntityState;
    fn set_state(&mut self, state: EntityState);

    /// Kind-specific validity predicate. `Err` carries the reason.
    fn check(&self) -> Result<(), String>;

    fn into_record(self) -> EntityRecord;
    fn from_record(record: EntityRecord) -> Option<Self>;

    /// The `(hash, id)` storage key of this version.
    fn key(&self) -> RecordKey {
        RecordKey::new(self.hash(), self.id().clone())
    }

    /// Canonical JSON of the tracked properties only.
    fn tracked_json(&self) -> RecordResult<String> {
        tracked_json_of(serde_json::to_value(self)?)
    }

    /// Content hash of the tracked properties (the git blob id of
    /// [`tracked_json`](Entity::tracked_json)).
    fn compute_hash(&self) -> RecordResult<ObjectId> {
        Ok(ContentHasher::BLOB.hash(self.tracked_json()?.as_bytes()))
    }

    /// Recompute and store the content hash.
    fn rehash(&mut self) -> RecordResult<ObjectId> {
        let hash = self.compute_hash()?;
        self.set_hash(hash);
        Ok(hash)
    }

    /// Full validity check: path-safe ids plus [`check`](Entity::check).
    fn validate(&self) -> RecordResult<()> {
        if !self.id().is_path_safe() {
            return Err(invalid(self, "id is not usable as a path component"));
        }
        if !self.job().is_path_safe() {
            return Err(invalid(self, "job id is not usable as a path component"));
        }
        self.check().map_err(|reason| invalid(self, reason))
    }
}

/// Strip untracked keys from an entity's JSON and encode it canonically.
pub fn tracked_json_of(mut value: Value) -> RecordResult<String> {
    if let Value::Object(map) = &mut value {
        for key in UNTRACKED_FIELDS {
            map.remove(key);
        }
    }
    Ok(canonical_json(&value)?)
}

macro_rules! entity_accessors {
    () => {
        fn id(&self) -> &EntityId {
            &self.id
        }
        fn hash(&self) -> ObjectId {
            self.hash
        }
        fn set_hash(&mut self, hash: ObjectId) {
            self.hash = hash;
        }
        fn state(&self) -> EntityState {
            self.state
        }
        fn set_state(&mut self, state: EntityState) {
            self.state = state;
        }
    };
}
pub(crate) use entity_accessors;

fn check_optional_id(label: &str, id: Option<&EntityId>) -> Result<(), String> {
    match id {
        Some(id) if !id.is_path_safe() => Err(format!("{label} {id:?} is not a valid id")),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Folder
// ---------------------------------------------------------------------------

/// A node in one of a job's folder hierarchies. `parent == None` marks a root.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub id: EntityId,
    pub job: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Folder type, one of the job's declared types or `component`.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub parent: Option<EntityId>,
    #[serde(default = "ObjectId::null")]
    pub hash: ObjectId,
    #[serde(default)]
    pub state: EntityState,
    #[serde(default)]
    pub priority: i64,
}

impl Folder {
    pub fn new(
        job: EntityId,
        name: impl Into<String>,
        kind: impl Into<String>,
        parent: Option<EntityId>,
    ) -> Self {
        Self {
            id: EntityId::generate(),
            job,
            name: name.into(),
            description: String::new(),
            kind: kind.into(),
            parent,
            hash: ObjectId::null(),
            state: EntityState::Unstaged,
            priority: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl Entity for Folder {
    const KIND: EntityKind = EntityKind::Folder;

    entity_accessors!();

    fn job(&self) -> &EntityId {
        &self.job
    }

    fn check(&self) -> Result<(), String> {
        if self.kind.trim().is_empty() {
            return Err("folder type must not be empty".into());
        }
        if self.parent.as_ref() == Some(&self.id) {
            return Err("folder cannot be its own parent".into());
        }
        check_optional_id("parent", self.parent.as_ref())
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Folder(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Folder(f) => Some(f),
            _ => None,
        }
    }
}

impl ParentLink for Folder {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// A component placed in a folder, or nested under another component.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub id: EntityId,
    pub job: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub folder: Option<EntityId>,
    #[serde(default)]
    pub parent: Option<EntityId>,
    /// External reference (catalogue or library key).
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
    #[serde(default = "ObjectId::null")]
    pub hash: ObjectId,
    #[serde(default)]
    pub state: EntityState,
}

impl Component {
    pub fn new(
        job: EntityId,
        name: impl Into<String>,
        folder: Option<EntityId>,
        parent: Option<EntityId>,
    ) -> Self {
        Self {
            id: EntityId::generate(),
            job,
            name: name.into(),
            description: String::new(),
            folder,
            parent,
            reference: None,
            hash: ObjectId::null(),
            state: EntityState::Unstaged,
        }
    }
}

impl Entity for Component {
    const KIND: EntityKind = EntityKind::Component;

    entity_accessors!();

    fn job(&self) -> &EntityId {
        &self.job
    }

    fn check(&self) -> Result<(), String> {
        if self.parent.as_ref() == Some(&self.id) {
            return Err("component cannot be its own parent".into());
        }
        check_optional_id("parent", self.parent.as_ref())?;
        check_optional_id("folder", self.folder.as_ref())
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Component(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Component(c) => Some(c),
            _ => None,
        }
    }
}

impl ParentLink for Component {
    fn id(&self) -> &EntityId {
        &self.id
    }

    fn parent(&self) -> Option<&EntityId> {
        self.parent.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Instance
// ---------------------------------------------------------------------------

/// A placement of a component, filed under one folder per folder type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: EntityId,
    pub job: EntityId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// The component this is an instance of.
    #[serde(rename = "ref")]
    pub component: EntityId,
    /// Folder type -> folder id.
    #[serde(default)]
    pub folders: BTreeMap<String, EntityId>,
    #[serde(default = "ObjectId::null")]
    pub hash: ObjectId,
    #[serde(default)]
    pub state: EntityState,
}

impl Instance {
    pub fn new(
        job: EntityId,
        name: impl Into<String>,
        component: EntityId,
        folders: BTreeMap<String, EntityId>,
    ) -> Self {
        Self {
            id: EntityId::generate(),
            job,
            name: name.into(),
            description: String::new(),
            component,
            folders,
            hash: ObjectId::null(),
            state: EntityState::Unstaged,
        }
    }
}

impl Entity for Instance {
    const KIND: EntityKind = EntityKind::Instance;

    entity_accessors!();

    fn job(&self) -> &EntityId {
        &self.job
    }

    fn check(&self) -> Result<(), String> {
        check_optional_id("ref", Some(&self.component))?;
        for (kind, folder) in &self.folders {
            check_optional_id(&format!("{kind} folder"), Some(folder))?;
        }
        Ok(())
    }

    fn into_record(self) -> EntityRecord {
        EntityRecord::Instance(self)
    }

    fn from_record(record: EntityRecord) -> Option<Self> {
        match record {
            EntityRecord::Instance(i) => Some(i),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// EntityRecord
// ---------------------------------------------------------------------------

/// Any entity, tagged by kind. This is the unit the record store moves around.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entity", rename_all = "lowercase")]
pub enum EntityRecord {
    Collection(Collection),
    Folder(Folder),
    Component(Component),
    Instance(Instance),
}

macro_rules! dispatch {
    ($record:expr, $e:ident => $body:expr) => {
        match $record {
            EntityRecord::Collection($e) => $body,
            EntityRecord::Folder($e) => $body,
            EntityRecord::Component($e) => $body,
            EntityRecord::Instance($e) => $body,
        }
    };
}

impl EntityRecord {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Collection(_) => EntityKind::Collection,
            Self::Folder(_) => EntityKind::Folder,
            Self::Component(_) => EntityKind::Component,
            Self::Instance(_) => EntityKind::Instance,
        }
    }

    pub fn id(&self) -> &EntityId {
        dispatch!(self, e => Entity::id(e))
    }

    pub fn job(&self) -> &EntityId {
        dispatch!(self, e => e.job())
    }

    pub fn hash(&self) -> ObjectId {
        dispatch!(self, e => e.hash())
    }

    pub fn state(&self) -> EntityState {
        dispatch!(self, e => e.state())
    }

    pub fn set_state(&mut self, state: EntityState) {
        dispatch!(self, e => e.set_state(state))
    }

    pub fn key(&self) -> RecordKey {
        dispatch!(self, e => e.key())
    }

    /// Parent pointer for folders and components.
    pub fn parent(&self) -> Option<&EntityId> {
        match self {
            Self::Folder(f) => f.parent.as_ref(),
            Self::Component(c) => c.parent.as_ref(),
            _ => None,
        }
    }

    pub fn tracked_json(&self) -> RecordResult<String> {
        dispatch!(self, e => e.tracked_json())
    }

    pub fn rehash(&mut self) -> RecordResult<ObjectId> {
        dispatch!(self, e => e.rehash())
    }

    pub fn validate(&self) -> RecordResult<()> {
        dispatch!(self, e => e.validate())
    }

    /// The full JSON form, including untracked fields.
    pub fn to_value(&self) -> RecordResult<Value> {
        Ok(dispatch!(self, e => serde_json::to_value(e))?)
    }

    /// Rebuild a record of `kind` from committed tracked JSON.
    ///
    /// Untracked fields are restored from the arguments; timestamps default
    /// to now.
    pub fn from_tracked(
        kind: EntityKind,
        id: &EntityId,
        hash: ObjectId,
        tracked: &[u8],
    ) -> RecordResult<Self> {
        let mut value: Value = serde_json::from_slice(tracked)?;
        if let Value::Object(map) = &mut value {
            map.insert("id".into(), Value::String(id.as_str().to_string()));
            map.insert("hash".into(), serde_json::to_value(hash)?);
            map.insert("state".into(), serde_json::to_value(EntityState::Committed)?);
            if kind == EntityKind::Collection {
                let now = serde_json::to_value(chrono::Utc::now())?;
                map.entry("modified").or_insert_with(|| now.clone());
                map.entry("created").or_insert(now);
            }
        }
        Ok(match kind {
            EntityKind::Collection => Self::Collection(serde_json::from_value(value)?),
            EntityKind::Folder => Self::Folder(serde_json::from_value(value)?),
            EntityKind::Component => Self::Component(serde_json::from_value(value)?),
            EntityKind::Instance => Self::Instance(serde_json::from_value(value)?),
        })
    }
}
