//! Working-copy operations: saving, staging and unstaging entity rows.
//!
//! Per entity id the store holds at most one row in each state. Saving
//! replaces the unstaged row, staging replaces the staged row, and the
//! commit path replaces the committed row.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use jobrepo_types::{EntityId, EntityKind, EntityState};
use tracing::{debug, info};

use crate::collection::Collection;
use crate::entity::{Entity, EntityRecord, Folder};
use crate::error::{invalid, RecordError, RecordResult};
use crate::store::{RecordFilter, RecordStore, Transaction};

/// Whether [`Workspace::save_with`] runs the entity's validity predicate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Validation {
    #[default]
    Enforce,
    Bypass,
}

/// Entry point for mutating a job's working set.
#[derive(Clone)]
pub struct Workspace {
    records: Arc<dyn RecordStore>,
}

impl Workspace {
    pub fn new(records: Arc<dyn RecordStore>) -> Self {
        Self { records }
    }

    /// The underlying record store.
    pub fn records(&self) -> &Arc<dyn RecordStore> {
        &self.records
    }

    /// Validate and save an entity as the working copy of its id.
    pub async fn save<E: Entity>(&self, entity: E) -> RecordResult<E> {
        self.save_with(entity, Validation::Enforce).await
    }

    /// Save an entity, optionally skipping validation.
    ///
    /// The entity is rehashed and stored `unstaged`, replacing any previous
    /// working copy. If its content equals the staged or committed version,
    /// that row is kept and the working copy is dropped instead.
    pub async fn save_with<E: Entity>(&self, entity: E, validation: Validation) -> RecordResult<E> {
        if validation == Validation::Enforce {
            entity.validate()?;
        }
        let mut record = entity.into_record();
        record.set_state(EntityState::Unstaged);
        let hash = record.rehash()?;

        let existing = self.records.versions(E::KIND, record.id()).await?;
        if let EntityRecord::Collection(new) = &mut record {
            new.modified = Utc::now();
            if let Some(created) = existing.iter().find_map(|row| match row {
                EntityRecord::Collection(old) => Some(old.created),
                _ => None,
            }) {
                new.created = created;
            }
            if validation == Validation::Enforce {
                if existing.is_empty() {
                    self.check_shortname_free(new).await?;
                }
                check_shortname_unchanged(new, &existing)?;
            }
        }

        let mut tx = Transaction::new();
        let mut kept = None;
        for row in &existing {
            if row.hash() == hash {
                if row.state() != EntityState::Unstaged {
                    kept = Some(row.clone());
                }
            } else if row.state() == EntityState::Unstaged {
                tx = tx.delete(E::KIND, row.key());
            }
        }
        let saved = match kept {
            Some(row) => row,
            None => {
                tx = tx.put(record.clone());
                record
            }
        };
        self.records.transaction(tx).await?;
        debug!(kind = %E::KIND, id = %saved.id(), hash = %hash.short_hex(), state = %saved.state(), "saved entity");

        E::from_record(saved).ok_or(RecordError::KindMismatch {
            expected: E::KIND,
            actual: E::KIND,
        })
    }

    /// Create a job: the collection plus one root folder per declared folder
    /// type and the `component` root, written in one transaction.
    ///
    /// The shortname names the job's ref namespace, so a name whose
    /// shortname is already taken by another job is rejected.
    pub async fn create_job(
        &self,
        name: &str,
        owner: &str,
        group: &str,
        order: Vec<String>,
    ) -> RecordResult<Collection> {
        let mut collection = Collection::create(name, owner, group, order);
        collection.validate()?;
        self.check_shortname_free(&collection).await?;

        let mut tx = Transaction::new();
        let root_types: Vec<String> = collection.root_types().map(str::to_string).collect();
        for kind in root_types {
            let mut root = Folder::new(collection.id.clone(), kind.clone(), kind.clone(), None);
            root.rehash()?;
            collection.folders.roots.insert(kind, root.id.clone());
            tx = tx.put(root.into_record());
        }
        collection.rehash()?;
        tx = tx.put(collection.clone().into_record());
        self.records.transaction(tx).await?;

        info!(job = %collection.id, shortname = %collection.shortname, "created job");
        Ok(collection)
    }

    /// Fails if a collection with another id already uses this shortname.
    async fn check_shortname_free(&self, collection: &Collection) -> RecordResult<()> {
        let rows = self
            .records
            .query(EntityKind::Collection, &RecordFilter::default())
            .await?;
        let taken = rows.iter().any(|row| {
            matches!(row, EntityRecord::Collection(other)
                if other.id != collection.id && other.shortname == collection.shortname)
        });
        if taken {
            return Err(invalid(
                collection,
                format!("shortname {:?} is already used by another job", collection.shortname),
            ));
        }
        Ok(())
    }

    /// The current version of the job's collection (working, else staged,
    /// else committed).
    pub async fn collection(&self, job: &EntityId) -> RecordResult<Collection> {
        let rows = self.records.versions(EntityKind::Collection, job).await?;
        pick_current(rows)
            .and_then(Collection::from_record)
            .ok_or_else(|| RecordError::NotFound {
                kind: EntityKind::Collection,
                id: job.clone(),
            })
    }

    /// Current version of every entity of `kind` in the job, keyed by id.
    pub async fn current(
        &self,
        kind: EntityKind,
        job: &EntityId,
    ) -> RecordResult<BTreeMap<EntityId, EntityRecord>> {
        let rows = self.records.query(kind, &RecordFilter::job(job)).await?;
        let mut by_id: BTreeMap<EntityId, Vec<EntityRecord>> = BTreeMap::new();
        for row in rows {
            by_id.entry(row.id().clone()).or_default().push(row);
        }
        Ok(by_id
            .into_iter()
            .filter_map(|(id, rows)| pick_current(rows).map(|r| (id, r)))
            .collect())
    }

    /// Stage the working copy of each selected entity.
    ///
    /// Returns the number of rows staged. Entities without a working copy are
    /// skipped.
    pub async fn stage(&self, job: &EntityId, selection: &[(EntityKind, EntityId)]) -> RecordResult<usize> {
        let mut tx = Transaction::new();
        let mut staged = 0;
        for (kind, id) in selection {
            let rows = self.job_versions(*kind, job, id).await?;
            let Some(working) = rows.iter().find(|r| r.state() == EntityState::Unstaged) else {
                continue;
            };
            for old in rows.iter().filter(|r| r.state() == EntityState::Staged) {
                tx = tx.delete(*kind, old.key());
            }
            tx = tx.transition(*kind, working.key(), EntityState::Unstaged, EntityState::Staged);
            staged += 1;
        }
        if staged > 0 {
            self.records.transaction(tx.expect_transitions(staged)).await?;
        }
        info!(job = %job, staged, "staged entities");
        Ok(staged)
    }

    /// Stage every working copy in the job, across all tables.
    pub async fn stage_all(&self, job: &EntityId) -> RecordResult<usize> {
        let selection = self.selection_in_state(job, EntityState::Unstaged).await?;
        self.stage(job, &selection).await
    }

    /// Move staged rows back to the working set.
    ///
    /// When the id already has a newer working copy the staged row is
    /// dropped instead.
    pub async fn unstage(&self, job: &EntityId, selection: &[(EntityKind, EntityId)]) -> RecordResult<usize> {
        let mut tx = Transaction::new();
        let mut unstaged = 0;
        let mut transitions = 0;
        for (kind, id) in selection {
            let rows = self.job_versions(*kind, job, id).await?;
            let Some(staged) = rows.iter().find(|r| r.state() == EntityState::Staged) else {
                continue;
            };
            if rows.iter().any(|r| r.state() == EntityState::Unstaged) {
                tx = tx.delete(*kind, staged.key());
            } else {
                tx = tx.transition(*kind, staged.key(), EntityState::Staged, EntityState::Unstaged);
                transitions += 1;
            }
            unstaged += 1;
        }
        if unstaged > 0 {
            self.records.transaction(tx.expect_transitions(transitions)).await?;
        }
        info!(job = %job, unstaged, "unstaged entities");
        Ok(unstaged)
    }

    /// `(kind, id)` of every row of the job in `state`.
    pub async fn selection_in_state(
        &self,
        job: &EntityId,
        state: EntityState,
    ) -> RecordResult<Vec<(EntityKind, EntityId)>> {
        let mut selection = Vec::new();
        for kind in EntityKind::ALL {
            let rows = self
                .records
                .query(kind, &RecordFilter::job(job).with_state(state))
                .await?;
            selection.extend(rows.into_iter().map(|r| (kind, r.id().clone())));
        }
        Ok(selection)
    }

    async fn job_versions(
        &self,
        kind: EntityKind,
        job: &EntityId,
        id: &EntityId,
    ) -> RecordResult<Vec<EntityRecord>> {
        self.records
            .query(kind, &RecordFilter::job(job).with_id(id))
            .await
    }
}

/// Working copy beats staged beats committed.
fn pick_current(rows: Vec<EntityRecord>) -> Option<EntityRecord> {
    rows.into_iter().min_by_key(|r| r.state())
}

fn check_shortname_unchanged(new: &Collection, existing: &[EntityRecord]) -> RecordResult<()> {
    for row in existing {
        if let EntityRecord::Collection(old) = row {
            if old.shortname != new.shortname {
                return Err(RecordError::InvalidEntity {
                    kind: EntityKind::Collection,
                    id: new.id.clone(),
                    reason: format!(
                        "shortname is immutable (was {:?}, now {:?})",
                        old.shortname, new.shortname
                    ),
                });
            }
        }
    }
    Ok(())
}
