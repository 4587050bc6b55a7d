//! High-level SDK for jobrepo.
//!
//! [`Repository`] ties the object store, the per-job ref namespaces and the
//! entity record store together: editing goes through its [`Workspace`],
//! status reports through the status engine and commits through the commit
//! orchestrator. This is the main entry point for applications embedding
//! jobrepo.

pub mod commit;
pub mod config;
pub mod error;
pub mod repository;

pub use commit::{entity_path, CommitSummary, LogEntry};
pub use config::{AuthorConfig, RepoConfig};
pub use error::{SdkError, SdkResult};
pub use repository::Repository;

// Re-export key types
pub use jobrepo_diff::{FieldChange, JsonDiff, TreeChange, TreeDiff};
pub use jobrepo_index::{Change, EntityStatus, JobStatus, StatusOptions, Version};
pub use jobrepo_records::{
    Collection, Component, Entity, EntityRecord, Folder, Instance, Validation, Workspace,
};
pub use jobrepo_store::{Commit, Person};
pub use jobrepo_types::{EntityId, EntityKind, EntityState, ObjectId, RecordKey};
