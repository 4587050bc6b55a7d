//! Domain entities and the working set for jobrepo.
//!
//! A job is a [`Collection`] plus the [`Folder`], [`Component`] and
//! [`Instance`] rows that belong to it. Rows live in a [`RecordStore`], keyed
//! by `(hash, id)`, and move through the `unstaged -> staged -> committed`
//! lifecycle. [`Workspace`] implements saving, staging and unstaging on top
//! of any record store.
//!
//! # Backends
//!
//! - [`InMemoryRecordStore`] -- `BTreeMap` tables, optionally mirrored to a
//!   JSON snapshot file

pub mod collection;
pub mod entity;
pub mod error;
pub mod memory;
pub mod store;
pub mod workspace;

pub use collection::{is_safe_shortname, slugify, Collection, FolderLayout, COMPONENT_ROOT};
pub use entity::{
    tracked_json_of, Component, Entity, EntityRecord, Folder, Instance, UNTRACKED_FIELDS,
};
pub use error::{RecordError, RecordResult};
pub use memory::InMemoryRecordStore;
pub use store::{RecordFilter, RecordStore, Transaction, TxOutcome, WriteOp};
pub use workspace::{Validation, Workspace};
