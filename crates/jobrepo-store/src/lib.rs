//! Content-addressed object storage for jobrepo.
//!
//! Every committed entity version, directory listing and snapshot is stored
//! as an immutable object identified by the SHA-1 of its framed bytes, using
//! the same encodings git uses for blobs, trees and commits.
//!
//! # Object Types
//!
//! - [`Blob`] -- serialized entity content
//! - [`Tree`] -- sorted directory listing mapping names to object references
//! - [`Commit`] -- root tree plus parent, authorship and message
//!
//! # Storage Backends
//!
//! All backends implement the async [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`FsObjectStore`] -- loose objects on disk, written atomically
//!
//! [`ObjectStoreExt`] adds typed `save_as` / `load_as` on top of any backend.

pub mod error;
pub mod fs;
pub mod memory;
pub mod object;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use fs::FsObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::{
    Blob, Commit, EntryMode, ObjectBody, ObjectKind, Person, StoredObject, Tree, TreeEntry,
};
pub use traits::{ObjectStore, ObjectStoreExt};
