//! Reference management for jobrepo.
//!
//! A ref is a named, mutable pointer to a commit id and the only mutable
//! location in a repository. Each job keeps its refs under its own
//! [`RefNamespace`] so several independent histories can share one store.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`traits`]: The async [`RefStore`] trait
//! - [`names`]: Ref name validation and [`RefNamespace`]
//! - [`memory`]: In-memory [`InMemoryRefStore`] for tests
//! - [`fs`]: On-disk [`FsRefStore`]

pub mod error;
pub mod fs;
pub mod memory;
pub mod names;
pub mod traits;

pub use error::{RefError, Result};
pub use fs::FsRefStore;
pub use memory::InMemoryRefStore;
pub use names::{validate_component, validate_ref_name, RefNamespace};
pub use traits::RefStore;
