//! Status engine for jobrepo.
//!
//! Compares three views of a job: the committed tree at a head commit, the
//! staged rows and the working rows of the record store. Every staged or
//! working entity is classified as created, modified or unchanged against
//! its committed entry, and flagged attached or detached relative to the
//! job's current folder roots.
//!
//! # Key Types
//!
//! - [`StatusEngine`] -- runs the comparison for one job
//! - [`JobStatus`] / [`EntityStatus`] -- per-table report
//! - [`CommittedTree`] -- entity ids and hashes read from a commit
//! - [`JobRows`] -- a job's rows grouped by id and state
//! - [`Containment`] -- folder closure and attachment predicates

pub mod committed;
pub mod containment;
pub mod engine;
pub mod error;
pub mod rows;
pub mod status;

pub use committed::CommittedTree;
pub use containment::Containment;
pub use engine::{StatusEngine, StatusOptions};
pub use error::{StatusError, StatusResult};
pub use rows::{JobRows, Versions};
pub use status::{Change, EntityStatus, JobStatus, Version};
