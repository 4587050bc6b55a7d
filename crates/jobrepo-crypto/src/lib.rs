//! Hashing and canonical encoding for jobrepo.
//!
//! Provides the object frame (`"<kind> <len>\0<body>"`), SHA-1 content
//! hashing over that frame, and canonical JSON for hashing domain entities
//! independently of key insertion order.
//!
//! All hashing wraps an established library; there is no custom cryptography.

pub mod canonical;
pub mod hasher;

pub use canonical::{canonical_json, canonical_value, CanonicalError};
pub use hasher::{frame, unframe, ContentHasher};
