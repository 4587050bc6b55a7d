//! In-memory reference store for testing and ephemeral use.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use jobrepo_types::ObjectId;
use tracing::debug;

use crate::error::{RefError, Result};
use crate::names::validate_ref_name;
use crate::traits::RefStore;

/// An in-memory implementation of [`RefStore`].
///
/// All data lives in a `BTreeMap` behind a `RwLock` and is lost when the
/// store is dropped.
#[derive(Debug, Default)]
pub struct InMemoryRefStore {
    refs: RwLock<BTreeMap<String, ObjectId>>,
}

impl InMemoryRefStore {
    /// Create a new empty ref store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefStore for InMemoryRefStore {
    async fn read_ref(&self, name: &str) -> Result<Option<ObjectId>> {
        let refs = self.refs.read().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs.get(name).copied())
    }

    async fn update_ref(&self, name: &str, id: &ObjectId) -> Result<()> {
        validate_ref_name(name)?;
        let mut refs = self.refs.write().map_err(|_| RefError::LockPoisoned)?;
        let previous = refs.insert(name.to_string(), *id);
        debug!(name, to = %id.short_hex(), from = ?previous.map(|p| p.short_hex()), "updated ref");
        Ok(())
    }

    async fn list_refs(&self, prefix: &str) -> Result<Vec<(String, ObjectId)>> {
        let refs = self.refs.read().map_err(|_| RefError::LockPoisoned)?;
        Ok(refs
            .range(prefix.to_string()..)
            .take_while(|(name, _)| name.starts_with(prefix))
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }
}
