//! Memoized store views for one owner instance.

use super::{AttributeStore, StoreResult};
use crate::backend::Backend;
use crate::model::owner::OwnerContext;
use crate::model::value::Slot;
use crate::schema::SchemaRegistry;
use crate::storage::BlobStore;
use serde_json::Value as Json;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

/// All attribute stores of one owner instance, created on first access.
pub struct StoreSet {
    owner_type: String,
    registry: Arc<SchemaRegistry>,
    blob_store: Option<Arc<dyn BlobStore>>,
    stores: BTreeMap<String, AttributeStore>,
}

impl StoreSet {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        owner_type: impl Into<String>,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            registry,
            blob_store,
            stores: BTreeMap::new(),
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Returns the store named `name`, creating it empty on first access.
    ///
    /// # Errors
    /// - `Schema(UndefinedStore)` when the owner type has no such store.
    /// - `Backend(MissingBlobStore)` for associated stores without storage.
    pub fn store(&mut self, name: &str) -> StoreResult<&mut AttributeStore> {
        match self.stores.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let schema = self.registry.lookup(&self.owner_type, name)?;
                let backend = Backend::for_schema(&schema, self.blob_store.clone())?;
                Ok(entry.insert(AttributeStore::new(schema, backend)))
            }
        }
    }

    /// Returns a store only if it was already accessed on this instance.
    pub fn bound_mut(&mut self, name: &str) -> Option<&mut AttributeStore> {
        self.stores.get_mut(name)
    }

    pub fn get(
        &mut self,
        owner: &dyn OwnerContext,
        store: &str,
        attribute: &str,
    ) -> StoreResult<Slot> {
        self.store(store)?.get(owner, attribute)
    }

    pub fn get_flag(
        &mut self,
        owner: &dyn OwnerContext,
        store: &str,
        attribute: &str,
    ) -> StoreResult<bool> {
        self.store(store)?.get_flag(owner, attribute)
    }

    pub fn set(
        &mut self,
        owner: &dyn OwnerContext,
        store: &str,
        attribute: &str,
        raw: impl Into<Json>,
    ) -> StoreResult<Slot> {
        self.store(store)?.set(owner.as_fields(), attribute, raw)
    }

    /// Returns whether any bound store has uncommitted writes.
    pub fn is_dirty(&self) -> bool {
        self.stores.values().any(AttributeStore::is_dirty)
    }

    /// Seeds an associated store's cache from a batch prefetch.
    pub fn prime_associated(&mut self, store: &str, blob: Option<Vec<u8>>) -> StoreResult<bool> {
        Ok(self.store(store)?.prime_associated(blob))
    }

    pub fn confirm_staged_all(&mut self) {
        self.stores.values_mut().for_each(AttributeStore::confirm_staged);
    }

    pub fn abandon_staged_all(&mut self) {
        self.stores.values_mut().for_each(AttributeStore::abandon_staged);
    }

    /// Discards every bound store (owner reload).
    pub fn discard_all(&mut self) {
        self.stores.values_mut().for_each(AttributeStore::discard);
    }
}
