//! Associated strategy: the blob lives in a separate record keyed by owner.
//!
//! # Invariants
//! - Storage is read at most once until `invalidate` (owner reload).
//! - A successful save refreshes the cache with the written bytes.

use super::{BackendError, BackendResult};
use crate::codec::{decode_map, encode_map, AttributeMap};
use crate::model::owner::{OwnerContext, OwnerKey};
use crate::schema::StoreSchema;
use crate::storage::{BlobKey, BlobStore};
use log::error;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
enum CachedRecord {
    Missing,
    Present(Vec<u8>),
}

pub struct AssociatedBackend {
    table: String,
    blob_store: Arc<dyn BlobStore>,
    cached: Option<CachedRecord>,
}

impl AssociatedBackend {
    pub fn new(table: String, blob_store: Arc<dyn BlobStore>) -> Self {
        Self {
            table,
            blob_store,
            cached: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns whether the associated record has been fetched (or primed).
    pub fn is_cached(&self) -> bool {
        self.cached.is_some()
    }

    /// Seeds the cache from a batch prefetch. `None` means "no record".
    pub fn prime(&mut self, blob: Option<Vec<u8>>) {
        self.cached = Some(match blob {
            Some(bytes) => CachedRecord::Present(bytes),
            None => CachedRecord::Missing,
        });
    }

    pub fn invalidate(&mut self) {
        self.cached = None;
    }

    pub fn load(
        &mut self,
        owner: &dyn OwnerContext,
        schema: &StoreSchema,
    ) -> BackendResult<AttributeMap> {
        if self.cached.is_none() {
            let key = self.key(owner.owner_key(), schema);
            let fetched = self.blob_store.fetch(&key).map_err(|source| {
                error!(
                    "event=store_load module=backend status=error store={} owner={} error={}",
                    schema.name(),
                    key.owner,
                    source
                );
                BackendError::Unavailable {
                    operation: "load",
                    store: schema.name().to_string(),
                    source,
                }
            })?;
            self.prime(fetched);
        }

        match &self.cached {
            Some(CachedRecord::Present(blob)) if !blob.is_empty() => decode_map(blob, schema)
                .map_err(|source| BackendError::Codec {
                    store: schema.name().to_string(),
                    source,
                }),
            _ => Ok(AttributeMap::default()),
        }
    }

    /// Writes `map` immediately, creating the record when absent.
    pub fn save(
        &mut self,
        owner: &dyn OwnerContext,
        schema: &StoreSchema,
        map: &AttributeMap,
    ) -> BackendResult<()> {
        let bytes = encode_map(map, schema).map_err(|source| BackendError::Codec {
            store: schema.name().to_string(),
            source,
        })?;
        let key = self.key(owner.owner_key(), schema);
        self.blob_store.put(&key, &bytes).map_err(|source| {
            error!(
                "event=store_save module=backend status=error store={} owner={} error={}",
                schema.name(),
                key.owner,
                source
            );
            BackendError::Unavailable {
                operation: "save",
                store: schema.name().to_string(),
                source,
            }
        })?;
        self.cached = Some(CachedRecord::Present(bytes));
        Ok(())
    }

    fn key(&self, owner: OwnerKey, schema: &StoreSchema) -> BlobKey {
        BlobKey::new(self.table.clone(), schema.name(), owner)
    }
}
