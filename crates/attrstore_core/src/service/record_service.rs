//! Record lifecycle service for the reference host.
//!
//! # Responsibility
//! - Create, save, reload, find and delete host records.
//! - Drive the lifecycle hooks that flush and discard attribute stores.
//!
//! # Invariants
//! - Associated stores are written before the owner row; a failing row
//!   write after that is reported as `PartialCommitError`.
//! - A failed save leaves every store's pending writes in place.

use crate::backend::BackendError;
use crate::commit::{CommitCoordinator, CommitError, LifecycleHooks, PartialCommitError};
use crate::model::record::{Record, RecordId, RecordRow};
use crate::repo::record_repo::{RecordRepository, RepoError, RepoResult};
use crate::schema::{SchemaRegistry, StorageMode};
use crate::storage::{BlobKey, BlobStore, StorageError};
use crate::store::{StoreError, StoreSet};
use log::{debug, error, info};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use uuid::Uuid;

const OWNER_ROW: &str = "owner row";

#[derive(Debug, Error)]
pub enum SaveError {
    #[error(transparent)]
    Commit(#[from] CommitError),
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    PartialCommit(#[from] PartialCommitError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Use-case service owning the record lifecycle.
pub struct RecordService<R: RecordRepository> {
    repo: R,
    registry: Arc<SchemaRegistry>,
    blob_store: Option<Arc<dyn BlobStore>>,
    hooks: LifecycleHooks<Record>,
}

impl<R: RecordRepository> RecordService<R> {
    /// Creates a service with store commit already wired into its hooks.
    ///
    /// `blob_store` is required only when the registry declares associated
    /// stores.
    pub fn new(
        repo: R,
        registry: Arc<SchemaRegistry>,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        let mut hooks = LifecycleHooks::new();
        CommitCoordinator::install(&mut hooks);
        Self {
            repo,
            registry,
            blob_store,
            hooks,
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Extra callbacks run after the store hooks.
    pub fn hooks_mut(&mut self) -> &mut LifecycleHooks<Record> {
        &mut self.hooks
    }

    /// Builds an unsaved record with a fresh id. Nothing is written.
    pub fn new_record(&self, owner_type: &str) -> Record {
        self.bind(RecordRow::new(owner_type, Uuid::new_v4()))
    }

    /// Loads a record by id; its stores stay unloaded until first access.
    pub fn find(&self, owner_type: &str, id: RecordId) -> RepoResult<Option<Record>> {
        Ok(self
            .repo
            .load_row(owner_type, id)?
            .map(|row| self.bind(row)))
    }

    pub fn list_ids(&self, owner_type: &str) -> RepoResult<Vec<RecordId>> {
        self.repo.list_ids(owner_type)
    }

    /// Saves the owner row together with every dirty attribute store.
    ///
    /// # Errors
    /// - `Commit` when a store fails to commit.
    /// - `Repo` when the row write fails and no associated store was written.
    /// - `PartialCommit` when the row write fails after associated stores
    ///   were already written.
    pub fn save(&self, record: &mut Record) -> Result<(), SaveError> {
        let started_at = Instant::now();

        if let Err(err) = self.hooks.run_before_save(record) {
            record.stores().abandon_staged_all();
            return Err(err.into());
        }
        let persisted = record.take_persisted_stores();

        match self.repo.save_row(record.row()) {
            Ok(()) => {
                let inline_columns = record.row().dirty_columns().count();
                record.row_mut().mark_saved();
                self.hooks.run_after_save(record);
                info!(
                    "event=record_save module=service status=ok owner={} inline_columns={} associated_stores={} duration_ms={}",
                    record.owner_key(),
                    inline_columns,
                    persisted.len(),
                    started_at.elapsed().as_millis()
                );
                Ok(())
            }
            Err(err) => {
                record.stores().abandon_staged_all();
                error!(
                    "event=record_save module=service status=error owner={} associated_stores={} error={}",
                    record.owner_key(),
                    persisted.len(),
                    err
                );
                if persisted.is_empty() {
                    return Err(err.into());
                }
                Err(PartialCommitError {
                    committed_stores: persisted,
                    failed: OWNER_ROW.to_string(),
                    source: Box::new(err),
                }
                .into())
            }
        }
    }

    /// Re-reads the owner row and discards every store's in-memory state.
    ///
    /// # Errors
    /// - `Repo(NotFound)` when the record no longer exists.
    pub fn reload(&self, record: &mut Record) -> Result<(), SaveError> {
        let row = self
            .repo
            .load_row(record.owner_type(), record.id())?
            .ok_or_else(|| RepoError::NotFound {
                owner_type: record.owner_type().to_string(),
                id: record.id(),
            })?;
        record.replace_row(row);
        self.hooks.run_after_reload(record);
        debug!(
            "event=record_reload module=service status=ok owner={}",
            record.owner_key()
        );
        Ok(())
    }

    /// Deletes a record and the associated records of all its stores.
    ///
    /// Returns whether the owner row existed.
    pub fn delete(&self, record: Record) -> Result<bool, SaveError> {
        let owner = record.owner_key();
        if let Some(blob_store) = &self.blob_store {
            for schema in self.registry.stores_for(record.owner_type()) {
                if let StorageMode::Associated { table } = schema.storage() {
                    blob_store.delete(&BlobKey::new(table.as_str(), schema.name(), owner.clone()))?;
                }
            }
        }
        let existed = self.repo.delete_row(record.owner_type(), record.id())?;
        info!(
            "event=record_delete module=service status=ok owner={} existed={}",
            owner, existed
        );
        Ok(existed)
    }

    /// Loads one associated store for many records with one batch read
    /// per owner type.
    ///
    /// Returns how many records were primed. Already loaded stores are
    /// left as they are; inline stores are a no-op. Every owner type is
    /// resolved before anything is fetched, so an undefined store primes
    /// nothing.
    pub fn prefetch(&self, records: &mut [Record], store: &str) -> Result<usize, SaveError> {
        let mut tables: BTreeMap<String, Option<String>> = BTreeMap::new();
        for record in records.iter() {
            if tables.contains_key(record.owner_type()) {
                continue;
            }
            let schema = self
                .registry
                .lookup(record.owner_type(), store)
                .map_err(StoreError::from)?;
            let table = match schema.storage() {
                StorageMode::Associated { table } => Some(table.clone()),
                StorageMode::Inline { .. } => None,
            };
            tables.insert(record.owner_type().to_string(), table);
        }
        if tables.values().all(Option::is_none) {
            return Ok(0);
        }
        let blob_store = self.blob_store.as_ref().ok_or_else(|| {
            StoreError::from(BackendError::MissingBlobStore {
                store: store.to_string(),
            })
        })?;

        let mut primed = 0;
        for (owner_type, table) in &tables {
            let Some(table) = table else {
                continue;
            };
            let owners = records
                .iter()
                .filter(|record| record.owner_type() == owner_type.as_str())
                .map(Record::owner_key)
                .collect::<Vec<_>>();
            let mut blobs = blob_store.fetch_many(table, store, &owners)?;

            for record in records
                .iter_mut()
                .filter(|record| record.owner_type() == owner_type.as_str())
            {
                let blob = blobs.remove(&record.owner_key());
                if record.stores().prime_associated(store, blob)? {
                    primed += 1;
                }
            }
        }
        debug!(
            "event=store_prefetch module=service status=ok store={} records={} owner_types={} primed={}",
            store,
            records.len(),
            tables.len(),
            primed
        );
        Ok(primed)
    }

    fn bind(&self, row: RecordRow) -> Record {
        let stores = StoreSet::new(
            Arc::clone(&self.registry),
            row.owner_type(),
            self.blob_store.clone(),
        );
        Record::new(row, stores)
    }
}
