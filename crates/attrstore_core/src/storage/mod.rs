//! Opaque key-addressable blob storage for associated stores.
//!
//! # Responsibility
//! - Define the byte-level storage contract used by associated backends.
//! - Provide SQLite and in-memory implementations.
//!
//! # Invariants
//! - At most one blob exists per `(table, owner, store)` key.
//! - `fetch` distinguishes "no record" (`None`) from an empty record.

mod memory;
mod sqlite;

pub use memory::MemoryBlobStore;
pub use sqlite::SqliteBlobStore;

use crate::model::owner::OwnerKey;
use std::collections::BTreeMap;
use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("invalid table name `{0}`")]
    InvalidTable(String),
}

/// Address of one associated record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlobKey {
    pub table: String,
    pub store: String,
    pub owner: OwnerKey,
}

impl BlobKey {
    pub fn new(table: impl Into<String>, store: impl Into<String>, owner: OwnerKey) -> Self {
        Self {
            table: table.into(),
            store: store.into(),
            owner,
        }
    }
}

/// Byte storage for associated records.
///
/// Implementations are shared across owner instances, hence `Send + Sync`.
pub trait BlobStore: Send + Sync {
    /// Returns the stored blob, or `None` when no record exists.
    fn fetch(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>>;

    /// Creates or replaces the record at `key`.
    fn put(&self, key: &BlobKey, blob: &[u8]) -> StorageResult<()>;

    /// Deletes the record at `key`. Returns whether a record existed.
    fn delete(&self, key: &BlobKey) -> StorageResult<bool>;

    /// Fetches the records of many owners of one store.
    ///
    /// Owners without a record are absent from the result.
    fn fetch_many(
        &self,
        table: &str,
        store: &str,
        owners: &[OwnerKey],
    ) -> StorageResult<BTreeMap<OwnerKey, Vec<u8>>> {
        let mut found = BTreeMap::new();
        for owner in owners {
            let key = BlobKey::new(table, store, owner.clone());
            if let Some(blob) = self.fetch(&key)? {
                found.insert(owner.clone(), blob);
            }
        }
        Ok(found)
    }
}
