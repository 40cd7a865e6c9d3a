//! In-memory blob store.
//!
//! Counts fetch/put calls so callers can assert load-once and no-op commit
//! behavior, and can simulate an unavailable backend.

use super::{BlobKey, BlobStore, StorageError, StorageResult};
use crate::model::owner::OwnerKey;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    records: Mutex<BTreeMap<BlobKey, Vec<u8>>>,
    fetch_calls: AtomicUsize,
    put_calls: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of storage reads served so far (`fetch` and `fetch_many`).
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Returns a copy of the raw bytes stored at `key`.
    pub fn raw(&self, key: &BlobKey) -> Option<Vec<u8>> {
        self.records
            .lock()
            .ok()
            .and_then(|records| records.get(key).cloned())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|records| records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn records(&self) -> StorageResult<std::sync::MutexGuard<'_, BTreeMap<BlobKey, Vec<u8>>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory blob store marked unavailable".to_string(),
            ));
        }
        self.records
            .lock()
            .map_err(|_| StorageError::Unavailable("memory blob store lock poisoned".to_string()))
    }
}

impl BlobStore for MemoryBlobStore {
    fn fetch(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.records()?.get(key).cloned())
    }

    fn put(&self, key: &BlobKey, blob: &[u8]) -> StorageResult<()> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.records()?.insert(key.clone(), blob.to_vec());
        Ok(())
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<bool> {
        Ok(self.records()?.remove(key).is_some())
    }

    fn fetch_many(
        &self,
        table: &str,
        store: &str,
        owners: &[OwnerKey],
    ) -> StorageResult<BTreeMap<OwnerKey, Vec<u8>>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records()?;
        Ok(owners
            .iter()
            .filter_map(|owner| {
                let key = BlobKey::new(table, store, owner.clone());
                records.get(&key).map(|blob| (owner.clone(), blob.clone()))
            })
            .collect())
    }
}
