//! Storage strategies behind an attribute store.
//!
//! # Responsibility
//! - Load a store's persisted attribute map for one owner.
//! - Save a merged attribute map, either staged on the owner (inline) or
//!   written to a separate record (associated).
//!
//! # Invariants
//! - The strategy is fixed by the store schema; there is no runtime switch.
//! - Storage failures surface as `BackendError::Unavailable`, never retried.

mod associated;
mod inline;

pub use associated::AssociatedBackend;
pub use inline::InlineBackend;

use crate::codec::{AttributeMap, CodecError};
use crate::model::owner::OwnerContext;
use crate::schema::{StorageMode, StoreSchema};
use crate::storage::{BlobStore, StorageError};
use std::sync::Arc;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend unavailable during {operation} of store `{store}`: {source}")]
    Unavailable {
        operation: &'static str,
        store: String,
        #[source]
        source: StorageError,
    },
    #[error("store `{store}` holds an unreadable blob: {source}")]
    Codec {
        store: String,
        #[source]
        source: CodecError,
    },
    #[error("store `{store}` is associated but no blob store was configured")]
    MissingBlobStore { store: String },
}

/// Encoded inline blob waiting for the owner's own row write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedBlob {
    pub store: String,
    pub column: String,
    pub bytes: Vec<u8>,
}

/// Result of a successful `Backend::save`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Inline: bytes must be written with the owner row.
    Staged(StagedBlob),
    /// Associated: the record was written immediately.
    Persisted,
}

/// Backend selected from a store's `StorageMode`.
pub enum Backend {
    Inline(InlineBackend),
    Associated(AssociatedBackend),
}

impl Backend {
    /// Builds the backend configured by `schema`.
    ///
    /// # Errors
    /// - `MissingBlobStore` for associated stores without a blob store.
    pub fn for_schema(
        schema: &StoreSchema,
        blob_store: Option<Arc<dyn BlobStore>>,
    ) -> BackendResult<Self> {
        match schema.storage() {
            StorageMode::Inline { column } => Ok(Self::Inline(InlineBackend::new(column.clone()))),
            StorageMode::Associated { table } => {
                let blob_store = blob_store.ok_or_else(|| BackendError::MissingBlobStore {
                    store: schema.name().to_string(),
                })?;
                Ok(Self::Associated(AssociatedBackend::new(
                    table.clone(),
                    blob_store,
                )))
            }
        }
    }

    pub fn load(
        &mut self,
        owner: &dyn OwnerContext,
        schema: &StoreSchema,
    ) -> BackendResult<AttributeMap> {
        match self {
            Self::Inline(backend) => backend.load(owner, schema),
            Self::Associated(backend) => backend.load(owner, schema),
        }
    }

    pub fn save(
        &mut self,
        owner: &dyn OwnerContext,
        schema: &StoreSchema,
        map: &AttributeMap,
    ) -> BackendResult<SaveOutcome> {
        match self {
            Self::Inline(backend) => backend.save(schema, map).map(SaveOutcome::Staged),
            Self::Associated(backend) => backend
                .save(owner, schema, map)
                .map(|()| SaveOutcome::Persisted),
        }
    }

    /// Drops any cached storage state so the next load re-reads storage.
    pub fn invalidate(&mut self) {
        if let Self::Associated(backend) = self {
            backend.invalidate();
        }
    }

    pub fn is_associated(&self) -> bool {
        matches!(self, Self::Associated(_))
    }
}
