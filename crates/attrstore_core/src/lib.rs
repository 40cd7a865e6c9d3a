//! Typed attribute stores for persisted records.
//!
//! Owners declare named stores of typed attributes. Each store is hydrated
//! lazily, buffers writes until the owner is saved, and persists either
//! inline on the owner's row or in an associated table.

pub mod backend;
pub mod codec;
pub mod commit;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod schema;
pub mod service;
pub mod storage;
pub mod store;

pub use backend::{Backend, BackendError, StagedBlob};
pub use codec::{AttributeMap, CodecError, CoercionError, DisallowedValueError};
pub use commit::{
    CommitCoordinator, CommitError, CommitReport, LifecycleHooks, PartialCommitError, StoreHost,
};
pub use logging::{default_log_level, init_logging, init_with_config, logging_status, LoggingConfig};
pub use model::owner::{OwnerContext, OwnerFields, OwnerKey};
pub use model::record::{Record, RecordId, RecordRow};
pub use model::value::{AttrType, AttrValue, Slot};
pub use repo::record_repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};
pub use schema::{
    AttributeOptions, CoercionPolicy, SchemaBuilder, SchemaError, SchemaRegistry, SchemaResult,
    StorageMode, StoreOptions, StoreSchema,
};
pub use service::record_service::{RecordService, SaveError};
pub use storage::{BlobKey, BlobStore, MemoryBlobStore, SqliteBlobStore, StorageError};
pub use store::{AttributeStore, CommitOutcome, StoreError, StoreResult, StoreSet};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
