//! Per-owner attribute stores.
//!
//! # Responsibility
//! - Layer pending writes over a lazily hydrated persisted snapshot.
//! - Memoize one store view per store name for each owner instance.
//!
//! # Invariants
//! - Reads resolve `pending` → `persisted` → default, in that order.
//! - `pending` is cleared only by a successful commit or by `discard`.
//! - A store is used by one owner instance on one thread at a time; callers
//!   that share an instance across threads must serialize access.

mod attribute_store;
mod store_set;

pub use attribute_store::{AttributeStore, CommitOutcome};
pub use store_set::StoreSet;

use crate::backend::BackendError;
use crate::codec::{CoercionError, DisallowedValueError};
use crate::schema::SchemaError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attribute `{attribute}` is not defined in store `{store}`")]
    UnknownAttribute { store: String, attribute: String },
    #[error(transparent)]
    Coercion(#[from] CoercionError),
    #[error(transparent)]
    DisallowedValue(#[from] DisallowedValueError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
