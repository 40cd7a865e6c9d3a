//! Owner save/reload integration.
//!
//! # Responsibility
//! - Model the host record's lifecycle as hook registrations.
//! - Flush every bound store at owner-save time and discard on reload.
//!
//! # Invariants
//! - Inline stores are staged and written with the owner row.
//! - Associated stores are written before the owner row; once one of them
//!   is written, any later failure of the same save is a `PartialCommitError`.

mod coordinator;
mod hooks;

pub use coordinator::{CommitCoordinator, CommitReport};
pub use hooks::{LifecycleHooks, StoreHost};

use crate::store::StoreError;
use std::error::Error;
use thiserror::Error;

/// Associated stores were persisted but a later step of the same save failed.
#[derive(Debug, Error)]
#[error(
    "partial commit: associated stores [{}] were written before `{failed}` failed: {source}",
    .committed_stores.join(", ")
)]
pub struct PartialCommitError {
    pub committed_stores: Vec<String>,
    /// Store name, or `owner row` when the host's own write failed.
    pub failed: String,
    #[source]
    pub source: Box<dyn Error + Send + Sync>,
}

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("commit of store `{store}` failed: {source}")]
    Store {
        store: String,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Partial(#[from] PartialCommitError),
}
