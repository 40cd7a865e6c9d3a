//! Flushes bound stores at owner-save time.

use super::{CommitError, LifecycleHooks, PartialCommitError, StoreHost};
use crate::backend::StagedBlob;
use crate::model::owner::OwnerContext;
use crate::store::{CommitOutcome, StoreSet};
use log::error;
use std::sync::Arc;

/// What one commit pass produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Inline blobs the host must write with its own row.
    pub staged: Vec<StagedBlob>,
    /// Associated stores already written, in commit order.
    pub persisted: Vec<String>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty() && self.persisted.is_empty()
    }
}

/// Glue between host lifecycle hooks and attribute stores.
pub struct CommitCoordinator;

impl CommitCoordinator {
    /// Subscribes store commit, confirm and discard to `hooks`.
    pub fn install<R: StoreHost + 'static>(hooks: &mut LifecycleHooks<R>) {
        hooks.on_before_save(|record: &mut R| {
            let report = {
                let (owner, stores) = record.owner_and_stores();
                Self::commit(owner, stores)?
            };
            record.apply_commit(report);
            Ok(())
        });
        hooks.on_after_save(|record: &mut R| {
            record.owner_and_stores().1.confirm_staged_all();
        });
        hooks.on_after_reload(|record: &mut R| {
            record.owner_and_stores().1.discard_all();
        });
    }

    /// Commits every store of the owner type, in declaration order.
    ///
    /// Stores never accessed on this instance have nothing pending and are
    /// skipped without being created.
    ///
    /// # Errors
    /// - `CommitError::Store` when the first failing store fails before any
    ///   associated store was written.
    /// - `CommitError::Partial` when an associated store was already written.
    pub fn commit(
        owner: &dyn OwnerContext,
        stores: &mut StoreSet,
    ) -> Result<CommitReport, CommitError> {
        let registry = Arc::clone(stores.registry());
        let mut report = CommitReport::default();

        for schema in registry.stores_for(stores.owner_type()) {
            let Some(store) = stores.bound_mut(schema.name()) else {
                continue;
            };
            match store.commit(owner) {
                Ok(CommitOutcome::Unchanged) => {}
                Ok(CommitOutcome::Staged(staged)) => report.staged.push(staged),
                Ok(CommitOutcome::Persisted) => report.persisted.push(schema.name().to_string()),
                Err(source) => {
                    error!(
                        "event=store_commit module=commit status=error store={} owner={} already_persisted={} error={}",
                        schema.name(),
                        owner.owner_key(),
                        report.persisted.len(),
                        source
                    );
                    if report.persisted.is_empty() {
                        return Err(CommitError::Store {
                            store: schema.name().to_string(),
                            source,
                        });
                    }
                    return Err(PartialCommitError {
                        committed_stores: report.persisted,
                        failed: schema.name().to_string(),
                        source: Box::new(source),
                    }
                    .into());
                }
            }
        }

        Ok(report)
    }
}
