//! Lifecycle hook registry for host records.

use super::{CommitError, CommitReport};
use crate::model::owner::OwnerContext;
use crate::store::StoreSet;

type SaveHook<R> = Box<dyn Fn(&mut R) -> Result<(), CommitError> + Send + Sync>;
type NotifyHook<R> = Box<dyn Fn(&mut R) + Send + Sync>;

/// A host record that carries attribute stores.
pub trait StoreHost {
    /// Splits the record into its read-only owner view and its stores.
    fn owner_and_stores(&mut self) -> (&dyn OwnerContext, &mut StoreSet);

    /// Receives the commit report: staged inline blobs must be written with
    /// the owner row; persisted associated stores are already durable.
    fn apply_commit(&mut self, report: CommitReport);
}

/// Callbacks run by the host around save and reload.
pub struct LifecycleHooks<R> {
    before_save: Vec<SaveHook<R>>,
    after_save: Vec<NotifyHook<R>>,
    after_reload: Vec<NotifyHook<R>>,
}

impl<R> Default for LifecycleHooks<R> {
    fn default() -> Self {
        Self {
            before_save: Vec::new(),
            after_save: Vec::new(),
            after_reload: Vec::new(),
        }
    }
}

impl<R> LifecycleHooks<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_before_save<F>(&mut self, hook: F)
    where
        F: Fn(&mut R) -> Result<(), CommitError> + Send + Sync + 'static,
    {
        self.before_save.push(Box::new(hook));
    }

    pub fn on_after_save<F>(&mut self, hook: F)
    where
        F: Fn(&mut R) + Send + Sync + 'static,
    {
        self.after_save.push(Box::new(hook));
    }

    pub fn on_after_reload<F>(&mut self, hook: F)
    where
        F: Fn(&mut R) + Send + Sync + 'static,
    {
        self.after_reload.push(Box::new(hook));
    }

    /// Runs before-save hooks in registration order; stops at the first error.
    pub fn run_before_save(&self, record: &mut R) -> Result<(), CommitError> {
        for hook in &self.before_save {
            hook(record)?;
        }
        Ok(())
    }

    pub fn run_after_save(&self, record: &mut R) {
        for hook in &self.after_save {
            hook(record);
        }
    }

    pub fn run_after_reload(&self, record: &mut R) {
        for hook in &self.after_reload {
            hook(record);
        }
    }
}
