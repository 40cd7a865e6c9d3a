//! One named attribute store bound to one owner instance.

use super::{StoreError, StoreResult};
use crate::backend::{Backend, SaveOutcome, StagedBlob};
use crate::codec::{coerce, validate_allowed, AttributeMap};
use crate::model::owner::{OwnerContext, OwnerFields};
use crate::model::value::Slot;
use crate::schema::{AttributeDefinition, CoercionPolicy, StoreSchema};
use log::{debug, info, warn};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Result of `AttributeStore::commit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Nothing pending; the backend was not called.
    Unchanged,
    /// Inline bytes staged for the owner row; confirm after the row write.
    Staged(StagedBlob),
    /// Associated record written.
    Persisted,
}

/// Two-layer view over one store of one owner.
pub struct AttributeStore {
    schema: Arc<StoreSchema>,
    backend: Backend,
    persisted: AttributeMap,
    pending: BTreeMap<String, Slot>,
    staged: Option<AttributeMap>,
    loaded: bool,
}

impl AttributeStore {
    /// Creates an empty, unloaded store. Storage is not touched.
    pub fn new(schema: Arc<StoreSchema>, backend: Backend) -> Self {
        Self {
            schema,
            backend,
            persisted: AttributeMap::default(),
            pending: BTreeMap::new(),
            staged: None,
            loaded: false,
        }
    }

    pub fn schema(&self) -> &StoreSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Returns whether uncommitted writes exist.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Names with pending writes, in schema order.
    pub fn changed_attributes(&self) -> Vec<&str> {
        self.schema
            .attributes()
            .iter()
            .map(AttributeDefinition::name)
            .filter(|name| self.pending.contains_key(*name))
            .collect()
    }

    /// Hydrates the persisted layer on first use. Idempotent.
    pub fn ensure_loaded(&mut self, owner: &dyn OwnerContext) -> StoreResult<()> {
        if self.loaded {
            return Ok(());
        }

        let started_at = Instant::now();
        let map = self.backend.load(owner, &self.schema)?;
        debug!(
            "event=store_load module=store status=ok store={} owner={} attributes={} passthrough={} duration_ms={}",
            self.schema.name(),
            owner.owner_key(),
            map.values.len(),
            map.extras.len(),
            started_at.elapsed().as_millis()
        );
        self.persisted = map;
        self.loaded = true;
        Ok(())
    }

    /// Reads one attribute through pending, persisted, then default.
    ///
    /// # Errors
    /// - `UnknownAttribute` when `name` is not in the schema.
    /// - `Backend` when hydration fails.
    pub fn get(&mut self, owner: &dyn OwnerContext, name: &str) -> StoreResult<Slot> {
        let definition = self.definition(name)?.clone();
        self.ensure_loaded(owner)?;

        if let Some(slot) = self.pending.get(name) {
            return Ok(slot.clone());
        }
        if let Some(slot) = self.persisted.values.get(name) {
            return Ok(slot.clone());
        }
        Ok(definition.resolve_default(owner.as_fields()))
    }

    /// Truthiness form of `get`; nulls are false.
    pub fn get_flag(&mut self, owner: &dyn OwnerContext, name: &str) -> StoreResult<bool> {
        Ok(self
            .get(owner, name)?
            .is_some_and(|value| value.is_truthy()))
    }

    /// Coerces, validates and buffers one write. The backend is not called.
    ///
    /// Rejected writes leave `pending` unchanged.
    pub fn set(
        &mut self,
        owner: &dyn OwnerFields,
        name: &str,
        raw: impl Into<Json>,
    ) -> StoreResult<Slot> {
        let schema = Arc::clone(&self.schema);
        let definition = schema
            .attribute(name)
            .ok_or_else(|| StoreError::UnknownAttribute {
                store: schema.name().to_string(),
                attribute: name.to_string(),
            })?;
        let raw = raw.into();

        let slot = match coerce(name, &raw, definition.attr_type()) {
            Ok(slot) => slot,
            Err(err) if self.schema.coercion() == CoercionPolicy::FallbackToDefault => {
                warn!(
                    "event=coerce_fallback module=store status=warn store={} attribute={} expected_type={}",
                    self.schema.name(),
                    name,
                    err.attr_type
                );
                definition.resolve_default(owner)
            }
            Err(err) => return Err(err.into()),
        };
        validate_allowed(name, &slot, definition.allowed())?;

        self.pending.insert(name.to_string(), slot.clone());
        Ok(slot)
    }

    /// Resolved values of every attribute, in schema order.
    pub fn to_map(&mut self, owner: &dyn OwnerContext) -> StoreResult<Vec<(String, Slot)>> {
        self.ensure_loaded(owner)?;
        let mut values = Vec::with_capacity(self.schema.attributes().len());
        for definition in self.schema.attributes() {
            let name = definition.name();
            let slot = match self.pending.get(name).or_else(|| self.persisted.values.get(name)) {
                Some(slot) => slot.clone(),
                None => definition.resolve_default(owner.as_fields()),
            };
            values.push((name.to_string(), slot));
        }
        Ok(values)
    }

    /// Flushes pending writes through the backend.
    ///
    /// No pending writes means no backend call. On failure `pending` is left
    /// intact so the save can be retried.
    pub fn commit(&mut self, owner: &dyn OwnerContext) -> StoreResult<CommitOutcome> {
        if self.pending.is_empty() {
            return Ok(CommitOutcome::Unchanged);
        }
        self.ensure_loaded(owner)?;

        let merged = self.merged_map(owner);
        match self.backend.save(owner, &self.schema, &merged)? {
            SaveOutcome::Persisted => {
                info!(
                    "event=store_commit module=store status=ok mode=associated store={} owner={} changed={}",
                    self.schema.name(),
                    owner.owner_key(),
                    self.pending.len()
                );
                self.persisted = merged;
                self.pending.clear();
                Ok(CommitOutcome::Persisted)
            }
            SaveOutcome::Staged(staged) => {
                debug!(
                    "event=store_commit module=store status=staged mode=inline store={} owner={} changed={} bytes={}",
                    self.schema.name(),
                    owner.owner_key(),
                    self.pending.len(),
                    staged.bytes.len()
                );
                self.staged = Some(merged);
                Ok(CommitOutcome::Staged(staged))
            }
        }
    }

    /// Promotes a staged inline commit once the owner row is written.
    ///
    /// Pending writes made after staging are kept.
    pub fn confirm_staged(&mut self) {
        let Some(staged) = self.staged.take() else {
            return;
        };
        self.pending
            .retain(|name, slot| staged.values.get(name) != Some(&*slot));
        self.persisted = staged;
    }

    /// Drops a staged inline commit after a failed owner row write.
    pub fn abandon_staged(&mut self) {
        self.staged = None;
    }

    /// Forgets pending writes and the hydrated snapshot (owner reload).
    pub fn discard(&mut self) {
        if !self.pending.is_empty() {
            debug!(
                "event=store_discard module=store status=ok store={} dropped={}",
                self.schema.name(),
                self.pending.len()
            );
        }
        self.pending.clear();
        self.staged = None;
        self.persisted = AttributeMap::default();
        self.loaded = false;
        self.backend.invalidate();
    }

    /// Seeds an unloaded associated store from a batch prefetch.
    ///
    /// Returns `false` for inline or already loaded stores.
    pub fn prime_associated(&mut self, blob: Option<Vec<u8>>) -> bool {
        if self.loaded {
            return false;
        }
        match &mut self.backend {
            Backend::Associated(backend) => {
                backend.prime(blob);
                true
            }
            Backend::Inline(_) => false,
        }
    }

    fn definition(&self, name: &str) -> StoreResult<&AttributeDefinition> {
        self.schema
            .attribute(name)
            .ok_or_else(|| StoreError::UnknownAttribute {
                store: self.schema.name().to_string(),
                attribute: name.to_string(),
            })
    }

    /// Full map written on commit: defaults materialized, persisted values
    /// overridden by pending ones, unknown keys carried through.
    fn merged_map(&self, owner: &dyn OwnerContext) -> AttributeMap {
        let mut merged = AttributeMap {
            values: BTreeMap::new(),
            extras: self.persisted.extras.clone(),
        };
        for definition in self.schema.attributes() {
            let name = definition.name();
            let slot = match self.pending.get(name).or_else(|| self.persisted.values.get(name)) {
                Some(slot) => slot.clone(),
                None => match definition.resolve_default(owner.as_fields()) {
                    Some(value) => Some(value),
                    None => continue,
                },
            };
            merged.extras.remove(name);
            merged.values.insert(name.to_string(), slot);
        }
        merged
    }
}
