//! Reference host record carrying attribute stores.
//!
//! # Responsibility
//! - Hold the owner's own row: scalar fields and inline store columns.
//! - Bind the owner's `StoreSet` and expose the attribute accessor surface.
//!
//! # Invariants
//! - `id` is stable and never reused for another record of the same type.
//! - Only columns staged since the last save are marked dirty.

use crate::backend::StagedBlob;
use crate::commit::{CommitReport, StoreHost};
use crate::model::owner::{OwnerContext, OwnerFields, OwnerKey};
use crate::model::value::Slot;
use crate::store::{StoreResult, StoreSet};
use serde_json::Value as Json;
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

pub type RecordId = Uuid;

/// The owner's own storage row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    owner_type: String,
    id: RecordId,
    fields: BTreeMap<String, Json>,
    columns: BTreeMap<String, Vec<u8>>,
    dirty_columns: BTreeSet<String>,
}

impl RecordRow {
    pub fn new(owner_type: impl Into<String>, id: RecordId) -> Self {
        Self {
            owner_type: owner_type.into(),
            id,
            fields: BTreeMap::new(),
            columns: BTreeMap::new(),
            dirty_columns: BTreeSet::new(),
        }
    }

    /// Rebuilds a row read from storage; nothing is dirty.
    pub fn from_storage(
        owner_type: impl Into<String>,
        id: RecordId,
        fields: BTreeMap<String, Json>,
        columns: BTreeMap<String, Vec<u8>>,
    ) -> Self {
        Self {
            owner_type: owner_type.into(),
            id,
            fields,
            columns,
            dirty_columns: BTreeSet::new(),
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn id(&self) -> RecordId {
        self.id
    }

    pub fn fields(&self) -> &BTreeMap<String, Json> {
        &self.fields
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Json>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn column(&self, column: &str) -> Option<&[u8]> {
        self.columns.get(column).map(Vec::as_slice)
    }

    /// Columns staged since the last successful save, with their bytes.
    pub fn dirty_columns(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.dirty_columns.iter().filter_map(|column| {
            self.columns
                .get(column)
                .map(|bytes| (column.as_str(), bytes.as_slice()))
        })
    }

    pub fn stage_column(&mut self, staged: StagedBlob) {
        self.dirty_columns.insert(staged.column.clone());
        self.columns.insert(staged.column, staged.bytes);
    }

    pub fn mark_saved(&mut self) {
        self.dirty_columns.clear();
    }
}

impl OwnerFields for RecordRow {
    fn owner_key(&self) -> OwnerKey {
        OwnerKey::new(self.owner_type.clone(), self.id.to_string())
    }

    fn field(&self, name: &str) -> Option<Json> {
        self.fields.get(name).cloned()
    }
}

impl OwnerContext for RecordRow {
    fn inline_blob(&self, column: &str) -> Option<&[u8]> {
        self.column(column)
    }

    fn as_fields(&self) -> &dyn OwnerFields {
        self
    }
}

/// Host record: own row plus memoized attribute stores.
pub struct Record {
    row: RecordRow,
    stores: StoreSet,
    persisted_in_save: Vec<String>,
}

impl Record {
    pub fn new(row: RecordRow, stores: StoreSet) -> Self {
        Self {
            row,
            stores,
            persisted_in_save: Vec::new(),
        }
    }

    pub fn id(&self) -> RecordId {
        self.row.id
    }

    pub fn owner_type(&self) -> &str {
        &self.row.owner_type
    }

    pub fn owner_key(&self) -> OwnerKey {
        self.row.owner_key()
    }

    pub fn row(&self) -> &RecordRow {
        &self.row
    }

    pub fn field(&self, name: &str) -> Option<&Json> {
        self.row.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Json>) {
        self.row.set_field(name, value);
    }

    pub fn stores(&mut self) -> &mut StoreSet {
        &mut self.stores
    }

    /// Reads `attribute` of `store` (the raw `k` form).
    pub fn get(&mut self, store: &str, attribute: &str) -> StoreResult<Slot> {
        self.stores.get(&self.row, store, attribute)
    }

    /// Truthiness of `attribute` (the `k?` form).
    pub fn get_flag(&mut self, store: &str, attribute: &str) -> StoreResult<bool> {
        self.stores.get_flag(&self.row, store, attribute)
    }

    /// Buffers a write to `attribute` (the `k=` form).
    pub fn set(&mut self, store: &str, attribute: &str, raw: impl Into<Json>) -> StoreResult<Slot> {
        self.stores.set(&self.row, store, attribute, raw)
    }

    pub(crate) fn replace_row(&mut self, row: RecordRow) {
        self.row = row;
    }

    pub(crate) fn row_mut(&mut self) -> &mut RecordRow {
        &mut self.row
    }

    /// Associated stores written by the last before-save pass.
    pub(crate) fn take_persisted_stores(&mut self) -> Vec<String> {
        std::mem::take(&mut self.persisted_in_save)
    }
}

impl StoreHost for Record {
    fn owner_and_stores(&mut self) -> (&dyn OwnerContext, &mut StoreSet) {
        (&self.row, &mut self.stores)
    }

    fn apply_commit(&mut self, report: CommitReport) {
        for staged in report.staged {
            self.row.stage_column(staged);
        }
        self.persisted_in_save = report.persisted;
    }
}
