//! Process-wide store schema registry.
//!
//! # Responsibility
//! - Collect store schemas per owner type during initialization.
//! - Serve read-only lookups afterwards.
//!
//! # Invariants
//! - The registry is append-only; definitions are never replaced.
//! - After initialization it is shared as `Arc<SchemaRegistry>` and never
//!   mutated again.

use super::definition::{
    AttributeDefinition, AttributeOptions, DefaultValue, RawDefault, StorageMode, StoreOptions,
    StoreSchema, TableOption,
};
use super::{SchemaError, SchemaResult};
use crate::codec::coerce;
use crate::model::value::{AttrType, AttrValue};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Builder handed to `SchemaRegistry::define`.
#[derive(Debug)]
pub struct SchemaBuilder {
    store: String,
    attributes: Vec<AttributeDefinition>,
}

impl SchemaBuilder {
    fn new(store: &str) -> Self {
        Self {
            store: store.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn boolean(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::Boolean, options)
    }

    pub fn string(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::String, options)
    }

    pub fn integer(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::Integer, options)
    }

    pub fn text(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::Text, options)
    }

    pub fn float(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::Float, options)
    }

    pub fn datetime(&mut self, name: &str, options: AttributeOptions) -> SchemaResult<()> {
        self.add(name, AttrType::DateTime, options)
    }

    /// Registers an attribute by type token, e.g. from parsed configuration.
    ///
    /// # Errors
    /// - `UnknownType` when `type_token` is not a supported type.
    pub fn attribute(
        &mut self,
        name: &str,
        type_token: &str,
        options: AttributeOptions,
    ) -> SchemaResult<()> {
        let attr_type = AttrType::parse(type_token)
            .ok_or_else(|| SchemaError::UnknownType(type_token.to_string()))?;
        self.add(name, attr_type, options)
    }

    fn add(
        &mut self,
        name: &str,
        attr_type: AttrType,
        options: AttributeOptions,
    ) -> SchemaResult<()> {
        ensure_identifier("attribute", name)?;
        if self.attributes.iter().any(|existing| existing.name() == name) {
            return Err(SchemaError::DuplicateAttribute {
                store: self.store.clone(),
                attribute: name.to_string(),
            });
        }

        let allowed = match options.allowed {
            Some(raw_values) => {
                let mut values: Vec<AttrValue> = Vec::with_capacity(raw_values.len());
                for raw in &raw_values {
                    let slot = coerce(name, raw, attr_type).map_err(|err| {
                        SchemaError::InvalidDefault {
                            attribute: name.to_string(),
                            reason: format!("allowed value rejected: {err}"),
                        }
                    })?;
                    if let Some(value) = slot {
                        values.push(value);
                    }
                }
                Some(values)
            }
            None => None,
        };

        let default = match options.default {
            RawDefault::None => DefaultValue::None,
            RawDefault::Computed(default_fn) => DefaultValue::Computed(default_fn),
            RawDefault::Literal(raw) => {
                let slot =
                    coerce(name, &raw, attr_type).map_err(|err| SchemaError::InvalidDefault {
                        attribute: name.to_string(),
                        reason: err.to_string(),
                    })?;
                if let (Some(value), Some(allowed)) = (&slot, &allowed) {
                    if !allowed.contains(value) {
                        return Err(SchemaError::InvalidDefault {
                            attribute: name.to_string(),
                            reason: format!("default `{value}` is not an allowed value"),
                        });
                    }
                }
                DefaultValue::Literal(slot)
            }
        };

        self.attributes.push(AttributeDefinition::new(
            name.to_string(),
            attr_type,
            default,
            allowed,
        ));
        Ok(())
    }
}

/// Store schemas keyed by owner type, in declaration order.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    owners: BTreeMap<String, Vec<Arc<StoreSchema>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares one store on `owner_type`.
    ///
    /// `build` is invoked exactly once with a fresh builder.
    ///
    /// # Errors
    /// - `InvalidName` for non-identifier owner, store, table or column names.
    /// - `DuplicateStore` when `store_name` already exists for `owner_type`.
    /// - `DuplicateColumn` when another inline store uses the same column.
    /// - Any error returned by `build`.
    pub fn define<F>(
        &mut self,
        owner_type: &str,
        store_name: &str,
        options: StoreOptions,
        build: F,
    ) -> SchemaResult<Arc<StoreSchema>>
    where
        F: FnOnce(&mut SchemaBuilder) -> SchemaResult<()>,
    {
        ensure_identifier("owner type", owner_type)?;
        ensure_identifier("store", store_name)?;

        let existing = self.stores_for(owner_type);
        if existing.iter().any(|schema| schema.name() == store_name) {
            return Err(SchemaError::DuplicateStore {
                owner_type: owner_type.to_string(),
                store: store_name.to_string(),
            });
        }

        let storage = match options.table {
            TableOption::Same => {
                let column = options.column.unwrap_or_else(|| store_name.to_string());
                ensure_identifier("column", &column)?;
                let taken = existing.iter().any(|schema| {
                    matches!(schema.storage(), StorageMode::Inline { column: used } if *used == column)
                });
                if taken {
                    return Err(SchemaError::DuplicateColumn {
                        owner_type: owner_type.to_string(),
                        column,
                    });
                }
                StorageMode::Inline { column }
            }
            TableOption::Table(table) => {
                ensure_identifier("table", &table)?;
                StorageMode::Associated { table }
            }
        };

        let mut builder = SchemaBuilder::new(store_name);
        build(&mut builder)?;

        let schema = Arc::new(StoreSchema::new(
            owner_type.to_string(),
            store_name.to_string(),
            storage,
            options.coercion,
            builder.attributes,
        ));
        info!(
            "event=schema_define module=schema status=ok owner_type={} store={} mode={} attributes={}",
            owner_type,
            store_name,
            storage_label(schema.storage()),
            schema.attributes().len()
        );

        self.owners
            .entry(owner_type.to_string())
            .or_default()
            .push(Arc::clone(&schema));
        Ok(schema)
    }

    /// Returns the schema of one store.
    ///
    /// # Errors
    /// - `UndefinedStore` when the store was never declared.
    pub fn lookup(&self, owner_type: &str, store_name: &str) -> SchemaResult<Arc<StoreSchema>> {
        self.stores_for(owner_type)
            .iter()
            .find(|schema| schema.name() == store_name)
            .cloned()
            .ok_or_else(|| SchemaError::UndefinedStore {
                owner_type: owner_type.to_string(),
                store: store_name.to_string(),
            })
    }

    /// Returns all stores of `owner_type` in declaration order.
    pub fn stores_for(&self, owner_type: &str) -> &[Arc<StoreSchema>] {
        self.owners
            .get(owner_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Returns sorted, de-duplicated associated table names.
    pub fn associated_tables(&self) -> Vec<String> {
        self.owners
            .values()
            .flatten()
            .filter_map(|schema| match schema.storage() {
                StorageMode::Associated { table } => Some(table.clone()),
                StorageMode::Inline { .. } => None,
            })
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn owner_types(&self) -> impl Iterator<Item = &str> {
        self.owners.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.owners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

/// Returns whether `value` is a plain SQL-safe identifier.
pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER_RE.is_match(value)
}

fn ensure_identifier(kind: &'static str, value: &str) -> SchemaResult<()> {
    if is_identifier(value) {
        return Ok(());
    }
    Err(SchemaError::InvalidName {
        kind,
        value: value.to_string(),
    })
}

fn storage_label(storage: &StorageMode) -> &'static str {
    match storage {
        StorageMode::Inline { .. } => "inline",
        StorageMode::Associated { .. } => "associated",
    }
}
