//! Attribute and store definitions.
//!
//! # Responsibility
//! - Describe one attribute: type, default and allowed-value constraint.
//! - Describe one store: ordered attributes plus backend configuration.
//!
//! # Invariants
//! - Definitions are immutable once built and shared behind `Arc`.
//! - Literal defaults and allowed members are already coerced to the
//!   attribute type.

use crate::codec::coerce;
use crate::model::owner::OwnerFields;
use crate::model::value::{AttrType, AttrValue, Slot};
use log::warn;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Default function evaluated against the owner's read-only fields.
pub type DefaultFn = Arc<dyn Fn(&dyn OwnerFields) -> Json + Send + Sync>;

/// Resolved default of one attribute.
#[derive(Clone)]
pub enum DefaultValue {
    None,
    Literal(Slot),
    Computed(DefaultFn),
}

impl Debug for DefaultValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Literal(slot) => f.debug_tuple("Literal").field(slot).finish(),
            Self::Computed(_) => f.write_str("Computed(<fn>)"),
        }
    }
}

#[derive(Clone, Default)]
pub(crate) enum RawDefault {
    #[default]
    None,
    Literal(Json),
    Computed(DefaultFn),
}

/// Options accepted by every attribute registration method.
#[derive(Clone, Default)]
pub struct AttributeOptions {
    pub(crate) default: RawDefault,
    pub(crate) allowed: Option<Vec<Json>>,
}

impl AttributeOptions {
    pub fn new() -> Self {
        <Self as Default>::default()
    }

    /// Literal default, coerced to the attribute type at definition time.
    #[allow(clippy::should_implement_trait)]
    pub fn default(mut self, value: impl Into<Json>) -> Self {
        self.default = RawDefault::Literal(value.into());
        self
    }

    /// Default computed from the owner on every unresolved read.
    pub fn default_with<F>(mut self, default_fn: F) -> Self
    where
        F: Fn(&dyn OwnerFields) -> Json + Send + Sync + 'static,
    {
        self.default = RawDefault::Computed(Arc::new(default_fn));
        self
    }

    /// Restricts writes to a finite set of values.
    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Json>,
    {
        self.allowed = Some(values.into_iter().map(Into::into).collect());
        self
    }
}

/// One attribute of a store schema.
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    name: String,
    attr_type: AttrType,
    default: DefaultValue,
    allowed: Option<Vec<AttrValue>>,
}

impl AttributeDefinition {
    pub(crate) fn new(
        name: String,
        attr_type: AttrType,
        default: DefaultValue,
        allowed: Option<Vec<AttrValue>>,
    ) -> Self {
        Self {
            name,
            attr_type,
            default,
            allowed,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn attr_type(&self) -> AttrType {
        self.attr_type
    }

    pub fn default_value(&self) -> &DefaultValue {
        &self.default
    }

    pub fn allowed(&self) -> Option<&[AttrValue]> {
        self.allowed.as_deref()
    }

    /// Resolves the default for `owner`.
    ///
    /// A computed default that does not coerce to the attribute type is
    /// logged and resolves to null.
    pub fn resolve_default(&self, owner: &dyn OwnerFields) -> Slot {
        match &self.default {
            DefaultValue::None => None,
            DefaultValue::Literal(slot) => slot.clone(),
            DefaultValue::Computed(default_fn) => {
                let raw = default_fn(owner);
                match coerce(&self.name, &raw, self.attr_type) {
                    Ok(slot) => slot,
                    Err(_) => {
                        warn!(
                            "event=default_resolve module=schema status=error attribute={} expected_type={} owner={}",
                            self.name,
                            self.attr_type,
                            owner.owner_key()
                        );
                        None
                    }
                }
            }
        }
    }
}

/// How a failed coercion in `set` is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoercionPolicy {
    /// Reject the write with a coercion error.
    #[default]
    Strict,
    /// Log and store the attribute's resolved default instead.
    FallbackToDefault,
}

/// Where a store keeps its blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOption {
    /// Inline column on the owner's own row.
    Same,
    /// Separate associated table.
    Table(String),
}

/// Declaration-time options of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOptions {
    pub table: TableOption,
    /// Inline column name; defaults to the store name.
    pub column: Option<String>,
    pub coercion: CoercionPolicy,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self::inline()
    }
}

impl StoreOptions {
    pub fn inline() -> Self {
        Self {
            table: TableOption::Same,
            column: None,
            coercion: CoercionPolicy::Strict,
        }
    }

    pub fn table(name: impl Into<String>) -> Self {
        Self {
            table: TableOption::Table(name.into()),
            column: None,
            coercion: CoercionPolicy::Strict,
        }
    }

    pub fn column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn coercion(mut self, policy: CoercionPolicy) -> Self {
        self.coercion = policy;
        self
    }
}

/// Backend selection resolved from `StoreOptions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageMode {
    Inline { column: String },
    Associated { table: String },
}

/// Ordered attribute definitions plus backend configuration for one store.
#[derive(Debug, Clone)]
pub struct StoreSchema {
    owner_type: String,
    name: String,
    storage: StorageMode,
    coercion: CoercionPolicy,
    attributes: Vec<AttributeDefinition>,
    index: BTreeMap<String, usize>,
}

impl StoreSchema {
    pub(crate) fn new(
        owner_type: String,
        name: String,
        storage: StorageMode,
        coercion: CoercionPolicy,
        attributes: Vec<AttributeDefinition>,
    ) -> Self {
        let index = attributes
            .iter()
            .enumerate()
            .map(|(position, definition)| (definition.name.clone(), position))
            .collect();
        Self {
            owner_type,
            name,
            storage,
            coercion,
            attributes,
            index,
        }
    }

    pub fn owner_type(&self) -> &str {
        &self.owner_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn storage(&self) -> &StorageMode {
        &self.storage
    }

    pub fn coercion(&self) -> CoercionPolicy {
        self.coercion
    }

    /// Attributes in declaration order.
    pub fn attributes(&self) -> &[AttributeDefinition] {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDefinition> {
        self.index
            .get(name)
            .and_then(|position| self.attributes.get(*position))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::{AttributeOptions, RawDefault};

    #[test]
    fn new_options_match_the_default_options() {
        for options in [AttributeOptions::new(), <AttributeOptions as Default>::default()] {
            assert!(matches!(options.default, RawDefault::None));
            assert!(options.allowed.is_none());
        }
    }
}
