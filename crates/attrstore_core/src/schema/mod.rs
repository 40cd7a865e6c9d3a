//! Store schema declarations and the process-wide schema registry.
//!
//! # Responsibility
//! - Build immutable store schemas from typed builder calls.
//! - Reject misconfiguration up front, at type-definition time.
//!
//! # Invariants
//! - Attribute names are unique within one store.
//! - Store names are unique within one owner type.
//! - Every identifier that may reach SQL is validated.

mod definition;
mod registry;

pub use definition::{
    AttributeDefinition, AttributeOptions, CoercionPolicy, DefaultFn, DefaultValue, StorageMode,
    StoreOptions, StoreSchema, TableOption,
};
pub use registry::{SchemaBuilder, SchemaRegistry};
pub(crate) use registry::is_identifier;

use thiserror::Error;

pub type SchemaResult<T> = Result<T, SchemaError>;

/// Schema misconfiguration. Fatal at definition time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("attribute `{attribute}` is already defined in store `{store}`")]
    DuplicateAttribute { store: String, attribute: String },
    #[error("unknown attribute type `{0}`; expected boolean|string|integer|text|float|datetime")]
    UnknownType(String),
    #[error("store `{store}` is not defined for `{owner_type}`")]
    UndefinedStore { owner_type: String, store: String },
    #[error("store `{store}` is already defined for `{owner_type}`")]
    DuplicateStore { owner_type: String, store: String },
    #[error("inline column `{column}` is already used by another store of `{owner_type}`")]
    DuplicateColumn { owner_type: String, column: String },
    #[error("invalid {kind} name `{value}`")]
    InvalidName { kind: &'static str, value: String },
    #[error("invalid default for attribute `{attribute}`: {reason}")]
    InvalidDefault { attribute: String, reason: String },
}
