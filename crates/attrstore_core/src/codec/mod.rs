//! Value coercion and attribute-map serialization.
//!
//! # Responsibility
//! - Turn arbitrary caller input into canonical typed values.
//! - Serialize a whole attribute map into one opaque blob and back.
//!
//! # Invariants
//! - `encode_map` output is deterministic for a given map.
//! - Keys unknown to the current schema survive a decode/encode cycle.

mod blob;
mod coerce;

pub use blob::{decode_map, encode_map, AttributeMap};
pub use coerce::{coerce, validate_allowed};

use crate::model::value::AttrType;
use thiserror::Error;

/// Raw input could not be interpreted as the attribute's type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot coerce `{raw}` to {attr_type} for attribute `{attribute}`")]
pub struct CoercionError {
    pub attribute: String,
    pub attr_type: AttrType,
    pub raw: String,
}

/// Value is outside the attribute's allowed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("value `{value}` is not allowed for attribute `{attribute}`")]
pub struct DisallowedValueError {
    pub attribute: String,
    pub value: String,
}

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed attribute blob: {0}")]
    MalformedBlob(String),
    #[error("failed to encode attribute map: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
