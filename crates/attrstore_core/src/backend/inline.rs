//! Inline strategy: the blob lives in a column of the owner's own row.

use super::{BackendError, BackendResult, StagedBlob};
use crate::codec::{decode_map, encode_map, AttributeMap};
use crate::model::owner::OwnerContext;
use crate::schema::StoreSchema;

#[derive(Debug, Clone)]
pub struct InlineBackend {
    column: String,
}

impl InlineBackend {
    pub fn new(column: String) -> Self {
        Self { column }
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Decodes the owner's column; an absent or empty column is an empty map.
    pub fn load(
        &self,
        owner: &dyn OwnerContext,
        schema: &StoreSchema,
    ) -> BackendResult<AttributeMap> {
        match owner.inline_blob(&self.column) {
            Some(blob) if !blob.is_empty() => {
                decode_map(blob, schema).map_err(|source| BackendError::Codec {
                    store: schema.name().to_string(),
                    source,
                })
            }
            _ => Ok(AttributeMap::default()),
        }
    }

    /// Encodes `map` for the owner's save; nothing is written here.
    pub fn save(&self, schema: &StoreSchema, map: &AttributeMap) -> BackendResult<StagedBlob> {
        let bytes = encode_map(map, schema).map_err(|source| BackendError::Codec {
            store: schema.name().to_string(),
            source,
        })?;
        Ok(StagedBlob {
            store: schema.name().to_string(),
            column: self.column.clone(),
            bytes,
        })
    }
}
