//! Owner identity and read-only owner capabilities.
//!
//! # Responsibility
//! - Identify the host record instance a store is bound to.
//! - Expose the narrow read surface that default functions and backends use.
//!
//! # Invariants
//! - Default functions only see `OwnerFields`; they cannot reach stores,
//!   inline blobs or the host's persistence.

use std::fmt::{Display, Formatter};

/// Stable identity of one owner instance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerKey {
    pub owner_type: String,
    pub owner_id: String,
}

impl OwnerKey {
    pub fn new(owner_type: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            owner_type: owner_type.into(),
            owner_id: owner_id.into(),
        }
    }
}

impl Display for OwnerKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.owner_type, self.owner_id)
    }
}

/// Read-only capability handed to function defaults.
pub trait OwnerFields {
    fn owner_key(&self) -> OwnerKey;

    /// Returns an already-loaded scalar field of the owner, if any.
    fn field(&self, name: &str) -> Option<serde_json::Value>;
}

/// Owner surface used by backends.
pub trait OwnerContext: OwnerFields {
    /// Returns the current bytes of an inline store column.
    ///
    /// `None` and an empty slice both mean "no attributes set yet".
    fn inline_blob(&self, column: &str) -> Option<&[u8]>;

    /// Narrows this owner to the capability given to default functions.
    fn as_fields(&self) -> &dyn OwnerFields;
}
