//! Host record persistence.
//!
//! # Responsibility
//! - Persist the reference host's own rows: scalar fields and inline store
//!   columns.
//! - Keep SQL details out of the service layer.
//!
//! # Invariants
//! - A row and its dirty inline columns are written in one transaction.
//! - Read paths reject malformed persisted data instead of masking it.

pub mod record_repo;
