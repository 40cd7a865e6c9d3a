//! Domain model for typed attribute stores.
//!
//! # Responsibility
//! - Define attribute types and canonical values.
//! - Define owner identity and the capabilities stores may use.
//! - Provide the reference host record used by the SQLite host.

pub mod owner;
pub mod record;
pub mod value;
