//! Record lifecycle services.
//!
//! # Responsibility
//! - Orchestrate repository, blob store and lifecycle hooks into record
//!   level operations.
//! - Keep callers decoupled from storage details.

pub mod record_service;
