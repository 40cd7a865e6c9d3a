//! Record host schema migrations.
//!
//! # Invariants
//! - Versions are strictly increasing; the applied version is stored in
//!   `PRAGMA user_version`.
//! - All pending steps run in one transaction.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "records_and_inline_columns",
    sql: include_str!("0001_init.sql"),
}];

/// Versions moved across by one `apply_migrations` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub from_version: u32,
    pub to_version: u32,
    /// Names of the steps applied, oldest first.
    pub applied: Vec<&'static str>,
}

impl MigrationReport {
    pub fn is_noop(&self) -> bool {
        self.applied.is_empty()
    }
}

/// Latest version this build knows how to create.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Names of the steps `apply_migrations` would run on `conn`.
pub fn pending_migrations(conn: &Connection) -> DbResult<Vec<&'static str>> {
    let current = checked_version(conn)?;
    Ok(MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current)
        .map(|migration| migration.name)
        .collect())
}

/// Brings `conn` up to `latest_version()`.
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer build.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<MigrationReport> {
    let from_version = checked_version(conn)?;
    let mut report = MigrationReport {
        from_version,
        to_version: from_version,
        applied: Vec::new(),
    };

    let steps = MIGRATIONS
        .iter()
        .filter(|migration| migration.version > from_version);
    let tx = conn.transaction()?;
    for migration in steps {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        report.to_version = migration.version;
        report.applied.push(migration.name);
    }
    tx.commit()?;

    if !report.is_noop() {
        info!(
            "event=db_migrate module=db status=ok from={} to={} steps={}",
            report.from_version,
            report.to_version,
            report.applied.len()
        );
    }
    Ok(report)
}

fn checked_version(conn: &Connection) -> DbResult<u32> {
    let current = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    let latest = latest_version();
    if current > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current,
            latest_supported: latest,
        });
    }
    Ok(current)
}
