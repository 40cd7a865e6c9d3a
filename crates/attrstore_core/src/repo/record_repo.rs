//! Record repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Upsert, read and delete host rows by `(owner_type, id)`.
//! - Write staged inline store columns together with their row.

use crate::db::DbError;
use crate::model::record::{RecordId, RecordRow};
use log::error;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("record not found: {owner_type}#{id}")]
    NotFound { owner_type: String, id: RecordId },
    #[error("invalid persisted record data: {0}")]
    InvalidData(String),
    #[error("record storage unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Persistence contract of the reference host.
pub trait RecordRepository {
    /// Inserts or updates `row` and writes its dirty inline columns.
    fn save_row(&self, row: &RecordRow) -> RepoResult<()>;
    fn load_row(&self, owner_type: &str, id: RecordId) -> RepoResult<Option<RecordRow>>;
    /// Deletes a row and its inline columns. Returns whether it existed.
    fn delete_row(&self, owner_type: &str, id: RecordId) -> RepoResult<bool>;
    /// Lists ids of one owner type, most recently updated first.
    fn list_ids(&self, owner_type: &str) -> RepoResult<Vec<RecordId>>;
}

/// SQLite-backed record repository.
pub struct SqliteRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn lock(&self) -> RepoResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RepoError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl RecordRepository for SqliteRecordRepository {
    fn save_row(&self, row: &RecordRow) -> RepoResult<()> {
        let fields = serde_json::to_string(row.fields())
            .map_err(|err| RepoError::InvalidData(format!("unserializable fields: {err}")))?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO records (owner_type, id, fields)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (owner_type, id) DO UPDATE SET
                fields = excluded.fields,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![row.owner_type(), row.id().to_string(), fields],
        )?;

        for (column, bytes) in row.dirty_columns() {
            tx.execute(
                "INSERT INTO record_columns (owner_type, owner_id, column_name, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (owner_type, owner_id, column_name) DO UPDATE SET
                    value = excluded.value;",
                params![row.owner_type(), row.id().to_string(), column, bytes],
            )?;
        }

        tx.commit().map_err(|err| {
            error!(
                "event=record_save module=repo status=error owner_type={} id={} error={}",
                row.owner_type(),
                row.id(),
                err
            );
            RepoError::from(err)
        })
    }

    fn load_row(&self, owner_type: &str, id: RecordId) -> RepoResult<Option<RecordRow>> {
        let conn = self.lock()?;
        let fields_text = conn
            .query_row(
                "SELECT fields FROM records WHERE owner_type = ?1 AND id = ?2;",
                params![owner_type, id.to_string()],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(fields_text) = fields_text else {
            return Ok(None);
        };

        let fields: BTreeMap<String, Json> = serde_json::from_str(&fields_text).map_err(|err| {
            RepoError::InvalidData(format!(
                "invalid fields document for {owner_type}#{id} in records.fields: {err}"
            ))
        })?;

        let mut stmt = conn.prepare(
            "SELECT column_name, value FROM record_columns
             WHERE owner_type = ?1 AND owner_id = ?2;",
        )?;
        let mut rows = stmt.query(params![owner_type, id.to_string()])?;
        let mut columns = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let column: String = row.get("column_name")?;
            let value: Option<Vec<u8>> = row.get("value")?;
            columns.insert(column, value.unwrap_or_default());
        }

        Ok(Some(RecordRow::from_storage(owner_type, id, fields, columns)))
    }

    fn delete_row(&self, owner_type: &str, id: RecordId) -> RepoResult<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "DELETE FROM records WHERE owner_type = ?1 AND id = ?2;",
            params![owner_type, id.to_string()],
        )?;
        Ok(changed > 0)
    }

    fn list_ids(&self, owner_type: &str) -> RepoResult<Vec<RecordId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id FROM records
             WHERE owner_type = ?1
             ORDER BY updated_at DESC, id ASC;",
        )?;
        let mut rows = stmt.query([owner_type])?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let id = Uuid::parse_str(&id_text).map_err(|_| {
                RepoError::InvalidData(format!("invalid uuid value `{id_text}` in records.id"))
            })?;
            ids.push(id);
        }
        Ok(ids)
    }
}
