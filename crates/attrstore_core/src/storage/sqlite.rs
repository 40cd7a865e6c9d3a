//! SQLite blob store for associated records.
//!
//! # Invariants
//! - Every associated table has primary key `(owner_type, owner_id, store_name)`.
//! - Table names are validated identifiers before reaching SQL.
//! - Tables are created lazily on first use and remembered per instance.

use super::{BlobKey, BlobStore, StorageError, StorageResult};
use crate::model::owner::OwnerKey;
use crate::schema::{is_identifier, SchemaRegistry};
use log::{debug, info};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Owner ids bound per `IN (...)` query, well under SQLite's variable limit.
const FETCH_MANY_BATCH: usize = 500;

/// Associated-record storage sharing one SQLite connection.
pub struct SqliteBlobStore {
    conn: Arc<Mutex<Connection>>,
    prepared: Mutex<BTreeSet<String>>,
}

impl SqliteBlobStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            prepared: Mutex::new(BTreeSet::new()),
        }
    }

    /// Creates the tables of every associated store declared in `registry`.
    pub fn prepare_tables(&self, registry: &SchemaRegistry) -> StorageResult<()> {
        let conn = self.lock()?;
        for table in registry.associated_tables() {
            self.ensure_table(&conn, &table)?;
        }
        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("sqlite connection lock poisoned".to_string()))
    }

    fn ensure_table(&self, conn: &Connection, table: &str) -> StorageResult<()> {
        if !is_identifier(table) {
            return Err(StorageError::InvalidTable(table.to_string()));
        }
        let mut prepared = self
            .prepared
            .lock()
            .map_err(|_| StorageError::Unavailable("table cache lock poisoned".to_string()))?;
        if prepared.contains(table) {
            return Ok(());
        }

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                owner_type TEXT NOT NULL,
                owner_id TEXT NOT NULL,
                store_name TEXT NOT NULL,
                value BLOB,
                created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000),
                PRIMARY KEY (owner_type, owner_id, store_name)
            );"
        ))?;
        info!("event=blob_table_prepare module=storage status=ok table={table}");
        prepared.insert(table.to_string());
        Ok(())
    }
}

impl BlobStore for SqliteBlobStore {
    fn fetch(&self, key: &BlobKey) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.lock()?;
        self.ensure_table(&conn, &key.table)?;

        let value = conn
            .query_row(
                &format!(
                    "SELECT value FROM {}
                     WHERE owner_type = ?1 AND owner_id = ?2 AND store_name = ?3;",
                    key.table
                ),
                params![key.owner.owner_type, key.owner.owner_id, key.store],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()?;

        debug!(
            "event=blob_fetch module=storage status=ok table={} store={} owner={} found={}",
            key.table,
            key.store,
            key.owner,
            value.is_some()
        );
        Ok(value.map(Option::unwrap_or_default))
    }

    fn put(&self, key: &BlobKey, blob: &[u8]) -> StorageResult<()> {
        let conn = self.lock()?;
        self.ensure_table(&conn, &key.table)?;

        conn.execute(
            &format!(
                "INSERT INTO {} (owner_type, owner_id, store_name, value)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (owner_type, owner_id, store_name) DO UPDATE SET
                    value = excluded.value,
                    updated_at = (strftime('%s', 'now') * 1000);",
                key.table
            ),
            params![key.owner.owner_type, key.owner.owner_id, key.store, blob],
        )?;
        Ok(())
    }

    fn delete(&self, key: &BlobKey) -> StorageResult<bool> {
        let conn = self.lock()?;
        self.ensure_table(&conn, &key.table)?;

        let changed = conn.execute(
            &format!(
                "DELETE FROM {}
                 WHERE owner_type = ?1 AND owner_id = ?2 AND store_name = ?3;",
                key.table
            ),
            params![key.owner.owner_type, key.owner.owner_id, key.store],
        )?;
        Ok(changed > 0)
    }

    fn fetch_many(
        &self,
        table: &str,
        store: &str,
        owners: &[OwnerKey],
    ) -> StorageResult<BTreeMap<OwnerKey, Vec<u8>>> {
        let conn = self.lock()?;
        self.ensure_table(&conn, table)?;

        let mut by_type: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for owner in owners {
            by_type
                .entry(owner.owner_type.as_str())
                .or_default()
                .push(owner.owner_id.as_str());
        }

        let mut found = BTreeMap::new();
        for (owner_type, ids) in by_type {
            for batch in ids.chunks(FETCH_MANY_BATCH) {
                let placeholders = vec!["?"; batch.len()].join(", ");
                let sql = format!(
                    "SELECT owner_id, value FROM {table}
                     WHERE owner_type = ? AND store_name = ? AND owner_id IN ({placeholders});"
                );
                let mut bind_values: Vec<Value> = Vec::with_capacity(batch.len() + 2);
                bind_values.push(Value::Text(owner_type.to_string()));
                bind_values.push(Value::Text(store.to_string()));
                bind_values.extend(batch.iter().map(|id| Value::Text((*id).to_string())));

                let mut stmt = conn.prepare(&sql)?;
                let mut rows = stmt.query(params_from_iter(bind_values))?;
                while let Some(row) = rows.next()? {
                    let owner_id: String = row.get(0)?;
                    let blob: Option<Vec<u8>> = row.get(1)?;
                    found.insert(
                        OwnerKey::new(owner_type, owner_id),
                        blob.unwrap_or_default(),
                    );
                }
            }
        }

        debug!(
            "event=blob_fetch_many module=storage status=ok table={} store={} requested={} found={}",
            table,
            store,
            owners.len(),
            found.len()
        );
        Ok(found)
    }
}
