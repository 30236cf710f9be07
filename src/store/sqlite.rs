use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use super::{RecordPage, RecordStore, StoreError, StoredRecord};
use crate::utils;

const DEFAULT_PAGE_SIZE: usize = 100;

/// A local table with the same paging, batch and patch contract as the
/// hosted one. Calls run inline on the caller's task.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    page_size: usize,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        utils::ensure_parent(path);
        let conn = Connection::open(path)?;
        Self::with_connection(conn, DEFAULT_PAGE_SIZE)
    }

    pub fn in_memory(page_size: usize) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, page_size)
    }

    fn with_connection(conn: Connection, page_size: usize) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
            page_size: page_size.max(1),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Decode("sqlite connection poisoned".into()))
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS records(
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                url TEXT,
                fields TEXT NOT NULL,
                created_at_utc TEXT NOT NULL,
                updated_at_utc TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS records_url ON records(url);",
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

fn record_id(url: Option<&str>, seq: i64, stamp: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.unwrap_or_default().as_bytes());
    hasher.update(b"|");
    hasher.update(seq.to_le_bytes());
    hasher.update(b"|");
    hasher.update(stamp.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("rec{}", &digest[..14])
}

fn decode_fields(payload: &str) -> rusqlite::Result<Map<String, Value>> {
    serde_json::from_str(payload).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            payload.len(),
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

fn encode_fields(fields: &Map<String, Value>) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|err| StoreError::Decode(err.to_string()))
}

impl RecordStore for SqliteStore {
    async fn list_page(&self, offset: Option<&str>) -> Result<RecordPage, StoreError> {
        let after: i64 = match offset {
            None => 0,
            Some(cursor) => cursor.parse().map_err(|_| StoreError::Api {
                status: 422,
                body: format!("invalid offset {cursor}"),
            })?,
        };

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT seq, id, fields FROM records WHERE seq > ?1 ORDER BY seq LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![after, (self.page_size + 1) as i64], |row| {
            let seq: i64 = row.get(0)?;
            let id: String = row.get(1)?;
            let payload: String = row.get(2)?;
            Ok((seq, StoredRecord {
                id,
                fields: decode_fields(&payload)?,
            }))
        })?;

        let mut fetched = Vec::new();
        for row in rows {
            fetched.push(row?);
        }

        let more = fetched.len() > self.page_size;
        fetched.truncate(self.page_size);
        let offset = if more {
            fetched.last().map(|(seq, _)| seq.to_string())
        } else {
            None
        };

        Ok(RecordPage {
            records: fetched.into_iter().map(|(_, record)| record).collect(),
            offset,
        })
    }

    /// Column types are already strings, so `typecast` changes nothing here.
    async fn create_records(
        &self,
        records: &[Map<String, Value>],
        _typecast: bool,
    ) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = Utc::now().to_rfc3339();
        let next_seq: i64 =
            tx.query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM records", [], |row| {
                row.get(0)
            })?;

        for (n, fields) in records.iter().enumerate() {
            let url = fields.get("url").and_then(Value::as_str);
            let id = record_id(url, next_seq + n as i64, &now);
            tx.execute(
                "INSERT INTO records (id, url, fields, created_at_utc, updated_at_utc)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, url, encode_fields(fields)?, now],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn update_record(&self, id: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let conn = self.lock()?;
        let payload: Option<String> = conn
            .query_row(
                "SELECT fields FROM records WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let payload = payload.ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let mut merged = decode_fields(&payload)?;
        for (key, value) in fields {
            merged.insert(key.clone(), value.clone());
        }
        let url = merged.get("url").and_then(Value::as_str).map(str::to_string);

        conn.execute(
            "UPDATE records SET fields = ?2, url = ?3, updated_at_utc = ?4 WHERE id = ?1",
            params![id, encode_fields(&merged)?, url, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
