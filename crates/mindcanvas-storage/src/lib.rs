//! SQLite-backed canvas store with a byte quota, plus JSON import/export of
//! [`CanvasDocument`]s.

use chrono::{DateTime, SecondsFormat, Utc};
use mindcanvas_core::{CanvasDocument, ImportError};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod io;
mod schema;

pub use io::{export_json, import_json, read_document, write_document};

const SCHEMA_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed canvas: {0}")]
    Malformed(#[from] ImportError),
    #[error("Storage quota exceeded: {required_bytes} bytes required, quota is {quota_bytes}")]
    Exhausted {
        required_bytes: u64,
        quota_bytes: u64,
    },
    #[error("Other error: {0}")]
    Other(String),
}

impl StorageError {
    /// The data was fine but there is no room for it; the caller should offer an export.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    pub id: String,
    pub name: String,
    pub byte_size: u64,
    pub node_count: usize,
    pub updated_at: DateTime<Utc>,
}

pub struct Storage {
    conn: Connection,
    quota_bytes: Option<u64>,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self {
            conn,
            quota_bytes: None,
        };
        storage.init()?;
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn,
            quota_bytes: None,
        };
        storage.init()?;
        Ok(storage)
    }

    /// Limit the total size of stored documents. `None` removes the limit.
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    pub fn quota_bytes(&self) -> Option<u64> {
        self.quota_bytes
    }

    pub fn set_quota_bytes(&mut self, quota_bytes: Option<u64>) {
        self.quota_bytes = quota_bytes;
    }

    fn init(&self) -> Result<(), StorageError> {
        schema::create_tables(&self.conn)?;
        schema::create_indexes(&self.conn)?;
        schema::apply_schema_migrations(self)
    }

    fn schema_version(&self) -> Result<u32, StorageError> {
        let version: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))?;
        Ok(version.max(0) as u32)
    }

    fn set_schema_version(&self, version: u32) -> Result<(), StorageError> {
        self.conn
            .pragma_update(None, "user_version", version.to_string())?;
        Ok(())
    }

    /// Total size of every stored document, in bytes.
    pub fn used_bytes(&self) -> Result<u64, StorageError> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(byte_size), 0) FROM canvas",
            [],
            |row| row.get(0),
        )?;
        Ok(used.max(0) as u64)
    }

    /// Store `document` under `id`, replacing any previous version. Fails with
    /// [`StorageError::Exhausted`] when the quota would be exceeded; nothing is written
    /// in that case.
    pub fn save_canvas(
        &self,
        id: &str,
        document: &CanvasDocument,
    ) -> Result<CanvasSummary, StorageError> {
        let json = export_json(document)?;
        let byte_size = json.len() as u64;
        let updated_at = Utc::now();

        let tx = self.conn.unchecked_transaction()?;
        let previous: Option<i64> = tx
            .query_row(
                "SELECT byte_size FROM canvas WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        let used: i64 = tx.query_row(
            "SELECT COALESCE(SUM(byte_size), 0) FROM canvas",
            [],
            |row| row.get(0),
        )?;
        let required_bytes = (used - previous.unwrap_or(0)).max(0) as u64 + byte_size;
        if let Some(quota_bytes) = self.quota_bytes
            && required_bytes > quota_bytes
        {
            tracing::warn!(
                "Refusing to save canvas {}: {} bytes required, quota is {}",
                id,
                required_bytes,
                quota_bytes
            );
            return Err(StorageError::Exhausted {
                required_bytes,
                quota_bytes,
            });
        }

        tx.execute(
            "INSERT OR REPLACE INTO canvas (id, name, document, byte_size, node_count, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                id,
                document.canvas_name,
                json,
                byte_size as i64,
                document.nodes.len() as i64,
                updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
            ],
        )?;
        tx.commit()?;
        tracing::debug!("Saved canvas {} ({} bytes)", id, byte_size);

        Ok(CanvasSummary {
            id: id.to_string(),
            name: document.canvas_name.clone(),
            byte_size,
            node_count: document.nodes.len(),
            updated_at,
        })
    }

    /// Load and validate the document stored under `id`.
    pub fn load_canvas(&self, id: &str) -> Result<Option<CanvasDocument>, StorageError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM canvas WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|json| import_json(&json)).transpose()
    }

    /// Stored canvases, most recently saved first.
    pub fn list_canvases(&self) -> Result<Vec<CanvasSummary>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, byte_size, node_count, updated_at FROM canvas
             ORDER BY updated_at DESC, id",
        )?;
        let rows = stmt.query_map([], summary_columns)?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, name, byte_size, node_count, updated_at) = row?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map_err(|e| StorageError::Other(format!("Bad timestamp for {id}: {e}")))?
                .with_timezone(&Utc);
            summaries.push(CanvasSummary {
                id,
                name,
                byte_size: byte_size.max(0) as u64,
                node_count: node_count.max(0) as usize,
                updated_at,
            });
        }
        Ok(summaries)
    }

    pub fn delete_canvas(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self
            .conn
            .execute("DELETE FROM canvas WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

type SummaryColumns = (String, String, i64, i64, String);

fn summary_columns(row: &Row) -> rusqlite::Result<SummaryColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

#[cfg(test)]
mod tests;
