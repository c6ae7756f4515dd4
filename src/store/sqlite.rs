use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::BlobStore;
use crate::error::StoreError;

/// Blob store over a single SQLite connection. Ids are rowids and stay
/// opaque to callers.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::with_connection(conn)
    }

    /// Backing for tests and ephemeral runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               content BLOB NOT NULL,
               created_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
             );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl BlobStore for SqliteBlobStore {
    fn put(&self, bytes: &[u8]) -> Result<i64, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute("INSERT INTO documents (content) VALUES (?1);", params![bytes])?;
        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<Vec<u8>, StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT content FROM documents WHERE id = ?1;",
            params![id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or(StoreError::NotFound(id))
    }
}
