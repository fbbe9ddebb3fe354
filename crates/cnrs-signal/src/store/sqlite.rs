//! SQLite list store
//!
//! Provides persistent room lists to survive server restarts. Each entry is a
//! row keyed by `(room, seq)`; pushing to the front takes a sequence number
//! below the current minimum, so ascending `seq` is list order.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection};
use tracing::{error, info};

use cnrs_core::StoreError;

use super::ListStore;

/// SQLite storage backend
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a new SQLite database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(db_error)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory database (for testing)
    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(db_error)?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS room_peers (
                room TEXT NOT NULL,
                seq INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (room, seq)
            );
            "#,
        )
        .map_err(db_error)?;

        info!("Storage schema initialized");
        Ok(())
    }

    /// Get total room count
    pub fn room_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let count: i64 = conn
            .query_row("SELECT COUNT(DISTINCT room) FROM room_peers", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    /// Get total peer record count across rooms
    pub fn total_peer_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM room_peers", [], |row| row.get(0))
            .map_err(db_error)?;
        Ok(count as usize)
    }

    fn count(conn: &Connection, key: &str) -> Result<usize, StoreError> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM room_peers WHERE room = ?1",
                params![key],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        Ok(count as usize)
    }
}

#[async_trait]
impl ListStore for SqliteStore {
    async fn length(&self, key: &str) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;
        Self::count(&conn, key)
    }

    async fn range(&self, key: &str, start: usize, end: usize) -> Result<Vec<String>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let limit = to_sql_int(end - start);
        let offset = to_sql_int(start);

        let mut stmt = conn
            .prepare(
                "SELECT payload FROM room_peers WHERE room = ?1 ORDER BY seq ASC LIMIT ?2 OFFSET ?3",
            )
            .map_err(db_error)?;

        let rows = stmt
            .query_map(params![key, limit, offset], |row| row.get::<_, String>(0))
            .map_err(db_error)?;

        let values = rows.collect::<Result<Vec<_>, _>>().map_err(db_error)?;
        Ok(values)
    }

    async fn push_front(&self, key: &str, value: String) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        conn.execute(
            "INSERT INTO room_peers (room, seq, payload)
             VALUES (?1, (SELECT COALESCE(MIN(seq), 0) - 1 FROM room_peers WHERE room = ?1), ?2)",
            params![key, value],
        )
        .map_err(db_error)?;

        Self::count(&conn, key)
    }

    async fn set_at(&self, key: &str, index: usize, value: String) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockPoisoned)?;

        let changed = conn
            .execute(
                "UPDATE room_peers SET payload = ?1
                 WHERE room = ?2 AND seq = (
                     SELECT seq FROM room_peers WHERE room = ?2 ORDER BY seq ASC LIMIT 1 OFFSET ?3
                 )",
                params![value, key, to_sql_int(index)],
            )
            .map_err(db_error)?;

        if changed == 0 {
            let len = Self::count(&conn, key)?;
            return Err(StoreError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn db_error(e: rusqlite::Error) -> StoreError {
    error!("Database error: {:?}", e);
    StoreError::Backend(e.to_string())
}
