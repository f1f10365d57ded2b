//! Durable pending-record storage
//!
//! SQLite-backed queue of sync records awaiting remote acknowledgment. A
//! record is appended on every domain write and removed only after an ack, so
//! the queue survives process restarts. Persistence is best-effort: a store
//! failure is logged and the record lives on in the in-memory queue.

use super::{RecordKey, RecordType, SyncRecord};
use crate::Result;
use rusqlite::{params, Connection};
use std::path::Path;

/// SQLite store for queued sync records
pub struct PendingStore {
    conn: Connection,
}

impl PendingStore {
    /// Open or create the pending-record database
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        tracing::info!(path = %path.display(), "Opening pending-record database");

        let conn = Connection::open(path)?;

        // WAL mode for better concurrency with readers
        conn.pragma_update(None, "journal_mode", "WAL")?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// In-memory store for tests and ephemeral runs
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS pending_records (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                record_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                origin_device_id TEXT NOT NULL,
                UNIQUE (timestamp, record_type, origin_device_id)
            );

            CREATE INDEX IF NOT EXISTS idx_pending_identity
                ON pending_records(timestamp, record_type, origin_device_id);
            "#,
        )?;
        Ok(())
    }

    /// Append a record to the durable queue
    pub fn append(&self, record: &SyncRecord) -> Result<()> {
        let payload = serde_json::to_string(&record.payload)?;

        self.conn.execute(
            "INSERT OR IGNORE INTO pending_records
                 (user_id, record_type, payload, timestamp, origin_device_id)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.user_id,
                record.record_type.as_str(),
                payload,
                record.timestamp,
                record.origin_device_id,
            ],
        )?;
        Ok(())
    }

    /// Load all pending records in insertion order
    pub fn load_all(&self) -> Result<Vec<SyncRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT user_id, record_type, payload, timestamp, origin_device_id
             FROM pending_records ORDER BY seq ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (user_id, record_type, payload, timestamp, origin_device_id) = row?;
            let record_type: RecordType = record_type.parse()?;
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            records.push(SyncRecord {
                user_id,
                record_type,
                payload,
                timestamp,
                origin_device_id,
            });
        }
        Ok(records)
    }

    /// Remove the record matching the identity key; returns whether a row
    /// was deleted.
    pub fn remove(&self, key: &RecordKey) -> Result<bool> {
        let (timestamp, record_type, origin_device_id) = key;
        let deleted = self.conn.execute(
            "DELETE FROM pending_records
             WHERE timestamp = ?1 AND record_type = ?2 AND origin_device_id = ?3",
            params![timestamp, record_type.as_str(), origin_device_id],
        )?;
        Ok(deleted > 0)
    }

    /// Number of records awaiting acknowledgment
    pub fn count(&self) -> Result<usize> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM pending_records", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}
