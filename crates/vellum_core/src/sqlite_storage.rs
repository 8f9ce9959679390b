//! SQLite-backed storage implementation for the persistence engine.
//!
//! Persists the live snapshots, the append-only update log, and the snapshot
//! history archive in a single SQLite database. The same database also backs
//! the blob store through a `blobs` table, so [`SqliteStorage`] implements
//! both [`DocStorage`] and [`BlobStore`].
//!
//! # Thread Safety
//!
//! The connection is wrapped in a `Mutex` for thread-safe access. SQLite
//! itself is used in serialized threading mode. Sequence assignment and the
//! snapshot freshness gate run inside SQL transactions, with composite
//! primary keys as the uniqueness backstop.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{Connection, OptionalExtension, params};

use crate::blob::{BlobPointer, BlobStore, reference_key};
use crate::config::EngineConfig;
use crate::error::{Result, VellumError};
use crate::storage::{DocRemoval, DocStorage, SnapshotUpsert};
use crate::types::{DocUpdate, Snapshot, SnapshotHistoryEntry};

/// SQLite-backed document storage and blob store.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
    inline_threshold: usize,
}

/// Parse a persisted pointer column inside a rusqlite row closure.
fn parse_pointer(idx: usize, json: &str) -> rusqlite::Result<BlobPointer> {
    serde_json::from_str(json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn pointer_json(pointer: &BlobPointer) -> Result<String> {
    Ok(serde_json::to_string(pointer)?)
}

impl SqliteStorage {
    /// Open or create a SQLite database at the given path.
    ///
    /// Creates the necessary tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or if schema
    /// initialization fails.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, &EngineConfig::default())
    }

    /// Open with an explicit engine config (inline blob threshold).
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: &EngineConfig) -> Result<Self> {
        let conn = Connection::open(path)?;
        let storage = Self {
            conn: Mutex::new(conn),
            inline_threshold: config.inline_blob_threshold,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Create an in-memory SQLite database for testing.
    ///
    /// Data is lost when the storage is dropped.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Self {
            conn: Mutex::new(conn),
            inline_threshold: EngineConfig::default().inline_blob_threshold,
        };
        storage.init_schema()?;
        Ok(storage)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Live compacted state, exactly one row per document
            CREATE TABLE IF NOT EXISTS snapshots (
                workspace_id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                blob TEXT NOT NULL,
                state BLOB,
                seq INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                updated_by TEXT NOT NULL,
                PRIMARY KEY (workspace_id, doc_id)
            );

            -- Append-only update log; the composite key enforces seq
            -- uniqueness per document
            CREATE TABLE IF NOT EXISTS updates (
                workspace_id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                blob TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                created_by TEXT NOT NULL,
                PRIMARY KEY (workspace_id, doc_id, seq)
            );

            -- Range queries by time remain cheap even though seq is the
            -- order authority
            CREATE INDEX IF NOT EXISTS idx_updates_created_at
                ON updates(workspace_id, doc_id, created_at);

            -- Append-only snapshot history archive
            CREATE TABLE IF NOT EXISTS snapshot_history (
                workspace_id TEXT NOT NULL,
                doc_id TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                blob TEXT NOT NULL,
                state BLOB,
                expired_at INTEGER,
                created_by TEXT NOT NULL,
                PRIMARY KEY (workspace_id, doc_id, timestamp)
            );

            CREATE INDEX IF NOT EXISTS idx_history_expired_at
                ON snapshot_history(expired_at);

            -- External blob locations referenced by pointers
            CREATE TABLE IF NOT EXISTS blobs (
                key TEXT PRIMARY KEY,
                data BLOB NOT NULL
            );
            "#,
        )?;
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStorage").finish_non_exhaustive()
    }
}

impl DocStorage for SqliteStorage {
    fn get_snapshot(&self, workspace_id: &str, doc_id: &str) -> Result<Option<Snapshot>> {
        let conn = self.conn.lock().unwrap();
        let snapshot = conn
            .query_row(
                "SELECT blob, state, seq, created_at, updated_at, created_by, updated_by
                 FROM snapshots WHERE workspace_id = ? AND doc_id = ?",
                params![workspace_id, doc_id],
                |row| {
                    let blob_json: String = row.get(0)?;
                    Ok(Snapshot {
                        workspace_id: workspace_id.to_string(),
                        doc_id: doc_id.to_string(),
                        blob: parse_pointer(0, &blob_json)?,
                        state: row.get(1)?,
                        seq: row.get(2)?,
                        created_at: row.get(3)?,
                        updated_at: row.get(4)?,
                        created_by: row.get(5)?,
                        updated_by: row.get(6)?,
                    })
                },
            )
            .optional()?;
        Ok(snapshot)
    }

    fn insert_snapshot(&self, snapshot: &Snapshot) -> Result<bool> {
        let blob_json = pointer_json(&snapshot.blob)?;
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO snapshots
                 (workspace_id, doc_id, blob, state, seq, created_at, updated_at, created_by, updated_by)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                snapshot.workspace_id,
                snapshot.doc_id,
                blob_json,
                snapshot.state,
                snapshot.seq,
                snapshot.created_at,
                snapshot.updated_at,
                snapshot.created_by,
                snapshot.updated_by,
            ],
        )?;
        Ok(changed == 1)
    }

    fn upsert_snapshot(&self, snapshot: &Snapshot) -> Result<SnapshotUpsert> {
        let blob_json = pointer_json(&snapshot.blob)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let existing: Option<(i64, String)> = tx
            .query_row(
                "SELECT updated_at, blob FROM snapshots WHERE workspace_id = ? AND doc_id = ?",
                params![snapshot.workspace_id, snapshot.doc_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let outcome = match existing {
            None => {
                tx.execute(
                    "INSERT INTO snapshots
                         (workspace_id, doc_id, blob, state, seq, created_at, updated_at, created_by, updated_by)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
                    params![
                        snapshot.workspace_id,
                        snapshot.doc_id,
                        blob_json,
                        snapshot.state,
                        snapshot.seq,
                        snapshot.created_at,
                        snapshot.updated_at,
                        snapshot.created_by,
                        snapshot.updated_by,
                    ],
                )?;
                SnapshotUpsert::Created
            }
            Some((stored_updated_at, _)) if snapshot.updated_at < stored_updated_at => {
                SnapshotUpsert::Stale
            }
            Some((_, old_blob_json)) => {
                tx.execute(
                    "UPDATE snapshots SET blob = ?, state = ?, seq = ?, updated_at = ?, updated_by = ?
                     WHERE workspace_id = ? AND doc_id = ?",
                    params![
                        blob_json,
                        snapshot.state,
                        snapshot.seq,
                        snapshot.updated_at,
                        snapshot.updated_by,
                        snapshot.workspace_id,
                        snapshot.doc_id,
                    ],
                )?;
                SnapshotUpsert::Replaced(serde_json::from_str(&old_blob_json)?)
            }
        };

        tx.commit()?;
        Ok(outcome)
    }

    fn append_update(
        &self,
        workspace_id: &str,
        doc_id: &str,
        blob: &BlobPointer,
        created_by: &str,
    ) -> Result<DocUpdate> {
        let blob_json = pointer_json(blob)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // max+1 assignment and the insert share one transaction; the
        // composite primary key rejects any duplicate seq regardless
        let (max_seq, max_created): (i64, i64) = tx.query_row(
            "SELECT COALESCE(MAX(seq), 0), COALESCE(MAX(created_at), 0)
             FROM updates WHERE workspace_id = ? AND doc_id = ?",
            params![workspace_id, doc_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let seq = max_seq + 1;
        let now = chrono::Utc::now().timestamp_millis();
        let created_at = now.max(max_created + 1);

        tx.execute(
            "INSERT INTO updates (workspace_id, doc_id, seq, blob, created_at, created_by)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![workspace_id, doc_id, seq, blob_json, created_at, created_by],
        )?;
        tx.commit()?;

        Ok(DocUpdate {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            seq,
            blob: blob.clone(),
            created_at,
            created_by: created_by.to_string(),
        })
    }

    fn updates_after_seq(
        &self,
        workspace_id: &str,
        doc_id: &str,
        seq: i64,
    ) -> Result<Vec<DocUpdate>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT seq, blob, created_at, created_by FROM updates
             WHERE workspace_id = ? AND doc_id = ? AND seq > ?
             ORDER BY seq ASC",
        )?;

        let updates = stmt
            .query_map(params![workspace_id, doc_id, seq], |row| {
                let blob_json: String = row.get(1)?;
                Ok(DocUpdate {
                    workspace_id: workspace_id.to_string(),
                    doc_id: doc_id.to_string(),
                    seq: row.get(0)?,
                    blob: parse_pointer(1, &blob_json)?,
                    created_at: row.get(2)?,
                    created_by: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(updates)
    }

    fn max_update_seq(&self, workspace_id: &str, doc_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(seq), 0) FROM updates WHERE workspace_id = ? AND doc_id = ?",
            params![workspace_id, doc_id],
            |row| row.get(0),
        )?;
        Ok(max)
    }

    fn delete_doc(&self, workspace_id: &str, doc_id: &str) -> Result<DocRemoval> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let mut released = Vec::new();

        let snapshot_blob: Option<String> = tx
            .query_row(
                "SELECT blob FROM snapshots WHERE workspace_id = ? AND doc_id = ?",
                params![workspace_id, doc_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(json) = snapshot_blob {
            released.push(serde_json::from_str(&json)?);
        }

        {
            let mut stmt = tx.prepare(
                "SELECT blob FROM updates WHERE workspace_id = ? AND doc_id = ? ORDER BY seq ASC",
            )?;
            let update_blobs = stmt
                .query_map(params![workspace_id, doc_id], |row| {
                    let json: String = row.get(0)?;
                    parse_pointer(0, &json)
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            released.extend(update_blobs);
        }

        let snapshot_rows = tx.execute(
            "DELETE FROM snapshots WHERE workspace_id = ? AND doc_id = ?",
            params![workspace_id, doc_id],
        )?;
        let update_rows = tx.execute(
            "DELETE FROM updates WHERE workspace_id = ? AND doc_id = ?",
            params![workspace_id, doc_id],
        )?;
        tx.commit()?;

        Ok(DocRemoval {
            existed: snapshot_rows + update_rows > 0,
            released,
        })
    }

    fn list_docs(&self, workspace_id: &str) -> Result<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT doc_id FROM snapshots WHERE workspace_id = ? ORDER BY doc_id")?;
        let docs = stmt
            .query_map(params![workspace_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(docs)
    }

    fn insert_history(&self, entry: &SnapshotHistoryEntry) -> Result<i64> {
        let blob_json = pointer_json(&entry.blob)?;
        let conn = self.conn.lock().unwrap();

        // The timestamp is the key; bump forward until a slot is free
        let mut timestamp = entry.timestamp;
        loop {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO snapshot_history
                     (workspace_id, doc_id, timestamp, blob, state, expired_at, created_by)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.workspace_id,
                    entry.doc_id,
                    timestamp,
                    blob_json,
                    entry.state,
                    entry.expired_at,
                    entry.created_by,
                ],
            )?;
            if changed == 1 {
                return Ok(timestamp);
            }
            timestamp += 1;
        }
    }

    fn get_history_at(
        &self,
        workspace_id: &str,
        doc_id: &str,
        timestamp: i64,
    ) -> Result<Option<SnapshotHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let entry = conn
            .query_row(
                "SELECT blob, state, expired_at, created_by FROM snapshot_history
                 WHERE workspace_id = ? AND doc_id = ? AND timestamp = ?",
                params![workspace_id, doc_id, timestamp],
                |row| {
                    let blob_json: String = row.get(0)?;
                    Ok(SnapshotHistoryEntry {
                        workspace_id: workspace_id.to_string(),
                        doc_id: doc_id.to_string(),
                        timestamp,
                        blob: parse_pointer(0, &blob_json)?,
                        state: row.get(1)?,
                        expired_at: row.get(2)?,
                        created_by: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    fn histories_before(
        &self,
        workspace_id: &str,
        doc_id: &str,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<SnapshotHistoryEntry>> {
        let conn = self.conn.lock().unwrap();
        let cursor = before.unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT timestamp, blob, state, expired_at, created_by FROM snapshot_history
             WHERE workspace_id = ? AND doc_id = ? AND timestamp < ?
             ORDER BY timestamp DESC LIMIT ?",
        )?;

        let entries = stmt
            .query_map(params![workspace_id, doc_id, cursor, limit as i64], |row| {
                let blob_json: String = row.get(1)?;
                Ok(SnapshotHistoryEntry {
                    workspace_id: workspace_id.to_string(),
                    doc_id: doc_id.to_string(),
                    timestamp: row.get(0)?,
                    blob: parse_pointer(1, &blob_json)?,
                    state: row.get(2)?,
                    expired_at: row.get(3)?,
                    created_by: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(entries)
    }

    fn delete_expired_histories(&self, now: i64) -> Result<Vec<BlobPointer>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let released = {
            let mut stmt = tx.prepare(
                "SELECT blob FROM snapshot_history
                 WHERE expired_at IS NOT NULL AND expired_at < ?",
            )?;
            stmt.query_map(params![now], |row| {
                let json: String = row.get(0)?;
                parse_pointer(0, &json)
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };

        tx.execute(
            "DELETE FROM snapshot_history WHERE expired_at IS NOT NULL AND expired_at < ?",
            params![now],
        )?;
        tx.commit()?;

        Ok(released)
    }
}

impl BlobStore for SqliteStorage {
    fn save(&self, workspace_id: &str, doc_id: &str, bytes: &[u8]) -> Result<BlobPointer> {
        if bytes.len() <= self.inline_threshold {
            return Ok(BlobPointer::inline(bytes.to_vec()));
        }

        let key = reference_key(workspace_id, doc_id);
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO blobs (key, data) VALUES (?, ?)",
            params![key, bytes],
        )?;
        Ok(BlobPointer::reference(key))
    }

    fn resolve(&self, pointer: &BlobPointer) -> Result<Vec<u8>> {
        match pointer {
            BlobPointer::Inline { bytes } => Ok(bytes.clone()),
            BlobPointer::Reference { key } => {
                let conn = self.conn.lock().unwrap();
                let data: Option<Vec<u8>> = conn
                    .query_row("SELECT data FROM blobs WHERE key = ?", params![key], |row| {
                        row.get(0)
                    })
                    .optional()?;
                data.ok_or_else(|| VellumError::BlobMissing(key.clone()))
            }
        }
    }

    fn delete(&self, pointer: &BlobPointer) -> Result<()> {
        match pointer {
            BlobPointer::Inline { .. } => Ok(()),
            BlobPointer::Reference { key } => {
                let conn = self.conn.lock().unwrap();
                conn.execute("DELETE FROM blobs WHERE key = ?", params![key])?;
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(workspace_id: &str, doc_id: &str, seq: i64, updated_at: i64) -> Snapshot {
        Snapshot {
            workspace_id: workspace_id.to_string(),
            doc_id: doc_id.to_string(),
            blob: BlobPointer::inline(format!("state-{}", seq).into_bytes()),
            state: Some(vec![1, 2, 3]),
            seq,
            created_at: updated_at,
            updated_at,
            created_by: "alice".to_string(),
            updated_by: "alice".to_string(),
        }
    }

    #[test]
    fn test_sqlite_snapshot_round_trip() {
        let storage = SqliteStorage::in_memory().unwrap();

        assert!(storage.get_snapshot("w1", "d1").unwrap().is_none());

        storage.upsert_snapshot(&snapshot("w1", "d1", 3, 500)).unwrap();
        let stored = storage.get_snapshot("w1", "d1").unwrap().unwrap();
        assert_eq!(stored.seq, 3);
        assert_eq!(stored.updated_at, 500);
        assert_eq!(stored.state, Some(vec![1, 2, 3]));
        assert_eq!(stored.blob, BlobPointer::inline(b"state-3".to_vec()));
    }

    #[test]
    fn test_sqlite_insert_snapshot_idempotent() {
        let storage = SqliteStorage::in_memory().unwrap();

        assert!(storage.insert_snapshot(&snapshot("w1", "d1", 0, 100)).unwrap());
        assert!(!storage.insert_snapshot(&snapshot("w1", "d1", 0, 999)).unwrap());

        let stored = storage.get_snapshot("w1", "d1").unwrap().unwrap();
        assert_eq!(stored.updated_at, 100);
    }

    #[test]
    fn test_sqlite_upsert_timestamp_gate() {
        let storage = SqliteStorage::in_memory().unwrap();

        assert_eq!(
            storage.upsert_snapshot(&snapshot("w1", "d1", 1, 200)).unwrap(),
            SnapshotUpsert::Created
        );

        // Strictly older write is a silent no-op
        assert_eq!(
            storage.upsert_snapshot(&snapshot("w1", "d1", 9, 100)).unwrap(),
            SnapshotUpsert::Stale
        );
        assert_eq!(storage.get_snapshot("w1", "d1").unwrap().unwrap().seq, 1);

        // Equal timestamp is accepted
        let result = storage.upsert_snapshot(&snapshot("w1", "d1", 2, 200)).unwrap();
        assert_eq!(result, SnapshotUpsert::Replaced(BlobPointer::inline(b"state-1".to_vec())));
        assert_eq!(storage.get_snapshot("w1", "d1").unwrap().unwrap().seq, 2);
    }

    #[test]
    fn test_sqlite_upsert_preserves_creator() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.upsert_snapshot(&snapshot("w1", "d1", 1, 100)).unwrap();

        let mut newer = snapshot("w1", "d1", 2, 200);
        newer.created_by = "bob".to_string();
        newer.updated_by = "bob".to_string();
        storage.upsert_snapshot(&newer).unwrap();

        let stored = storage.get_snapshot("w1", "d1").unwrap().unwrap();
        assert_eq!(stored.created_by, "alice");
        assert_eq!(stored.updated_by, "bob");
        assert_eq!(stored.created_at, 100);
    }

    #[test]
    fn test_sqlite_append_update_seq_and_timestamps() {
        let storage = SqliteStorage::in_memory().unwrap();

        let mut last_created = 0;
        for expected_seq in 1..=5 {
            let update = storage
                .append_update("w1", "d1", &BlobPointer::inline(b"u".to_vec()), "alice")
                .unwrap();
            assert_eq!(update.seq, expected_seq);
            assert!(update.created_at > last_created);
            last_created = update.created_at;
        }

        // Another document gets its own sequence
        let other = storage
            .append_update("w1", "d2", &BlobPointer::inline(b"u".to_vec()), "alice")
            .unwrap();
        assert_eq!(other.seq, 1);
    }

    #[test]
    fn test_sqlite_updates_after_seq() {
        let storage = SqliteStorage::in_memory().unwrap();
        for _ in 0..4 {
            storage
                .append_update("w1", "d1", &BlobPointer::inline(b"u".to_vec()), "alice")
                .unwrap();
        }

        let after = storage.updates_after_seq("w1", "d1", 2).unwrap();
        assert_eq!(after.iter().map(|u| u.seq).collect::<Vec<_>>(), vec![3, 4]);
        assert_eq!(storage.max_update_seq("w1", "d1").unwrap(), 4);
    }

    #[test]
    fn test_sqlite_delete_doc_collects_pointers() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.upsert_snapshot(&snapshot("w1", "d1", 0, 100)).unwrap();
        storage
            .append_update("w1", "d1", &BlobPointer::reference("w1/d1/a".to_string()), "alice")
            .unwrap();

        let removal = storage.delete_doc("w1", "d1").unwrap();
        assert!(removal.existed);
        assert_eq!(removal.released.len(), 2);
        assert!(storage.get_snapshot("w1", "d1").unwrap().is_none());

        assert!(!storage.delete_doc("w1", "d1").unwrap().existed);
    }

    #[test]
    fn test_sqlite_list_docs() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.insert_snapshot(&snapshot("w1", "beta", 0, 100)).unwrap();
        storage.insert_snapshot(&snapshot("w1", "alpha", 0, 100)).unwrap();
        storage.insert_snapshot(&snapshot("w2", "gamma", 0, 100)).unwrap();

        assert_eq!(storage.list_docs("w1").unwrap(), vec!["alpha", "beta"]);
    }

    fn history(timestamp: i64, expired_at: Option<i64>) -> SnapshotHistoryEntry {
        SnapshotHistoryEntry {
            workspace_id: "w1".to_string(),
            doc_id: "d1".to_string(),
            timestamp,
            blob: BlobPointer::inline(b"archived".to_vec()),
            state: None,
            expired_at,
            created_by: "alice".to_string(),
        }
    }

    #[test]
    fn test_sqlite_history_collision_bump() {
        let storage = SqliteStorage::in_memory().unwrap();

        assert_eq!(storage.insert_history(&history(1000, None)).unwrap(), 1000);
        assert_eq!(storage.insert_history(&history(1000, None)).unwrap(), 1001);

        assert!(storage.get_history_at("w1", "d1", 1000).unwrap().is_some());
        assert!(storage.get_history_at("w1", "d1", 1001).unwrap().is_some());
        assert!(storage.get_history_at("w1", "d1", 1002).unwrap().is_none());
    }

    #[test]
    fn test_sqlite_histories_before_pagination() {
        let storage = SqliteStorage::in_memory().unwrap();
        for ts in [1000, 2000, 3000, 4000, 5000] {
            storage.insert_history(&history(ts, None)).unwrap();
        }

        let page1 = storage.histories_before("w1", "d1", None, 2).unwrap();
        assert_eq!(page1.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![5000, 4000]);

        let page2 = storage.histories_before("w1", "d1", Some(4000), 2).unwrap();
        assert_eq!(page2.iter().map(|e| e.timestamp).collect::<Vec<_>>(), vec![3000, 2000]);
    }

    #[test]
    fn test_sqlite_cleanup_expired_only() {
        let storage = SqliteStorage::in_memory().unwrap();
        storage.insert_history(&history(1000, Some(1500))).unwrap();
        storage.insert_history(&history(2000, Some(9999))).unwrap();
        storage.insert_history(&history(3000, None)).unwrap();

        let released = storage.delete_expired_histories(2000).unwrap();
        assert_eq!(released.len(), 1);

        assert!(storage.get_history_at("w1", "d1", 1000).unwrap().is_none());
        assert!(storage.get_history_at("w1", "d1", 2000).unwrap().is_some());
        assert!(storage.get_history_at("w1", "d1", 3000).unwrap().is_some());
    }

    #[test]
    fn test_sqlite_blob_store_threshold() {
        let config = EngineConfig {
            inline_blob_threshold: 8,
            ..Default::default()
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        let storage = SqliteStorage::open_with_config(file.path(), &config).unwrap();

        let small = storage.save("w1", "d1", b"tiny").unwrap();
        assert!(small.is_inline());

        let big = storage.save("w1", "d1", b"definitely larger than eight").unwrap();
        assert!(!big.is_inline());
        assert_eq!(
            storage.resolve(&big).unwrap(),
            b"definitely larger than eight"
        );

        storage.delete(&big).unwrap();
        assert!(matches!(
            storage.resolve(&big),
            Err(VellumError::BlobMissing(_))
        ));
    }

    #[test]
    fn test_sqlite_persists_across_reopen() {
        let file = tempfile::NamedTempFile::new().unwrap();
        {
            let storage = SqliteStorage::open(file.path()).unwrap();
            storage.upsert_snapshot(&snapshot("w1", "d1", 1, 100)).unwrap();
            storage
                .append_update("w1", "d1", &BlobPointer::inline(b"u".to_vec()), "alice")
                .unwrap();
        }

        let storage = SqliteStorage::open(file.path()).unwrap();
        assert!(storage.get_snapshot("w1", "d1").unwrap().is_some());
        assert_eq!(storage.max_update_seq("w1", "d1").unwrap(), 1);
    }
}
