//! SQLite storage backend

use super::traits::{
    ArtifactKey, ArtifactPhase, ArtifactStore, OpenStore, StorageError, StorageResult,
};
use crate::record::{RawRecord, RecordId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// SQLite-backed artifact store
///
/// Uses a single database file with a `records` table (partitioned by the
/// `category` column once routed) and an `artifacts` table keyed by
/// (scope, phase). Thread-safe via internal mutex on the connection.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id TEXT PRIMARY KEY,
                category TEXT,
                content_kind TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_records_category
                ON records(category);

            CREATE TABLE IF NOT EXISTS artifacts (
                scope TEXT NOT NULL,
                phase TEXT NOT NULL,
                blob BLOB NOT NULL,
                PRIMARY KEY (scope, phase)
            );

            CREATE INDEX IF NOT EXISTS idx_artifacts_phase
                ON artifacts(phase);

            -- Concurrent readers while a writer commits
            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Records currently assigned to `category`, ordered by id
    pub fn load_category(&self, category: &str) -> StorageResult<Vec<RawRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT record_json FROM records WHERE category = ?1 ORDER BY id")?;
        let rows = stmt.query_map(params![category], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ArtifactStore for SqliteStore {
    // === Record staging ===

    fn save_record(&self, record: &RawRecord) -> StorageResult<()> {
        let record_json = serde_json::to_string(record)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO records (id, category, content_kind, record_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                category = excluded.category,
                content_kind = excluded.content_kind,
                record_json = excluded.record_json
            "#,
            params![
                record.id.as_str(),
                record.category,
                record.content_kind.as_str(),
                record_json,
            ],
        )?;
        Ok(())
    }

    fn load_record(&self, id: &RecordId) -> StorageResult<Option<RawRecord>> {
        let conn = self.conn()?;
        let json: Option<String> = conn
            .query_row(
                "SELECT record_json FROM records WHERE id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn load_records(&self) -> StorageResult<Vec<RawRecord>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT record_json FROM records ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(serde_json::from_str(&row?)?);
        }
        Ok(records)
    }

    fn record_count(&self) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // === Artifacts ===

    fn put_artifact(&self, key: &ArtifactKey, blob: &[u8]) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO artifacts (scope, phase, blob)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(scope, phase) DO UPDATE SET blob = excluded.blob
            "#,
            params![key.scope, key.phase.as_str(), blob],
        )?;
        Ok(())
    }

    fn get_artifact(&self, key: &ArtifactKey) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn()?;
        let blob = conn
            .query_row(
                "SELECT blob FROM artifacts WHERE scope = ?1 AND phase = ?2",
                params![key.scope, key.phase.as_str()],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(blob)
    }

    fn has_artifact(&self, key: &ArtifactKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM artifacts WHERE scope = ?1 AND phase = ?2",
            params![key.scope, key.phase.as_str()],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    fn delete_artifact(&self, key: &ArtifactKey) -> StorageResult<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM artifacts WHERE scope = ?1 AND phase = ?2",
            params![key.scope, key.phase.as_str()],
        )?;
        Ok(deleted > 0)
    }

    fn list_artifacts(&self, phase: ArtifactPhase) -> StorageResult<Vec<ArtifactKey>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT scope FROM artifacts WHERE phase = ?1 ORDER BY scope")?;
        let rows = stmt.query_map(params![phase.as_str()], |row| row.get::<_, String>(0))?;

        let mut keys = Vec::new();
        for scope in rows {
            keys.push(ArtifactKey::new(scope?, phase));
        }
        Ok(keys)
    }
}
