//! Version storage layer.
//!
//! Provides SQLite-backed persistence for version rows. Dedup is enforced by
//! the table's unique constraint, so concurrent writers need no coordination
//! beyond the database itself.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::config::VersioningConfig;
use crate::error::{KeepsakeError, KeepsakeResult};
use crate::versioning::version::{format_timestamp, parse_timestamp};
use crate::versioning::{NewVersion, RecordKey, Version, VersionId, VersionSummary};

/// Trait for version storage operations
pub trait VersionStore: Send + Sync {
    /// Insert a version; `None` when identical content is already stored for the record
    fn insert(&self, version: &NewVersion) -> KeepsakeResult<Option<VersionId>>;

    /// Get a version row by id
    fn find(&self, id: VersionId) -> KeepsakeResult<Option<Version>>;

    /// All versions of a record, most recently updated first
    fn list(&self, key: &RecordKey) -> KeepsakeResult<Vec<Version>>;

    /// Most recently created version of a record
    fn latest(&self, key: &RecordKey) -> KeepsakeResult<Option<Version>>;

    /// Number of versions of a record
    fn count(&self, key: &RecordKey) -> KeepsakeResult<usize>;

    /// Delete one version; false if no such row
    fn delete(&self, id: VersionId) -> KeepsakeResult<bool>;

    /// Delete all versions of a record
    fn delete_all(&self, key: &RecordKey) -> KeepsakeResult<usize>;

    /// Keep only the `keep` most recent versions of a record
    fn prune(&self, key: &RecordKey, keep: usize) -> KeepsakeResult<usize>;

    /// Version summary for a record
    fn summary(&self, key: &RecordKey) -> KeepsakeResult<Option<VersionSummary>>;

    /// Count total versions in store
    fn count_all(&self) -> KeepsakeResult<usize>;
}

/// Open a database file for shared use: waits on locks and uses WAL.
pub(crate) fn open_connection(path: &Path, busy_timeout: Duration) -> KeepsakeResult<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(path).map_err(|e| KeepsakeError::connection_failed(path, e))?;
    conn.busy_timeout(busy_timeout)?;
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    tracing::debug!(path = %path.display(), journal_mode = %mode, "opened database");
    Ok(conn)
}

const COLUMNS: &str = "id, object_id, object_table, name, data, hash, created_at, updated_at";

/// SQLite-backed version store
pub struct SqliteVersionStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteVersionStore {
    /// Open (or create) a store at the given path
    pub fn new(path: impl AsRef<Path>, config: &VersioningConfig) -> KeepsakeResult<Self> {
        config.validate()?;
        let conn = open_connection(path.as_ref(), config.busy_timeout())?;
        Self::with_connection(conn, config)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> KeepsakeResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, &VersioningConfig::default())
    }

    fn with_connection(conn: Connection, config: &VersioningConfig) -> KeepsakeResult<Self> {
        config.validate()?;
        let store = Self {
            conn: Mutex::new(conn),
            table: config.table.clone(),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Name of the backing table
    pub fn table(&self) -> &str {
        &self.table
    }

    fn conn(&self) -> KeepsakeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| KeepsakeError::Internal("version store connection lock poisoned".into()))
    }

    fn init_schema(&self) -> KeepsakeResult<()> {
        let conn = self.conn()?;
        let t = &self.table;
        conn.execute_batch(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                object_id INTEGER NOT NULL,
                object_table VARCHAR(255) NOT NULL,
                name VARCHAR(255) NOT NULL,
                data TEXT NOT NULL,
                hash VARCHAR(255) NOT NULL,
                created_at TIMESTAMP,
                updated_at TIMESTAMP,
                UNIQUE(object_id, object_table, hash)
            );

            CREATE INDEX IF NOT EXISTS idx_{t}_object_id
                ON {t}(object_id);

            -- Ordered history listing
            CREATE INDEX IF NOT EXISTS idx_{t}_object_updated
                ON {t}(object_id, object_table, updated_at DESC);

            -- Latest version lookup
            CREATE INDEX IF NOT EXISTS idx_{t}_object_created
                ON {t}(object_id, object_table, created_at DESC);
        "#
        ))?;
        Ok(())
    }

    fn row_to_version(row: &rusqlite::Row<'_>) -> KeepsakeResult<Version> {
        let created_at: String = row.get(6)?;
        let updated_at: String = row.get(7)?;

        Ok(Version {
            id: row.get(0)?,
            object_id: row.get(1)?,
            object_type: row.get(2)?,
            name: row.get(3)?,
            data: row.get(4)?,
            hash: row.get(5)?,
            created_at: parse_timestamp(&created_at)?,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn is_unique_violation(err: &rusqlite::Error) -> bool {
        matches!(
            err,
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        )
    }
}

impl VersionStore for SqliteVersionStore {
    fn insert(&self, version: &NewVersion) -> KeepsakeResult<Option<VersionId>> {
        let timestamp = format_timestamp(&version.captured_at)?;
        let conn = self.conn()?;

        let result = conn.execute(
            &format!(
                r#"INSERT INTO {}
                   (object_id, object_table, name, data, hash, created_at, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                self.table
            ),
            params![
                version.key.object_id,
                version.key.object_type,
                version.name,
                version.data,
                version.hash,
                timestamp,
                timestamp,
            ],
        );

        match result {
            Ok(_) => Ok(Some(conn.last_insert_rowid())),
            // Same content already stored for this record; possibly by a concurrent writer.
            Err(e) if Self::is_unique_violation(&e) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn find(&self, id: VersionId) -> KeepsakeResult<Option<Version>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM {} WHERE id = ?1",
            self.table
        ))?;

        stmt.query_row(params![id], |row| Ok(Self::row_to_version(row)))
            .optional()?
            .transpose()
    }

    fn list(&self, key: &RecordKey) -> KeepsakeResult<Vec<Version>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {COLUMNS} FROM {}
               WHERE object_id = ?1 AND object_table = ?2
               ORDER BY updated_at DESC, id DESC"#,
            self.table
        ))?;

        let results = stmt.query_map(params![key.object_id, key.object_type], |row| {
            Ok(Self::row_to_version(row))
        })?;

        results
            .map(|r| r.map_err(|e| e.into()).and_then(|inner| inner))
            .collect()
    }

    fn latest(&self, key: &RecordKey) -> KeepsakeResult<Option<Version>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT {COLUMNS} FROM {}
               WHERE object_id = ?1 AND object_table = ?2
               ORDER BY created_at DESC, id DESC
               LIMIT 1"#,
            self.table
        ))?;

        stmt.query_row(params![key.object_id, key.object_type], |row| {
            Ok(Self::row_to_version(row))
        })
        .optional()?
        .transpose()
    }

    fn count(&self, key: &RecordKey) -> KeepsakeResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM {} WHERE object_id = ?1 AND object_table = ?2",
                self.table
            ),
            params![key.object_id, key.object_type],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn delete(&self, id: VersionId) -> KeepsakeResult<bool> {
        let conn = self.conn()?;
        let count = conn.execute(
            &format!("DELETE FROM {} WHERE id = ?1", self.table),
            params![id],
        )?;
        Ok(count > 0)
    }

    fn delete_all(&self, key: &RecordKey) -> KeepsakeResult<usize> {
        let conn = self.conn()?;
        let count = conn.execute(
            &format!(
                "DELETE FROM {} WHERE object_id = ?1 AND object_table = ?2",
                self.table
            ),
            params![key.object_id, key.object_type],
        )?;
        Ok(count)
    }

    fn prune(&self, key: &RecordKey, keep: usize) -> KeepsakeResult<usize> {
        let conn = self.conn()?;

        // Delete versions older than the Nth most recent
        let count = conn.execute(
            &format!(
                r#"DELETE FROM {t}
                   WHERE object_id = ?1 AND object_table = ?2
                   AND id NOT IN (
                       SELECT id
                       FROM {t}
                       WHERE object_id = ?1 AND object_table = ?2
                       ORDER BY created_at DESC, id DESC
                       LIMIT ?3
                   )"#,
                t = self.table
            ),
            params![key.object_id, key.object_type, keep as i64],
        )?;
        Ok(count)
    }

    fn summary(&self, key: &RecordKey) -> KeepsakeResult<Option<VersionSummary>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"SELECT
                COUNT(*) as total,
                MIN(created_at) as first,
                MAX(created_at) as last
               FROM {}
               WHERE object_id = ?1 AND object_table = ?2"#,
            self.table
        ))?;

        let row: (i64, Option<String>, Option<String>) = stmt
            .query_row(params![key.object_id, key.object_type], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;

        let (total, Some(first), Some(last)) = row else {
            return Ok(None);
        };
        if total == 0 {
            return Ok(None);
        }

        let latest_version_id: VersionId = conn.query_row(
            &format!(
                r#"SELECT id FROM {}
                   WHERE object_id = ?1 AND object_table = ?2
                   ORDER BY created_at DESC, id DESC
                   LIMIT 1"#,
                self.table
            ),
            params![key.object_id, key.object_type],
            |row| row.get(0),
        )?;

        Ok(Some(VersionSummary {
            key: key.clone(),
            total_versions: total as usize,
            latest_version_id,
            first_captured: parse_timestamp(&first)?,
            last_captured: parse_timestamp(&last)?,
        }))
    }

    fn count_all(&self) -> KeepsakeResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", self.table), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}
