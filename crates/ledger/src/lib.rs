//! # Ledger
//!
//! Durable state store for converge deployments, backed by SQLite.
//!
//! One row per logical resource name holds the record body as JSON; a
//! `meta` table holds the schema version and the store revision. Every
//! mutation runs in an immediate transaction that checks the revision the
//! caller last observed, so two processes applying the same deployment
//! cannot silently overwrite each other.
//!
//! ## Example
//!
//! ```no_run
//! use converge::StateStore;
//! use ledger::SqliteStore;
//! use std::path::Path;
//!
//! let store = SqliteStore::open(Path::new("/tmp/keel/state.db"))?;
//! let snapshot = store.load()?;
//! for (name, record) in &snapshot.records {
//!     println!("{name}: {} ({})", record.live_identity, record.resource_type);
//! }
//! # Ok::<(), converge::Error>(())
//! ```

mod error;

pub use error::{Error, Result};

use chrono::SecondsFormat;
use converge::{RECORD_FORMAT, Revision, StateRecord, StateSnapshot, StateStore};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Layout version of the database
pub const SCHEMA_VERSION: i64 = 1;

/// How long to wait for another process holding the write lock
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed [`StateStore`]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create a state database at the given path
    ///
    /// Creates the database file and necessary tables if they don't exist.
    pub fn open(db_path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        log::debug!("Opened state database {}", db_path.display());
        Self::init(conn, Some(db_path.to_path_buf()))
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', 1);
            INSERT OR IGNORE INTO meta (key, value) VALUES ('revision', 0);

            CREATE TABLE IF NOT EXISTS resources (
                name TEXT PRIMARY KEY,
                resource_type TEXT NOT NULL,
                identity TEXT NOT NULL,
                inputs_hash TEXT NOT NULL,
                format INTEGER NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        let found = read_meta(&conn, "schema_version")?;
        if found > SCHEMA_VERSION {
            return Err(Error::UnsupportedSchema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Database file, if on disk
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current store revision
    pub fn revision(&self) -> Result<Revision> {
        Ok(read_meta(&self.lock(), "revision")? as Revision)
    }

    /// Read every record with the revision they belong to
    pub fn snapshot(&self) -> Result<StateSnapshot> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let revision = read_meta(&tx, "revision")? as Revision;

        let mut records = BTreeMap::new();
        {
            let mut stmt = tx.prepare("SELECT name, format, body FROM resources ORDER BY name")?;
            let rows = stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            for row in rows {
                let (name, format, body) = row?;
                if format > RECORD_FORMAT {
                    return Err(Error::UnsupportedRecord { name, format });
                }
                let record: StateRecord = serde_json::from_str(&body)?;
                records.insert(name, record);
            }
        }
        tx.commit()?;

        Ok(StateSnapshot { revision, records })
    }

    /// Insert or replace a record if the store is still at `expected`
    pub fn put(&self, name: &str, record: &StateRecord, expected: Revision) -> Result<Revision> {
        let body = serde_json::to_string(record)?;
        self.mutate(expected, |tx| {
            tx.execute(
                "INSERT INTO resources (name, resource_type, identity, inputs_hash, format, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                    resource_type = excluded.resource_type,
                    identity = excluded.identity,
                    inputs_hash = excluded.inputs_hash,
                    format = excluded.format,
                    body = excluded.body,
                    updated_at = excluded.updated_at",
                params![
                    name,
                    record.resource_type,
                    record.live_identity,
                    record.inputs_hash,
                    record.format,
                    body,
                    record.updated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
                ],
            )?;
            Ok(())
        })
    }

    /// Delete a record if the store is still at `expected`
    pub fn delete(&self, name: &str, expected: Revision) -> Result<Revision> {
        self.mutate(expected, |tx| {
            tx.execute("DELETE FROM resources WHERE name = ?1", params![name])?;
            Ok(())
        })
    }

    fn mutate<F>(&self, expected: Revision, write: F) -> Result<Revision>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<()>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let found = read_meta(&tx, "revision")? as Revision;
        if found != expected {
            return Err(Error::Conflict { expected, found });
        }

        write(&tx)?;
        let next = found + 1;
        tx.execute(
            "UPDATE meta SET value = ?1 WHERE key = 'revision'",
            params![next as i64],
        )?;
        tx.commit()?;
        Ok(next)
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn read_meta(conn: &Connection, key: &str) -> Result<i64> {
    let value = conn
        .query_row("SELECT value FROM meta WHERE key = ?1", params![key], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(value.unwrap_or(0))
}

impl StateStore for SqliteStore {
    fn load(&self) -> converge::Result<StateSnapshot> {
        Ok(self.snapshot()?)
    }

    fn commit(
        &self,
        name: &str,
        record: &StateRecord,
        expected: Revision,
    ) -> converge::Result<Revision> {
        Ok(self.put(name, record, expected)?)
    }

    fn remove(&self, name: &str, expected: Revision) -> converge::Result<Revision> {
        Ok(self.delete(name, expected)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge::{Attributes, Inputs};
    use serde_json::json;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn record(identity: &str, size: i64) -> StateRecord {
        StateRecord::new(
            "bucket",
            identity,
            Inputs::from([("size".to_string(), json!(size))]),
            Attributes::from([("arn".to_string(), json!(format!("arn:{identity}")))]),
            BTreeSet::from(["vpc".to_string()]),
        )
    }

    #[test]
    fn test_open_creates_db() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("state").join("keel.db");

        let store = SqliteStore::open(&db_path).unwrap();
        assert!(db_path.exists());
        assert_eq!(store.path(), Some(db_path.as_path()));
        assert_eq!(store.revision().unwrap(), 0);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_commit_and_reload() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("keel.db");

        {
            let store = SqliteStore::open(&db_path).unwrap();
            let rev = store.commit("logs", &record("logs-1", 10), 0).unwrap();
            assert_eq!(rev, 1);
            let rev = store.commit("logs", &record("logs-1", 20), rev).unwrap();
            assert_eq!(rev, 2);
        }

        let store = SqliteStore::open(&db_path).unwrap();
        let snapshot = store.load().unwrap();
        assert_eq!(snapshot.revision, 2);
        assert_eq!(snapshot.len(), 1);
        let logs = snapshot.get("logs").unwrap();
        assert_eq!(logs.inputs["size"], json!(20));
        assert_eq!(logs.attributes["arn"], json!("arn:logs-1"));
        assert!(logs.dependencies.contains("vpc"));
        assert_eq!(logs, &record_with_time(&record("logs-1", 20), logs));
    }

    fn record_with_time(record: &StateRecord, like: &StateRecord) -> StateRecord {
        StateRecord {
            updated_at: like.updated_at,
            ..record.clone()
        }
    }

    #[test]
    fn test_retired_incarnations_survive_reload() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state.db");
        let old = record("logs-1", 10);
        let current = record("logs-2", 20).with_retired(vec![converge::Retired::from(&old)]);
        SqliteStore::open(&path)
            .unwrap()
            .commit("logs", &current, 0)
            .unwrap();

        let snapshot = SqliteStore::open(&path).unwrap().snapshot().unwrap();
        let logs = snapshot.get("logs").unwrap();
        assert_eq!(logs.live_identity, "logs-2");
        assert_eq!(logs.retired.len(), 1);
        assert_eq!(logs.retired[0].live_identity, "logs-1");
        assert_eq!(logs.retired[0].inputs["size"], json!(10));
    }

    #[test]
    fn test_remove() {
        let store = SqliteStore::open_in_memory().unwrap();
        let rev = store.commit("logs", &record("logs-1", 10), 0).unwrap();
        let rev = store.remove("logs", rev).unwrap();
        assert_eq!(rev, 2);
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_conflict_between_processes() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("keel.db");
        let first = SqliteStore::open(&db_path).unwrap();
        let second = SqliteStore::open(&db_path).unwrap();

        let seen = second.load().unwrap().revision;
        first.commit("logs", &record("logs-1", 10), 0).unwrap();

        let err = second.commit("data", &record("data-1", 5), seen).unwrap_err();
        assert!(matches!(
            err,
            converge::Error::ConcurrentModification {
                expected: 0,
                found: 1
            }
        ));
        assert!(second.load().unwrap().get("data").is_none());

        let err = second.remove("logs", seen).unwrap_err();
        assert!(matches!(err, converge::Error::ConcurrentModification { .. }));
        assert!(first.load().unwrap().get("logs").is_some());
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("keel.db");
        SqliteStore::open(&db_path).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        conn.execute("UPDATE meta SET value = 99 WHERE key = 'schema_version'", [])
            .unwrap();
        drop(conn);

        let err = SqliteStore::open(&db_path).err().unwrap();
        assert!(matches!(err, Error::UnsupportedSchema { found: 99, .. }));
    }

    #[test]
    fn test_newer_record_format_is_rejected() {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("keel.db");
        let store = SqliteStore::open(&db_path).unwrap();
        store.commit("logs", &record("logs-1", 10), 0).unwrap();

        let conn = Connection::open(&db_path).unwrap();
        conn.execute("UPDATE resources SET format = 7 WHERE name = 'logs'", [])
            .unwrap();
        drop(conn);

        let err = store.snapshot().unwrap_err();
        assert!(matches!(err, Error::UnsupportedRecord { format: 7, .. }));
        let err: converge::Error = err.into();
        assert!(matches!(err, converge::Error::State(_)));
    }

    #[test]
    fn test_corrupt_body_is_a_state_error() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.commit("logs", &record("logs-1", 10), 0).unwrap();
        store
            .lock()
            .execute("UPDATE resources SET body = '{not json' WHERE name = 'logs'", [])
            .unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, converge::Error::State(message) if message.contains("corrupt")));
    }
}
