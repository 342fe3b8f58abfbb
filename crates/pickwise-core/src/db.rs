// SQLite persistence layer: one picklist blob per event plus a small
// key-value table for app state.

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::persist::{BlobStore, KEY_PREFIX};

/// SQLite-backed blob storage.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database (useful
    /// for tests).
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS picklist_blobs (
                key      TEXT PRIMARY KEY,
                value    TEXT NOT NULL,
                saved_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS app_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the database connection.
    ///
    /// Panics if the mutex is poisoned (another thread panicked while
    /// holding the lock). This should never happen in normal operation.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    /// When the blob under `key` was last written, if it exists.
    pub fn last_saved(&self, key: &str) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn();
        let saved_at: Option<String> = conn
            .query_row(
                "SELECT saved_at FROM picklist_blobs WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .context("failed to query saved_at")?;

        saved_at
            .map(|ts| {
                DateTime::parse_from_rfc3339(&ts)
                    .map(|dt| dt.with_timezone(&Utc))
                    .with_context(|| format!("invalid saved_at timestamp {ts:?}"))
            })
            .transpose()
    }

    /// Event ids that have a stored picklist blob, sorted.
    pub fn stored_events(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT key FROM picklist_blobs WHERE key LIKE ?1 ORDER BY key")
            .context("failed to prepare stored_events query")?;

        let keys = stmt
            .query_map(params![format!("{KEY_PREFIX}%")], |row| row.get::<_, String>(0))
            .context("failed to query stored events")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map stored event rows")?;

        Ok(keys
            .into_iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX).map(str::to_string))
            .collect())
    }

    // ------------------------------------------------------------------
    // Active event
    // ------------------------------------------------------------------

    /// Key used in the app_state table to store the last opened event.
    const ACTIVE_EVENT_KEY: &'static str = "active_event";

    /// The event opened most recently, if any.
    pub fn active_event(&self) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM app_state WHERE key = ?1",
            params![Self::ACTIVE_EVENT_KEY],
            |row| row.get(0),
        )
        .optional()
        .context("failed to load active event")
    }

    pub fn set_active_event(&self, event_id: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?1, ?2)",
            params![Self::ACTIVE_EVENT_KEY, event_id],
        )
        .context("failed to save active event")?;
        Ok(())
    }
}

impl BlobStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT value FROM picklist_blobs WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to load blob")
    }

    /// Uses INSERT OR REPLACE so each save overwrites the previous blob in a
    /// single statement.
    fn put(&self, key: &str, blob: &str) -> Result<()> {
        let conn = self.conn();
        let saved_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        conn.execute(
            "INSERT OR REPLACE INTO picklist_blobs (key, value, saved_at) VALUES (?1, ?2, ?3)",
            params![key, blob, saved_at],
        )
        .context("failed to save blob")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::PicklistPersistence;
    use crate::picklist::PicklistSet;
    use crate::store::PicklistStore;
    use crate::team::TeamId;

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn sample_set() -> PicklistSet {
        let mut store = PicklistStore::default();
        store
            .save_list("Finalists", vec![TeamId::from(33), TeamId::from(254)])
            .unwrap();
        store.cross_out(&TeamId::from(33));
        store.set().clone()
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"picklist_blobs".to_string()));
        assert!(tables.contains(&"app_state".to_string()));
    }

    #[test]
    fn put_and_get_round_trip() {
        let db = test_db();
        db.put("k", r#"{"lists":{}}"#).unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some(r#"{"lists":{}}"#));
    }

    #[test]
    fn get_returns_none_for_missing_key() {
        let db = test_db();
        assert!(db.get("nonexistent").unwrap().is_none());
    }

    #[test]
    fn put_overwrites_previous_value() {
        let db = test_db();
        db.put("k", "1").unwrap();
        db.put("k", "2").unwrap();

        assert_eq!(db.get("k").unwrap().as_deref(), Some("2"));
        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM picklist_blobs", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn put_stamps_saved_at() {
        let db = test_db();
        assert!(db.last_saved("k").unwrap().is_none());

        let before = Utc::now() - chrono::Duration::seconds(1);
        db.put("k", "1").unwrap();

        let saved_at = db.last_saved("k").unwrap().expect("timestamp recorded");
        assert!(saved_at >= before);
    }

    #[test]
    fn stored_events_lists_picklist_keys_only() {
        let db = test_db();
        let persistence = PicklistPersistence::new(db);
        persistence.save("2025mndu", &sample_set()).unwrap();
        persistence.save("2025casj", &sample_set()).unwrap();
        persistence.backend().put("unrelated", "x").unwrap();

        let events = persistence.backend().stored_events().unwrap();

        assert_eq!(events, vec!["2025casj".to_string(), "2025mndu".to_string()]);
    }

    #[test]
    fn persistence_round_trip_through_sqlite() {
        let persistence = PicklistPersistence::new(test_db());
        let set = sample_set();

        persistence.save("2025mndu", &set).unwrap();
        let (loaded, _) = persistence.load("2025mndu").unwrap();

        assert_eq!(loaded, set);
    }

    #[test]
    fn active_event_persists_via_state_store() {
        let db = test_db();
        assert!(db.active_event().unwrap().is_none());

        db.set_active_event("2025mndu").unwrap();
        assert_eq!(db.active_event().unwrap().as_deref(), Some("2025mndu"));

        db.set_active_event("2025wila").unwrap();
        assert_eq!(db.active_event().unwrap().as_deref(), Some("2025wila"));
    }

    #[test]
    fn file_database_survives_reopen() {
        let tmp_dir = std::env::temp_dir();
        let db_path = tmp_dir.join(format!("pickwise_reopen_{}.db", std::process::id()));
        let db_path_str = db_path.to_str().unwrap();
        let _ = std::fs::remove_file(&db_path);

        {
            let persistence = PicklistPersistence::new(Database::open(db_path_str).unwrap());
            persistence.save("2025mndu", &sample_set()).unwrap();
        }

        let persistence = PicklistPersistence::new(Database::open(db_path_str).unwrap());
        let (loaded, _) = persistence.load("2025mndu").unwrap();
        assert_eq!(loaded, sample_set());

        drop(persistence);
        let _ = std::fs::remove_file(&db_path);
        let _ = std::fs::remove_file(format!("{}-wal", db_path_str));
        let _ = std::fs::remove_file(format!("{}-shm", db_path_str));
    }
}
