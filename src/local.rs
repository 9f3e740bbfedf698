//! Local fallback persistence: a small key-value table in the app data
//! directory, used when no remote identity is present. The document is an
//! opaque JSON string to this layer.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::errors::AppResult;

pub struct LocalStore {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl LocalStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;
        let path = data_dir.join(database_file);
        let connection = Connection::open(&path)?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
            );
            "#,
        )?;
        info!(target: "local_store", path = %path.display(), "local store ready");
        Ok(Self {
            connection: Mutex::new(connection),
            path,
        })
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        let connection = self.connection.lock();
        let value = connection
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let connection = self.connection.lock();
        connection.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            (key, value, Utc::now().to_rfc3339()),
        )?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path(), "local.db").unwrap();
        assert_eq!(store.get("camerite_dashboard_data").unwrap(), None);

        store.set("camerite_dashboard_data", "{\"year\":2025}").unwrap();
        assert_eq!(
            store.get("camerite_dashboard_data").unwrap().as_deref(),
            Some("{\"year\":2025}")
        );

        store.set("camerite_dashboard_data", "{\"year\":2026}").unwrap();
        assert_eq!(
            store.get("camerite_dashboard_data").unwrap().as_deref(),
            Some("{\"year\":2026}")
        );
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        {
            let store = LocalStore::open(dir.path(), "local.db").unwrap();
            store.set("doc", "persisted").unwrap();
        }
        let store = LocalStore::open(dir.path(), "local.db").unwrap();
        assert_eq!(store.get("doc").unwrap().as_deref(), Some("persisted"));
        assert!(store.path().ends_with("local.db"));
    }
}
