//! SQLite-backed durable store for scheduler state.
//!
//! The store holds the three things that must survive a scheduler restart:
//! - the framework identity assigned on first registration
//! - one record per launched task
//! - every stored version of every app definition
//!
//! Records are stored as JSON payloads keyed by their ids; the scheduler
//! core never queries inside a payload.

use std::path::Path;
use std::sync::Mutex;

use armada_id::{AppId, FrameworkId, TaskId};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use crate::model::{AppDefinition, TaskRecord};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("payload encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store call timed out")]
    Timeout,
}

/// Durable store contract used by the tracker and the app repository.
#[async_trait]
pub trait SchedulerStore: Send + Sync {
    async fn framework_id(&self) -> Result<Option<FrameworkId>, StoreError>;
    async fn set_framework_id(&self, id: &FrameworkId) -> Result<(), StoreError>;

    async fn put_task(&self, task: &TaskRecord) -> Result<(), StoreError>;
    async fn remove_task(&self, task_id: &TaskId) -> Result<(), StoreError>;
    async fn load_tasks(&self) -> Result<Vec<TaskRecord>, StoreError>;

    async fn put_app_version(&self, app: &AppDefinition) -> Result<(), StoreError>;

    /// Deletes every stored version of an app; one flag per version,
    /// `true` when that version's row was actually removed.
    async fn delete_app_versions(&self, app_id: &AppId) -> Result<Vec<bool>, StoreError>;

    async fn current_app_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, StoreError>;

    async fn app_ids(&self) -> Result<Vec<AppId>, StoreError>;
}

/// SQLite store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS framework (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                framework_id TEXT
            );

            INSERT OR IGNORE INTO framework (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                app_id TEXT NOT NULL,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_app_id ON tasks(app_id);

            CREATE TABLE IF NOT EXISTS app_versions (
                app_id TEXT NOT NULL,
                version_ms INTEGER NOT NULL,
                payload TEXT NOT NULL,
                PRIMARY KEY (app_id, version_ms)
            );
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned lock means a panic mid-statement; the connection is
        // still structurally valid for subsequent statements.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SchedulerStore for SqliteStore {
    async fn framework_id(&self) -> Result<Option<FrameworkId>, StoreError> {
        let conn = self.lock();
        let value: Option<String> = conn
            .query_row("SELECT framework_id FROM framework WHERE id = 1", [], |r| {
                r.get(0)
            })
            .optional()?
            .flatten();
        Ok(value.map(FrameworkId::new))
    }

    async fn set_framework_id(&self, id: &FrameworkId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "UPDATE framework SET framework_id = ?1 WHERE id = 1",
            params![id.as_str()],
        )?;
        Ok(())
    }

    async fn put_task(&self, task: &TaskRecord) -> Result<(), StoreError> {
        let payload = serde_json::to_string(task)?;
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO tasks (task_id, app_id, payload)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(task_id) DO UPDATE SET payload = excluded.payload
            "#,
            params![task.id.to_string(), task.app_id.to_string(), payload],
        )?;
        Ok(())
    }

    async fn remove_task(&self, task_id: &TaskId) -> Result<(), StoreError> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM tasks WHERE task_id = ?1",
            params![task_id.to_string()],
        )?;
        Ok(())
    }

    async fn load_tasks(&self) -> Result<Vec<TaskRecord>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT payload FROM tasks ORDER BY task_id")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut tasks = Vec::with_capacity(payloads.len());
        for payload in payloads {
            tasks.push(serde_json::from_str(&payload)?);
        }
        Ok(tasks)
    }

    async fn put_app_version(&self, app: &AppDefinition) -> Result<(), StoreError> {
        let payload = serde_json::to_string(app)?;
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO app_versions (app_id, version_ms, payload)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(app_id, version_ms) DO UPDATE SET payload = excluded.payload
            "#,
            params![
                app.id.to_string(),
                app.version.timestamp_millis(),
                payload
            ],
        )?;
        Ok(())
    }

    async fn delete_app_versions(&self, app_id: &AppId) -> Result<Vec<bool>, StoreError> {
        let conn = self.lock();
        let versions: Vec<i64> = {
            let mut stmt =
                conn.prepare("SELECT version_ms FROM app_versions WHERE app_id = ?1")?;
            let rows = stmt
                .query_map(params![app_id.to_string()], |row| row.get(0))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut results = Vec::with_capacity(versions.len());
        for version_ms in versions {
            let deleted = conn.execute(
                "DELETE FROM app_versions WHERE app_id = ?1 AND version_ms = ?2",
                params![app_id.to_string(), version_ms],
            )?;
            results.push(deleted == 1);
        }
        Ok(results)
    }

    async fn current_app_version(
        &self,
        app_id: &AppId,
    ) -> Result<Option<AppDefinition>, StoreError> {
        let conn = self.lock();
        let payload: Option<String> = conn
            .query_row(
                r#"
                SELECT payload FROM app_versions
                WHERE app_id = ?1
                ORDER BY version_ms DESC
                LIMIT 1
                "#,
                params![app_id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn app_ids(&self) -> Result<Vec<AppId>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT DISTINCT app_id FROM app_versions ORDER BY app_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        // Stored ids were validated on the way in; skip anything unreadable.
        Ok(ids.iter().filter_map(|s| AppId::parse(s).ok()).collect())
    }
}
