//! SQLite database layer for workflow records, the message audit log and
//! the durable queues.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::FlowError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, FlowError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| FlowError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| FlowError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, FlowError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| FlowError::Database(format!("Failed to open in-memory db: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| FlowError::Database(e.to_string()))
    }

    /// Execute a closure with mutable access to the connection, for
    /// operations that need a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&mut Connection) -> Result<T, FlowError>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| FlowError::Database(format!("Lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| FlowError::Database(format!("Task join error: {}", e)))?
    }

    /// Async variant of [`Database::with_conn_mut`].
    pub async fn with_conn_mut_async<F, T>(&self, f: F) -> Result<T, FlowError>
    where
        F: FnOnce(&mut Connection) -> Result<T, FlowError> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn_mut(f))
            .await
            .map_err(|e| FlowError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), FlowError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS workflows (
                    id              TEXT PRIMARY KEY,
                    user_id         TEXT NOT NULL,
                    input_id        TEXT NOT NULL,
                    status          TEXT NOT NULL DEFAULT 'initiated',
                    current_step_id TEXT NOT NULL,
                    steps           TEXT NOT NULL DEFAULT '[]',
                    metadata        TEXT NOT NULL DEFAULT '{}',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);

                CREATE TABLE IF NOT EXISTS agent_messages (
                    message_id      TEXT PRIMARY KEY,
                    workflow_id     TEXT NOT NULL,
                    step_id         TEXT NOT NULL,
                    agent_type      TEXT NOT NULL,
                    message_type    TEXT NOT NULL,
                    payload         TEXT NOT NULL DEFAULT 'null',
                    retry_count     INTEGER,
                    timestamp       INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_agent_messages_workflow
                    ON agent_messages(workflow_id);

                CREATE TABLE IF NOT EXISTS processed_messages (
                    message_id      TEXT PRIMARY KEY,
                    processed_at    INTEGER NOT NULL
                );

                CREATE TABLE IF NOT EXISTS outbound_messages (
                    seq             INTEGER PRIMARY KEY AUTOINCREMENT,
                    queue           TEXT NOT NULL,
                    message_id      TEXT NOT NULL,
                    body            TEXT NOT NULL,
                    available_at    INTEGER NOT NULL DEFAULT 0,
                    created_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_outbound_queue ON outbound_messages(queue, seq);

                CREATE TABLE IF NOT EXISTS inbound_messages (
                    id              TEXT PRIMARY KEY,
                    body            TEXT NOT NULL,
                    attempts        INTEGER NOT NULL DEFAULT 0,
                    visible_at      INTEGER NOT NULL,
                    created_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_inbound_visible ON inbound_messages(visible_at);
                ",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory_creates_tables() {
        let db = Database::open_in_memory().unwrap();
        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                     ('workflows', 'agent_messages', 'processed_messages',
                      'outbound_messages', 'inbound_messages')",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn test_open_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("flow.db");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        db.with_conn(|conn| conn.execute("DELETE FROM workflows", [])).unwrap();
        assert!(path.exists());
    }
}
