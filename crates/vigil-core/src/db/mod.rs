//! SQLite database layer for the Vigil backend.
//!
//! Uses rusqlite with WAL mode for concurrent read performance.
//! All database operations are executed via `tokio::task::spawn_blocking`
//! to avoid blocking the async runtime.

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::ServerError;

/// Thread-safe handle to the SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open (or create) a SQLite database at the given path.
    pub fn open(db_path: &str) -> Result<Self, ServerError> {
        let path = Path::new(db_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(db_path)
            .map_err(|e| ServerError::Database(format!("Failed to open database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;

        tracing::info!("SQLite database opened at: {}", db_path);
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, ServerError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| ServerError::Database(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| ServerError::Database(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };

        db.initialize_tables()?;
        Ok(db)
    }

    /// Execute a closure with access to the database connection.
    /// Automatically handles locking and error conversion.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ServerError::Database(format!("Lock poisoned: {}", e)))?;
        f(&conn).map_err(|e| ServerError::Database(e.to_string()))
    }

    /// Execute a closure with access to the database connection (async-friendly).
    pub async fn with_conn_async<F, T>(&self, f: F) -> Result<T, ServerError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| ServerError::Database(format!("Task join error: {}", e)))?
    }

    /// Create all tables if they don't exist.
    fn initialize_tables(&self) -> Result<(), ServerError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "
                CREATE TABLE IF NOT EXISTS anomalies (
                    id                  TEXT PRIMARY KEY,
                    title               TEXT NOT NULL,
                    description         TEXT NOT NULL,
                    kind                TEXT NOT NULL DEFAULT 'other',
                    severity            TEXT NOT NULL DEFAULT 'medium',
                    status              TEXT NOT NULL DEFAULT 'detected',
                    confidence          REAL NOT NULL DEFAULT 0.0,
                    latitude            REAL NOT NULL,
                    longitude           REAL NOT NULL,
                    location            TEXT NOT NULL,
                    source_id           TEXT,
                    source_type         TEXT NOT NULL DEFAULT 'manual',
                    raw_data            TEXT NOT NULL DEFAULT '{}',
                    ai_analysis         TEXT,
                    verification_data   TEXT,
                    impact_assessment   TEXT,
                    media_urls          TEXT NOT NULL DEFAULT '[]',
                    tags                TEXT NOT NULL DEFAULT '[]',
                    reviewed_by         TEXT,
                    reviewed_at         INTEGER,
                    resolved_at         INTEGER,
                    created_at          INTEGER NOT NULL,
                    updated_at          INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_anomalies_kind ON anomalies(kind);
                CREATE INDEX IF NOT EXISTS idx_anomalies_severity ON anomalies(severity);
                CREATE INDEX IF NOT EXISTS idx_anomalies_status ON anomalies(status);
                CREATE INDEX IF NOT EXISTS idx_anomalies_created ON anomalies(created_at);
                CREATE INDEX IF NOT EXISTS idx_anomalies_coords ON anomalies(latitude, longitude);

                CREATE TABLE IF NOT EXISTS workflows (
                    id              TEXT PRIMARY KEY,
                    name            TEXT NOT NULL UNIQUE,
                    description     TEXT NOT NULL DEFAULT '',
                    kind            TEXT NOT NULL DEFAULT 'default',
                    status          TEXT NOT NULL DEFAULT 'draft',
                    version         INTEGER NOT NULL DEFAULT 1,
                    steps           TEXT NOT NULL DEFAULT '[]',
                    created_at      INTEGER NOT NULL,
                    updated_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_workflows_status ON workflows(status);

                CREATE TABLE IF NOT EXISTS workflow_executions (
                    id              TEXT PRIMARY KEY,
                    workflow_id     TEXT NOT NULL REFERENCES workflows(id),
                    anomaly_id      TEXT,
                    status          TEXT NOT NULL DEFAULT 'pending',
                    current_step    TEXT,
                    step_results    TEXT NOT NULL DEFAULT '[]',
                    input           TEXT NOT NULL DEFAULT '{}',
                    output          TEXT,
                    error           TEXT,
                    triggered_by    TEXT NOT NULL DEFAULT 'manual',
                    started_at      INTEGER,
                    completed_at    INTEGER,
                    duration_ms     INTEGER,
                    created_at      INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_executions_workflow ON workflow_executions(workflow_id);
                CREATE INDEX IF NOT EXISTS idx_executions_anomaly ON workflow_executions(anomaly_id);
                CREATE INDEX IF NOT EXISTS idx_executions_status ON workflow_executions(status);
                ",
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_backed_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vigil.db").to_string_lossy().to_string();

        {
            let db = Database::open(&path).unwrap();
            db.with_conn_async(|conn| {
                conn.execute(
                    "INSERT INTO workflows (id, name, created_at, updated_at) \
                     VALUES ('w-1', 'Persisted', 0, 0)",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        let name: String = reopened
            .with_conn(|conn| {
                conn.query_row("SELECT name FROM workflows WHERE id = 'w-1'", [], |row| {
                    row.get(0)
                })
            })
            .unwrap();
        assert_eq!(name, "Persisted");
    }
}
