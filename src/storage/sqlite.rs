//! SQLite ledger backend.
//!
//! One row per run. The run id is the primary key, so a duplicate append is
//! refused by the database itself and surfaces as `LedgerConflict`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::storage::RunLedger;
use crate::types::{EndgameError, RunRecord};

const CREATE_RUNS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    run_id    TEXT PRIMARY KEY NOT NULL,
    timestamp TEXT NOT NULL,
    record    TEXT NOT NULL
)
"#;

pub struct SqliteLedger {
    pool: SqlitePool,
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

impl SqliteLedger {
    /// Open (creating if needed) the database file at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new().filename(path).create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open SQLite ledger {}", path.display()))?;

        Self::with_pool(pool).await
    }

    /// Private in-memory database, dropped with the ledger. Nothing is
    /// persisted, so it only suits tests and throwaway ledgers.
    pub async fn in_memory() -> Result<Self> {
        // Every pooled connection to :memory: is a separate database, so
        // pin the pool to a single connection that never expires.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite ledger")?;

        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        sqlx::query(CREATE_RUNS_TABLE)
            .execute(&pool)
            .await
            .context("Failed to create runs table")?;
        debug!("SQLite ledger schema ready");
        Ok(Self { pool })
    }
}

#[async_trait]
impl RunLedger for SqliteLedger {
    async fn append(&self, record: &RunRecord) -> Result<(), EndgameError> {
        let body = serde_json::to_string(record)
            .map_err(|e| EndgameError::Storage(format!("Failed to serialise run: {e}")))?;

        let result = sqlx::query("INSERT INTO runs (run_id, timestamp, record) VALUES (?, ?, ?)")
            .bind(&record.run_id)
            .bind(record.timestamp.to_rfc3339())
            .bind(body)
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!(run_id = %record.run_id, "Run appended to SQLite ledger");
                Ok(())
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(run_id = %record.run_id, "Duplicate run id rejected");
                Err(EndgameError::LedgerConflict(record.run_id.clone()))
            }
            Err(e) => Err(EndgameError::Storage(format!("Failed to insert run: {e}"))),
        }
    }

    async fn runs(&self) -> Result<Vec<RunRecord>, EndgameError> {
        let rows = sqlx::query("SELECT record FROM runs ORDER BY rowid")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| EndgameError::Storage(format!("Failed to read runs: {e}")))?;

        rows.iter()
            .map(|row| {
                let body: String = row.get("record");
                serde_json::from_str(&body)
                    .map_err(|e| EndgameError::Storage(format!("Corrupt run row: {e}")))
            })
            .collect()
    }

    async fn contains(&self, run_id: &str) -> Result<bool, EndgameError> {
        let row = sqlx::query("SELECT 1 FROM runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| EndgameError::Storage(format!("Failed to query run: {e}")))?;
        Ok(row.is_some())
    }
}
