//! Database access for vtriage-de
//!
//! All durable engine state lives in one SQLite database in the root folder:
//! the score store, the run-state ledger, decision records, and the
//! append-only action log.

pub mod action_log;
pub mod decisions;
pub mod run_state;
pub mod scores;

pub use action_log::ActionLogStore;
pub use decisions::DecisionStore;
pub use run_state::RunStateTracker;
pub use scores::ScoreStore;

use sqlx::SqlitePool;
use std::path::Path;
use vtriage_common::Result;

/// Initialize database connection pool.
///
/// Connects to the shared vtriage.db in the root folder, creating it (and
/// its parent directory) when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;
    init_tables(&pool).await?;

    Ok(pool)
}

/// Create engine tables if they don't exist.
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source_file TEXT NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Write-once per (chunk, signal, stage); enforced in ScoreStore
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scores (
            chunk_id TEXT NOT NULL,
            signal TEXT NOT NULL,
            stage TEXT NOT NULL,
            value REAL NOT NULL,
            recorded_at TEXT NOT NULL,
            PRIMARY KEY (chunk_id, signal, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS semantic_candidates (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            category TEXT NOT NULL,
            confidence REAL NOT NULL,
            provenance TEXT NOT NULL,
            recorded_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_state (
            chunk_id TEXT NOT NULL,
            stage TEXT NOT NULL,
            status TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (chunk_id, stage)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS decisions (
            chunk_id TEXT PRIMARY KEY,
            aggregate_score REAL NOT NULL,
            final_score REAL NOT NULL,
            category TEXT NOT NULL,
            category_confidence REAL NOT NULL,
            provenance TEXT,
            verdict TEXT NOT NULL,
            reasons TEXT NOT NULL,
            decided_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Append-only: rows are inserted, never updated or deleted
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS action_log (
            id TEXT PRIMARY KEY,
            chunk_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            outcome TEXT NOT NULL,
            destination TEXT,
            detail TEXT,
            executed_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!(
        "Database tables initialized (chunks, scores, semantic_candidates, run_state, decisions, action_log)"
    );

    Ok(())
}
