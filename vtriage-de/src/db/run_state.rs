//! Run-state ledger: persisted per-chunk, per-stage completion tracking
//!
//! Every stage loop consults `is_done` before recomputing and calls
//! `mark_done` only after its output is durably persisted. A crash between
//! the two leaves the stage safely re-runnable.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use vtriage_common::types::{ChunkId, Stage, StageStatus};
use vtriage_common::Result;

#[derive(Clone)]
pub struct RunStateTracker {
    pool: SqlitePool,
}

impl RunStateTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn is_done(&self, chunk_id: &ChunkId, stage: Stage) -> Result<bool> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT status FROM run_state WHERE chunk_id = ? AND stage = ?")
                .bind(chunk_id.as_str())
                .bind(stage.as_str())
                .fetch_optional(&self.pool)
                .await?;
        Ok(matches!(row, Some((status,)) if status == StageStatus::Done.as_str()))
    }

    /// Mark a stage complete for a chunk. Call only after the stage output
    /// is durably persisted (persist output, then mark done — never the
    /// reverse).
    pub async fn mark_done(&self, chunk_id: &ChunkId, stage: Stage) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO run_state (chunk_id, stage, status, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (chunk_id, stage) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(chunk_id.as_str())
        .bind(stage.as_str())
        .bind(StageStatus::Done.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        tracing::debug!(chunk_id = %chunk_id, stage = %stage, "Stage marked done");
        Ok(())
    }

    /// Operator-only: regress a stage back to NOT_STARTED. Never called by
    /// the pipeline itself.
    pub async fn reset(&self, chunk_id: &ChunkId, stage: Stage) -> Result<()> {
        sqlx::query("DELETE FROM run_state WHERE chunk_id = ? AND stage = ?")
            .bind(chunk_id.as_str())
            .bind(stage.as_str())
            .execute(&self.pool)
            .await?;
        tracing::warn!(chunk_id = %chunk_id, stage = %stage, "Stage reset by operator");
        Ok(())
    }

    /// Chunk ids with the given stage DONE.
    pub async fn done_chunks(&self, stage: Stage) -> Result<BTreeSet<ChunkId>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT chunk_id FROM run_state WHERE stage = ? AND status = ?")
                .bind(stage.as_str())
                .bind(StageStatus::Done.as_str())
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| ChunkId::new(id)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn tracker() -> (TempDir, RunStateTracker) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("vtriage.db"))
            .await
            .unwrap();
        (dir, RunStateTracker::new(pool))
    }

    #[tokio::test]
    async fn test_mark_and_check() {
        let (_dir, tracker) = tracker().await;
        let chunk = ChunkId::new("chunk_001.mp4");
        assert!(!tracker.is_done(&chunk, Stage::Decided).await.unwrap());
        tracker.mark_done(&chunk, Stage::Decided).await.unwrap();
        assert!(tracker.is_done(&chunk, Stage::Decided).await.unwrap());
        // Other stages unaffected
        assert!(!tracker.is_done(&chunk, Stage::Executed).await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_done_is_idempotent() {
        let (_dir, tracker) = tracker().await;
        let chunk = ChunkId::new("chunk_001.mp4");
        tracker.mark_done(&chunk, Stage::Scored).await.unwrap();
        tracker.mark_done(&chunk, Stage::Scored).await.unwrap();
        assert!(tracker.is_done(&chunk, Stage::Scored).await.unwrap());
    }

    #[tokio::test]
    async fn test_reset_regresses_stage() {
        let (_dir, tracker) = tracker().await;
        let chunk = ChunkId::new("chunk_001.mp4");
        tracker.mark_done(&chunk, Stage::Decided).await.unwrap();
        tracker.reset(&chunk, Stage::Decided).await.unwrap();
        assert!(!tracker.is_done(&chunk, Stage::Decided).await.unwrap());
    }

    #[tokio::test]
    async fn test_done_chunks_filters_by_stage() {
        let (_dir, tracker) = tracker().await;
        tracker
            .mark_done(&ChunkId::new("a.mp4"), Stage::Decided)
            .await
            .unwrap();
        tracker
            .mark_done(&ChunkId::new("b.mp4"), Stage::Decided)
            .await
            .unwrap();
        tracker
            .mark_done(&ChunkId::new("c.mp4"), Stage::Executed)
            .await
            .unwrap();
        let done = tracker.done_chunks(Stage::Decided).await.unwrap();
        assert_eq!(done.len(), 2);
        assert!(done.contains(&ChunkId::new("a.mp4")));
    }
}
