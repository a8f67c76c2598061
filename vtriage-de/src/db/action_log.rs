//! Append-only action log: the single source of truth for "has this already
//! happened"
//!
//! Rows are only ever inserted. The executor consults `has_applied` with the
//! chunk + action signature before touching the filesystem; resume after a
//! crash replays the plan against this log and performs no duplicate side
//! effects.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;
use vtriage_common::types::{ActionKind, ActionLogEntry, ActionOutcome, ChunkId};
use vtriage_common::Result;

#[derive(Clone)]
pub struct ActionLogStore {
    pool: SqlitePool,
}

impl ActionLogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. Never updates or deletes existing rows.
    pub async fn append(&self, entry: &ActionLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO action_log (id, chunk_id, kind, outcome, destination, detail, executed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(entry.chunk_id.as_str())
        .bind(entry.kind.as_str())
        .bind(entry.outcome.as_str())
        .bind(entry.destination.as_deref())
        .bind(entry.detail.as_deref())
        .bind(entry.executed_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Whether a prior APPLIED record exists for this chunk + action
    /// signature.
    pub async fn has_applied(
        &self,
        chunk_id: &ChunkId,
        kind: ActionKind,
        destination: Option<&str>,
    ) -> Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM action_log WHERE chunk_id = ? AND kind = ? AND outcome = ? \
             AND destination IS ? LIMIT 1",
        )
        .bind(chunk_id.as_str())
        .bind(kind.as_str())
        .bind(ActionOutcome::Applied.as_str())
        .bind(destination)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// Full log in append order.
    pub async fn load_all(&self) -> Result<Vec<ActionLogEntry>> {
        let rows: Vec<(String, String, String, Option<String>, Option<String>, String)> =
            sqlx::query_as(
                "SELECT chunk_id, kind, outcome, destination, detail, executed_at \
                 FROM action_log ORDER BY rowid",
            )
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for (chunk_id, kind, outcome, destination, detail, executed_at) in rows {
            entries.push(ActionLogEntry {
                chunk_id: ChunkId::new(chunk_id),
                kind: kind.parse::<ActionKind>()?,
                outcome: outcome.parse::<ActionOutcome>()?,
                destination,
                detail,
                executed_at: DateTime::parse_from_rfc3339(&executed_at)
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(entries)
    }
}
