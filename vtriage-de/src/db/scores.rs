//! Score store: append-only, idempotent persistence of per-chunk raw signal
//! values and semantic-tag candidates
//!
//! Writes are keyed by (chunk, signal, stage) and happen at most once:
//! re-ingesting an identical value is a no-op, re-ingesting a different value
//! is a contract violation surfaced as `Error::ScoreConflict`.

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;
use vtriage_common::types::{
    Category, Chunk, ChunkId, Provenance, ScoreRecord, SemanticCandidate, Signal, Stage,
};
use vtriage_common::{Error, Result};

/// Equality tolerance when deciding whether a re-ingested value matches the
/// stored one (REAL column round-trip).
const VALUE_EPSILON: f64 = 1e-9;

#[derive(Clone)]
pub struct ScoreStore {
    pool: SqlitePool,
}

impl ScoreStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a chunk. Idempotent: re-registering an existing chunk id is
    /// a no-op (chunks are immutable once created).
    pub async fn register_chunk(&self, chunk: &Chunk) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO chunks (id, source_file, start_ms, end_ms, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(chunk.id.as_str())
        .bind(&chunk.source_file)
        .bind(chunk.start_ms)
        .bind(chunk.end_ms)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record one signal value for a chunk.
    ///
    /// Values are clamped to [0.0, 1.0] at this ingest boundary; NaN is
    /// rejected. Write-once per (chunk, signal, stage).
    pub async fn record_score(&self, record: &ScoreRecord) -> Result<()> {
        if record.value.is_nan() {
            return Err(Error::InvalidInput(format!(
                "NaN score for {}/{}",
                record.chunk_id, record.signal
            )));
        }
        let value = record.value.clamp(0.0, 1.0);

        let existing: Option<(f64,)> = sqlx::query_as(
            "SELECT value FROM scores WHERE chunk_id = ? AND signal = ? AND stage = ?",
        )
        .bind(record.chunk_id.as_str())
        .bind(record.signal.as_str())
        .bind(record.stage.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((stored,)) = existing {
            if (stored - value).abs() > VALUE_EPSILON {
                return Err(Error::ScoreConflict {
                    chunk: record.chunk_id.to_string(),
                    signal: record.signal.to_string(),
                    stage: record.stage.to_string(),
                    stored,
                    attempted: value,
                });
            }
            tracing::debug!(
                chunk_id = %record.chunk_id,
                signal = %record.signal,
                "Score already recorded, skipping"
            );
            return Ok(());
        }

        sqlx::query(
            r#"
            INSERT INTO scores (chunk_id, signal, stage, value, recorded_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.chunk_id.as_str())
        .bind(record.signal.as_str())
        .bind(record.stage.as_str())
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a semantic-tag candidate. Multiple candidates may exist per
    /// chunk; the decider picks one.
    pub async fn record_candidate(&self, candidate: &SemanticCandidate) -> Result<()> {
        if candidate.confidence.is_nan() {
            return Err(Error::InvalidInput(format!(
                "NaN confidence for {}",
                candidate.chunk_id
            )));
        }
        sqlx::query(
            r#"
            INSERT INTO semantic_candidates (id, chunk_id, category, confidence, provenance, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(candidate.chunk_id.as_str())
        .bind(candidate.category.as_str())
        .bind(candidate.confidence.clamp(0.0, 1.0))
        .bind(candidate.provenance.as_str())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All registered chunks in id order.
    pub async fn list_chunks(&self) -> Result<Vec<Chunk>> {
        let rows: Vec<(String, String, i64, i64)> =
            sqlx::query_as("SELECT id, source_file, start_ms, end_ms FROM chunks ORDER BY id")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|(id, source_file, start_ms, end_ms)| Chunk {
                id: ChunkId::new(id),
                source_file,
                start_ms,
                end_ms,
            })
            .collect())
    }

    /// All score records for one chunk, in (signal, stage) order for
    /// deterministic downstream consumption.
    pub async fn scores_for(&self, chunk_id: &ChunkId) -> Result<Vec<ScoreRecord>> {
        let rows: Vec<(String, String, f64)> = sqlx::query_as(
            "SELECT signal, stage, value FROM scores WHERE chunk_id = ? ORDER BY signal, stage",
        )
        .bind(chunk_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for (signal, stage, value) in rows {
            records.push(ScoreRecord {
                chunk_id: chunk_id.clone(),
                signal: Signal::from(signal),
                value,
                stage: stage.parse::<Stage>()?,
            });
        }
        Ok(records)
    }

    /// All semantic candidates for one chunk, in insertion order.
    pub async fn candidates_for(&self, chunk_id: &ChunkId) -> Result<Vec<SemanticCandidate>> {
        let rows: Vec<(String, f64, String)> = sqlx::query_as(
            "SELECT category, confidence, provenance FROM semantic_candidates \
             WHERE chunk_id = ? ORDER BY rowid",
        )
        .bind(chunk_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (category, confidence, provenance) in rows {
            candidates.push(SemanticCandidate {
                chunk_id: chunk_id.clone(),
                category: Category::from(category),
                confidence,
                provenance: provenance.parse::<Provenance>()?,
            });
        }
        Ok(candidates)
    }
}
