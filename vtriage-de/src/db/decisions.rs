//! Persistence for decision records
//!
//! A decision is produced exactly once per chunk per run. Store-then-mark
//! ordering means a crash can leave a record without its DONE marker; the
//! decider is deterministic, so re-storing on resume rewrites an identical
//! record.

use chrono::Utc;
use sqlx::SqlitePool;
use vtriage_common::types::{Category, ChunkId, DecisionRecord, Provenance, Verdict};
use vtriage_common::{Error, Result};

#[derive(Clone)]
pub struct DecisionStore {
    pool: SqlitePool,
}

impl DecisionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn store(&self, record: &DecisionRecord) -> Result<()> {
        let reasons_json = serde_json::to_string(&record.reasons)
            .map_err(|e| Error::Internal(format!("serialize reasons failed: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO decisions (
                chunk_id, aggregate_score, final_score, category,
                category_confidence, provenance, verdict, reasons, decided_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (chunk_id) DO UPDATE SET
                aggregate_score = excluded.aggregate_score,
                final_score = excluded.final_score,
                category = excluded.category,
                category_confidence = excluded.category_confidence,
                provenance = excluded.provenance,
                verdict = excluded.verdict,
                reasons = excluded.reasons,
                decided_at = excluded.decided_at
            "#,
        )
        .bind(record.chunk_id.as_str())
        .bind(record.aggregate_score)
        .bind(record.final_score)
        .bind(record.category.as_str())
        .bind(record.category_confidence)
        .bind(record.provenance.map(|p| p.as_str()))
        .bind(record.verdict.as_str())
        .bind(reasons_json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load(&self, chunk_id: &ChunkId) -> Result<Option<DecisionRecord>> {
        let row: Option<DecisionRow> = sqlx::query_as(
            "SELECT chunk_id, aggregate_score, final_score, category, category_confidence, \
             provenance, verdict, reasons FROM decisions WHERE chunk_id = ?",
        )
        .bind(chunk_id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(DecisionRow::into_record).transpose()
    }

    /// All decision records, ordered by chunk id.
    pub async fn load_all(&self) -> Result<Vec<DecisionRecord>> {
        let rows: Vec<DecisionRow> = sqlx::query_as(
            "SELECT chunk_id, aggregate_score, final_score, category, category_confidence, \
             provenance, verdict, reasons FROM decisions ORDER BY chunk_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(DecisionRow::into_record).collect()
    }
}

#[derive(sqlx::FromRow)]
struct DecisionRow {
    chunk_id: String,
    aggregate_score: f64,
    final_score: f64,
    category: String,
    category_confidence: f64,
    provenance: Option<String>,
    verdict: String,
    reasons: String,
}

impl DecisionRow {
    fn into_record(self) -> Result<DecisionRecord> {
        let reasons: Vec<String> = serde_json::from_str(&self.reasons)
            .map_err(|e| Error::Internal(format!("parse reasons failed: {e}")))?;
        Ok(DecisionRecord {
            chunk_id: ChunkId::new(self.chunk_id),
            aggregate_score: self.aggregate_score,
            final_score: self.final_score,
            category: Category::from(self.category),
            category_confidence: self.category_confidence,
            provenance: self
                .provenance
                .map(|p| p.parse::<Provenance>())
                .transpose()?,
            verdict: self.verdict.parse::<Verdict>()?,
            reasons,
        })
    }
}
