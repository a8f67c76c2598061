//! Ingest collaborator JSON into the score store
//!
//! Upstream perception modules exchange results as flat JSON documents:
//! a scores file keyed by chunk id with `<metric>_score` entries, and a
//! semantic tags file keyed by chunk id with category and attribution.
//! This module parses both, registers any chunks it has not seen, and
//! records scores and candidates through the write-once store.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};
use vtriage_common::types::{
    Category, Chunk, ChunkId, Provenance, ScoreRecord, SemanticCandidate, Signal, Stage,
};
use vtriage_common::{Error, Result};

use crate::db::{RunStateTracker, ScoreStore};

/// What one ingest call wrote, for operator-facing reporting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct IngestReport {
    pub chunks_registered: usize,
    pub scores_recorded: usize,
    pub candidates_recorded: usize,
    /// Records rejected by the write-once contract, with the cause
    pub conflicts: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    category: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    attribution: Option<String>,
}

/// Load chunk metadata from a JSON array of chunk objects.
pub async fn ingest_chunks(store: &ScoreStore, path: &Path) -> Result<usize> {
    let raw = tokio::fs::read_to_string(path).await?;
    let chunks: Vec<Chunk> = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidInput(format!("malformed chunks file {}: {e}", path.display())))?;

    for chunk in &chunks {
        store.register_chunk(chunk).await?;
    }
    info!(count = chunks.len(), file = %path.display(), "ingested chunk metadata");
    Ok(chunks.len())
}

/// Load a scores document: `{ "<chunk_id>": { "<metric>_score": value } }`.
///
/// Unknown chunks are registered on the fly with placeholder metadata so a
/// scores-only workflow still works. Each chunk that contributes at least one
/// score is marked done for the Scored stage.
pub async fn ingest_scores(
    store: &ScoreStore,
    tracker: &RunStateTracker,
    path: &Path,
) -> Result<IngestReport> {
    let raw = tokio::fs::read_to_string(path).await?;
    let scores: BTreeMap<String, BTreeMap<String, f64>> = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidInput(format!("malformed scores file {}: {e}", path.display())))?;

    let mut report = IngestReport::default();
    for (chunk_name, metrics) in &scores {
        let chunk_id = ChunkId::new(chunk_name.clone());
        if register_placeholder(store, &chunk_id).await? {
            report.chunks_registered += 1;
        }

        for (metric, value) in metrics {
            let record = ScoreRecord {
                chunk_id: chunk_id.clone(),
                signal: signal_for_metric(metric),
                value: *value,
                stage: Stage::Scored,
            };
            match store.record_score(&record).await {
                Ok(()) => report.scores_recorded += 1,
                Err(e @ Error::ScoreConflict { .. }) => {
                    warn!(chunk = %chunk_id, metric, "score rejected: {e}");
                    report.conflicts.push(e.to_string());
                }
                Err(e) => return Err(e),
            }
        }
        if !metrics.is_empty() {
            tracker.mark_done(&chunk_id, Stage::Scored).await?;
        }
    }
    info!(
        scores = report.scores_recorded,
        conflicts = report.conflicts.len(),
        file = %path.display(),
        "ingested scores"
    );
    Ok(report)
}

/// Load a semantic tags document: `{ "<chunk_id>": { "category", "attribution" } }`.
///
/// Attribution `llm` maps to the fallback classifier; anything else (the
/// original fast path wrote `regex`) maps to the keyword matcher. A missing
/// confidence defaults to 1.0.
pub async fn ingest_tags(
    store: &ScoreStore,
    tracker: &RunStateTracker,
    path: &Path,
) -> Result<IngestReport> {
    let raw = tokio::fs::read_to_string(path).await?;
    let tags: BTreeMap<String, TagEntry> = serde_json::from_str(&raw)
        .map_err(|e| Error::InvalidInput(format!("malformed tags file {}: {e}", path.display())))?;

    let mut report = IngestReport::default();
    for (chunk_name, tag) in &tags {
        let chunk_id = ChunkId::new(chunk_name.clone());
        if register_placeholder(store, &chunk_id).await? {
            report.chunks_registered += 1;
        }

        let candidate = SemanticCandidate {
            chunk_id: chunk_id.clone(),
            category: Category::from(tag.category.clone()),
            confidence: tag.confidence.unwrap_or(1.0),
            provenance: match tag.attribution.as_deref() {
                Some("llm") => Provenance::Classifier,
                _ => Provenance::Keyword,
            },
        };
        store.record_candidate(&candidate).await?;
        report.candidates_recorded += 1;
        tracker.mark_done(&chunk_id, Stage::Tagged).await?;
    }
    info!(
        candidates = report.candidates_recorded,
        file = %path.display(),
        "ingested semantic tags"
    );
    Ok(report)
}

/// Register a chunk with placeholder metadata when only its id is known.
/// Returns whether a new row was inserted.
async fn register_placeholder(store: &ScoreStore, chunk_id: &ChunkId) -> Result<bool> {
    let known = store
        .list_chunks()
        .await?
        .iter()
        .any(|c| &c.id == chunk_id);
    if known {
        return Ok(false);
    }
    store
        .register_chunk(&Chunk {
            id: chunk_id.clone(),
            source_file: chunk_id.as_str().to_string(),
            start_ms: 0,
            end_ms: 0,
        })
        .await?;
    Ok(true)
}

/// Map a collaborator metric name to a signal. The speech analyzer writes
/// `vad_score`; unrecognized metrics become open signals with the `_score`
/// suffix stripped.
fn signal_for_metric(metric: &str) -> Signal {
    match metric {
        "face_score" => Signal::Face,
        "motion_score" => Signal::Motion,
        "vad_score" | "speech_score" => Signal::Speech,
        other => Signal::from(other.strip_suffix("_score").unwrap_or(other).to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;

    async fn test_stores() -> (TempDir, ScoreStore, RunStateTracker) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("vtriage.db"))
            .await
            .unwrap();
        (
            dir,
            ScoreStore::new(pool.clone()),
            RunStateTracker::new(pool),
        )
    }

    async fn write_json(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        tokio::fs::write(&path, body).await.unwrap();
        path
    }

    #[test]
    fn test_metric_signal_mapping() {
        assert_eq!(signal_for_metric("face_score"), Signal::Face);
        assert_eq!(signal_for_metric("motion_score"), Signal::Motion);
        assert_eq!(signal_for_metric("vad_score"), Signal::Speech);
        assert_eq!(
            signal_for_metric("scene_change_score"),
            Signal::Other("scene_change".to_string())
        );
    }

    #[tokio::test]
    async fn test_ingest_scores_registers_and_records() {
        let (dir, store, tracker) = test_stores().await;
        let path = write_json(
            &dir,
            "scores.json",
            r#"{
                "chunk_001.mp4": {"face_score": 0.9, "motion_score": 0.8, "vad_score": 0.7},
                "chunk_002.mp4": {"face_score": 0.1}
            }"#,
        )
        .await;

        let report = ingest_scores(&store, &tracker, &path).await.unwrap();
        assert_eq!(report.chunks_registered, 2);
        assert_eq!(report.scores_recorded, 4);
        assert!(report.conflicts.is_empty());

        let scores = store
            .scores_for(&ChunkId::new("chunk_001.mp4"))
            .await
            .unwrap();
        assert_eq!(scores.len(), 3);
        assert!(tracker
            .is_done(&ChunkId::new("chunk_001.mp4"), Stage::Scored)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ingest_scores_isolates_conflicts() {
        let (dir, store, tracker) = test_stores().await;
        store
            .record_score(&ScoreRecord {
                chunk_id: ChunkId::new("chunk_001.mp4"),
                signal: Signal::Face,
                value: 0.5,
                stage: Stage::Scored,
            })
            .await
            .unwrap();

        let path = write_json(
            &dir,
            "scores.json",
            r#"{"chunk_001.mp4": {"face_score": 0.9, "motion_score": 0.8}}"#,
        )
        .await;
        let report = ingest_scores(&store, &tracker, &path).await.unwrap();

        // Conflicting face score rejected, motion still lands
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.scores_recorded, 1);
        let scores = store
            .scores_for(&ChunkId::new("chunk_001.mp4"))
            .await
            .unwrap();
        assert_eq!(scores.len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_tags_attribution_mapping() {
        let (dir, store, tracker) = test_stores().await;
        let path = write_json(
            &dir,
            "semantic_tags.json",
            r#"{
                "chunk_001.mp4": {"category": "product_related", "attribution": "llm", "confidence": 0.9},
                "chunk_002.mp4": {"category": "funny", "attribution": "regex", "transcript": "haha"}
            }"#,
        )
        .await;

        let report = ingest_tags(&store, &tracker, &path).await.unwrap();
        assert_eq!(report.candidates_recorded, 2);

        let first = store
            .candidates_for(&ChunkId::new("chunk_001.mp4"))
            .await
            .unwrap();
        assert_eq!(first[0].provenance, Provenance::Classifier);
        assert_eq!(first[0].category, Category::ProductRelated);
        assert_eq!(first[0].confidence, 0.9);

        let second = store
            .candidates_for(&ChunkId::new("chunk_002.mp4"))
            .await
            .unwrap();
        assert_eq!(second[0].provenance, Provenance::Keyword);
        assert_eq!(second[0].confidence, 1.0);
        assert!(tracker
            .is_done(&ChunkId::new("chunk_002.mp4"), Stage::Tagged)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ingest_chunks_file() {
        let (dir, store, _tracker) = test_stores().await;
        let path = write_json(
            &dir,
            "chunks.json",
            r#"[{"id": "chunk_001.mp4", "source_file": "stream.mp4", "start_ms": 0, "end_ms": 12000}]"#,
        )
        .await;
        let count = ingest_chunks(&store, &path).await.unwrap();
        assert_eq!(count, 1);
        let chunks = store.list_chunks().await.unwrap();
        assert_eq!(chunks[0].source_file, "stream.mp4");
    }

    #[tokio::test]
    async fn test_malformed_scores_file_is_invalid_input() {
        let (dir, store, tracker) = test_stores().await;
        let path = write_json(&dir, "scores.json", "not json").await;
        let err = ingest_scores(&store, &tracker, &path).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
