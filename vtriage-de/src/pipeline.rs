//! Pipeline orchestrator
//!
//! Coordinates the run through its stages:
//! DECIDE -> SUMMARIZE -> PLAN -> EXECUTE -> EXPLAIN
//!
//! Each stage reads from the stores, persists its output, then marks the
//! run-state ledger. Persist-then-mark ordering means a crash between the
//! two leaves the stage not-done and the work is redone on resume; the
//! reverse order could mark work done that was never stored.
//!
//! Per-chunk failures are isolated: a chunk with no input is decided
//! DISCARD with a `no_input` reason, a plan collision defers only that
//! chunk, a failed filesystem action logs FAILED and the batch continues.
//! Only configuration and infrastructure errors abort the run.

use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use vtriage_common::config::{reports_dir, EngineConfig};
use vtriage_common::types::{
    ActionLogEntry, ActionOutcome, Category, ChunkId, DecisionRecord, RunSummary, Stage, Verdict,
};
use vtriage_common::{Error, Result};

use crate::db::{ActionLogStore, DecisionStore, RunStateTracker, ScoreStore};
use crate::planner::DeferredAction;
use crate::{analytics, decider, executor, explainer, planner};

/// Progress events emitted while a run executes.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    RunStarted {
        total_chunks: usize,
    },
    StageStarted {
        stage: Stage,
    },
    ChunkDecided {
        chunk_id: ChunkId,
        verdict: Verdict,
    },
    /// Chunk already done for a stage on a previous run
    ChunkSkipped {
        chunk_id: ChunkId,
        stage: Stage,
    },
    ChunkDeferred {
        chunk_id: ChunkId,
        reason: String,
    },
    ActionExecuted {
        chunk_id: ChunkId,
        outcome: ActionOutcome,
    },
    RunCancelled {
        stage: Stage,
    },
    RunCompleted {
        kept: usize,
        quarantined: usize,
        discarded: usize,
    },
}

/// Everything a completed (or cancelled) run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub summary: RunSummary,
    pub decisions: Vec<DecisionRecord>,
    pub deferred: Vec<DeferredAction>,
    pub log_entries: Vec<ActionLogEntry>,
    /// JSON/text artifacts written under the reports directory
    pub artifacts: Vec<PathBuf>,
    pub cancelled: bool,
}

/// The decision and resilience engine's run orchestrator.
pub struct Pipeline {
    config: EngineConfig,
    pool: SqlitePool,
    root: PathBuf,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
}

impl Pipeline {
    pub fn new(config: EngineConfig, pool: SqlitePool, root: impl Into<PathBuf>) -> Self {
        Self {
            config,
            pool,
            root: root.into(),
            event_tx: None,
        }
    }

    /// Attach a progress event channel.
    pub fn with_events(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    async fn emit(&self, event: PipelineEvent) {
        if let Some(tx) = &self.event_tx {
            // A slow or dropped consumer must never stall the run
            let _ = tx.try_send(event);
        }
    }

    /// Execute a full run over every chunk in the store.
    ///
    /// `processing_dir` is where the physical chunk files live. Cancellation
    /// is honored at chunk and stage boundaries; already-persisted work is
    /// kept and the next run resumes from the ledger.
    pub async fn run(
        &self,
        processing_dir: &Path,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        // Policy errors are fatal before any chunk is touched
        self.config.validate()?;

        let score_store = ScoreStore::new(self.pool.clone());
        let tracker = RunStateTracker::new(self.pool.clone());
        let decision_store = DecisionStore::new(self.pool.clone());
        let action_log = ActionLogStore::new(self.pool.clone());

        let chunks = score_store.list_chunks().await?;
        info!(total_chunks = chunks.len(), root = %self.root.display(), "Starting run");
        self.emit(PipelineEvent::RunStarted {
            total_chunks: chunks.len(),
        })
        .await;

        // Stage: DECIDE
        self.emit(PipelineEvent::StageStarted {
            stage: Stage::Decided,
        })
        .await;
        let cancelled = self
            .decide_stage(&chunks, &tracker, &decision_store, &cancel)
            .await?;

        let decisions = decision_store.load_all().await?;
        let summary = analytics::summarize(&decisions, &self.config.decider);

        if cancelled {
            warn!("Run cancelled during decide stage");
            self.emit(PipelineEvent::RunCancelled {
                stage: Stage::Decided,
            })
            .await;
            return Ok(RunReport {
                summary,
                decisions,
                deferred: Vec::new(),
                log_entries: Vec::new(),
                artifacts: Vec::new(),
                cancelled: true,
            });
        }

        let mut artifacts = Vec::new();
        let reports = reports_dir(&self.root);
        tokio::fs::create_dir_all(&reports).await?;
        artifacts.push(
            write_json_artifact(&reports.join("run_summary.json"), &summary).await?,
        );

        // Stage: PLAN
        self.emit(PipelineEvent::StageStarted {
            stage: Stage::Planned,
        })
        .await;
        let output_root = self.config.output_root(&self.root);
        let existing = unaccounted_destinations(&output_root, &action_log.load_all().await?);
        let plan = planner::plan(&decisions, &existing, &output_root, &self.config.actions);

        for deferred in &plan.deferred {
            self.emit(PipelineEvent::ChunkDeferred {
                chunk_id: deferred.chunk_id.clone(),
                reason: deferred.reason.clone(),
            })
            .await;
        }
        artifacts.push(
            write_json_artifact(&reports.join("action_plan.json"), &plan.entries).await?,
        );
        for entry in &plan.entries {
            tracker.mark_done(&entry.chunk_id, Stage::Planned).await?;
        }

        if cancel.is_cancelled() {
            warn!("Run cancelled before execution");
            self.emit(PipelineEvent::RunCancelled {
                stage: Stage::Planned,
            })
            .await;
            return Ok(RunReport {
                summary,
                decisions,
                deferred: plan.deferred,
                log_entries: Vec::new(),
                artifacts,
                cancelled: true,
            });
        }

        // Stage: EXECUTE
        self.emit(PipelineEvent::StageStarted {
            stage: Stage::Executed,
        })
        .await;
        let log_entries = executor::execute(
            &plan,
            processing_dir,
            &action_log,
            &self.config.executor,
            &cancel,
        )
        .await?;
        for entry in &log_entries {
            self.emit(PipelineEvent::ActionExecuted {
                chunk_id: entry.chunk_id.clone(),
                outcome: entry.outcome,
            })
            .await;
            // Failed chunks stay not-done so a later run retries them
            if entry.outcome != ActionOutcome::Failed {
                tracker.mark_done(&entry.chunk_id, Stage::Executed).await?;
            }
        }

        if cancel.is_cancelled() {
            warn!("Run cancelled during execution, completed actions are persisted");
            self.emit(PipelineEvent::RunCancelled {
                stage: Stage::Executed,
            })
            .await;
            return Ok(RunReport {
                summary,
                decisions,
                deferred: plan.deferred,
                log_entries,
                artifacts,
                cancelled: true,
            });
        }

        // Stage: EXPLAIN
        self.emit(PipelineEvent::StageStarted {
            stage: Stage::Explained,
        })
        .await;
        let full_log = action_log.load_all().await?;
        let (narrative, explanations) = explainer::explain(&decisions, &summary, &full_log);

        let narrative_path = reports.join("narrative.txt");
        tokio::fs::write(&narrative_path, &narrative).await?;
        artifacts.push(narrative_path);
        artifacts.push(
            write_json_artifact(&reports.join("clip_explanations.json"), &explanations).await?,
        );
        for chunk_id in explanations.keys() {
            tracker.mark_done(chunk_id, Stage::Explained).await?;
        }

        info!(
            kept = summary.kept,
            quarantined = summary.quarantined,
            discarded = summary.discarded,
            deferred = plan.deferred.len(),
            "Run completed"
        );
        self.emit(PipelineEvent::RunCompleted {
            kept: summary.kept,
            quarantined: summary.quarantined,
            discarded: summary.discarded,
        })
        .await;

        Ok(RunReport {
            summary,
            decisions,
            deferred: plan.deferred,
            log_entries,
            artifacts,
            cancelled: false,
        })
    }

    /// Decide every chunk not already decided. Returns whether the stage was
    /// cancelled part-way.
    async fn decide_stage(
        &self,
        chunks: &[vtriage_common::types::Chunk],
        tracker: &RunStateTracker,
        decision_store: &DecisionStore,
        cancel: &CancellationToken,
    ) -> Result<bool> {
        let done = tracker.done_chunks(Stage::Decided).await?;

        // The ledger and the decision store must agree: a chunk marked done
        // with no stored record means the artifact was lost, and silently
        // re-deciding would hide that.
        for chunk in chunks {
            if done.contains(&chunk.id) && decision_store.load(&chunk.id).await?.is_none() {
                return Err(Error::ResumeInconsistency(format!(
                    "chunk {} marked decided but no decision record exists",
                    chunk.id
                )));
            }
        }

        let mut tasks: JoinSet<Result<(ChunkId, Verdict)>> = JoinSet::new();
        let mut cancelled = false;

        for chunk in chunks {
            if done.contains(&chunk.id) {
                self.emit(PipelineEvent::ChunkSkipped {
                    chunk_id: chunk.id.clone(),
                    stage: Stage::Decided,
                })
                .await;
                continue;
            }
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let pool = self.pool.clone();
            let config = self.config.clone();
            let chunk_id = chunk.id.clone();
            tasks.spawn(async move {
                let store = ScoreStore::new(pool.clone());
                let decisions = DecisionStore::new(pool.clone());
                let tracker = RunStateTracker::new(pool);

                let scores = store.scores_for(&chunk_id).await?;
                let candidates = store.candidates_for(&chunk_id).await?;

                let record = match decider::decide(&chunk_id, &scores, &candidates, &config) {
                    Ok(record) => record,
                    Err(Error::IncompleteInput(_)) => {
                        warn!(chunk = %chunk_id, "No input recorded, discarding");
                        no_input_decision(&chunk_id)
                    }
                    Err(e) => return Err(e),
                };

                decision_store_then_mark(&decisions, &tracker, &record).await?;
                Ok((record.chunk_id, record.verdict))
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (chunk_id, verdict) =
                joined.map_err(|e| Error::Internal(format!("decide task panicked: {e}")))??;
            self.emit(PipelineEvent::ChunkDecided { chunk_id, verdict }).await;
        }

        Ok(cancelled)
    }
}

/// Persist the decision record, then mark the ledger. Order matters.
async fn decision_store_then_mark(
    decisions: &DecisionStore,
    tracker: &RunStateTracker,
    record: &DecisionRecord,
) -> Result<()> {
    decisions.store(record).await?;
    tracker.mark_done(&record.chunk_id, Stage::Decided).await?;
    Ok(())
}

/// The decision recorded for a chunk with no scores and no candidates.
fn no_input_decision(chunk_id: &ChunkId) -> DecisionRecord {
    DecisionRecord {
        chunk_id: chunk_id.clone(),
        aggregate_score: 0.0,
        final_score: 0.0,
        category: Category::General,
        category_confidence: 0.0,
        provenance: None,
        verdict: Verdict::Discard,
        reasons: vec!["no_input".to_string()],
    }
}

/// Files under the output root that the action log does not account for.
///
/// Destinations the engine itself produced on earlier runs are excluded so
/// a re-run regenerates the same plan and lands on `AlreadyApplied` instead
/// of colliding with its own output. Anything else under the root is foreign
/// and stays in the collision set.
fn unaccounted_destinations(
    output_root: &Path,
    log_entries: &[ActionLogEntry],
) -> BTreeSet<PathBuf> {
    let ours: BTreeSet<PathBuf> = log_entries
        .iter()
        .filter(|e| {
            matches!(
                e.outcome,
                ActionOutcome::Applied | ActionOutcome::AlreadyApplied
            )
        })
        .filter_map(|e| e.destination.as_ref().map(PathBuf::from))
        .collect();

    let mut existing = BTreeSet::new();
    for entry in walkdir::WalkDir::new(output_root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path().to_path_buf();
        if !ours.contains(&path) {
            existing.insert(path);
        }
    }
    existing
}

async fn write_json_artifact<T: serde::Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("artifact serialization failed: {e}")))?;
    tokio::fs::write(path, body).await?;
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_input_decision_shape() {
        let record = no_input_decision(&ChunkId::new("chunk_009.mp4"));
        assert_eq!(record.verdict, Verdict::Discard);
        assert_eq!(record.final_score, 0.0);
        assert_eq!(record.reasons, vec!["no_input".to_string()]);
        assert!(record.provenance.is_none());
    }

    #[test]
    fn test_unaccounted_destinations_excludes_logged_outputs() {
        let dir = tempfile::TempDir::new().unwrap();
        let kept = dir.path().join("general");
        std::fs::create_dir_all(&kept).unwrap();
        let ours = kept.join("chunk_001.mp4");
        let foreign = kept.join("manual_upload.mp4");
        std::fs::write(&ours, b"x").unwrap();
        std::fs::write(&foreign, b"y").unwrap();

        let log = vec![ActionLogEntry {
            chunk_id: ChunkId::new("chunk_001.mp4"),
            kind: vtriage_common::types::ActionKind::Move,
            outcome: ActionOutcome::Applied,
            destination: Some(ours.to_string_lossy().to_string()),
            detail: None,
            executed_at: chrono::Utc::now(),
        }];

        let existing = unaccounted_destinations(dir.path(), &log);
        assert!(existing.contains(&foreign));
        assert!(!existing.contains(&ours));
    }
}
