//! Action executor: applies a plan to the filesystem with idempotent,
//! crash-safe semantics
//!
//! Dumb by design: no judgment logic lives here. Each entry is checked
//! against the append-only action log first; a prior APPLIED with the same
//! chunk + action signature short-circuits to ALREADY_APPLIED with zero
//! filesystem mutation. Failures are isolated per entry and never abort the
//! batch.

use crate::db::ActionLogStore;
use crate::planner::ActionPlan;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vtriage_common::config::ExecutorConfig;
use vtriage_common::types::{ActionKind, ActionLogEntry, ActionOutcome, ActionPlanEntry};
use vtriage_common::{Error, Result};

/// Execute a plan. Returns the log entries appended during this invocation,
/// in plan order.
///
/// Cancellation is honored between entries: already-appended entries are
/// durable and the remainder of the plan is left for the next run.
pub async fn execute(
    plan: &ActionPlan,
    processing_dir: &Path,
    log: &ActionLogStore,
    config: &ExecutorConfig,
    cancel: &CancellationToken,
) -> Result<Vec<ActionLogEntry>> {
    info!("Executing {} planned actions", plan.entries.len());
    let op_timeout = Duration::from_secs(config.op_timeout_secs);

    let mut results = Vec::with_capacity(plan.entries.len());

    for entry in &plan.entries {
        if cancel.is_cancelled() {
            warn!(
                completed = results.len(),
                remaining = plan.entries.len() - results.len(),
                "Cancellation requested, stopping before the next action"
            );
            break;
        }

        let destination = entry
            .destination
            .as_ref()
            .map(|p| p.to_string_lossy().to_string());

        // The action log is the single source of truth for "has this
        // already happened".
        if log
            .has_applied(&entry.chunk_id, entry.kind, destination.as_deref())
            .await?
        {
            debug!(chunk_id = %entry.chunk_id, "Action already applied, skipping");
            let log_entry = ActionLogEntry {
                chunk_id: entry.chunk_id.clone(),
                kind: entry.kind,
                outcome: ActionOutcome::AlreadyApplied,
                destination,
                detail: None,
                executed_at: Utc::now(),
            };
            log.append(&log_entry).await?;
            results.push(log_entry);
            continue;
        }

        let outcome = match timeout(op_timeout, apply(entry, processing_dir)).await {
            Ok(Ok((outcome, detail))) => (outcome, detail),
            Ok(Err(e)) => {
                warn!(chunk_id = %entry.chunk_id, error = %e, "Action failed");
                (ActionOutcome::Failed, Some(e.to_string()))
            }
            Err(_) => {
                warn!(chunk_id = %entry.chunk_id, "Action timed out");
                (
                    ActionOutcome::Failed,
                    Some(format!(
                        "operation timed out after {}s",
                        config.op_timeout_secs
                    )),
                )
            }
        };

        let log_entry = ActionLogEntry {
            chunk_id: entry.chunk_id.clone(),
            kind: entry.kind,
            outcome: outcome.0,
            destination,
            detail: outcome.1,
            executed_at: Utc::now(),
        };
        // Persist before moving on: on crash the log, not memory, decides
        // what already happened.
        log.append(&log_entry).await?;
        results.push(log_entry);
    }

    let applied = results
        .iter()
        .filter(|e| e.outcome == ActionOutcome::Applied)
        .count();
    info!(
        "Execution complete: {} applied, {} of {} total",
        applied,
        results.len(),
        plan.entries.len()
    );

    Ok(results)
}

/// Perform the physical operation for one entry. Returns the outcome and an
/// optional detail string for the log.
async fn apply(
    entry: &ActionPlanEntry,
    processing_dir: &Path,
) -> Result<(ActionOutcome, Option<String>)> {
    match entry.kind {
        ActionKind::Skip => Ok((
            ActionOutcome::Applied,
            Some("no physical asset for this chunk".to_string()),
        )),
        ActionKind::Move | ActionKind::Copy => {
            let destination = entry.destination.as_ref().ok_or_else(|| {
                Error::Execution(format!("{} entry without destination", entry.kind.as_str()))
            })?;
            let source = match locate_source(processing_dir, entry.chunk_id.as_str()) {
                Some(source) => source,
                None => {
                    // A crash between the physical move and the log append
                    // leaves the file at its destination with no source; the
                    // destination is the evidence the move completed.
                    if entry.kind == ActionKind::Move
                        && tokio::fs::try_exists(destination).await?
                    {
                        return Ok((
                            ActionOutcome::AlreadyApplied,
                            Some(format!(
                                "source missing, destination {} already present",
                                destination.display()
                            )),
                        ));
                    }
                    return Err(Error::Execution(format!(
                        "source file not found for {}",
                        entry.chunk_id
                    )));
                }
            };
            if let Some(parent) = destination.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            if entry.kind == ActionKind::Copy {
                tokio::fs::copy(&source, destination).await?;
            } else {
                move_file(&source, destination).await?;
            }
            Ok((ActionOutcome::Applied, None))
        }
        ActionKind::Delete => {
            let source = locate_source(processing_dir, entry.chunk_id.as_str()).ok_or_else(
                || Error::Execution(format!("source file not found for {}", entry.chunk_id)),
            )?;
            tokio::fs::remove_file(&source).await?;
            Ok((ActionOutcome::Applied, Some(format!("deleted {}", source.display()))))
        }
    }
}

/// Rename, falling back to copy + remove when source and destination sit on
/// different filesystems (rename cannot cross mount points).
async fn move_file(source: &Path, destination: &Path) -> Result<()> {
    if tokio::fs::rename(source, destination).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(source, destination).await?;
    tokio::fs::remove_file(source).await?;
    Ok(())
}

/// Locate a chunk file anywhere under the processing directory. Upstream
/// filters may have moved chunks into stage subfolders.
fn locate_source(processing_dir: &Path, file_name: &str) -> Option<PathBuf> {
    walkdir::WalkDir::new(processing_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .find(|e| e.file_type().is_file() && e.file_name() == file_name)
        .map(|e| e.into_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_database_pool;
    use tempfile::TempDir;
    use vtriage_common::types::{ChunkId, Verdict};

    async fn setup() -> (TempDir, ActionLogStore) {
        let dir = TempDir::new().unwrap();
        let pool = init_database_pool(&dir.path().join("vtriage.db"))
            .await
            .unwrap();
        (dir, ActionLogStore::new(pool))
    }

    fn write_chunk(dir: &Path, name: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), b"video-bytes").unwrap();
    }

    fn move_entry(chunk: &str, dest: PathBuf) -> ActionPlanEntry {
        ActionPlanEntry {
            chunk_id: ChunkId::new(chunk),
            kind: ActionKind::Move,
            destination: Some(dest),
            verdict: Verdict::Keep,
        }
    }

    #[tokio::test]
    async fn test_move_applies_and_is_idempotent() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        write_chunk(&processing, "chunk_001.mp4");
        let dest = dir.path().join("out/general/chunk_001.mp4");

        let plan = ActionPlan {
            entries: vec![move_entry("chunk_001.mp4", dest.clone())],
            deferred: vec![],
        };
        let config = ExecutorConfig::default();

        let cancel = CancellationToken::new();
        let first = execute(&plan, &processing, &log, &config, &cancel)
            .await
            .unwrap();
        assert_eq!(first[0].outcome, ActionOutcome::Applied);
        assert!(dest.exists());
        assert!(!processing.join("chunk_001.mp4").exists());

        // Re-invoking the same plan produces only ALREADY_APPLIED and zero
        // additional filesystem mutations.
        let before = std::fs::read(&dest).unwrap();
        let second = execute(&plan, &processing, &log, &config, &cancel)
            .await
            .unwrap();
        assert_eq!(second[0].outcome, ActionOutcome::AlreadyApplied);
        assert_eq!(std::fs::read(&dest).unwrap(), before);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        // Only the second chunk exists on disk
        write_chunk(&processing, "chunk_002.mp4");

        let plan = ActionPlan {
            entries: vec![
                move_entry("chunk_001.mp4", dir.path().join("out/general/chunk_001.mp4")),
                move_entry("chunk_002.mp4", dir.path().join("out/general/chunk_002.mp4")),
            ],
            deferred: vec![],
        };
        let results = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
            .await
            .unwrap();

        assert_eq!(results[0].outcome, ActionOutcome::Failed);
        assert!(results[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("source file not found"));
        assert_eq!(results[1].outcome, ActionOutcome::Applied);
        assert!(dir.path().join("out/general/chunk_002.mp4").exists());
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        write_chunk(&processing, "chunk_003.mp4");

        let plan = ActionPlan {
            entries: vec![ActionPlanEntry {
                chunk_id: ChunkId::new("chunk_003.mp4"),
                kind: ActionKind::Delete,
                destination: None,
                verdict: Verdict::Discard,
            }],
            deferred: vec![],
        };
        let results = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
            .await
            .unwrap();
        assert_eq!(results[0].outcome, ActionOutcome::Applied);
        assert!(!processing.join("chunk_003.mp4").exists());
    }

    #[tokio::test]
    async fn test_skip_touches_nothing() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        std::fs::create_dir_all(&processing).unwrap();

        let plan = ActionPlan {
            entries: vec![ActionPlanEntry {
                chunk_id: ChunkId::new("chunk_004.mp4"),
                kind: ActionKind::Skip,
                destination: None,
                verdict: Verdict::Discard,
            }],
            deferred: vec![],
        };
        let results = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
            .await
            .unwrap();
        assert_eq!(results[0].outcome, ActionOutcome::Applied);
    }

    #[tokio::test]
    async fn test_source_in_stage_subfolder_is_found() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        write_chunk(&processing.join("keep/speech"), "chunk_005.mp4");
        let dest = dir.path().join("out/funny/chunk_005.mp4");

        let plan = ActionPlan {
            entries: vec![move_entry("chunk_005.mp4", dest.clone())],
            deferred: vec![],
        };
        let results = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
            .await
            .unwrap();
        assert_eq!(results[0].outcome, ActionOutcome::Applied);
        assert!(dest.exists());
    }

    #[tokio::test]
    async fn test_cancellation_stops_between_entries() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        write_chunk(&processing, "chunk_006.mp4");
        write_chunk(&processing, "chunk_007.mp4");

        let plan = ActionPlan {
            entries: vec![
                move_entry("chunk_006.mp4", dir.path().join("out/general/chunk_006.mp4")),
                move_entry("chunk_007.mp4", dir.path().join("out/general/chunk_007.mp4")),
            ],
            deferred: vec![],
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let results = execute(&plan, &processing, &log, &ExecutorConfig::default(), &cancel)
            .await
            .unwrap();

        // Nothing executed, nothing logged, sources untouched
        assert!(results.is_empty());
        assert!(log.load_all().await.unwrap().is_empty());
        assert!(processing.join("chunk_006.mp4").exists());
        assert!(processing.join("chunk_007.mp4").exists());

        // A fresh invocation picks up the full plan
        let resumed = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(resumed.len(), 2);
        assert!(resumed.iter().all(|e| e.outcome == ActionOutcome::Applied));
    }

    #[tokio::test]
    async fn test_timeout_fails_entry_without_aborting_batch() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        write_chunk(&processing, "chunk_008.mp4");

        // A move suspends on filesystem work, so a zero-second budget always
        // expires; the skip entry resolves on its first poll and still lands.
        let plan = ActionPlan {
            entries: vec![
                move_entry("chunk_008.mp4", dir.path().join("out/general/chunk_008.mp4")),
                ActionPlanEntry {
                    chunk_id: ChunkId::new("chunk_009.mp4"),
                    kind: ActionKind::Skip,
                    destination: None,
                    verdict: Verdict::Discard,
                },
            ],
            deferred: vec![],
        };
        let config = ExecutorConfig { op_timeout_secs: 0 };
        let results = execute(&plan, &processing, &log, &config, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results[0].outcome, ActionOutcome::Failed);
        assert!(results[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("timed out after 0s"));
        assert_eq!(results[1].outcome, ActionOutcome::Applied);
    }

    #[tokio::test]
    async fn test_missing_source_with_occupied_destination_resolves() {
        let (dir, log) = setup().await;
        let processing = dir.path().join("processing");
        std::fs::create_dir_all(&processing).unwrap();
        // The file already sits at its destination and the source is gone,
        // as after a crash between the move and the log append
        let dest = dir.path().join("out/general/chunk_010.mp4");
        std::fs::create_dir_all(dest.parent().unwrap()).unwrap();
        std::fs::write(&dest, b"video-bytes").unwrap();

        let plan = ActionPlan {
            entries: vec![move_entry("chunk_010.mp4", dest.clone())],
            deferred: vec![],
        };
        let results = execute(
            &plan,
            &processing,
            &log,
            &ExecutorConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(results[0].outcome, ActionOutcome::AlreadyApplied);
        assert!(results[0]
            .detail
            .as_deref()
            .unwrap()
            .contains("destination"));
        assert_eq!(std::fs::read(&dest).unwrap(), b"video-bytes");
    }
}
