//! Action planner: pure function mapping decision records to a conflict-free
//! execution plan
//!
//! Side-effect free; the single-threaded pass enforces the one cross-chunk
//! constraint (pairwise-distinct destinations). Collisions never overwrite
//! silently: depending on policy the conflicting chunk is deferred to manual
//! review or renamed with a deterministic chunk-id suffix.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use vtriage_common::config::{ActionConfig, CollisionMode, DiscardMode};
use vtriage_common::types::{ActionKind, ActionPlanEntry, ChunkId, DecisionRecord, Verdict};
use vtriage_common::{Error, Result};

/// A conflict-free plan plus the chunks the collision policy could not place.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionPlan {
    pub entries: Vec<ActionPlanEntry>,
    /// Chunks whose plan entry conflicted under the `fail` policy; deferred
    /// to manual review rather than silently dropped or overwritten.
    pub deferred: Vec<DeferredAction>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DeferredAction {
    pub chunk_id: ChunkId,
    pub reason: String,
}

/// Build an execution plan from decision records.
///
/// `existing_destinations` carries paths already occupied on disk (from
/// previous runs); destinations planned here must not collide with them or
/// with each other.
pub fn plan(
    decisions: &[DecisionRecord],
    existing_destinations: &BTreeSet<PathBuf>,
    output_root: &Path,
    config: &ActionConfig,
) -> ActionPlan {
    let mut taken = existing_destinations.clone();
    let mut entries = Vec::with_capacity(decisions.len());
    let mut deferred = Vec::new();

    for decision in decisions {
        let (kind, target_dir) = match decision.verdict {
            Verdict::Keep => (
                ActionKind::Move,
                Some(output_root.join(decision.category.dir_name())),
            ),
            // Category is preserved as metadata on the decision record, not
            // as a directory: review-pending assets stay in one place.
            Verdict::Quarantine => (
                ActionKind::Move,
                Some(output_root.join(&config.quarantine_dir)),
            ),
            Verdict::Discard => {
                if decision.reasons.iter().any(|r| r == "no_input") {
                    // Nothing was ever filed for this chunk; there is no
                    // physical asset to move or delete.
                    (ActionKind::Skip, None)
                } else {
                    match config.discard_mode {
                        DiscardMode::Delete => (ActionKind::Delete, None),
                        DiscardMode::Trash => (
                            ActionKind::Move,
                            Some(output_root.join(&config.trash_dir)),
                        ),
                    }
                }
            }
        };

        let destination = match target_dir {
            Some(dir) => {
                match resolve_destination(
                    &dir,
                    decision.chunk_id.as_str(),
                    &decision.chunk_id,
                    &taken,
                    config.collision_mode,
                ) {
                    Ok(path) => {
                        taken.insert(path.clone());
                        Some(path)
                    }
                    Err(e) => {
                        tracing::warn!(
                            chunk_id = %decision.chunk_id,
                            error = %e,
                            "Plan conflict, deferring chunk to manual review"
                        );
                        deferred.push(DeferredAction {
                            chunk_id: decision.chunk_id.clone(),
                            reason: e.to_string(),
                        });
                        continue;
                    }
                }
            }
            None => None,
        };

        entries.push(ActionPlanEntry {
            chunk_id: decision.chunk_id.clone(),
            kind,
            destination,
            verdict: decision.verdict,
        });
    }

    ActionPlan { entries, deferred }
}

/// Resolve a destination path under the collision policy.
///
/// `fail`: a taken destination is a `PlanConflictError`. `disambiguate`: the
/// file name gains a deterministic `__<chunk stem>` suffix; a collision that
/// survives even that is still an error.
pub fn resolve_destination(
    dir: &Path,
    file_name: &str,
    chunk_id: &ChunkId,
    taken: &BTreeSet<PathBuf>,
    mode: CollisionMode,
) -> Result<PathBuf> {
    let candidate = dir.join(file_name);
    if !taken.contains(&candidate) {
        return Ok(candidate);
    }

    match mode {
        CollisionMode::Fail => Err(Error::PlanConflict(format!(
            "destination {} already claimed (chunk {})",
            candidate.display(),
            chunk_id
        ))),
        CollisionMode::Disambiguate => {
            let suffixed = dir.join(disambiguated_name(file_name, chunk_id));
            if taken.contains(&suffixed) {
                Err(Error::PlanConflict(format!(
                    "destination {} still claimed after disambiguation (chunk {})",
                    suffixed.display(),
                    chunk_id
                )))
            } else {
                Ok(suffixed)
            }
        }
    }
}

fn disambiguated_name(file_name: &str, chunk_id: &ChunkId) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}__{}.{ext}", chunk_id.stem()),
        None => format!("{file_name}__{}", chunk_id.stem()),
    }
}
