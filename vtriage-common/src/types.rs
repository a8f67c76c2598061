//! Domain types shared across the vtriage decision engine
//!
//! Record types flowing between pipeline stages: scores and semantic
//! candidates in, decision records out, plan entries and action-log entries
//! at the execution boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Chunk identity: source file stem plus ordinal, e.g. `chunk_001.mp4`.
///
/// Chunk ids are assigned by the upstream splitter and used as the
/// partitioning key for every store in the engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(pub String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File stem without extension, used for deterministic disambiguation
    /// suffixes (`clip.mp4` + `chunk_003.mp4` -> `clip__chunk_003.mp4`).
    pub fn stem(&self) -> &str {
        self.0.rsplit_once('.').map(|(s, _)| s).unwrap_or(&self.0)
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A contiguous time-bounded segment of a source recording.
///
/// Immutable once created by the upstream splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub source_file: String,
    pub start_ms: i64,
    pub end_ms: i64,
}

/// Perception signal kinds. The fixed set maps to the upstream face, motion
/// and speech-activity analyzers; `Other` admits additional analyzers without
/// a schema change.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Signal {
    Face,
    Motion,
    Speech,
    Other(String),
}

impl Signal {
    pub fn as_str(&self) -> &str {
        match self {
            Signal::Face => "face",
            Signal::Motion => "motion",
            Signal::Speech => "speech",
            Signal::Other(name) => name,
        }
    }
}

impl From<String> for Signal {
    fn from(s: String) -> Self {
        match s.as_str() {
            "face" => Signal::Face,
            "motion" => Signal::Motion,
            "speech" => Signal::Speech,
            _ => Signal::Other(s),
        }
    }
}

impl From<Signal> for String {
    fn from(s: Signal) -> Self {
        s.as_str().to_string()
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Signal {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Signal::from(s.to_string()))
    }
}

/// Pipeline stages a chunk flows through, recorded in the run-state ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scored,
    Tagged,
    Decided,
    Planned,
    Executed,
    Explained,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scored => "scored",
            Stage::Tagged => "tagged",
            Stage::Decided => "decided",
            Stage::Planned => "planned",
            Stage::Executed => "executed",
            Stage::Explained => "explained",
        }
    }

    pub const ALL: [Stage; 6] = [
        Stage::Scored,
        Stage::Tagged,
        Stage::Decided,
        Stage::Planned,
        Stage::Executed,
        Stage::Explained,
    ];
}

impl FromStr for Stage {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scored" => Ok(Stage::Scored),
            "tagged" => Ok(Stage::Tagged),
            "decided" => Ok(Stage::Decided),
            "planned" => Ok(Stage::Planned),
            "executed" => Ok(Stage::Executed),
            "explained" => Ok(Stage::Explained),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown stage: {other}"
            ))),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-chunk, per-stage completion status in the run-state ledger.
///
/// Transitions are monotonic: NotStarted -> Done, reversed only by explicit
/// operator reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    NotStarted,
    Done,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::NotStarted => "not_started",
            StageStatus::Done => "done",
        }
    }
}

/// A single raw signal value for one chunk, written by a perception module.
///
/// Write-once per (chunk, signal, stage): re-writing the same key with a
/// different value violates the score store contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub chunk_id: ChunkId,
    pub signal: Signal,
    /// Normalized value in [0.0, 1.0]
    pub value: f64,
    pub stage: Stage,
}

/// Semantic categories in priority order: product-related content beats funny
/// beats general. The ranking is an explicit total order, used to break ties
/// between equally-weighted candidates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Category {
    ProductRelated,
    Funny,
    General,
    Other(String),
}

impl Category {
    /// Tie-break rank: lower wins.
    pub fn priority_rank(&self) -> u8 {
        match self {
            Category::ProductRelated => 0,
            Category::Funny => 1,
            Category::General => 2,
            Category::Other(_) => 3,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Category::ProductRelated => "product_related",
            Category::Funny => "funny",
            Category::General => "general",
            Category::Other(name) => name,
        }
    }

    /// Subdirectory name for kept chunks of this category. Unrecognized
    /// categories file under a shared `selected` directory.
    pub fn dir_name(&self) -> &str {
        match self {
            Category::ProductRelated => "product_related",
            Category::Funny => "funny",
            Category::General => "general",
            Category::Other(_) => "selected",
        }
    }
}

impl From<String> for Category {
    fn from(s: String) -> Self {
        match s.as_str() {
            "product_related" => Category::ProductRelated,
            "funny" => Category::Funny,
            "general" => Category::General,
            _ => Category::Other(s),
        }
    }
}

impl From<Category> for String {
    fn from(c: Category) -> Self {
        c.as_str().to_string()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PartialOrd for Category {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Category {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.priority_rank()
            .cmp(&other.priority_rank())
            .then_with(|| self.as_str().cmp(other.as_str()))
    }
}

/// Where a semantic candidate came from: the fast-path keyword matcher or the
/// fallback classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Keyword,
    Classifier,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Keyword => "keyword",
            Provenance::Classifier => "classifier",
        }
    }
}

impl FromStr for Provenance {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keyword" => Ok(Provenance::Keyword),
            "classifier" => Ok(Provenance::Classifier),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown provenance: {other}"
            ))),
        }
    }
}

/// One category proposal for a chunk. Several candidates may exist per chunk;
/// the decider picks exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticCandidate {
    pub chunk_id: ChunkId,
    pub category: Category,
    /// Confidence in [0.0, 1.0]
    pub confidence: f64,
    pub provenance: Provenance,
}

/// The decider's output disposition for a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Keep,
    Quarantine,
    Discard,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Keep => "keep",
            Verdict::Quarantine => "quarantine",
            Verdict::Discard => "discard",
        }
    }
}

impl FromStr for Verdict {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep" => Ok(Verdict::Keep),
            "quarantine" => Ok(Verdict::Quarantine),
            "discard" => Ok(Verdict::Discard),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown verdict: {other}"
            ))),
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chunk's verdict with the full justification trail.
///
/// Deterministic: recomputing with identical inputs and config reproduces an
/// identical record, including reason-code ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub chunk_id: ChunkId,
    /// Weighted signal sum before the category bonus (unnormalized)
    pub aggregate_score: f64,
    /// Aggregate plus category bonus, clamped to the configured ceiling
    pub final_score: f64,
    pub category: Category,
    /// Confidence of the chosen candidate (0.0 when defaulted)
    pub category_confidence: f64,
    /// None when no candidate existed and the category was defaulted
    pub provenance: Option<Provenance>,
    pub verdict: Verdict,
    /// Stable, sorted machine-readable reason codes
    pub reasons: Vec<String>,
}

/// Physical action kinds the planner may emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Move,
    Copy,
    Delete,
    Skip,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Move => "move",
            ActionKind::Copy => "copy",
            ActionKind::Delete => "delete",
            ActionKind::Skip => "skip",
        }
    }
}

impl FromStr for ActionKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "move" => Ok(ActionKind::Move),
            "copy" => Ok(ActionKind::Copy),
            "delete" => Ok(ActionKind::Delete),
            "skip" => Ok(ActionKind::Skip),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown action kind: {other}"
            ))),
        }
    }
}

/// One planned filesystem action. Destinations are pairwise distinct across a
/// plan; `Delete` and `Skip` carry no destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlanEntry {
    pub chunk_id: ChunkId,
    pub kind: ActionKind,
    pub destination: Option<PathBuf>,
    /// Verdict snapshot at planning time
    pub verdict: Verdict,
}

/// Execution outcome of one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    Applied,
    AlreadyApplied,
    Failed,
}

impl ActionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Applied => "applied",
            ActionOutcome::AlreadyApplied => "already_applied",
            ActionOutcome::Failed => "failed",
        }
    }
}

impl FromStr for ActionOutcome {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "applied" => Ok(ActionOutcome::Applied),
            "already_applied" => Ok(ActionOutcome::AlreadyApplied),
            "failed" => Ok(ActionOutcome::Failed),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown action outcome: {other}"
            ))),
        }
    }
}

/// One line of the append-only action log: what physically happened to a
/// chunk. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub chunk_id: ChunkId,
    pub kind: ActionKind,
    pub outcome: ActionOutcome,
    pub destination: Option<String>,
    /// Failure cause or informational detail
    pub detail: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Run-level statistics aggregated from decision records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_chunks: usize,
    pub kept: usize,
    pub quarantined: usize,
    pub discarded: usize,
    pub keep_rate: f64,
    pub avg_final_score: f64,
    pub category_counts: BTreeMap<String, usize>,
    pub reason_histogram: BTreeMap<String, usize>,
    /// Count of chunks within the sensitivity band of a threshold
    pub borderline_chunks: usize,
    /// Fraction of chunks whose verdict flips under a +/-0.05 perturbation
    pub sensitivity: f64,
    pub score_distribution: BTreeMap<String, usize>,
    /// Chunk-level failures surfaced during the run (nothing fails silently)
    pub failures: Vec<String>,
    pub discard_threshold: f64,
    pub keep_threshold: f64,
}

/// Human-readable justification for one chunk's verdict and final outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipExplanation {
    pub chunk_id: ChunkId,
    pub verdict: Verdict,
    pub final_score: f64,
    pub category: Category,
    pub why: Vec<String>,
    /// Outcome of the executed action, when the executor has run
    pub outcome: Option<ActionOutcome>,
    pub destination: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_round_trip() {
        assert_eq!(Signal::from("face".to_string()), Signal::Face);
        assert_eq!(Signal::Face.as_str(), "face");
        assert_eq!(
            Signal::from("scene_change".to_string()),
            Signal::Other("scene_change".to_string())
        );
    }

    #[test]
    fn test_category_priority_order() {
        // product_related > funny > general > other, in declaration order
        assert!(Category::ProductRelated < Category::Funny);
        assert!(Category::Funny < Category::General);
        assert!(Category::General < Category::Other("misc".to_string()));
    }

    #[test]
    fn test_chunk_id_stem() {
        assert_eq!(ChunkId::new("chunk_001.mp4").stem(), "chunk_001");
        assert_eq!(ChunkId::new("no_extension").stem(), "no_extension");
    }

    #[test]
    fn test_stage_parse() {
        assert_eq!("decided".parse::<Stage>().unwrap(), Stage::Decided);
        assert!("bogus".parse::<Stage>().is_err());
    }

    #[test]
    fn test_verdict_serde_snake_case() {
        let json = serde_json::to_string(&Verdict::Quarantine).unwrap();
        assert_eq!(json, "\"quarantine\"");
    }
}
