//! Configuration loading and validation
//!
//! Config is loaded once per run and immutable for the run's duration.
//! Resolution follows a priority order: explicit path, environment variable,
//! `vtriage.toml` in the root folder, compiled defaults.

use crate::types::{Category, Signal};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// What DISCARD physically does. Non-destructive trash-move is the default;
/// destructive delete is an explicit opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscardMode {
    Trash,
    Delete,
}

/// How the planner resolves destination collisions. `Fail` defers the
/// conflicting chunk to manual review; `Disambiguate` appends a deterministic
/// chunk-id suffix. Silent overwrite is never an option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionMode {
    Fail,
    Disambiguate,
}

/// Decider policy: signal weights and verdict thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeciderConfig {
    /// Signal name -> non-negative weight. Not required to sum to 1; the
    /// aggregate is unnormalized and thresholds are calibrated to its scale.
    pub signal_weights: BTreeMap<Signal, f64>,
    /// Below this, the chunk is discarded
    pub discard_threshold: f64,
    /// At or above this, the chunk is kept; between the two it is quarantined
    pub keep_threshold: f64,
    /// Per-signal "low" markers; signals scoring below get a `low:` reason
    pub low_markers: BTreeMap<Signal, f64>,
    /// Fallback low marker for signals without an explicit entry
    pub default_low_marker: f64,
    /// Upper clamp for the final score (policy-defined scale, not [0,1])
    pub score_ceiling: f64,
}

impl Default for DeciderConfig {
    fn default() -> Self {
        let mut signal_weights = BTreeMap::new();
        signal_weights.insert(Signal::Face, 0.4);
        signal_weights.insert(Signal::Motion, 0.3);
        signal_weights.insert(Signal::Speech, 0.3);
        Self {
            signal_weights,
            discard_threshold: 0.4,
            keep_threshold: 0.65,
            low_markers: BTreeMap::new(),
            default_low_marker: 0.25,
            score_ceiling: 2.0,
        }
    }
}

impl DeciderConfig {
    pub fn low_marker(&self, signal: &Signal) -> f64 {
        self.low_markers
            .get(signal)
            .copied()
            .unwrap_or(self.default_low_marker)
    }
}

/// Semantic policy: per-category weights used both for candidate selection
/// and for the category bonus on the final score.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub category_weights: BTreeMap<Category, f64>,
    /// Weight for categories without an explicit entry
    pub default_weight: f64,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        let mut category_weights = BTreeMap::new();
        category_weights.insert(Category::ProductRelated, 1.0);
        category_weights.insert(Category::Funny, 0.8);
        category_weights.insert(Category::General, 0.5);
        Self {
            category_weights,
            default_weight: 0.5,
        }
    }
}

impl SemanticConfig {
    pub fn weight(&self, category: &Category) -> f64 {
        self.category_weights
            .get(category)
            .copied()
            .unwrap_or(self.default_weight)
    }
}

/// Filing policy: where routed chunks land and how conflicts are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionConfig {
    /// Root directory for routed output, relative paths resolved against the
    /// engine root folder
    pub output_dir: PathBuf,
    pub discard_mode: DiscardMode,
    pub collision_mode: CollisionMode,
    pub quarantine_dir: String,
    pub trash_dir: String,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output_clips"),
            discard_mode: DiscardMode::Trash,
            collision_mode: CollisionMode::Fail,
            quarantine_dir: "quarantine".to_string(),
            trash_dir: "trash".to_string(),
        }
    }
}

/// Executor bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Per-operation timeout; expiry marks the entry FAILED and the batch
    /// continues
    pub op_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self { op_timeout_secs: 30 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub decider: DeciderConfig,
    pub semantic: SemanticConfig,
    pub actions: ActionConfig,
    pub executor: ExecutorConfig,
}

impl EngineConfig {
    /// Load configuration with priority: explicit path, `VTRIAGE_CONFIG`
    /// environment variable, `vtriage.toml` in the root folder, defaults.
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self> {
        let candidate = explicit
            .map(PathBuf::from)
            .or_else(|| std::env::var("VTRIAGE_CONFIG").ok().map(PathBuf::from))
            .or_else(|| {
                let p = root.join("vtriage.toml");
                p.exists().then_some(p)
            });

        let config = match candidate {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("read {} failed: {e}", path.display()))
                })?;
                let config: EngineConfig = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("parse {} failed: {e}", path.display()))
                })?;
                tracing::info!("Configuration loaded from {}", path.display());
                config
            }
            None => {
                tracing::info!("No config file found, using compiled defaults");
                EngineConfig::default()
            }
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate weights and thresholds. Fatal: a run aborts here before any
    /// chunk is processed.
    pub fn validate(&self) -> Result<()> {
        for (signal, weight) in &self.decider.signal_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Config(format!(
                    "signal weight for '{signal}' must be a non-negative finite number, got {weight}"
                )));
            }
        }
        for (category, weight) in &self.semantic.category_weights {
            if !weight.is_finite() || *weight < 0.0 {
                return Err(Error::Config(format!(
                    "category weight for '{category}' must be a non-negative finite number, got {weight}"
                )));
            }
        }
        if self.semantic.default_weight < 0.0 || !self.semantic.default_weight.is_finite() {
            return Err(Error::Config(format!(
                "default category weight must be non-negative, got {}",
                self.semantic.default_weight
            )));
        }
        if self.decider.discard_threshold >= self.decider.keep_threshold {
            return Err(Error::Config(format!(
                "discard_threshold ({}) must be below keep_threshold ({})",
                self.decider.discard_threshold, self.decider.keep_threshold
            )));
        }
        if self.decider.score_ceiling <= 0.0 {
            return Err(Error::Config(format!(
                "score_ceiling must be positive, got {}",
                self.decider.score_ceiling
            )));
        }
        Ok(())
    }

    /// Output root resolved against the engine root folder.
    pub fn output_root(&self, root: &Path) -> PathBuf {
        if self.actions.output_dir.is_absolute() {
            self.actions.output_dir.clone()
        } else {
            root.join(&self.actions.output_dir)
        }
    }
}

/// Resolve the engine root folder.
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `VTRIAGE_ROOT` environment variable
/// 3. OS-dependent default data directory
pub fn resolve_root(cli_arg: Option<&str>) -> PathBuf {
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("VTRIAGE_ROOT") {
        return PathBuf::from(path);
    }
    dirs::data_local_dir()
        .map(|d| d.join("vtriage"))
        .unwrap_or_else(|| PathBuf::from("./vtriage_data"))
}

/// Database path inside the root folder.
pub fn database_path(root: &Path) -> PathBuf {
    root.join("vtriage.db")
}

/// Directory for run artifacts (summaries, narratives, explanations).
pub fn reports_dir(root: &Path) -> PathBuf {
    root.join("reports")
}
