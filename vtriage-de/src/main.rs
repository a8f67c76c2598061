//! vtriage-de - Decision & Resilience Engine
//!
//! Turns independently-scored video chunks into auditable, resumable filing
//! decisions: decide, plan, execute, explain. Runs are idempotent and can be
//! interrupted at any point; the next invocation resumes from the run-state
//! ledger.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vtriage_common::config::{self, EngineConfig};
use vtriage_common::types::{ChunkId, Stage};
use vtriage_de::db::{self, ActionLogStore, DecisionStore, RunStateTracker, ScoreStore};
use vtriage_de::{analytics, explainer, feedback, ingest, Pipeline};

/// Command-line arguments for vtriage-de
#[derive(Parser, Debug)]
#[command(name = "vtriage-de")]
#[command(about = "Decision & Resilience Engine for scored video chunks")]
#[command(version)]
struct Args {
    /// Engine root folder (database, reports, default output)
    #[arg(short, long, env = "VTRIAGE_ROOT")]
    root: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "VTRIAGE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline over every chunk in the store
    Run {
        /// Directory holding the physical chunk files
        #[arg(long, default_value = "processing")]
        processing_dir: PathBuf,
    },
    /// Load collaborator JSON (scores, semantic tags, chunk metadata)
    Ingest {
        /// Scores file: chunk id -> metric -> value
        #[arg(long)]
        scores: Option<PathBuf>,
        /// Semantic tags file: chunk id -> category/attribution
        #[arg(long)]
        tags: Option<PathBuf>,
        /// Chunk metadata file: array of chunk objects
        #[arg(long)]
        chunks: Option<PathBuf>,
    },
    /// Print the run summary for the stored decisions
    Summary,
    /// Print the run narrative and per-chunk justifications
    Explain,
    /// Export decisions and reason frequencies for heuristics tooling
    Feedback {
        /// Output file; stdout when omitted
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Operator reset of one (chunk, stage) ledger entry
    Reset {
        #[arg(long)]
        chunk: String,
        #[arg(long)]
        stage: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vtriage_de=info,vtriage_common=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let root = config::resolve_root(args.root.as_deref());
    tokio::fs::create_dir_all(&root)
        .await
        .with_context(|| format!("Failed to create root folder {}", root.display()))?;

    let engine_config = EngineConfig::load(args.config.as_deref(), &root)
        .context("Failed to load configuration")?;

    let db_path = config::database_path(&root);
    info!("Database: {}", db_path.display());
    let pool = db::init_database_pool(&db_path)
        .await
        .context("Failed to open database")?;

    match args.command {
        Command::Run { processing_dir } => {
            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping at the next chunk boundary");
                    ctrl_c_token.cancel();
                }
            });

            let pipeline = Pipeline::new(engine_config, pool, &root);
            let report = pipeline
                .run(&processing_dir, cancel)
                .await
                .context("Run failed")?;

            if report.cancelled {
                warn!("Run cancelled; progress is persisted, rerun to resume");
            }
            println!(
                "{} chunks: {} kept, {} quarantined, {} discarded, {} deferred",
                report.summary.total_chunks,
                report.summary.kept,
                report.summary.quarantined,
                report.summary.discarded,
                report.deferred.len()
            );
            for artifact in &report.artifacts {
                println!("  wrote {}", artifact.display());
            }
        }
        Command::Ingest {
            scores,
            tags,
            chunks,
        } => {
            if scores.is_none() && tags.is_none() && chunks.is_none() {
                anyhow::bail!("Nothing to ingest: pass --scores, --tags, or --chunks");
            }
            let store = ScoreStore::new(pool.clone());
            let tracker = RunStateTracker::new(pool);

            if let Some(path) = chunks {
                let count = ingest::ingest_chunks(&store, &path)
                    .await
                    .context("Chunk ingest failed")?;
                println!("Registered {count} chunks");
            }
            if let Some(path) = scores {
                let report = ingest::ingest_scores(&store, &tracker, &path)
                    .await
                    .context("Score ingest failed")?;
                println!(
                    "Recorded {} scores ({} conflicts rejected)",
                    report.scores_recorded,
                    report.conflicts.len()
                );
                for conflict in &report.conflicts {
                    warn!("{conflict}");
                }
            }
            if let Some(path) = tags {
                let report = ingest::ingest_tags(&store, &tracker, &path)
                    .await
                    .context("Tag ingest failed")?;
                println!("Recorded {} semantic candidates", report.candidates_recorded);
            }
        }
        Command::Summary => {
            let decisions = DecisionStore::new(pool).load_all().await?;
            let summary = analytics::summarize(&decisions, &engine_config.decider);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Explain => {
            let decisions = DecisionStore::new(pool.clone()).load_all().await?;
            let log = ActionLogStore::new(pool).load_all().await?;
            let summary = analytics::summarize(&decisions, &engine_config.decider);
            let (narrative, explanations) = explainer::explain(&decisions, &summary, &log);
            println!("{narrative}\n");
            for explanation in explanations.values() {
                let destination = explanation
                    .destination
                    .as_deref()
                    .unwrap_or("-");
                println!(
                    "{}: {} ({:.2}) [{}] -> {}",
                    explanation.chunk_id,
                    explanation.verdict,
                    explanation.final_score,
                    explanation.why.join("; "),
                    destination
                );
            }
        }
        Command::Feedback { out } => {
            let decisions = DecisionStore::new(pool).load_all().await?;
            let export = feedback::export(&decisions);
            let body = serde_json::to_string_pretty(&export)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, body).await?;
                    println!("Wrote feedback export to {}", path.display());
                }
                None => println!("{body}"),
            }
        }
        Command::Reset { chunk, stage } => {
            let stage = Stage::from_str(&stage)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            RunStateTracker::new(pool)
                .reset(&ChunkId::new(chunk.clone()), stage)
                .await?;
            println!("Reset {chunk} at stage {stage}");
        }
    }

    Ok(())
}
