//! vtriage-de library interface
//!
//! The Decision & Resilience Engine: aggregates heterogeneous per-chunk
//! signals into verdicts under a configurable policy, turns verdicts into a
//! conflict-free execution plan, and executes that plan with crash-safe,
//! idempotent, append-only bookkeeping so an interrupted run resumes without
//! recomputation or duplicate side effects.

pub mod analytics;
pub mod db;
pub mod decider;
pub mod executor;
pub mod explainer;
pub mod feedback;
pub mod ingest;
pub mod pipeline;
pub mod planner;

pub use pipeline::{Pipeline, PipelineEvent, RunReport};
