//! Common error types for vtriage

use thiserror::Error;

/// Common result type for vtriage operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the decision engine.
///
/// Configuration errors are fatal and abort a run before any chunk is
/// processed. Chunk-level errors (`IncompleteInput`, `PlanConflict`,
/// `Execution`) are isolated to the affected chunk and recorded; they never
/// abort the batch.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error (fatal, pre-run)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A chunk arrived with no signals and no semantic candidates
    #[error("Incomplete input for chunk {0}: no signals and no candidates")]
    IncompleteInput(String),

    /// A planned destination collides and the collision policy cannot resolve it
    #[error("Plan conflict: {0}")]
    PlanConflict(String),

    /// A physical filesystem action failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// The run-state ledger claims a stage DONE but its output artifact is missing
    #[error("Resume inconsistency: {0}")]
    ResumeInconsistency(String),

    /// A score key was re-written with a different value (write-once contract)
    #[error("Score conflict for {chunk}/{signal}@{stage}: stored {stored}, attempted {attempted}")]
    ScoreConflict {
        chunk: String,
        signal: String,
        stage: String,
        stored: f64,
        attempted: f64,
    },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
