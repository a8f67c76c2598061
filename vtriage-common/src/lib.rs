//! # vtriage Common Library
//!
//! Shared code for the vtriage decision engine including:
//! - Chunk, signal, and category domain types
//! - Decision, plan, and action-log record types
//! - Error taxonomy (Error enum)
//! - Configuration loading and validation

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
