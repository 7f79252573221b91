/// Error types for koru-reflect operations.
///
/// Errors fall into four families: configuration problems that must stop a
/// step before it touches any collaborator, state-consistency failures
/// between the portfolio's feedback dates and the reflection log, checkpoint
/// collisions, and infrastructure failures (I/O, serialization, storage).
///
/// Degraded outcomes (an unconverged reasoning call, missing momentum,
/// zero-magnitude feedback) are not errors and never appear here.
use chrono::NaiveDate;
use std::path::PathBuf;
use thiserror::Error;

use crate::types::{MemoryId, MemoryTier};

/// The main error type for koru-reflect operations.
#[derive(Error, Debug)]
pub enum ReflectError {
    /// Run mode string was neither `train` nor `test`
    #[error("Invalid run mode '{value}': expected 'train' or 'test'")]
    InvalidRunMode {
        /// The rejected value
        value: String,
    },

    /// Missing or invalid configuration
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what is wrong
        reason: String,
    },

    /// Feedback arrived for a date that has no recorded reflection
    #[error("No reflection recorded for {date}; feedback and reflection dates diverged")]
    MissingReflection {
        /// The fed-back date
        date: NaiveDate,
    },

    /// Checkpoint destination already exists and `force` was not set
    #[error("Checkpoint location '{}' already exists (use force to overwrite)", path.display())]
    CheckpointExists {
        /// The existing location
        path: PathBuf,
    },

    /// A reinforcement referenced an id the store never issued
    #[error("Unknown memory id '{id}' in {tier} tier for '{symbol}'")]
    UnknownMemory {
        /// Tier the id was consulted in
        tier: MemoryTier,
        /// Asset the id belongs to
        symbol: String,
        /// The offending id
        id: MemoryId,
    },

    /// Storage operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error when converting data to/from JSON
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReflectError {
    /// Shorthand for a configuration error.
    pub fn config(reason: impl Into<String>) -> Self {
        ReflectError::Config {
            reason: reason.into(),
        }
    }

    /// True for errors that indicate the step was rejected before any side effect.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ReflectError::InvalidRunMode { .. } | ReflectError::Config { .. }
        )
    }
}

/// Result type alias for koru-reflect operations.
pub type ReflectResult<T> = Result<T, ReflectError>;
