//! Error types for bq-report.
//!
//! Defines the main error enum used throughout the crate. Every variant is
//! fatal to the current query; nothing is retried locally.

use std::time::Duration;
use thiserror::Error;

/// Main error type for bq-report operations.
#[derive(Error, Debug)]
pub enum ReportError {
    /// The remote service no longer knows about the job.
    #[error("Job {0} no longer exists")]
    JobVanished(String),

    /// The remote service reported that the job failed.
    #[error("Job failed: {0}")]
    JobExecution(String),

    /// A result column's wire type disagrees with the expected type.
    #[error("Type mismatch in column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: String,
        actual: String,
    },

    /// An expected column is absent from the result schema.
    #[error("Column '{0}' is not present in the result set")]
    MissingColumn(String),

    /// An operation was attempted on a job in the wrong state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Output sink failures.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level failures talking to the remote service.
    #[error("Network error: {0}")]
    Network(String),

    /// The wait for job completion exceeded its deadline.
    #[error("Timed out after {0:?} waiting for job completion")]
    Timeout(Duration),

    /// The wait for job completion was cancelled locally.
    #[error("Wait for job completion was cancelled")]
    Cancelled,

    /// A streaming insert was (partially) rejected.
    #[error("Streaming insert rejected {failed_rows} row(s): {details}")]
    InsertRejected { failed_rows: usize, details: String },

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReportError {
    /// Creates a job execution error with the remote-supplied message.
    pub fn job_execution(msg: impl Into<String>) -> Self {
        Self::JobExecution(msg.into())
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(
        column: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            column: column.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an invalid state error with the given message.
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    /// Creates a network error with the given message.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::JobVanished(_) => "Job Vanished",
            Self::JobExecution(_) => "Job Execution Error",
            Self::TypeMismatch { .. } | Self::MissingColumn(_) => "Type Mismatch",
            Self::InvalidState(_) => "Invalid State",
            Self::Io(_) => "I/O Failure",
            Self::Network(_) => "Network Error",
            Self::Timeout(_) | Self::Cancelled => "Wait Aborted",
            Self::InsertRejected { .. } => "Insert Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using ReportError.
pub type Result<T> = std::result::Result<T, ReportError>;
