//! Error taxonomy for the filter-execution core.
//!
//! Every fallible operation in this crate returns `Result<T, EngineError>`.
//! The CLI binary is the only place this taxonomy is collapsed down to an
//! exit code (see `main.rs`).

use thiserror::Error;

/// The engine's error taxonomy (see spec §7).
#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Parser syntax error, unknown directive, `THRESHHOLD` misspelling, or a
    /// REQUIRES cycle detected during partial-order closure. Fatal.
    #[error("invalid spec at line {line}: {message}")]
    InvalidSpec { line: usize, message: String },

    /// A `REQUIRES` edge names a filter that was never declared. Fatal.
    #[error("filter '{filter}' requires unknown filter '{dependency}'")]
    MissingDependency { filter: String, dependency: String },

    /// A filter's `eval` returned an error or panicked while evaluating one
    /// object. Recovered per-object unless it recurs past the configured
    /// consecutive-failure limit.
    #[error("filter '{filter}' failed to evaluate object {object_id}: {message}")]
    FilterEvalError {
        filter: String,
        object_id: u64,
        message: String,
    },

    /// The same filter failed on more than `max_consec_fails` objects in a
    /// row; the search is aborted.
    #[error("filter '{filter}' failed on {count} consecutive objects, aborting search")]
    TooManyConsecutiveFailures { filter: String, count: u32 },

    /// External cancellation was observed. Not itself an error condition for
    /// the caller beyond signaling a clean, partial shutdown.
    #[error("search cancelled")]
    Cancelled,

    /// The object store or blob store collaborator failed even after
    /// exhausting the retry/backoff policy.
    #[error("collaborator '{collaborator}' unavailable after {attempts} attempts: {message}")]
    CollaboratorUnavailable {
        collaborator: String,
        attempts: u32,
        message: String,
    },
}

impl EngineError {
    /// Maps a terminal error to the CLI exit code defined in spec §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::InvalidSpec { .. } | EngineError::MissingDependency { .. } => 1,
            EngineError::FilterEvalError { .. } | EngineError::TooManyConsecutiveFailures { .. } => 2,
            EngineError::Cancelled => 3,
            EngineError::CollaboratorUnavailable { .. } => 1,
        }
    }
}

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;
