//! Error types for the matching pipeline.
//!
//! Errors are classified by blast radius:
//! - Per-record: bad input data, ambiguous resolution — logged, skipped,
//!   counted in the cycle report.
//! - Recoverable: semantic oracle failures — fall back to lexical overlap.
//! - Fatal: invariant violations and storage failures — abort the cycle.

use thiserror::Error;

use crate::db::DbError;

/// Errors raised by the matching pipeline.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A single input record is unusable (missing field, invalid enum,
    /// negative reach). The record is skipped; the cycle continues.
    #[error("bad record '{record}': {message}")]
    Data { record: String, message: String },

    /// More than one profile matched a record at the name+company tier.
    /// The record is skipped for this cycle.
    #[error("ambiguous resolution for '{name}': {candidates} equally strong candidates")]
    AmbiguousResolution { name: String, candidates: usize },

    /// The semantic similarity oracle failed. Scoring falls back to token
    /// overlap; this error is only surfaced when the caller probes directly.
    #[error("semantic oracle failed: {0}")]
    Oracle(String),

    /// A self-pair was emitted, a harmonic mean left [0, 100], or the
    /// popularity cap was breached. Must not occur; aborts the cycle.
    #[error("invariant violated: {0}")]
    Invariant(String),

    /// The cycle was cancelled at a stage boundary. No partial scorer
    /// output was persisted.
    #[error("cycle cancelled before stage '{0}'")]
    Cancelled(&'static str),

    /// The cycle configuration is unusable (weights off, thresholds out of
    /// range).
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl MatchError {
    /// Stable machine-readable tag for operators and counters.
    pub fn kind(&self) -> &'static str {
        match self {
            MatchError::Data { .. } => "data_error",
            MatchError::AmbiguousResolution { .. } => "resolution_conflict",
            MatchError::Oracle(_) => "oracle_error",
            MatchError::Invariant(_) => "invariant_violation",
            MatchError::Cancelled(_) => "cancelled",
            MatchError::Config(_) => "config_error",
            MatchError::Storage(_) => "storage_error",
        }
    }

    /// True when the error must abort the whole cycle rather than skip a
    /// record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MatchError::Invariant(_)
                | MatchError::Storage(_)
                | MatchError::Config(_)
                | MatchError::Cancelled(_)
        )
    }
}
