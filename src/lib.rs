//! Reciprocal JV partner matching engine.
//!
//! Four-stage offline pipeline run per match cycle (or on demand for one
//! profile): resolve incoming records into canonical profiles, assemble
//! per-profile feature bundles, score every eligible ordered pair and combine
//! directions with a harmonic mean, then apply the popularity-cap fairness
//! filter before persisting ranked suggestions.
//!
//! The crate owns the matching pipeline and its SQLite store. Everything
//! around it — upload surfaces, transcript parsing, report rendering,
//! authorization — lives in external collaborators that feed records in and
//! read suggestions out.

pub mod assembler;
pub mod config;
pub mod db;
pub mod error;
pub mod fairness;
pub mod freshness;
mod migrations;
pub mod pipeline;
pub mod resolver;
pub mod scheduler;
pub mod scorer;
pub mod semantic;
pub mod types;
pub mod util;

pub use config::CycleConfig;
pub use db::MatchDb;
pub use error::MatchError;
pub use pipeline::{CycleReport, MatchPipeline};
pub use semantic::SimilarityOracle;
pub use types::TrustLevel;
