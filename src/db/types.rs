//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Write transaction failed at {phase}: {source}")]
    Transaction {
        phase: &'static str,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Invalid stored value: {0}")]
    InvalidValue(String),

    #[error("Status transition from '{from}' to '{to}' is not allowed")]
    InvalidTransition { from: String, to: String },
}

/// A row from the `profiles` table. Canonical person record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProfile {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    /// Normalized business-category string.
    pub niche: Option<String>,
    pub audience: Option<String>,
    pub list_size: Option<i64>,
    pub social_reach: Option<i64>,
    pub what_you_do: Option<String>,
    pub offering: Option<String>,
    pub seeking: Option<String>,
    pub last_active_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl DbProfile {
    /// `list_size + social_reach`, missing components counted as zero.
    pub fn reach(&self) -> i64 {
        self.list_size.unwrap_or(0).max(0) + self.social_reach.unwrap_or(0).max(0)
    }
}

/// A row from `intake_submissions`. Verified per-event declaration of
/// intent; Platinum-qualifying only while `confirmed_at` is recent.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbIntake {
    pub id: String,
    pub profile_id: String,
    pub event_id: String,
    pub event_name: Option<String>,
    pub event_date: Option<String>,
    pub verified_offers: Vec<String>,
    pub verified_needs: Vec<String>,
    pub match_preference: Vec<String>,
    pub anti_personas: Vec<String>,
    /// Transcript-inferred pre-fill. Never feeds scoring directly.
    pub suggested_offers: Vec<String>,
    pub suggested_needs: Vec<String>,
    pub confirmed_at: Option<String>,
    pub created_at: String,
}

/// A row from `match_suggestions`. The pipeline's output contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSuggestion {
    pub id: String,
    pub cycle_id: String,
    pub target_profile_id: String,
    pub candidate_profile_id: String,
    /// Directional scores on the 0–100 scale.
    pub score_ab: f64,
    pub score_ba: f64,
    pub harmonic_mean: f64,
    /// Harmonic mean after the trust modifier; what ranking sorts on.
    pub final_score: f64,
    /// Reach-ratio diagnostic in [0, 1].
    pub scale_symmetry_score: f64,
    pub trust_level: String,
    pub match_reason: String,
    pub rank_position: u32,
    pub rank_tier: String,
    pub status: String,
    pub config_snapshot: String,
    pub expires_at: String,
    pub suggested_at: String,
}

/// A row from `match_popularity`: fairness accounting for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbPopularity {
    pub profile_id: String,
    pub match_cycle_id: String,
    pub top_3_appearances: u32,
}

/// A row from `profile_review_queue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbReviewEntry {
    pub id: String,
    pub extracted_name: String,
    /// JSON blob of the unresolved source record.
    pub extracted_data: String,
    pub candidate_profile_id: Option<String>,
    pub confidence: f64,
    pub reason: String,
    pub status: String,
    pub created_at: String,
}

/// A row from `profile_field_history`: a merge conflict preserved instead
/// of overwritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFieldHistory {
    pub id: String,
    pub profile_id: String,
    pub field: String,
    pub kept_value: Option<String>,
    pub incoming_value: String,
    pub source: String,
    pub recorded_at: String,
}

/// Decode a JSON-array text column into a string list. Bad data yields an
/// empty list rather than failing the whole query.
pub(crate) fn decode_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

/// Encode a string list for a JSON-array text column.
pub(crate) fn encode_list(values: &[String]) -> String {
    serde_json::to_string(values).unwrap_or_else(|_| "[]".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reach_sums_and_clamps() {
        let profile = DbProfile {
            list_size: Some(1000),
            social_reach: Some(250),
            ..Default::default()
        };
        assert_eq!(profile.reach(), 1250);

        let profile = DbProfile {
            list_size: None,
            social_reach: Some(-5),
            ..Default::default()
        };
        assert_eq!(profile.reach(), 0);
    }

    #[test]
    fn list_roundtrip() {
        let values = vec!["a".to_string(), "b c".to_string()];
        assert_eq!(decode_list(&encode_list(&values)), values);
        assert!(decode_list("not json").is_empty());
        assert!(decode_list("[]").is_empty());
    }
}
