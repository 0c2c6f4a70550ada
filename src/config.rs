//! Cycle configuration: scoring weights, thresholds, caps, and the
//! snapshot serialization persisted with every suggestion row.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::MatchError;

/// Weights for the four directional score components. Must sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreWeights {
    pub intent: f64,
    pub synergy: f64,
    pub momentum: f64,
    pub context: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            intent: 0.45,
            synergy: 0.25,
            momentum: 0.20,
            context: 0.10,
        }
    }
}

/// Tunable knobs for one match cycle.
///
/// A JSON snapshot of the config is stored on every suggestion row so a
/// score can always be traced back to the weights that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleConfig {
    /// Suggestions kept per target profile.
    pub top_k: usize,
    /// Max number of targets in whose Top-3 a single candidate may appear.
    pub popularity_cap: u32,
    /// Suggestion expiry, days from cycle start.
    pub expiry_days: i64,
    /// Pairs scoring below this floor (0–100) are not persisted.
    pub min_score: f64,
    /// Oracle similarity needed for an intent match.
    pub semantic_match_threshold: f64,
    /// Jaccard overlap needed for an intent match when the oracle is
    /// unavailable.
    pub intent_fallback_threshold: f64,
    /// Similarity at or above which two niches count as identical.
    pub niche_identical_threshold: f64,
    /// Similarity at or above which two niches count as client-adjacent.
    pub niche_adjacent_threshold: f64,
    /// Disable to skip the oracle entirely and score with token overlap.
    pub use_oracle: bool,
    pub weights: ScoreWeights,
    /// Worker shards for pair scoring.
    pub scorer_shards: usize,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            top_k: 20,
            popularity_cap: 5,
            expiry_days: 7,
            min_score: 10.0,
            semantic_match_threshold: 0.65,
            intent_fallback_threshold: 0.30,
            niche_identical_threshold: 0.85,
            niche_adjacent_threshold: 0.40,
            use_oracle: true,
            weights: ScoreWeights::default(),
            scorer_shards: 4,
        }
    }
}

impl CycleConfig {
    /// Reject configs that would produce unbounded or nonsense scores.
    pub fn validate(&self) -> Result<(), MatchError> {
        let w = &self.weights;
        let sum = w.intent + w.synergy + w.momentum + w.context;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(MatchError::Config(format!(
                "score weights must sum to 1.0, got {sum}"
            )));
        }
        for (label, value) in [
            ("semanticMatchThreshold", self.semantic_match_threshold),
            ("intentFallbackThreshold", self.intent_fallback_threshold),
            ("nicheIdenticalThreshold", self.niche_identical_threshold),
            ("nicheAdjacentThreshold", self.niche_adjacent_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(MatchError::Config(format!(
                    "{label} must be in [0, 1], got {value}"
                )));
            }
        }
        if self.niche_adjacent_threshold > self.niche_identical_threshold {
            return Err(MatchError::Config(
                "nicheAdjacentThreshold must not exceed nicheIdenticalThreshold".to_string(),
            ));
        }
        if self.top_k == 0 {
            return Err(MatchError::Config("topK must be at least 1".to_string()));
        }
        if self.scorer_shards == 0 {
            return Err(MatchError::Config(
                "scorerShards must be at least 1".to_string(),
            ));
        }
        if self.expiry_days <= 0 {
            return Err(MatchError::Config(
                "expiryDays must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Opaque snapshot persisted on each suggestion row.
    pub fn snapshot_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Short content hash identifying this exact configuration.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.snapshot_json().as_bytes());
        let digest = hasher.finalize();
        digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect::<String>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(CycleConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unbalanced_weights() {
        let mut config = CycleConfig::default();
        config.weights.intent = 0.9;
        let err = config.validate().unwrap_err();
        assert_eq!(err.kind(), "config_error");
    }

    #[test]
    fn rejects_out_of_range_thresholds() {
        let mut config = CycleConfig::default();
        config.semantic_match_threshold = 1.2;
        assert!(config.validate().is_err());

        let mut config = CycleConfig::default();
        config.niche_adjacent_threshold = 0.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn snapshot_roundtrips() {
        let config = CycleConfig::default();
        let restored: CycleConfig = serde_json::from_str(&config.snapshot_json()).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn fingerprint_tracks_content() {
        let a = CycleConfig::default();
        let mut b = CycleConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
        b.popularity_cap = 3;
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
