//! Cycle orchestration: Resolver output → Feature Assembler → Scorer →
//! Fairness Filter → persisted suggestions.
//!
//! Stages run sequentially; pair scoring inside the Scorer stage is
//! sharded across worker threads reading the immutable feature table.
//! The database is touched only at stage ingress/egress, and the final
//! write is one transaction — a failed cycle persists nothing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::assembler::{assemble, FeatureBundle, FeatureTable};
use crate::config::CycleConfig;
use crate::db::{DbSuggestion, MatchDb};
use crate::error::MatchError;
use crate::fairness::{self, FairnessOutcome, RankedPair};
use crate::scorer::{global_ordering, rank_ordering, PairScore, RuleBasedPolicy, ScoringPolicy};
use crate::semantic::{SemanticIndex, SimilarityOracle};

/// Counts from one cycle run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleReport {
    pub cycle_id: String,
    pub profiles_scored: u32,
    pub pairs_considered: u64,
    pub pairs_emitted: u32,
    pub pairs_dropped_by_fairness: u32,
    /// Profiles that ended the cycle with zero suggestions.
    pub orphans: u32,
    pub data_errors: u32,
    pub oracle_fallbacks: u32,
}

/// Cooperative cancellation token for a running cycle. Cancellation takes
/// effect at stage boundaries; partial scorer output is discarded.
#[derive(Clone)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// The matching pipeline, configured once and run per cycle or per
/// profile.
pub struct MatchPipeline {
    config: CycleConfig,
    oracle: Option<Arc<dyn SimilarityOracle>>,
    cancel: Arc<AtomicBool>,
}

impl MatchPipeline {
    pub fn new(config: CycleConfig) -> Self {
        Self {
            config,
            oracle: None,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn SimilarityOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn config(&self) -> &CycleConfig {
        &self.config
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.cancel))
    }

    fn checkpoint(&self, stage: &'static str) -> Result<(), MatchError> {
        if self.cancel.load(Ordering::Relaxed) {
            log::warn!("Cycle cancelled before stage '{stage}'");
            return Err(MatchError::Cancelled(stage));
        }
        Ok(())
    }

    fn semantic_index(&self) -> SemanticIndex {
        if self.config.use_oracle {
            SemanticIndex::new(self.oracle.clone())
        } else {
            SemanticIndex::lexical_only()
        }
    }

    /// Run a full match cycle: score every eligible ordered pair, apply
    /// fairness, persist ranked suggestions and popularity counters.
    pub fn run_cycle(
        &self,
        db: &MatchDb,
        cycle_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CycleReport, MatchError> {
        self.config.validate()?;
        self.checkpoint("assemble")?;

        let (table, data_errors) = assemble(db, now)?;
        let dismissals = db.load_all_dismissals()?;
        log::info!(
            "Cycle '{}': assembled {} feature bundles ({} data errors)",
            cycle_id,
            table.len(),
            data_errors
        );

        self.checkpoint("score")?;
        let semantic = self.semantic_index();
        let policy = RuleBasedPolicy::new(&self.config, &semantic, now);
        let targets: Vec<&FeatureBundle> = table.iter().collect();
        let (pairs, pairs_considered) =
            self.score_sharded(&policy, &semantic, &table, &targets, &dismissals)?;
        log::info!(
            "Cycle '{}': scored {} pairs, {} above floor",
            cycle_id,
            pairs_considered,
            pairs.len()
        );

        self.checkpoint("fairness")?;
        let kept = keep_top_k(pairs, self.config.top_k);
        let outcome = fairness::apply(kept, self.config.popularity_cap, HashMap::new());
        verify_invariants(&outcome, self.config.popularity_cap)?;

        self.checkpoint("persist")?;
        let suggestions = self.build_suggestions(cycle_id, &outcome.ranked, now);
        db.with_transaction(|db| {
            for target in table.iter() {
                db.clear_target_suggestions(cycle_id, &target.profile_id)?;
            }
            for suggestion in &suggestions {
                db.upsert_suggestion(suggestion)?;
            }
            db.save_popularity(cycle_id, &outcome.counters)?;
            Ok(())
        })?;

        let orphans = count_orphans(&table, &outcome.ranked);
        let report = CycleReport {
            cycle_id: cycle_id.to_string(),
            profiles_scored: table.len() as u32,
            pairs_considered,
            pairs_emitted: outcome.ranked.len() as u32,
            pairs_dropped_by_fairness: outcome.dropped_from_top3,
            orphans,
            data_errors,
            oracle_fallbacks: semantic.fallback_count(),
        };
        log::info!(
            "Cycle '{}' complete: {} suggestions, {} dropped by fairness, {} orphans",
            cycle_id,
            report.pairs_emitted,
            report.pairs_dropped_by_fairness,
            report.orphans
        );
        Ok(report)
    }

    /// On-demand refresh for a single profile inside an existing cycle.
    ///
    /// The target's previously-held Top-3 popularity slots are released,
    /// the fresh list runs through the same cap gate, and updated counters
    /// are persisted — the cap invariant holds mid-cycle.
    pub fn run_for_profile(
        &self,
        db: &MatchDb,
        cycle_id: &str,
        profile_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<DbSuggestion>, MatchError> {
        self.config.validate()?;
        self.checkpoint("assemble")?;

        let (table, _) = assemble(db, now)?;
        let target = table.get(profile_id).ok_or_else(|| MatchError::Data {
            record: profile_id.to_string(),
            message: "profile not found".to_string(),
        })?;
        let dismissed = db.dismissed_candidate_ids(profile_id)?;

        self.checkpoint("score")?;
        let semantic = self.semantic_index();
        let policy = RuleBasedPolicy::new(&self.config, &semantic, now);
        prime_for_target(&semantic, target, table.bundles());

        let mut pairs = Vec::new();
        for candidate in table.iter() {
            if candidate.profile_id == profile_id || dismissed.contains(&candidate.profile_id) {
                continue;
            }
            if let Some(pair) = policy.score_pair(target, candidate) {
                if pair.final_score >= self.config.min_score {
                    pairs.push(pair);
                }
            }
        }
        pairs.sort_by(rank_ordering);
        pairs.truncate(self.config.top_k);

        self.checkpoint("fairness")?;
        // Release the slots this target's old Top-3 was holding.
        let mut counters = db.load_popularity(cycle_id)?;
        for old in db.get_suggestions_for_target(profile_id)? {
            if old.cycle_id == cycle_id && old.rank_position <= 3 {
                if let Some(count) = counters.get_mut(&old.candidate_profile_id) {
                    *count = count.saturating_sub(1);
                }
            }
        }
        let outcome = fairness::apply(pairs, self.config.popularity_cap, counters);
        verify_invariants(&outcome, self.config.popularity_cap)?;

        self.checkpoint("persist")?;
        let suggestions = self.build_suggestions(cycle_id, &outcome.ranked, now);
        db.with_transaction(|db| {
            db.clear_target_suggestions(cycle_id, profile_id)?;
            for suggestion in &suggestions {
                db.upsert_suggestion(suggestion)?;
            }
            db.save_popularity(cycle_id, &outcome.counters)?;
            Ok(())
        })?;

        Ok(db
            .get_suggestions_for_target(profile_id)?
            .into_iter()
            .filter(|s| s.cycle_id == cycle_id)
            .collect())
    }

    /// Shard pair scoring across worker threads. Each worker owns a chunk
    /// of targets and scores them against the full candidate pool, reading
    /// the feature table and semantic index read-only; output buffers are
    /// merged append-only, then globally sorted for determinism.
    fn score_sharded(
        &self,
        policy: &RuleBasedPolicy<'_>,
        semantic: &SemanticIndex,
        table: &FeatureTable,
        targets: &[&FeatureBundle],
        dismissals: &HashMap<String, std::collections::HashSet<String>>,
    ) -> Result<(Vec<PairScore>, u64), MatchError> {
        if targets.is_empty() {
            return Ok((Vec::new(), 0));
        }
        let shard_count = self.config.scorer_shards.min(targets.len()).max(1);
        let chunk_size = targets.len().div_ceil(shard_count);
        let cancel = &self.cancel;
        let min_score = self.config.min_score;

        let mut shard_outputs: Vec<(Vec<PairScore>, u64)> = Vec::new();
        std::thread::scope(|scope| {
            let mut handles = Vec::new();
            for shard in targets.chunks(chunk_size) {
                handles.push(scope.spawn(move || {
                    let mut buffer = Vec::new();
                    let mut considered = 0u64;
                    for target in shard {
                        if cancel.load(Ordering::Relaxed) {
                            return (buffer, considered);
                        }
                        prime_for_target(semantic, target, table.bundles());
                        let dismissed = dismissals.get(&target.profile_id);
                        for candidate in table.iter() {
                            if candidate.profile_id == target.profile_id {
                                continue;
                            }
                            if dismissed.is_some_and(|d| d.contains(&candidate.profile_id)) {
                                continue;
                            }
                            considered += 1;
                            if let Some(pair) = policy.score_pair(target, candidate) {
                                if pair.final_score >= min_score {
                                    buffer.push(pair);
                                }
                            }
                        }
                    }
                    (buffer, considered)
                }));
            }
            for handle in handles {
                shard_outputs.push(handle.join().expect("scorer shard panicked"));
            }
        });

        self.checkpoint("merge")?;

        let mut pairs = Vec::new();
        let mut considered = 0u64;
        for (buffer, count) in shard_outputs {
            pairs.extend(buffer);
            considered += count;
        }
        pairs.sort_by(global_ordering);
        Ok((pairs, considered))
    }

    fn build_suggestions(
        &self,
        cycle_id: &str,
        ranked: &[RankedPair],
        now: DateTime<Utc>,
    ) -> Vec<DbSuggestion> {
        let snapshot = self.config.snapshot_json();
        let expires_at = (now + Duration::days(self.config.expiry_days)).to_rfc3339();
        let suggested_at = now.to_rfc3339();

        ranked
            .iter()
            .map(|r| DbSuggestion {
                id: format!(
                    "sug-{cycle_id}-{}-{}",
                    r.pair.target_id, r.pair.candidate_id
                ),
                cycle_id: cycle_id.to_string(),
                target_profile_id: r.pair.target_id.clone(),
                candidate_profile_id: r.pair.candidate_id.clone(),
                score_ab: r.pair.score_ab,
                score_ba: r.pair.score_ba,
                harmonic_mean: r.pair.harmonic_mean,
                final_score: r.pair.final_score,
                scale_symmetry_score: r.pair.scale_symmetry,
                trust_level: r.pair.trust.as_str().to_string(),
                match_reason: r.pair.reason.clone(),
                rank_position: r.rank,
                rank_tier: r.tier.as_str().to_string(),
                status: "pending".to_string(),
                config_snapshot: snapshot.clone(),
                expires_at: expires_at.clone(),
                suggested_at: suggested_at.clone(),
            })
            .collect()
    }
}

/// Batch-resolve every oracle lookup one target's scoring will need:
/// needs×offers in both directions plus niche pairs.
fn prime_for_target(semantic: &SemanticIndex, target: &FeatureBundle, pool: &[FeatureBundle]) {
    let mut batch: Vec<(&str, &str)> = Vec::new();
    for candidate in pool {
        if candidate.profile_id == target.profile_id {
            continue;
        }
        for need in &target.needs {
            for offer in &candidate.offers {
                batch.push((need, offer));
            }
        }
        for need in &candidate.needs {
            for offer in &target.offers {
                batch.push((need, offer));
            }
        }
        if !target.niche.is_empty() && !candidate.niche.is_empty() {
            batch.push((&target.niche, &candidate.niche));
        }
    }
    semantic.prime(&batch);
}

/// Per-target truncation to the configured list length.
fn keep_top_k(pairs: Vec<PairScore>, top_k: usize) -> Vec<PairScore> {
    let mut groups: HashMap<String, Vec<PairScore>> = HashMap::new();
    for pair in pairs {
        groups.entry(pair.target_id.clone()).or_default().push(pair);
    }
    let mut targets: Vec<String> = groups.keys().cloned().collect();
    targets.sort();

    let mut kept = Vec::new();
    for target in targets {
        let mut group = groups.remove(&target).expect("group exists");
        group.sort_by(rank_ordering);
        group.truncate(top_k);
        kept.extend(group);
    }
    kept
}

/// Conditions that must never hold in emitted output: self-pairs,
/// out-of-bounds scores, cap breaches. Any hit aborts the cycle.
fn verify_invariants(outcome: &FairnessOutcome, cap: u32) -> Result<(), MatchError> {
    for ranked in &outcome.ranked {
        let pair = &ranked.pair;
        if pair.target_id == pair.candidate_id {
            return Err(MatchError::Invariant(format!(
                "self pair emitted for '{}'",
                pair.target_id
            )));
        }
        if !(0.0..=100.0).contains(&pair.harmonic_mean)
            || !(0.0..=100.0).contains(&pair.final_score)
        {
            return Err(MatchError::Invariant(format!(
                "score out of bounds for ({} -> {}): hm={} final={}",
                pair.target_id, pair.candidate_id, pair.harmonic_mean, pair.final_score
            )));
        }
    }
    fairness::verify_cap(outcome, cap)
}

fn count_orphans(table: &FeatureTable, ranked: &[RankedPair]) -> u32 {
    let with_matches: std::collections::HashSet<&str> = ranked
        .iter()
        .map(|r| r.pair.target_id.as_str())
        .collect();
    table
        .iter()
        .filter(|b| !with_matches.contains(b.profile_id.as_str()))
        .count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{DbIntake, DbProfile};
    use crate::semantic::testing::StubOracle;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap()
    }

    fn seed_member(
        db: &MatchDb,
        id: &str,
        niche: &str,
        offers: &[&str],
        needs: &[&str],
        preference: &str,
        reach: i64,
    ) {
        db.upsert_profile(&DbProfile {
            id: id.to_string(),
            name: format!("Member {id}"),
            niche: Some(niche.to_string()),
            list_size: Some(reach),
            social_reach: Some(0),
            last_active_at: Some(now().to_rfc3339()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            ..Default::default()
        })
        .unwrap();
        db.upsert_intake(&DbIntake {
            id: format!("intake-{id}-e1"),
            profile_id: id.to_string(),
            event_id: "e1".to_string(),
            verified_offers: offers.iter().map(|s| s.to_string()).collect(),
            verified_needs: needs.iter().map(|s| s.to_string()).collect(),
            match_preference: vec![preference.to_string()],
            confirmed_at: Some("2026-02-10T00:00:00Z".to_string()),
            created_at: "2026-02-10T00:00:00Z".to_string(),
            ..Default::default()
        })
        .unwrap();
    }

    fn seeded_pool() -> MatchDb {
        let db = MatchDb::open_in_memory().unwrap();
        seed_member(
            &db,
            "alice",
            "health & wellness",
            &["video editing services"],
            &["copywriting"],
            "peer_bundle",
            10_000,
        );
        seed_member(
            &db,
            "bob",
            "health & wellness",
            &["copywriting"],
            &["video editor"],
            "peer_bundle",
            9_000,
        );
        seed_member(
            &db,
            "carol",
            "digital marketing",
            &["paid ads management"],
            &["wellness content"],
            "referral_upstream",
            8_000,
        );
        db
    }

    fn pipeline() -> MatchPipeline {
        let oracle = StubOracle::new(&[
            ("video editor", "video editing services", 0.92),
            ("copywriting", "copywriting", 1.0),
            ("wellness content", "video editing services", 0.70),
            ("health & wellness", "digital marketing", 0.55),
        ]);
        MatchPipeline::new(CycleConfig::default()).with_oracle(Arc::new(oracle))
    }

    #[test]
    fn full_cycle_persists_ranked_suggestions() {
        let db = seeded_pool();
        let report = pipeline().run_cycle(&db, "2026-02", now()).unwrap();

        assert_eq!(report.profiles_scored, 3);
        assert!(report.pairs_emitted > 0);
        assert_eq!(report.data_errors, 0);

        let for_alice = db.get_suggestions_for_target("alice").unwrap();
        assert!(!for_alice.is_empty());
        assert_eq!(for_alice[0].rank_position, 1);
        assert_eq!(for_alice[0].rank_tier, "gold");
        assert_eq!(for_alice[0].candidate_profile_id, "bob");
        assert!(for_alice[0].match_reason.contains("✅ Verified intent"));
        assert!(for_alice[0].config_snapshot.contains("popularityCap"));
        assert_eq!(for_alice[0].expires_at, "2026-02-24T12:00:00+00:00");
    }

    #[test]
    fn no_self_matches_and_scores_in_bounds() {
        let db = seeded_pool();
        pipeline().run_cycle(&db, "2026-02", now()).unwrap();

        for target in ["alice", "bob", "carol"] {
            for suggestion in db.get_suggestions_for_target(target).unwrap() {
                assert_ne!(
                    suggestion.target_profile_id,
                    suggestion.candidate_profile_id
                );
                assert!((0.0..=100.0).contains(&suggestion.harmonic_mean));
                assert!((0.0..=100.0).contains(&suggestion.final_score));
                assert!(
                    suggestion.harmonic_mean
                        <= 2.0 * suggestion.score_ab.min(suggestion.score_ba) + 1e-9
                );
            }
        }
    }

    #[test]
    fn identical_inputs_produce_identical_output() {
        let db1 = seeded_pool();
        let db2 = seeded_pool();
        pipeline().run_cycle(&db1, "2026-02", now()).unwrap();
        pipeline().run_cycle(&db2, "2026-02", now()).unwrap();

        let rows1 = db1.get_suggestions_for_cycle("2026-02").unwrap();
        let rows2 = db2.get_suggestions_for_cycle("2026-02").unwrap();
        assert_eq!(
            serde_json::to_string(&rows1).unwrap(),
            serde_json::to_string(&rows2).unwrap()
        );
    }

    #[test]
    fn rerun_refreshes_instead_of_duplicating() {
        let db = seeded_pool();
        let p = pipeline();
        p.run_cycle(&db, "2026-02", now()).unwrap();
        let first = db.get_suggestions_for_cycle("2026-02").unwrap();
        p.run_cycle(&db, "2026-02", now()).unwrap();
        let second = db.get_suggestions_for_cycle("2026-02").unwrap();
        assert_eq!(first.len(), second.len());
    }

    #[test]
    fn min_score_floor_drops_weak_pairs() {
        let db = seeded_pool();
        let mut config = CycleConfig::default();
        config.min_score = 99.0;
        let p = MatchPipeline::new(config);
        let report = p.run_cycle(&db, "2026-02", now()).unwrap();
        assert_eq!(report.pairs_emitted, 0);
        assert_eq!(report.orphans, 3);
    }

    #[test]
    fn dismissed_candidates_are_not_rescored() {
        let db = seeded_pool();
        let p = pipeline();
        p.run_cycle(&db, "2026-02", now()).unwrap();
        db.update_suggestion_status("alice", "bob", crate::types::MatchStatus::Dismissed)
            .unwrap();

        p.run_cycle(&db, "2026-02", now()).unwrap();
        let for_alice = db.get_suggestions_for_target("alice").unwrap();
        let bob_row = for_alice
            .iter()
            .find(|s| s.candidate_profile_id == "bob")
            .unwrap();
        // The dismissed row survives untouched; no fresh pending row.
        assert_eq!(bob_row.status, "dismissed");
        assert_eq!(
            for_alice
                .iter()
                .filter(|s| s.candidate_profile_id == "bob")
                .count(),
            1
        );
    }

    #[test]
    fn anti_persona_blocks_both_directions_end_to_end() {
        let db = seeded_pool();
        // Bob opts out of competitors; Alice shares his niche.
        db.upsert_intake(&DbIntake {
            id: "intake-bob-e1".to_string(),
            profile_id: "bob".to_string(),
            event_id: "e1".to_string(),
            verified_offers: vec!["copywriting".to_string()],
            verified_needs: vec!["video editor".to_string()],
            match_preference: vec!["peer_bundle".to_string()],
            anti_personas: vec!["no_competitors".to_string()],
            confirmed_at: Some("2026-02-11T00:00:00Z".to_string()),
            created_at: "2026-02-11T00:00:00Z".to_string(),
            ..Default::default()
        })
        .unwrap();

        pipeline().run_cycle(&db, "2026-02", now()).unwrap();

        let alice_rows = db.get_suggestions_for_target("alice").unwrap();
        assert!(alice_rows.iter().all(|s| s.candidate_profile_id != "bob"));
        let bob_rows = db.get_suggestions_for_target("bob").unwrap();
        assert!(bob_rows.iter().all(|s| s.candidate_profile_id != "alice"));
    }

    #[test]
    fn popularity_cap_applies_across_targets() {
        let db = MatchDb::open_in_memory().unwrap();
        // One star everyone needs, plus a fallback candidate, plus eight
        // targets wanting the star.
        seed_member(
            &db,
            "star",
            "health & wellness",
            &["list promotion"],
            &["nothing specific"],
            "peer_bundle",
            50_000,
        );
        seed_member(
            &db,
            "backup",
            "health & wellness",
            &["list promotion"],
            &["nothing specific"],
            "peer_bundle",
            40_000,
        );
        for i in 0..8 {
            seed_member(
                &db,
                &format!("seeker{i}"),
                "health & wellness",
                &["nothing specific"],
                &["list promotion"],
                "peer_bundle",
                45_000,
            );
        }

        let mut config = CycleConfig::default();
        config.popularity_cap = 3;
        let report = MatchPipeline::new(config)
            .run_cycle(&db, "2026-02", now())
            .unwrap();

        let rows = db.get_suggestions_for_cycle("2026-02").unwrap();
        let star_top3 = rows
            .iter()
            .filter(|s| s.candidate_profile_id == "star" && s.rank_position <= 3)
            .count();
        assert_eq!(star_top3, 3);
        assert!(report.pairs_dropped_by_fairness > 0);

        let popularity = db.load_popularity("2026-02").unwrap();
        assert_eq!(popularity["star"], 3);
    }

    #[test]
    fn run_for_profile_refreshes_one_target() {
        let db = seeded_pool();
        let p = pipeline();
        p.run_cycle(&db, "2026-02", now()).unwrap();

        let refreshed = p
            .run_for_profile(&db, "2026-02", "alice", now())
            .unwrap();
        assert!(!refreshed.is_empty());
        assert_eq!(refreshed[0].target_profile_id, "alice");
        assert_eq!(refreshed[0].rank_position, 1);

        // Counters stay consistent: no candidate exceeds the cap.
        let popularity = db.load_popularity("2026-02").unwrap();
        for (_, count) in popularity {
            assert!(count <= CycleConfig::default().popularity_cap);
        }
    }

    #[test]
    fn run_for_profile_unknown_id_is_a_data_error() {
        let db = seeded_pool();
        let err = pipeline()
            .run_for_profile(&db, "2026-02", "nobody", now())
            .unwrap_err();
        assert_eq!(err.kind(), "data_error");
    }

    #[test]
    fn cancelled_cycle_persists_nothing() {
        let db = seeded_pool();
        let p = pipeline();
        p.cancel_handle().cancel();

        let err = p.run_cycle(&db, "2026-02", now()).unwrap_err();
        assert_eq!(err.kind(), "cancelled");
        assert!(db.get_suggestions_for_cycle("2026-02").unwrap().is_empty());
    }

    #[test]
    fn oracle_failure_falls_back_and_reports() {
        let db = seeded_pool();
        let p = MatchPipeline::new(CycleConfig::default())
            .with_oracle(Arc::new(StubOracle::failing()));
        let report = p.run_cycle(&db, "2026-02", now()).unwrap();
        assert!(report.oracle_fallbacks > 0);
        // Lexical fallback still finds the reciprocal copy/video pair.
        assert!(report.pairs_emitted > 0);
    }

    #[test]
    fn orphans_are_counted() {
        let db = seeded_pool();
        // A profile with nothing to offer or need, in an unrelated niche,
        // inactive: scores below the floor against everyone.
        db.upsert_profile(&DbProfile {
            id: "zz-loner".to_string(),
            name: "Loner".to_string(),
            niche: Some("industrial welding".to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            ..Default::default()
        })
        .unwrap();

        let report = pipeline().run_cycle(&db, "2026-02", now()).unwrap();
        assert!(report.orphans >= 1);
    }
}
