//! Reciprocal pair scoring.
//!
//! Each ordered pair (A, B) gets a directional score in [0, 1] from four
//! weighted components — Intent (does A need what B offers), Synergy
//! (niche fit modulated by preference and audience scale), Momentum (B's
//! activity decay), Context (shared events) — then the two directions are
//! combined with a harmonic mean so one-sided pairs sink, and the result
//! is damped by the weaker side's data provenance.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use crate::assembler::FeatureBundle;
use crate::config::CycleConfig;
use crate::semantic::{SemanticIndex, SimilaritySource};
use crate::types::{AntiPersona, MatchPreference, TrustLevel};

/// Candidates below this reach count as beginners for the
/// `no_beginners` anti-persona. Unknown reach counts as beginner.
pub const BEGINNER_REACH_FLOOR: i64 = 500;

/// Niche relationship tier backing a synergy score; drives the reason
/// clause wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NicheTier {
    PeerIdentical,
    PeerDifferent,
    Competitor,
    ReferralAdjacent,
    ReferralUnrelated,
    ServiceProvider,
}

/// One direction of a scored pair, with component breakdown.
#[derive(Debug, Clone)]
pub struct DirectionalScore {
    /// Weighted sum in [0, 1].
    pub total: f64,
    pub intent: f64,
    pub synergy: f64,
    pub momentum: f64,
    pub context: f64,
    pub niche_tier: NicheTier,
    /// Strongest (need, offer) pair when intent fired.
    pub intent_pair: Option<(String, String)>,
}

/// Both directions combined: what the fairness filter and the store see.
#[derive(Debug, Clone)]
pub struct PairScore {
    pub target_id: String,
    pub candidate_id: String,
    /// Directional scores on the 0–100 scale.
    pub score_ab: f64,
    pub score_ba: f64,
    pub harmonic_mean: f64,
    /// Harmonic mean after the trust modifier. Ranking sorts on this.
    pub final_score: f64,
    pub trust: TrustLevel,
    /// Reach-ratio diagnostic in [0, 1]; 0 when either reach is unknown.
    pub scale_symmetry: f64,
    pub reason: String,
    /// Candidate recency, kept for tie-breaking.
    pub candidate_last_active: Option<DateTime<Utc>>,
}

/// Scoring strategy seam: the rule-based policy today, a learned ranker
/// later, without touching the fairness filter or the data model.
pub trait ScoringPolicy: Sync {
    /// Score an ordered (target, candidate) pair. `None` means the pair is
    /// excluded outright (anti-persona on either side).
    fn score_pair(&self, target: &FeatureBundle, candidate: &FeatureBundle) -> Option<PairScore>;
}

/// The rule-based scorer.
pub struct RuleBasedPolicy<'a> {
    config: &'a CycleConfig,
    semantic: &'a SemanticIndex,
    now: DateTime<Utc>,
}

impl<'a> RuleBasedPolicy<'a> {
    pub fn new(config: &'a CycleConfig, semantic: &'a SemanticIndex, now: DateTime<Utc>) -> Self {
        Self {
            config,
            semantic,
            now,
        }
    }

    /// Intent(A,B): does A need what B offers? Binary, with the strongest
    /// matching pair kept for the reason string.
    fn intent(&self, a: &FeatureBundle, b: &FeatureBundle) -> (f64, Option<(String, String)>) {
        let mut best: Option<(f64, &str, &str)> = None;
        for need in &a.needs {
            for offer in &b.offers {
                let sim = self.semantic.similarity(need, offer);
                let threshold = match sim.source {
                    SimilaritySource::Oracle => self.config.semantic_match_threshold,
                    SimilaritySource::Lexical => self.config.intent_fallback_threshold,
                };
                if sim.value >= threshold && best.map_or(true, |(v, _, _)| sim.value > v) {
                    best = Some((sim.value, need, offer));
                }
            }
        }
        match best {
            Some((_, need, offer)) => (1.0, Some((need.to_string(), offer.to_string()))),
            None => (0.0, None),
        }
    }

    /// Niche relationship between two profiles, from A's point of view.
    fn niche_similarity(&self, a: &FeatureBundle, b: &FeatureBundle) -> f64 {
        if a.niche.is_empty() || b.niche.is_empty() {
            return 0.0;
        }
        if a.niche == b.niche {
            return 1.0;
        }
        self.semantic.similarity(&a.niche, &b.niche).value
    }

    /// niche_score for one of A's preferences.
    fn niche_score_for(&self, pref: MatchPreference, similarity: f64) -> (f64, NicheTier) {
        let identical = similarity >= self.config.niche_identical_threshold;
        let adjacent = similarity >= self.config.niche_adjacent_threshold;
        match pref {
            MatchPreference::PeerBundle => {
                if identical {
                    (1.0, NicheTier::PeerIdentical)
                } else {
                    (0.2, NicheTier::PeerDifferent)
                }
            }
            MatchPreference::ReferralUpstream | MatchPreference::ReferralDownstream => {
                if identical {
                    // Same niche on a referral ask is a competitor.
                    (0.1, NicheTier::Competitor)
                } else if adjacent {
                    (0.9, NicheTier::ReferralAdjacent)
                } else {
                    (0.3, NicheTier::ReferralUnrelated)
                }
            }
            MatchPreference::ServiceProvider => (0.7, NicheTier::ServiceProvider),
        }
    }

    /// Best niche_score across A's selected preferences.
    fn niche_score(&self, a: &FeatureBundle, b: &FeatureBundle) -> (f64, NicheTier) {
        let similarity = self.niche_similarity(a, b);
        let mut best = (f64::MIN, NicheTier::PeerDifferent);
        for pref in &a.preferences {
            let scored = self.niche_score_for(*pref, similarity);
            if scored.0 > best.0 {
                best = scored;
            }
        }
        best
    }

    /// Scale modifier on the two reaches, from A's point of view.
    fn scale_modifier(&self, a: &FeatureBundle, b: &FeatureBundle) -> f64 {
        let only_service_provider = a.preferences.len() == 1
            && a.preferences.contains(&MatchPreference::ServiceProvider);
        if only_service_provider {
            return 1.0;
        }
        if a.reach <= 0 || b.reach <= 0 {
            return 0.8;
        }
        let r = reach_ratio(a.reach, b.reach);
        if r > 0.5 {
            1.0
        } else if r < 0.1 {
            0.5
        } else {
            0.5 + (r - 0.1) * (0.5 / 0.4)
        }
    }

    /// Momentum(B): exponential decay on days since the candidate was last
    /// active; 0.5 when unknown.
    fn momentum(&self, b: &FeatureBundle) -> f64 {
        match b.last_active_at {
            Some(active) => {
                let days = (self.now - active).num_days().max(0) as f64;
                (-0.02 * days).exp()
            }
            None => 0.5,
        }
    }

    /// Context: shared-event bonus, 0.25 per event, capped at 1.
    fn context(&self, a: &FeatureBundle, b: &FeatureBundle) -> f64 {
        let shared = a.events.intersection(&b.events).count();
        (0.25 * shared as f64).min(1.0)
    }

    /// One direction of the score.
    pub fn directional(&self, a: &FeatureBundle, b: &FeatureBundle) -> DirectionalScore {
        let (intent, intent_pair) = self.intent(a, b);
        let (niche_score, niche_tier) = self.niche_score(a, b);
        let synergy = (niche_score * self.scale_modifier(a, b)).clamp(0.0, 1.0);
        let momentum = self.momentum(b).clamp(0.0, 1.0);
        let context = self.context(a, b).clamp(0.0, 1.0);

        let w = &self.config.weights;
        let total = w.intent * intent + w.synergy * synergy + w.momentum * momentum
            + w.context * context;

        DirectionalScore {
            total: total.clamp(0.0, 1.0),
            intent,
            synergy,
            momentum,
            context,
            niche_tier,
            intent_pair,
        }
    }

    fn reason(&self, a: &FeatureBundle, b: &FeatureBundle, dir: &DirectionalScore) -> String {
        let mut clauses: Vec<String> = Vec::new();

        if let Some((need, offer)) = &dir.intent_pair {
            clauses.push(format!("You need {need} and they offer {offer}"));
        }
        match dir.niche_tier {
            NicheTier::PeerIdentical => clauses.push("Strong business alignment".to_string()),
            NicheTier::ReferralAdjacent => {
                clauses.push("Complementary referral fit".to_string())
            }
            NicheTier::Competitor => {
                clauses.push("Competitor — low recommendation".to_string())
            }
            _ => {}
        }
        if dir.momentum > 0.8 {
            clauses.push("Very active recently".to_string());
        } else if dir.momentum < 0.3 {
            clauses.push("Less active".to_string());
        }
        let shared = a.events.intersection(&b.events).count();
        if shared > 0 {
            clauses.push(format!("Attended {shared} shared event(s)"));
        }
        if a.verified_intent {
            clauses.push("✅ Verified intent".to_string());
        }

        clauses.join(". ")
    }
}

impl ScoringPolicy for RuleBasedPolicy<'_> {
    fn score_pair(&self, target: &FeatureBundle, candidate: &FeatureBundle) -> Option<PairScore> {
        if target.profile_id == candidate.profile_id {
            return None;
        }
        if pair_excluded(target, candidate) {
            return None;
        }

        let ab = self.directional(target, candidate);
        let ba = self.directional(candidate, target);

        let hm = harmonic_mean(ab.total, ba.total);
        let trust = target.trust.min(candidate.trust);
        let final_score = 100.0 * hm * trust.weight();
        let reason = self.reason(target, candidate, &ab);

        Some(PairScore {
            target_id: target.profile_id.clone(),
            candidate_id: candidate.profile_id.clone(),
            score_ab: ab.total * 100.0,
            score_ba: ba.total * 100.0,
            harmonic_mean: hm * 100.0,
            final_score,
            trust,
            scale_symmetry: if target.reach > 0 && candidate.reach > 0 {
                reach_ratio(target.reach, candidate.reach)
            } else {
                0.0
            },
            reason,
            candidate_last_active: candidate.last_active_at,
        })
    }
}

/// min/max reach ratio in (0, 1].
fn reach_ratio(a: i64, b: i64) -> f64 {
    let (small, large) = if a <= b { (a, b) } else { (b, a) };
    small as f64 / large as f64
}

/// Harmonic mean of two scores in [0, 1]. Zero if either side is zero, so
/// one-sided pairs never survive.
pub fn harmonic_mean(x: f64, y: f64) -> f64 {
    if x + y <= 0.0 {
        return 0.0;
    }
    2.0 * x * y / (x + y)
}

/// True when either party is in the other's anti-persona exclusion set.
pub fn pair_excluded(a: &FeatureBundle, b: &FeatureBundle) -> bool {
    hits_anti_persona(a, b) || hits_anti_persona(b, a)
}

/// Does `other` fall into one of `owner`'s excluded classes?
fn hits_anti_persona(owner: &FeatureBundle, other: &FeatureBundle) -> bool {
    owner.anti_personas.iter().any(|persona| match persona {
        AntiPersona::NoBeginners => other.reach < BEGINNER_REACH_FLOOR,
        AntiPersona::NoServiceProviders => other
            .preferences
            .contains(&MatchPreference::ServiceProvider),
        AntiPersona::NoCompetitors => !owner.niche.is_empty() && owner.niche == other.niche,
    })
}

/// Ordering of candidates within one target's list: final score, then
/// trust, reciprocal symmetry, candidate recency, candidate id.
pub fn rank_ordering(a: &PairScore, b: &PairScore) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| b.trust.cmp(&a.trust))
        .then_with(|| {
            let gap_a = (a.score_ab - a.score_ba).abs();
            let gap_b = (b.score_ab - b.score_ba).abs();
            gap_a.partial_cmp(&gap_b).unwrap_or(Ordering::Equal)
        })
        .then_with(|| b.candidate_last_active.cmp(&a.candidate_last_active))
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
}

/// Global deterministic ordering for the fairness pass and persistence:
/// highest final score first, ties broken on ids.
pub fn global_ordering(a: &PairScore, b: &PairScore) -> Ordering {
    b.final_score
        .partial_cmp(&a.final_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.candidate_id.cmp(&b.candidate_id))
        .then_with(|| a.target_id.cmp(&b.target_id))
}
