//! Fairness filter: cap Top-3 over-representation of popular profiles.
//!
//! Pairs are processed in globally decreasing final-score order, but each
//! target's own list is consumed in rank order. A candidate already
//! holding `cap` Top-3 slots elsewhere is demoted out of this target's
//! Top-3 (it may still appear at rank 4+); the next candidate is promoted
//! through the same gate, so final ranks always respect the cap.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};

use crate::error::MatchError;
use crate::scorer::{global_ordering, rank_ordering, PairScore};
use crate::types::RankTier;

/// A pair with its final per-target rank and display tier.
#[derive(Debug, Clone)]
pub struct RankedPair {
    pub pair: PairScore,
    pub rank: u32,
    pub tier: RankTier,
}

/// Result of one fairness pass.
#[derive(Debug)]
pub struct FairnessOutcome {
    /// All retained pairs, grouped per target in final rank order, targets
    /// sorted by id.
    pub ranked: Vec<RankedPair>,
    /// Pairs demoted out of a Top-3 slot by the cap.
    pub dropped_from_top3: u32,
    /// Updated Top-3 appearance counters.
    pub counters: HashMap<String, u32>,
}

/// Max-heap entry: best global score pops first.
struct Frontier(PairScore);

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        global_ordering(&self.0, &other.0) == Ordering::Equal
    }
}
impl Eq for Frontier {}
impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Frontier {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed: global_ordering sorts best-first, BinaryHeap pops max.
        global_ordering(&other.0, &self.0)
    }
}

#[derive(Default)]
struct TargetState {
    top3: Vec<PairScore>,
    rest: Vec<PairScore>,
}

/// Apply the popularity cap.
///
/// `counters` carries pre-existing Top-3 counts for the cycle (empty for a
/// fresh full-cycle run; current counts for a single-profile refresh).
pub fn apply(pairs: Vec<PairScore>, cap: u32, counters: HashMap<String, u32>) -> FairnessOutcome {
    let mut queues: HashMap<String, VecDeque<PairScore>> = HashMap::new();
    {
        let mut groups: HashMap<String, Vec<PairScore>> = HashMap::new();
        for pair in pairs {
            groups.entry(pair.target_id.clone()).or_default().push(pair);
        }
        for (target, mut group) in groups {
            group.sort_by(rank_ordering);
            queues.insert(target, group.into());
        }
    }

    let mut counters = counters;
    let mut states: HashMap<String, TargetState> = HashMap::new();
    let mut dropped = 0u32;

    // Seed the frontier with each target's best pair; refill as we go so
    // every target is consumed in its own rank order while cap slots are
    // contended in global score order.
    let mut frontier = BinaryHeap::new();
    for queue in queues.values_mut() {
        if let Some(pair) = queue.pop_front() {
            frontier.push(Frontier(pair));
        }
    }

    while let Some(Frontier(pair)) = frontier.pop() {
        let target_id = pair.target_id.clone();
        let state = states.entry(target_id.clone()).or_default();

        if state.top3.len() < 3 {
            let count = counters.get(&pair.candidate_id).copied().unwrap_or(0);
            if count >= cap {
                log::debug!(
                    "Popularity cap: demoting {} from {}'s Top-3",
                    pair.candidate_id,
                    target_id
                );
                dropped += 1;
                state.rest.push(pair);
            } else {
                counters.insert(pair.candidate_id.clone(), count + 1);
                state.top3.push(pair);
            }
        } else {
            state.rest.push(pair);
        }

        if let Some(next) = queues.get_mut(&target_id).and_then(VecDeque::pop_front) {
            frontier.push(Frontier(next));
        }
    }

    let mut targets: Vec<String> = states.keys().cloned().collect();
    targets.sort();

    let mut ranked = Vec::new();
    for target in targets {
        let state = states.remove(&target).expect("state exists");
        let mut rank = 0u32;
        for pair in state.top3.into_iter().chain(state.rest) {
            rank += 1;
            ranked.push(RankedPair {
                pair,
                rank,
                tier: RankTier::for_rank(rank),
            });
        }
    }

    FairnessOutcome {
        ranked,
        dropped_from_top3: dropped,
        counters,
    }
}

/// Re-count Top-3 appearances from final ranks; any breach aborts the
/// cycle. Must never fire in a correct run.
pub fn verify_cap(outcome: &FairnessOutcome, cap: u32) -> Result<(), MatchError> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for ranked in &outcome.ranked {
        if ranked.rank <= 3 {
            let count = counts.entry(ranked.pair.candidate_id.as_str()).or_insert(0);
            *count += 1;
            if *count > cap {
                return Err(MatchError::Invariant(format!(
                    "popularity cap breached for candidate '{}'",
                    ranked.pair.candidate_id
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TrustLevel;

    fn pair(target: &str, candidate: &str, score: f64) -> PairScore {
        PairScore {
            target_id: target.to_string(),
            candidate_id: candidate.to_string(),
            score_ab: score,
            score_ba: score,
            harmonic_mean: score,
            final_score: score,
            trust: TrustLevel::Gold,
            scale_symmetry: 1.0,
            reason: String::new(),
            candidate_last_active: None,
        }
    }

    #[test]
    fn ranks_and_tiers_without_contention() {
        let pairs = vec![
            pair("t1", "c1", 90.0),
            pair("t1", "c2", 80.0),
            pair("t1", "c3", 70.0),
            pair("t1", "c4", 60.0),
            pair("t1", "c5", 50.0),
            pair("t1", "c6", 40.0),
            pair("t1", "c7", 30.0),
            pair("t1", "c8", 20.0),
            pair("t1", "c9", 15.0),
        ];
        let outcome = apply(pairs, 5, HashMap::new());
        assert_eq!(outcome.dropped_from_top3, 0);

        let tiers: Vec<RankTier> = outcome.ranked.iter().map(|r| r.tier).collect();
        assert_eq!(&tiers[0..3], &[RankTier::Gold; 3]);
        assert_eq!(&tiers[3..8], &[RankTier::Silver; 5]);
        assert_eq!(tiers[8], RankTier::Bronze);
    }

    #[test]
    fn popular_candidate_capped_at_five_top3_slots() {
        // Profile X would rank in the Top-3 of 10 targets; CAP=5 keeps
        // exactly 5 and demotes the rest to rank 4+.
        let mut pairs = Vec::new();
        for i in 0..10 {
            let target = format!("t{i:02}");
            // X is everyone's best candidate; targets t00..t04 score X
            // highest globally.
            pairs.push(pair(&target, "x", 90.0 - i as f64));
            pairs.push(pair(&target, "alt1", 50.0));
            pairs.push(pair(&target, "alt2", 45.0));
            pairs.push(pair(&target, "alt3", 40.0));
        }

        let outcome = apply(pairs, 5, HashMap::new());
        assert_eq!(outcome.dropped_from_top3, 5);
        assert_eq!(outcome.counters["x"], 5);

        let x_top3: Vec<&RankedPair> = outcome
            .ranked
            .iter()
            .filter(|r| r.pair.candidate_id == "x" && r.rank <= 3)
            .collect();
        assert_eq!(x_top3.len(), 5);
        // The highest-scoring targets won the contention.
        for kept in &x_top3 {
            assert!(kept.pair.target_id.as_str() < "t05");
        }

        // Displaced pairs remain in their lists at rank 4+.
        let x_rest: Vec<&RankedPair> = outcome
            .ranked
            .iter()
            .filter(|r| r.pair.candidate_id == "x" && r.rank > 3)
            .collect();
        assert_eq!(x_rest.len(), 5);

        verify_cap(&outcome, 5).unwrap();
    }

    #[test]
    fn demotion_promotes_the_next_candidate_through_the_gate() {
        // One target; the hot candidate is already at cap from elsewhere.
        let mut counters = HashMap::new();
        counters.insert("hot".to_string(), 5_u32);

        let pairs = vec![
            pair("t1", "hot", 90.0),
            pair("t1", "b", 80.0),
            pair("t1", "c", 70.0),
            pair("t1", "d", 60.0),
        ];
        let outcome = apply(pairs, 5, counters);
        assert_eq!(outcome.dropped_from_top3, 1);

        let top3: Vec<&str> = outcome
            .ranked
            .iter()
            .filter(|r| r.rank <= 3)
            .map(|r| r.pair.candidate_id.as_str())
            .collect();
        assert_eq!(top3, vec!["b", "c", "d"]);

        // The demoted pair lands at rank 4.
        let hot = outcome
            .ranked
            .iter()
            .find(|r| r.pair.candidate_id == "hot")
            .unwrap();
        assert_eq!(hot.rank, 4);
        verify_cap(&outcome, 5).unwrap();
    }

    #[test]
    fn counters_carry_across_calls() {
        let pairs = vec![pair("t1", "x", 90.0)];
        let outcome = apply(pairs, 5, HashMap::new());
        assert_eq!(outcome.counters["x"], 1);

        let pairs = vec![pair("t2", "x", 85.0)];
        let outcome = apply(pairs, 5, outcome.counters);
        assert_eq!(outcome.counters["x"], 2);
    }

    #[test]
    fn verify_cap_catches_breaches() {
        let outcome = FairnessOutcome {
            ranked: (0..6)
                .map(|i| RankedPair {
                    pair: pair(&format!("t{i}"), "x", 90.0),
                    rank: 1,
                    tier: RankTier::Gold,
                })
                .collect(),
            dropped_from_top3: 0,
            counters: HashMap::new(),
        };
        let err = verify_cap(&outcome, 5).unwrap_err();
        assert_eq!(err.kind(), "invariant_violation");
    }

    #[test]
    fn empty_input_is_fine() {
        let outcome = apply(Vec::new(), 5, HashMap::new());
        assert!(outcome.ranked.is_empty());
        assert_eq!(outcome.dropped_from_top3, 0);
    }
}
