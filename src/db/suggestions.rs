//! Suggestion persistence, status lifecycle, and fairness accounting.

use std::collections::{HashMap, HashSet};

use rusqlite::{params, OptionalExtension, Row};

use crate::types::MatchStatus;

use super::{DbError, DbPopularity, DbSuggestion, MatchDb};

impl MatchDb {
    /// Insert or refresh a suggestion row.
    ///
    /// Upserts on (target, candidate) so re-running a cycle updates scores
    /// in place. A row the member already progressed past `pending` keeps
    /// its status; only the scoring fields refresh.
    pub fn upsert_suggestion(&self, suggestion: &DbSuggestion) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO match_suggestions (
                id, cycle_id, target_profile_id, candidate_profile_id,
                score_ab, score_ba, harmonic_mean, final_score,
                scale_symmetry_score, trust_level, match_reason,
                rank_position, rank_tier, status, config_snapshot,
                expires_at, suggested_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
             ON CONFLICT(target_profile_id, candidate_profile_id) DO UPDATE SET
                id = excluded.id,
                cycle_id = excluded.cycle_id,
                score_ab = excluded.score_ab,
                score_ba = excluded.score_ba,
                harmonic_mean = excluded.harmonic_mean,
                final_score = excluded.final_score,
                scale_symmetry_score = excluded.scale_symmetry_score,
                trust_level = excluded.trust_level,
                match_reason = excluded.match_reason,
                rank_position = excluded.rank_position,
                rank_tier = excluded.rank_tier,
                status = CASE
                    WHEN match_suggestions.status = 'pending' THEN excluded.status
                    ELSE match_suggestions.status
                END,
                config_snapshot = excluded.config_snapshot,
                expires_at = excluded.expires_at,
                suggested_at = excluded.suggested_at",
            params![
                suggestion.id,
                suggestion.cycle_id,
                suggestion.target_profile_id,
                suggestion.candidate_profile_id,
                suggestion.score_ab,
                suggestion.score_ba,
                suggestion.harmonic_mean,
                suggestion.final_score,
                suggestion.scale_symmetry_score,
                suggestion.trust_level,
                suggestion.match_reason,
                suggestion.rank_position,
                suggestion.rank_tier,
                suggestion.status,
                suggestion.config_snapshot,
                suggestion.expires_at,
                suggestion.suggested_at,
            ],
        )?;
        Ok(())
    }

    /// Remove a target's suggestions for a cycle ahead of a refresh.
    /// Dismissed rows are kept so the exclusion list survives re-runs.
    pub fn clear_target_suggestions(&self, cycle_id: &str, target_id: &str) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM match_suggestions
             WHERE cycle_id = ?1 AND target_profile_id = ?2 AND status != 'dismissed'",
            params![cycle_id, target_id],
        )?;
        Ok(())
    }

    /// Ranked suggestions for a target, best first.
    pub fn get_suggestions_for_target(&self, target_id: &str) -> Result<Vec<DbSuggestion>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM match_suggestions
             WHERE target_profile_id = ?1
             ORDER BY rank_position, candidate_profile_id"
        ))?;
        let rows = stmt.query_map(params![target_id], map_suggestion_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every suggestion in a cycle, in deterministic order.
    pub fn get_suggestions_for_cycle(&self, cycle_id: &str) -> Result<Vec<DbSuggestion>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SUGGESTION_COLUMNS} FROM match_suggestions
             WHERE cycle_id = ?1
             ORDER BY target_profile_id, rank_position, candidate_profile_id"
        ))?;
        let rows = stmt.query_map(params![cycle_id], map_suggestion_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Advance a suggestion's status along the monotone lifecycle.
    pub fn update_suggestion_status(
        &self,
        target_id: &str,
        candidate_id: &str,
        next: MatchStatus,
    ) -> Result<(), DbError> {
        let current: Option<String> = self
            .conn
            .query_row(
                "SELECT status FROM match_suggestions
                 WHERE target_profile_id = ?1 AND candidate_profile_id = ?2",
                params![target_id, candidate_id],
                |row| row.get(0),
            )
            .optional()?;

        let current = current.ok_or_else(|| {
            DbError::InvalidValue(format!(
                "no suggestion ({target_id} -> {candidate_id}) to update"
            ))
        })?;
        let parsed = MatchStatus::parse(&current)
            .ok_or_else(|| DbError::InvalidValue(format!("unknown stored status '{current}'")))?;

        if !parsed.can_transition_to(next) {
            return Err(DbError::InvalidTransition {
                from: current,
                to: next.as_str().to_string(),
            });
        }

        self.conn.execute(
            "UPDATE match_suggestions SET status = ?3
             WHERE target_profile_id = ?1 AND candidate_profile_id = ?2",
            params![target_id, candidate_id, next.as_str()],
        )?;
        Ok(())
    }

    /// Candidates this target has dismissed, across all cycles. Dismissed
    /// profiles are never re-suggested.
    pub fn dismissed_candidate_ids(&self, target_id: &str) -> Result<HashSet<String>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT candidate_profile_id FROM match_suggestions
             WHERE target_profile_id = ?1 AND status = 'dismissed'",
        )?;
        let rows = stmt.query_map(params![target_id], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<Result<HashSet<_>, _>>()?)
    }

    /// Dismissals for the whole pool in one query: target → dismissed set.
    pub fn load_all_dismissals(&self) -> Result<HashMap<String, HashSet<String>>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT target_profile_id, candidate_profile_id FROM match_suggestions
             WHERE status = 'dismissed'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut dismissals: HashMap<String, HashSet<String>> = HashMap::new();
        for row in rows {
            let (target, candidate) = row?;
            dismissals.entry(target).or_default().insert(candidate);
        }
        Ok(dismissals)
    }

    // =========================================================================
    // Popularity accounting
    // =========================================================================

    /// Top-3 appearance counters for one cycle.
    pub fn load_popularity(&self, cycle_id: &str) -> Result<HashMap<String, u32>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT profile_id, top_3_appearances FROM match_popularity
             WHERE match_cycle_id = ?1",
        )?;
        let rows = stmt.query_map(params![cycle_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u32>(1)?))
        })?;
        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    /// Write one cycle's counters. Never touches other cycles' rows.
    pub fn save_popularity(
        &self,
        cycle_id: &str,
        counters: &HashMap<String, u32>,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "DELETE FROM match_popularity WHERE match_cycle_id = ?1",
            params![cycle_id],
        )?;
        let mut stmt = self.conn.prepare(
            "INSERT INTO match_popularity (profile_id, match_cycle_id, top_3_appearances)
             VALUES (?1, ?2, ?3)",
        )?;
        let mut ids: Vec<&String> = counters.keys().collect();
        ids.sort();
        for id in ids {
            stmt.execute(params![id, cycle_id, counters[id]])?;
        }
        Ok(())
    }

    /// Popularity rows for a cycle, for reporting.
    pub fn list_popularity(&self, cycle_id: &str) -> Result<Vec<DbPopularity>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT profile_id, match_cycle_id, top_3_appearances
             FROM match_popularity WHERE match_cycle_id = ?1 ORDER BY profile_id",
        )?;
        let rows = stmt.query_map(params![cycle_id], |row| {
            Ok(DbPopularity {
                profile_id: row.get(0)?,
                match_cycle_id: row.get(1)?,
                top_3_appearances: row.get(2)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

const SUGGESTION_COLUMNS: &str = "id, cycle_id, target_profile_id, candidate_profile_id, score_ab, \
     score_ba, harmonic_mean, final_score, scale_symmetry_score, trust_level, match_reason, \
     rank_position, rank_tier, status, config_snapshot, expires_at, suggested_at";

fn map_suggestion_row(row: &Row<'_>) -> rusqlite::Result<DbSuggestion> {
    Ok(DbSuggestion {
        id: row.get(0)?,
        cycle_id: row.get(1)?,
        target_profile_id: row.get(2)?,
        candidate_profile_id: row.get(3)?,
        score_ab: row.get(4)?,
        score_ba: row.get(5)?,
        harmonic_mean: row.get(6)?,
        final_score: row.get(7)?,
        scale_symmetry_score: row.get(8)?,
        trust_level: row.get(9)?,
        match_reason: row.get(10)?,
        rank_position: row.get(11)?,
        rank_tier: row.get(12)?,
        status: row.get(13)?,
        config_snapshot: row.get(14)?,
        expires_at: row.get(15)?,
        suggested_at: row.get(16)?,
    })
}
