//! Intake submission queries.
//!
//! Intakes are immutable once confirmed; a later confirmed intake for the
//! same profile supersedes earlier ones (latest wins). One row per
//! (profile, event).

use std::collections::HashMap;

use rusqlite::{params, OptionalExtension, Row};

use super::types::{decode_list, encode_list};
use super::{DbError, DbIntake, MatchDb};

impl MatchDb {
    /// Insert or replace the intake for a (profile, event) pair.
    ///
    /// A confirmed intake is never downgraded: once `confirmed_at` is set
    /// the row only accepts updates that keep it confirmed.
    pub fn upsert_intake(&self, intake: &DbIntake) -> Result<(), DbError> {
        let existing_confirmed: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT confirmed_at FROM intake_submissions
                 WHERE profile_id = ?1 AND event_id = ?2",
                params![intake.profile_id, intake.event_id],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(Some(_)) = existing_confirmed {
            if intake.confirmed_at.is_none() {
                return Err(DbError::InvalidValue(format!(
                    "intake for profile '{}' at event '{}' is already confirmed",
                    intake.profile_id, intake.event_id
                )));
            }
        }

        self.conn.execute(
            "INSERT INTO intake_submissions (
                id, profile_id, event_id, event_name, event_date,
                verified_offers, verified_needs, match_preference, anti_personas,
                suggested_offers, suggested_needs, confirmed_at, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(profile_id, event_id) DO UPDATE SET
                event_name = excluded.event_name,
                event_date = excluded.event_date,
                verified_offers = excluded.verified_offers,
                verified_needs = excluded.verified_needs,
                match_preference = excluded.match_preference,
                anti_personas = excluded.anti_personas,
                suggested_offers = excluded.suggested_offers,
                suggested_needs = excluded.suggested_needs,
                confirmed_at = excluded.confirmed_at",
            params![
                intake.id,
                intake.profile_id,
                intake.event_id,
                intake.event_name,
                intake.event_date,
                encode_list(&intake.verified_offers),
                encode_list(&intake.verified_needs),
                encode_list(&intake.match_preference),
                encode_list(&intake.anti_personas),
                encode_list(&intake.suggested_offers),
                encode_list(&intake.suggested_needs),
                intake.confirmed_at,
                intake.created_at,
            ],
        )?;
        Ok(())
    }

    /// Merge transcript-inferred offers/needs into the (profile, event)
    /// intake as Bronze pre-fill, creating the row unconfirmed if absent.
    /// Verified fields are never touched.
    pub fn prefill_intake_suggestions(
        &self,
        intake_id: &str,
        profile_id: &str,
        event_id: &str,
        event_name: Option<&str>,
        suggested_offers: &[String],
        suggested_needs: &[String],
        now: &str,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO intake_submissions (
                id, profile_id, event_id, event_name,
                suggested_offers, suggested_needs, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(profile_id, event_id) DO UPDATE SET
                suggested_offers = excluded.suggested_offers,
                suggested_needs = excluded.suggested_needs",
            params![
                intake_id,
                profile_id,
                event_id,
                event_name,
                encode_list(suggested_offers),
                encode_list(suggested_needs),
                now,
            ],
        )?;
        Ok(())
    }

    /// Latest confirmed intake for a profile, by `confirmed_at` (latest
    /// wins). `None` when the profile never confirmed one.
    pub fn latest_confirmed_intake(&self, profile_id: &str) -> Result<Option<DbIntake>, DbError> {
        self.conn
            .query_row(
                &format!(
                    "SELECT {INTAKE_COLUMNS} FROM intake_submissions
                     WHERE profile_id = ?1 AND confirmed_at IS NOT NULL
                     ORDER BY confirmed_at DESC, id LIMIT 1"
                ),
                params![profile_id],
                map_intake_row,
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Latest confirmed intake per profile, for the whole pool in one query.
    pub fn load_latest_confirmed_intakes(&self) -> Result<HashMap<String, DbIntake>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INTAKE_COLUMNS} FROM intake_submissions
             WHERE confirmed_at IS NOT NULL
             ORDER BY profile_id, confirmed_at DESC, id"
        ))?;
        let rows = stmt.query_map([], map_intake_row)?;

        let mut latest: HashMap<String, DbIntake> = HashMap::new();
        for row in rows {
            let intake = row?;
            // Rows arrive newest-first per profile; keep the first seen.
            latest.entry(intake.profile_id.clone()).or_insert(intake);
        }
        Ok(latest)
    }

    /// All intakes for a profile (confirmed or not), newest event first.
    /// Feeds the attended-events set and Bronze pre-fill detection.
    pub fn list_intakes_for_profile(&self, profile_id: &str) -> Result<Vec<DbIntake>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INTAKE_COLUMNS} FROM intake_submissions
             WHERE profile_id = ?1
             ORDER BY created_at DESC, id"
        ))?;
        let rows = stmt.query_map(params![profile_id], map_intake_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every intake row, for building the full event-attendance index.
    pub fn list_all_intakes(&self) -> Result<Vec<DbIntake>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INTAKE_COLUMNS} FROM intake_submissions ORDER BY profile_id, event_id"
        ))?;
        let rows = stmt.query_map([], map_intake_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

const INTAKE_COLUMNS: &str = "id, profile_id, event_id, event_name, event_date, verified_offers, \
     verified_needs, match_preference, anti_personas, suggested_offers, suggested_needs, \
     confirmed_at, created_at";

fn map_intake_row(row: &Row<'_>) -> rusqlite::Result<DbIntake> {
    let verified_offers: String = row.get(5)?;
    let verified_needs: String = row.get(6)?;
    let match_preference: String = row.get(7)?;
    let anti_personas: String = row.get(8)?;
    let suggested_offers: String = row.get(9)?;
    let suggested_needs: String = row.get(10)?;
    Ok(DbIntake {
        id: row.get(0)?,
        profile_id: row.get(1)?,
        event_id: row.get(2)?,
        event_name: row.get(3)?,
        event_date: row.get(4)?,
        verified_offers: decode_list(&verified_offers),
        verified_needs: decode_list(&verified_needs),
        match_preference: decode_list(&match_preference),
        anti_personas: decode_list(&anti_personas),
        suggested_offers: decode_list(&suggested_offers),
        suggested_needs: decode_list(&suggested_needs),
        confirmed_at: row.get(11)?,
        created_at: row.get(12)?,
    })
}
