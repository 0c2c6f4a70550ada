//! Profile queries: upserts with field-preserving merge support, lookups
//! for the resolver cascade, and the field-history log.

use rusqlite::{params, OptionalExtension, Row};

use super::{DbError, DbFieldHistory, DbProfile, MatchDb};

impl MatchDb {
    /// Insert or update a profile.
    ///
    /// On conflict, incoming non-null fields fill existing nulls but never
    /// overwrite existing non-null values — conflicting values are the
    /// resolver's job and go to `profile_field_history` instead.
    pub fn upsert_profile(&self, profile: &DbProfile) -> Result<bool, DbError> {
        let existed: bool = self
            .conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM profiles WHERE id = ?1)",
                params![profile.id],
                |row| row.get(0),
            )
            .unwrap_or(true);

        self.conn.execute(
            "INSERT INTO profiles (
                id, name, email, company, website, linkedin, niche, audience,
                list_size, social_reach, what_you_do, offering, seeking,
                last_active_at, created_at, updated_at
             ) VALUES (?1, ?2, LOWER(?3), ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
             ON CONFLICT(id) DO UPDATE SET
                email = COALESCE(profiles.email, excluded.email),
                company = COALESCE(profiles.company, excluded.company),
                website = COALESCE(profiles.website, excluded.website),
                linkedin = COALESCE(profiles.linkedin, excluded.linkedin),
                niche = COALESCE(profiles.niche, excluded.niche),
                audience = COALESCE(profiles.audience, excluded.audience),
                list_size = COALESCE(profiles.list_size, excluded.list_size),
                social_reach = COALESCE(profiles.social_reach, excluded.social_reach),
                what_you_do = COALESCE(profiles.what_you_do, excluded.what_you_do),
                offering = COALESCE(profiles.offering, excluded.offering),
                seeking = COALESCE(profiles.seeking, excluded.seeking),
                last_active_at = CASE
                    WHEN excluded.last_active_at > COALESCE(profiles.last_active_at, '')
                        THEN excluded.last_active_at
                    ELSE profiles.last_active_at
                END,
                updated_at = excluded.updated_at",
            params![
                profile.id,
                profile.name,
                profile.email,
                profile.company,
                profile.website,
                profile.linkedin,
                profile.niche,
                profile.audience,
                profile.list_size,
                profile.social_reach,
                profile.what_you_do,
                profile.offering,
                profile.seeking,
                profile.last_active_at,
                profile.created_at,
                profile.updated_at,
            ],
        )?;
        Ok(!existed)
    }

    /// Get a profile by id.
    pub fn get_profile(&self, id: &str) -> Result<Option<DbProfile>, DbError> {
        self.conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = ?1"),
                params![id],
                map_profile_row,
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Look up a profile by email (case-insensitive).
    pub fn get_profile_by_email(&self, email: &str) -> Result<Option<DbProfile>, DbError> {
        self.conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE email = LOWER(?1)"),
                params![email],
                map_profile_row,
            )
            .optional()
            .map_err(DbError::from)
    }

    /// All profiles, ordered by id for deterministic iteration.
    pub fn list_profiles(&self) -> Result<Vec<DbProfile>, DbError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY id"))?;
        let rows = stmt.query_map([], map_profile_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Advance `last_active_at` if the new timestamp is more recent.
    pub fn touch_last_active(&self, profile_id: &str, active_at: &str) -> Result<(), DbError> {
        self.conn.execute(
            "UPDATE profiles
             SET last_active_at = CASE
                    WHEN ?2 > COALESCE(last_active_at, '') THEN ?2
                    ELSE last_active_at
                 END,
                 updated_at = ?2
             WHERE id = ?1",
            params![profile_id, active_at],
        )?;
        Ok(())
    }

    /// Overwrite a single profile field with a resolver-approved value.
    pub fn set_profile_field(
        &self,
        profile_id: &str,
        field: &str,
        value: &str,
        updated_at: &str,
    ) -> Result<(), DbError> {
        // Column name comes from a fixed internal list, never user input.
        let sql = match field {
            "name" | "company" | "website" | "linkedin" | "niche" | "audience" | "what_you_do"
            | "offering" | "seeking" => {
                format!("UPDATE profiles SET {field} = ?2, updated_at = ?3 WHERE id = ?1")
            }
            other => {
                return Err(DbError::InvalidValue(format!(
                    "'{other}' is not a mergeable profile field"
                )))
            }
        };
        self.conn
            .execute(&sql, params![profile_id, value, updated_at])?;
        Ok(())
    }

    /// Record a merge conflict: the kept value stays on the profile, the
    /// incoming value is preserved here.
    pub fn insert_field_history(&self, entry: &DbFieldHistory) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO profile_field_history (
                id, profile_id, field, kept_value, incoming_value, source, recorded_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.id,
                entry.profile_id,
                entry.field,
                entry.kept_value,
                entry.incoming_value,
                entry.source,
                entry.recorded_at,
            ],
        )?;
        Ok(())
    }

    /// Field-history entries for a profile, newest first.
    pub fn get_field_history(&self, profile_id: &str) -> Result<Vec<DbFieldHistory>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, profile_id, field, kept_value, incoming_value, source, recorded_at
             FROM profile_field_history
             WHERE profile_id = ?1
             ORDER BY recorded_at DESC, id",
        )?;
        let rows = stmt.query_map(params![profile_id], |row| {
            Ok(DbFieldHistory {
                id: row.get(0)?,
                profile_id: row.get(1)?,
                field: row.get(2)?,
                kept_value: row.get(3)?,
                incoming_value: row.get(4)?,
                source: row.get(5)?,
                recorded_at: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

const PROFILE_COLUMNS: &str = "id, name, email, company, website, linkedin, niche, audience, \
     list_size, social_reach, what_you_do, offering, seeking, last_active_at, \
     created_at, updated_at";

fn map_profile_row(row: &Row<'_>) -> rusqlite::Result<DbProfile> {
    Ok(DbProfile {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        company: row.get(3)?,
        website: row.get(4)?,
        linkedin: row.get(5)?,
        niche: row.get(6)?,
        audience: row.get(7)?,
        list_size: row.get(8)?,
        social_reach: row.get(9)?,
        what_you_do: row.get(10)?,
        offering: row.get(11)?,
        seeking: row.get(12)?,
        last_active_at: row.get(13)?,
        created_at: row.get(14)?,
        updated_at: row.get(15)?,
    })
}
