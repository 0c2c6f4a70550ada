//! Review queue: resolver outcomes that need a human decision.

use rusqlite::{params, Row};

use super::{DbError, DbReviewEntry, MatchDb};

impl MatchDb {
    pub fn insert_review_entry(&self, entry: &DbReviewEntry) -> Result<(), DbError> {
        self.conn.execute(
            "INSERT INTO profile_review_queue (
                id, extracted_name, extracted_data, candidate_profile_id,
                confidence, reason, status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.extracted_name,
                entry.extracted_data,
                entry.candidate_profile_id,
                entry.confidence,
                entry.reason,
                entry.status,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// Pending review entries, oldest first.
    pub fn list_pending_reviews(&self) -> Result<Vec<DbReviewEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, extracted_name, extracted_data, candidate_profile_id,
                    confidence, reason, status, created_at
             FROM profile_review_queue
             WHERE status = 'pending'
             ORDER BY created_at, id",
        )?;
        let rows = stmt.query_map([], map_review_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Close out a review entry ('approved' or 'rejected').
    pub fn resolve_review_entry(&self, id: &str, status: &str) -> Result<(), DbError> {
        let updated = self.conn.execute(
            "UPDATE profile_review_queue SET status = ?2 WHERE id = ?1 AND status = 'pending'",
            params![id, status],
        )?;
        if updated == 0 {
            return Err(DbError::InvalidValue(format!(
                "no pending review entry '{id}'"
            )));
        }
        Ok(())
    }
}

fn map_review_row(row: &Row<'_>) -> rusqlite::Result<DbReviewEntry> {
    Ok(DbReviewEntry {
        id: row.get(0)?,
        extracted_name: row.get(1)?,
        extracted_data: row.get(2)?,
        candidate_profile_id: row.get(3)?,
        confidence: row.get(4)?,
        reason: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> DbReviewEntry {
        DbReviewEntry {
            id: id.to_string(),
            extracted_name: "Jane Smyth".to_string(),
            extracted_data: "{}".to_string(),
            candidate_profile_id: None,
            confidence: 0.55,
            reason: "fuzzy name match".to_string(),
            status: "pending".to_string(),
            created_at: "2026-02-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn pending_entries_roundtrip() {
        let db = MatchDb::open_in_memory().unwrap();
        db.insert_review_entry(&entry("r1")).unwrap();
        db.insert_review_entry(&entry("r2")).unwrap();

        assert_eq!(db.list_pending_reviews().unwrap().len(), 2);

        db.resolve_review_entry("r1", "rejected").unwrap();
        let pending = db.list_pending_reviews().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, "r2");
    }

    #[test]
    fn resolving_twice_fails() {
        let db = MatchDb::open_in_memory().unwrap();
        db.insert_review_entry(&entry("r1")).unwrap();
        db.resolve_review_entry("r1", "approved").unwrap();
        assert!(db.resolve_review_entry("r1", "rejected").is_err());
    }
}
