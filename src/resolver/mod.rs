//! Entity resolution: fuse directory rows and transcript-derived speaker
//! records into canonical profiles.
//!
//! Matching cascade, first success wins:
//!   1. normalized email equality (confidence 1.0) — merge
//!   2. exact normalized name + company (0.9) — merge; multiple candidates
//!      is a hard error for that record
//!   3. exact normalized name, company absent on either side (0.7) — merge
//!   4. fuzzy name similarity ≥ 0.80 (0.5–0.7) — review queue, never
//!      auto-merged
//!   5. no tier matched — create (directory) or review (transcript)
//!
//! Merges fill missing fields only. Conflicting non-null values keep the
//! older value and log the incoming one to `profile_field_history`.

pub mod normalize;
pub mod record;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{DbFieldHistory, DbProfile, DbReviewEntry, MatchDb};
use crate::error::MatchError;
use crate::util::{normalize_text, profile_id_from_email, profile_id_from_name};

pub use normalize::{normalize_email, normalize_name, similarity_ratio};
pub use record::{parse_count, RecordSource, SourceRecord};

/// Fuzzy names at or above this ratio are staged for manual review.
pub const FUZZY_REVIEW_THRESHOLD: f64 = 0.80;

const TIER1_CONFIDENCE: f64 = 1.0;
const TIER2_CONFIDENCE: f64 = 0.90;
const TIER3_CONFIDENCE: f64 = 0.70;

/// Transcript pre-fill keeps at most this many offers/needs.
const MAX_SUGGESTED_ITEMS: usize = 2;

/// What happened to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Merged {
        profile_id: String,
        confidence: f64,
        tier: u8,
    },
    Created {
        profile_id: String,
    },
    Queued {
        review_id: String,
    },
}

/// Batch outcome counts. Per-record failures never abort the batch.
#[derive(Debug, Default)]
pub struct ResolutionReport {
    pub created: u32,
    pub merged: u32,
    pub review_queued: u32,
    pub data_errors: u32,
    pub conflicts: u32,
    /// Human-readable skip reasons, in input order.
    pub errors: Vec<String>,
}

/// Resolve a batch of incoming records against the profile store.
pub fn resolve_batch(
    db: &MatchDb,
    records: &[SourceRecord],
    now: DateTime<Utc>,
) -> Result<ResolutionReport, MatchError> {
    let mut profiles = db.list_profiles()?;
    let mut report = ResolutionReport::default();

    for record in records {
        match resolve_record(db, &mut profiles, record, now) {
            Ok(Resolution::Merged { profile_id, tier, .. }) => {
                log::info!(
                    "Resolved '{}' -> profile '{}' (tier {})",
                    record.name,
                    profile_id,
                    tier
                );
                report.merged += 1;
            }
            Ok(Resolution::Created { profile_id }) => {
                log::info!("Created profile '{}' for '{}'", profile_id, record.name);
                report.created += 1;
            }
            Ok(Resolution::Queued { .. }) => {
                log::info!("Queued '{}' for manual review", record.name);
                report.review_queued += 1;
            }
            Err(e @ MatchError::AmbiguousResolution { .. }) => {
                log::warn!("Skipping record '{}': {}", record.name, e);
                report.conflicts += 1;
                report.errors.push(e.to_string());
            }
            Err(e @ MatchError::Data { .. }) => {
                log::warn!("Skipping record '{}': {}", record.name, e);
                report.data_errors += 1;
                report.errors.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    Ok(report)
}

/// Resolve a single record. Mutates the in-memory profile cache so later
/// records in the batch see earlier creations and merges.
fn resolve_record(
    db: &MatchDb,
    profiles: &mut Vec<DbProfile>,
    record: &SourceRecord,
    now: DateTime<Utc>,
) -> Result<Resolution, MatchError> {
    validate_record(record)?;

    match find_match(profiles, record)? {
        Candidate::Merge {
            index,
            confidence,
            tier,
        } => {
            let profile_id = profiles[index].id.clone();
            apply_merge(db, &profiles[index], record, now)?;
            if let Some(refreshed) = db.get_profile(&profile_id)? {
                profiles[index] = refreshed;
            }
            Ok(Resolution::Merged {
                profile_id,
                confidence,
                tier,
            })
        }
        Candidate::Create => {
            let profile = build_profile(record, now);
            if profiles.iter().any(|p| p.id == profile.id) {
                // Same derived id, different identity per the cascade —
                // a human has to untangle it.
                let review_id = queue_review(db, record, None, 0.0, "derived id collision", now)?;
                return Ok(Resolution::Queued { review_id });
            }
            db.upsert_profile(&profile)?;
            attach_transcript_signals(db, &profile.id, record, now)?;
            let id = profile.id.clone();
            profiles.push(profile);
            Ok(Resolution::Created { profile_id: id })
        }
        Candidate::Review {
            index,
            confidence,
            reason,
        } => {
            let candidate_id = index.map(|i| profiles[i].id.clone());
            let review_id =
                queue_review(db, record, candidate_id.as_deref(), confidence, &reason, now)?;
            Ok(Resolution::Queued { review_id })
        }
    }
}

enum Candidate {
    Merge {
        index: usize,
        confidence: f64,
        tier: u8,
    },
    Create,
    Review {
        index: Option<usize>,
        confidence: f64,
        reason: String,
    },
}

fn validate_record(record: &SourceRecord) -> Result<(), MatchError> {
    if normalize_name(&record.name).is_empty() {
        return Err(MatchError::Data {
            record: record.name.clone(),
            message: "missing name".to_string(),
        });
    }
    if record.list_size.is_some_and(|v| v < 0) || record.social_reach.is_some_and(|v| v < 0) {
        return Err(MatchError::Data {
            record: record.name.clone(),
            message: "negative reach".to_string(),
        });
    }
    Ok(())
}

fn find_match(profiles: &[DbProfile], record: &SourceRecord) -> Result<Candidate, MatchError> {
    // Tier 1: email equality
    if let Some(email) = record.email.as_deref().map(normalize_email) {
        if !email.is_empty() {
            if let Some(index) = profiles
                .iter()
                .position(|p| p.email.as_deref() == Some(email.as_str()))
            {
                return Ok(Candidate::Merge {
                    index,
                    confidence: TIER1_CONFIDENCE,
                    tier: 1,
                });
            }
        }
    }

    let name = normalize_name(&record.name);
    let company = record
        .company
        .as_deref()
        .map(normalize_text)
        .filter(|c| !c.is_empty());

    // Tier 2: exact name + exact company
    if let Some(company) = company.as_deref() {
        let matches: Vec<usize> = profiles
            .iter()
            .enumerate()
            .filter(|(_, p)| {
                normalize_name(&p.name) == name
                    && p.company.as_deref().map(normalize_text).as_deref() == Some(company)
            })
            .map(|(i, _)| i)
            .collect();
        match matches.len() {
            0 => {}
            1 => {
                return Ok(Candidate::Merge {
                    index: matches[0],
                    confidence: TIER2_CONFIDENCE,
                    tier: 2,
                })
            }
            n => {
                return Err(MatchError::AmbiguousResolution {
                    name: record.name.clone(),
                    candidates: n,
                })
            }
        }
    }

    // Tier 3: exact name, company absent on either side
    let matches: Vec<usize> = profiles
        .iter()
        .enumerate()
        .filter(|(_, p)| {
            normalize_name(&p.name) == name && (company.is_none() || p.company.is_none())
        })
        .map(|(i, _)| i)
        .collect();
    match matches.len() {
        0 => {}
        1 => {
            return Ok(Candidate::Merge {
                index: matches[0],
                confidence: TIER3_CONFIDENCE,
                tier: 3,
            })
        }
        n => {
            return Ok(Candidate::Review {
                index: Some(matches[0]),
                confidence: TIER3_CONFIDENCE,
                reason: format!("{n} profiles share this exact name"),
            })
        }
    }

    // Tier 4: fuzzy name
    let mut best: Option<(usize, f64)> = None;
    for (i, profile) in profiles.iter().enumerate() {
        let ratio = similarity_ratio(&name, &normalize_name(&profile.name));
        if ratio >= FUZZY_REVIEW_THRESHOLD && best.map_or(true, |(_, b)| ratio > b) {
            best = Some((i, ratio));
        }
    }
    if let Some((index, ratio)) = best {
        // 0.80–1.00 similarity maps onto 0.50–0.70 confidence.
        let confidence = (0.5 + (ratio - FUZZY_REVIEW_THRESHOLD)).min(0.70);
        return Ok(Candidate::Review {
            index: Some(index),
            confidence,
            reason: format!("fuzzy name match at {:.0}% similarity", ratio * 100.0),
        });
    }

    // Tier 5
    match record.source {
        RecordSource::Directory => Ok(Candidate::Create),
        RecordSource::Transcript => Ok(Candidate::Review {
            index: None,
            confidence: 0.0,
            reason: "no matching profile above threshold".to_string(),
        }),
    }
}

/// Merge a record into an existing profile: new non-null values fill old
/// nulls; conflicting values are preserved in the field history instead of
/// overwriting.
fn apply_merge(
    db: &MatchDb,
    existing: &DbProfile,
    record: &SourceRecord,
    now: DateTime<Utc>,
) -> Result<(), MatchError> {
    let now_str = now.to_rfc3339();

    // Transcript offers/needs are Bronze pre-fill and never land on the
    // profile; blank them out of the merge candidate.
    let (offering, seeking) = match record.source {
        RecordSource::Directory => (record.offering.clone(), record.seeking.clone()),
        RecordSource::Transcript => (None, None),
    };

    let fill = DbProfile {
        id: existing.id.clone(),
        name: existing.name.clone(),
        email: record.email.as_deref().map(normalize_email),
        company: record.company.clone(),
        website: record.website.clone(),
        linkedin: record.linkedin.clone(),
        niche: record.niche.as_deref().map(normalize_text),
        audience: record.audience.clone(),
        list_size: record.list_size,
        social_reach: record.social_reach,
        what_you_do: record.what_you_do.clone(),
        offering,
        seeking,
        last_active_at: None,
        created_at: existing.created_at.clone(),
        updated_at: now_str.clone(),
    };
    db.upsert_profile(&fill)?;

    // Conflicting non-null values: keep the older record's value, append
    // the newcomer to history.
    let text_conflicts: [(&str, Option<&String>, Option<&String>); 7] = [
        ("company", existing.company.as_ref(), record.company.as_ref()),
        ("website", existing.website.as_ref(), record.website.as_ref()),
        ("linkedin", existing.linkedin.as_ref(), record.linkedin.as_ref()),
        ("niche", existing.niche.as_ref(), record.niche.as_ref()),
        ("audience", existing.audience.as_ref(), record.audience.as_ref()),
        ("offering", existing.offering.as_ref(), fill.offering.as_ref()),
        ("seeking", existing.seeking.as_ref(), fill.seeking.as_ref()),
    ];
    for (field, kept, incoming) in text_conflicts {
        if let (Some(kept), Some(incoming)) = (kept, incoming) {
            if normalize_text(kept) != normalize_text(incoming) {
                record_conflict(db, &existing.id, field, kept, incoming, record.source, &now_str)?;
            }
        }
    }
    let numeric_conflicts: [(&str, Option<i64>, Option<i64>); 2] = [
        ("list_size", existing.list_size, record.list_size),
        ("social_reach", existing.social_reach, record.social_reach),
    ];
    for (field, kept, incoming) in numeric_conflicts {
        if let (Some(kept), Some(incoming)) = (kept, incoming) {
            if kept != incoming {
                record_conflict(
                    db,
                    &existing.id,
                    field,
                    &kept.to_string(),
                    &incoming.to_string(),
                    record.source,
                    &now_str,
                )?;
            }
        }
    }

    attach_transcript_signals(db, &existing.id, record, now)?;
    Ok(())
}

fn record_conflict(
    db: &MatchDb,
    profile_id: &str,
    field: &str,
    kept: &str,
    incoming: &str,
    source: RecordSource,
    now: &str,
) -> Result<(), MatchError> {
    db.insert_field_history(&DbFieldHistory {
        id: Uuid::new_v4().to_string(),
        profile_id: profile_id.to_string(),
        field: field.to_string(),
        kept_value: Some(kept.to_string()),
        incoming_value: incoming.to_string(),
        source: source.as_str().to_string(),
        recorded_at: now.to_string(),
    })?;
    Ok(())
}

/// Transcript records bump activity and pre-fill intake suggestions for
/// the event they were observed at.
fn attach_transcript_signals(
    db: &MatchDb,
    profile_id: &str,
    record: &SourceRecord,
    now: DateTime<Utc>,
) -> Result<(), MatchError> {
    if record.source != RecordSource::Transcript {
        return Ok(());
    }

    let active_at = record
        .observed_at
        .clone()
        .unwrap_or_else(|| now.to_rfc3339());
    db.touch_last_active(profile_id, &active_at)?;

    if let Some(event_id) = record.event_id.as_deref() {
        let offers: Vec<String> = record
            .suggested_offers
            .iter()
            .take(MAX_SUGGESTED_ITEMS)
            .cloned()
            .collect();
        let needs: Vec<String> = record
            .suggested_needs
            .iter()
            .take(MAX_SUGGESTED_ITEMS)
            .cloned()
            .collect();
        if !offers.is_empty() || !needs.is_empty() {
            db.prefill_intake_suggestions(
                &format!("intake-{profile_id}-{event_id}"),
                profile_id,
                event_id,
                record.event_name.as_deref(),
                &offers,
                &needs,
                &now.to_rfc3339(),
            )?;
        }
    }
    Ok(())
}

fn build_profile(record: &SourceRecord, now: DateTime<Utc>) -> DbProfile {
    let now_str = now.to_rfc3339();
    let email = record
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty());
    let id = match email.as_deref() {
        Some(email) => profile_id_from_email(email),
        None => profile_id_from_name(&normalize_name(&record.name), record.company.as_deref()),
    };

    DbProfile {
        id,
        name: record.name.trim().to_string(),
        email,
        company: record.company.clone(),
        website: record.website.clone(),
        linkedin: record.linkedin.clone(),
        niche: record.niche.as_deref().map(normalize_text),
        audience: record.audience.clone(),
        list_size: record.list_size,
        social_reach: record.social_reach,
        what_you_do: record.what_you_do.clone(),
        offering: record.offering.clone(),
        seeking: record.seeking.clone(),
        last_active_at: record.observed_at.clone(),
        created_at: now_str.clone(),
        updated_at: now_str,
    }
}

fn queue_review(
    db: &MatchDb,
    record: &SourceRecord,
    candidate_profile_id: Option<&str>,
    confidence: f64,
    reason: &str,
    now: DateTime<Utc>,
) -> Result<String, MatchError> {
    let id = Uuid::new_v4().to_string();
    db.insert_review_entry(&DbReviewEntry {
        id: id.clone(),
        extracted_name: record.name.clone(),
        extracted_data: serde_json::to_string(record).unwrap_or_else(|_| "{}".to_string()),
        candidate_profile_id: candidate_profile_id.map(str::to_string),
        confidence,
        reason: reason.to_string(),
        status: "pending".to_string(),
        created_at: now.to_rfc3339(),
    })?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap()
    }

    fn seeded_db() -> MatchDb {
        let db = MatchDb::open_in_memory().unwrap();
        let mut jane = SourceRecord::directory("Jane Smith");
        jane.email = Some("jane@smithcoaching.com".to_string());
        jane.company = Some("Smith Coaching".to_string());
        jane.niche = Some("Business Coaching".to_string());
        jane.list_size = Some(5000);
        resolve_batch(&db, &[jane], now()).unwrap();
        db
    }

    #[test]
    fn tier1_email_match_merges() {
        let db = seeded_db();
        let mut update = SourceRecord::directory("J. Smith");
        update.email = Some("JANE@smithcoaching.com ".to_string());
        update.audience = Some("founders".to_string());

        let report = resolve_batch(&db, &[update], now()).unwrap();
        assert_eq!(report.merged, 1);
        assert_eq!(report.created, 0);

        let profile = db
            .get_profile_by_email("jane@smithcoaching.com")
            .unwrap()
            .unwrap();
        assert_eq!(profile.audience.as_deref(), Some("founders"));
        // Original name kept
        assert_eq!(profile.name, "Jane Smith");
    }

    #[test]
    fn tier2_name_and_company_merges() {
        let db = seeded_db();
        let mut update = SourceRecord::directory("jane  SMITH");
        update.company = Some("smith coaching".to_string());
        update.social_reach = Some(1200);

        let report = resolve_batch(&db, &[update], now()).unwrap();
        assert_eq!(report.merged, 1);

        let profile = db
            .get_profile_by_email("jane@smithcoaching.com")
            .unwrap()
            .unwrap();
        assert_eq!(profile.social_reach, Some(1200));
    }

    #[test]
    fn ambiguous_tier2_is_skipped_with_conflict() {
        let db = seeded_db();
        // A second, distinct Jane Smith at the same company name, seeded
        // directly (the cascade would otherwise merge her).
        db.upsert_profile(&DbProfile {
            id: "jane-2".to_string(),
            name: "Jane Smith".to_string(),
            email: Some("jane2@elsewhere.com".to_string()),
            company: Some("Smith Coaching".to_string()),
            created_at: now().to_rfc3339(),
            updated_at: now().to_rfc3339(),
            ..Default::default()
        })
        .unwrap();

        let mut incoming = SourceRecord::directory("Jane Smith");
        incoming.company = Some("Smith Coaching".to_string());

        let report = resolve_batch(&db, &[incoming], now()).unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.merged, 0);
        assert_eq!(report.errors.len(), 1);
    }

    #[test]
    fn tier3_merges_when_company_absent() {
        let db = seeded_db();
        let mut update = SourceRecord::directory("Jane Smith (Host)");
        update.website = Some("https://smithcoaching.com".to_string());

        let report = resolve_batch(&db, &[update], now()).unwrap();
        assert_eq!(report.merged, 1);

        let profile = db
            .get_profile_by_email("jane@smithcoaching.com")
            .unwrap()
            .unwrap();
        assert_eq!(
            profile.website.as_deref(),
            Some("https://smithcoaching.com")
        );
    }

    #[test]
    fn tier4_fuzzy_goes_to_review_not_merge() {
        let db = seeded_db();
        let mut close = SourceRecord::transcript("Jane Smyth");
        close.suggested_offers = vec!["funnel audits".to_string()];

        let report = resolve_batch(&db, &[close], now()).unwrap();
        assert_eq!(report.review_queued, 1);
        assert_eq!(report.merged, 0);

        let entries = db.list_pending_reviews().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].confidence >= 0.5 && entries[0].confidence <= 0.7);
        assert!(entries[0].candidate_profile_id.is_some());
    }

    #[test]
    fn unmatched_directory_record_creates_profile() {
        let db = seeded_db();
        let mut new = SourceRecord::directory("Bob Johnson");
        new.company = Some("Digital Marketing Agency".to_string());

        let report = resolve_batch(&db, &[new], now()).unwrap();
        assert_eq!(report.created, 1);
        assert!(db
            .get_profile("bob-johnson-digital-marketing-agency")
            .unwrap()
            .is_some());
    }

    #[test]
    fn unmatched_transcript_speaker_goes_to_review() {
        let db = seeded_db();
        let stranger = SourceRecord::transcript("Totally Unknown Speaker");

        let report = resolve_batch(&db, &[stranger], now()).unwrap();
        assert_eq!(report.created, 0);
        assert_eq!(report.review_queued, 1);
    }

    #[test]
    fn conflicting_values_go_to_history_not_profile() {
        let db = seeded_db();
        let mut update = SourceRecord::directory("Jane Smith");
        update.email = Some("jane@smithcoaching.com".to_string());
        update.company = Some("Completely Different LLC".to_string());
        update.list_size = Some(9000);

        resolve_batch(&db, &[update], now()).unwrap();

        let profile = db
            .get_profile_by_email("jane@smithcoaching.com")
            .unwrap()
            .unwrap();
        assert_eq!(profile.company.as_deref(), Some("Smith Coaching"));
        assert_eq!(profile.list_size, Some(5000));

        let history = db.get_field_history(&profile.id).unwrap();
        let fields: Vec<&str> = history.iter().map(|h| h.field.as_str()).collect();
        assert!(fields.contains(&"company"));
        assert!(fields.contains(&"list_size"));
    }

    #[test]
    fn transcript_merge_prefills_intake_and_bumps_activity() {
        let db = seeded_db();
        let mut speaker = SourceRecord::transcript("Jane Smith");
        speaker.email = Some("jane@smithcoaching.com".to_string());
        speaker.event_id = Some("spring-summit".to_string());
        speaker.event_name = Some("Spring Summit".to_string());
        speaker.suggested_offers = vec![
            "list swaps".to_string(),
            "podcast guesting".to_string(),
            "a third thing".to_string(),
        ];
        speaker.suggested_needs = vec!["video editing".to_string()];
        speaker.observed_at = Some("2026-02-15T19:00:00Z".to_string());

        resolve_batch(&db, &[speaker], now()).unwrap();

        let profile = db
            .get_profile_by_email("jane@smithcoaching.com")
            .unwrap()
            .unwrap();
        assert_eq!(
            profile.last_active_at.as_deref(),
            Some("2026-02-15T19:00:00Z")
        );
        // Transcript offers never land on the profile itself.
        assert!(profile.offering.is_none());

        let intakes = db.list_intakes_for_profile(&profile.id).unwrap();
        assert_eq!(intakes.len(), 1);
        assert_eq!(intakes[0].suggested_offers.len(), MAX_SUGGESTED_ITEMS);
        assert!(intakes[0].confirmed_at.is_none());
    }

    #[test]
    fn record_without_name_is_a_data_error() {
        let db = seeded_db();
        let blank = SourceRecord::directory("   ");
        let report = resolve_batch(&db, &[blank], now()).unwrap();
        assert_eq!(report.data_errors, 1);
    }

    #[test]
    fn negative_reach_is_a_data_error() {
        let db = seeded_db();
        let mut bad = SourceRecord::directory("Negative Nancy");
        bad.list_size = Some(-10);
        let report = resolve_batch(&db, &[bad], now()).unwrap();
        assert_eq!(report.data_errors, 1);
        assert_eq!(report.created, 0);
    }

    #[test]
    fn batch_sees_earlier_creations() {
        let db = MatchDb::open_in_memory().unwrap();
        let mut first = SourceRecord::directory("Carol Danvers");
        first.email = Some("carol@higher.com".to_string());
        let mut second = SourceRecord::directory("Carol Danvers");
        second.email = Some("carol@higher.com".to_string());
        second.niche = Some("leadership".to_string());

        let report = resolve_batch(&db, &[first, second], now()).unwrap();
        assert_eq!(report.created, 1);
        assert_eq!(report.merged, 1);
    }
}
