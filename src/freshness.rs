//! Freshness and trust classification.
//!
//! Pure functions over a profile, its latest confirmed intake, and the
//! caller-supplied clock. Two related classifications:
//! - `trust_source`: 4-level provenance (Platinum/Gold/Bronze/Legacy) that
//!   drives the final score modifier.
//! - `classify_freshness`: activity state used for re-engagement flagging,
//!   including the Sleeping Giant marker.

use chrono::{DateTime, Duration, Utc};

use crate::db::{DbIntake, DbProfile};
use crate::types::TrustLevel;
use crate::util::parse_timestamp;

/// An intake is Platinum-qualifying only while confirmed within this window.
pub const PLATINUM_WINDOW_DAYS: i64 = 30;

/// Activity counts as recent within this window.
pub const ACTIVE_WINDOW_DAYS: i64 = 30;

/// Reach above which an inactive profile is worth chasing.
pub const SLEEPING_GIANT_REACH: i64 = 5000;

/// Activity state of a profile, independent of the trust modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreshnessLevel {
    /// Verified intake confirmed within the window.
    Platinum,
    /// Recently active but no recent confirmed intake.
    Active,
    /// Neither verified nor recently active.
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Freshness {
    pub level: FreshnessLevel,
    /// High reach, but dormant: flag for re-engagement.
    pub sleeping_giant: bool,
}

/// True when the intake's `confirmed_at` falls inside the Platinum window.
pub fn intake_is_platinum(intake: &DbIntake, now: DateTime<Utc>) -> bool {
    intake
        .confirmed_at
        .as_deref()
        .and_then(parse_timestamp)
        .is_some_and(|confirmed| now - confirmed <= Duration::days(PLATINUM_WINDOW_DAYS))
}

fn recently_active(profile: &DbProfile, now: DateTime<Utc>) -> bool {
    profile
        .last_active_at
        .as_deref()
        .and_then(parse_timestamp)
        .is_some_and(|active| now - active <= Duration::days(ACTIVE_WINDOW_DAYS))
}

fn has_manual_fields(profile: &DbProfile) -> bool {
    let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    filled(&profile.offering) || filled(&profile.seeking) || filled(&profile.niche)
}

fn has_inferred_signals(intake: Option<&DbIntake>) -> bool {
    intake.is_some_and(|i| !i.suggested_offers.is_empty() || !i.suggested_needs.is_empty())
}

/// Provenance of the data that would back this profile's side of a match.
///
/// Platinum: verified intake within 30 days. Gold: manually populated
/// profile fields without a recent intake. Bronze: only transcript-inferred
/// signals (or bare recent activity). Legacy: none of the above.
pub fn trust_source(
    profile: &DbProfile,
    latest_intake: Option<&DbIntake>,
    now: DateTime<Utc>,
) -> TrustLevel {
    if latest_intake.is_some_and(|intake| intake_is_platinum(intake, now)) {
        return TrustLevel::Platinum;
    }
    if has_manual_fields(profile) {
        return TrustLevel::Gold;
    }
    if has_inferred_signals(latest_intake) || recently_active(profile, now) {
        return TrustLevel::Bronze;
    }
    TrustLevel::Legacy
}

/// Activity classification plus the Sleeping Giant flag.
pub fn classify_freshness(
    profile: &DbProfile,
    latest_intake: Option<&DbIntake>,
    now: DateTime<Utc>,
) -> Freshness {
    let level = if latest_intake.is_some_and(|intake| intake_is_platinum(intake, now)) {
        FreshnessLevel::Platinum
    } else if recently_active(profile, now) {
        FreshnessLevel::Active
    } else {
        FreshnessLevel::Legacy
    };

    Freshness {
        level,
        sleeping_giant: profile.reach() > SLEEPING_GIANT_REACH && level == FreshnessLevel::Legacy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 17, 12, 0, 0).unwrap()
    }

    fn profile() -> DbProfile {
        DbProfile {
            id: "p1".to_string(),
            name: "Jane Smith".to_string(),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            updated_at: "2026-01-01T00:00:00Z".to_string(),
            ..Default::default()
        }
    }

    fn confirmed_intake(confirmed_at: &str) -> DbIntake {
        DbIntake {
            id: "i1".to_string(),
            profile_id: "p1".to_string(),
            event_id: "e1".to_string(),
            confirmed_at: Some(confirmed_at.to_string()),
            created_at: "2026-01-01T00:00:00Z".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn recent_confirmed_intake_is_platinum() {
        let intake = confirmed_intake("2026-02-01T00:00:00Z");
        assert_eq!(
            trust_source(&profile(), Some(&intake), now()),
            TrustLevel::Platinum
        );
        assert_eq!(
            classify_freshness(&profile(), Some(&intake), now()).level,
            FreshnessLevel::Platinum
        );
    }

    #[test]
    fn stale_confirmation_is_not_platinum() {
        let intake = confirmed_intake("2025-11-01T00:00:00Z");
        assert_ne!(
            trust_source(&profile(), Some(&intake), now()),
            TrustLevel::Platinum
        );
    }

    #[test]
    fn window_boundary_is_inclusive() {
        // Exactly 30 days old still qualifies.
        let intake = confirmed_intake("2026-01-18T12:00:00Z");
        assert!(intake_is_platinum(&intake, now()));
        let intake = confirmed_intake("2026-01-18T11:59:59Z");
        assert!(!intake_is_platinum(&intake, now()));
    }

    #[test]
    fn manual_fields_make_gold() {
        let mut p = profile();
        p.offering = Some("Executive coaching".to_string());
        assert_eq!(trust_source(&p, None, now()), TrustLevel::Gold);

        let mut p = profile();
        p.niche = Some("health & wellness".to_string());
        assert_eq!(trust_source(&p, None, now()), TrustLevel::Gold);
    }

    #[test]
    fn inferred_signals_make_bronze() {
        let mut intake = confirmed_intake("2025-10-01T00:00:00Z");
        intake.confirmed_at = None;
        intake.suggested_offers = vec!["list swaps".to_string()];
        assert_eq!(
            trust_source(&profile(), Some(&intake), now()),
            TrustLevel::Bronze
        );
    }

    #[test]
    fn bare_recent_activity_is_bronze() {
        let mut p = profile();
        p.last_active_at = Some("2026-02-10T00:00:00Z".to_string());
        assert_eq!(trust_source(&p, None, now()), TrustLevel::Bronze);
        assert_eq!(
            classify_freshness(&p, None, now()).level,
            FreshnessLevel::Active
        );
    }

    #[test]
    fn empty_profile_is_legacy() {
        assert_eq!(trust_source(&profile(), None, now()), TrustLevel::Legacy);
        let f = classify_freshness(&profile(), None, now());
        assert_eq!(f.level, FreshnessLevel::Legacy);
        assert!(!f.sleeping_giant);
    }

    #[test]
    fn dormant_high_reach_is_a_sleeping_giant() {
        let mut p = profile();
        p.list_size = Some(4000);
        p.social_reach = Some(2000);
        let f = classify_freshness(&p, None, now());
        assert_eq!(f.level, FreshnessLevel::Legacy);
        assert!(f.sleeping_giant);

        // Active profiles are never sleeping giants, whatever their reach.
        p.last_active_at = Some("2026-02-10T00:00:00Z".to_string());
        assert!(!classify_freshness(&p, None, now()).sleeping_giant);
    }

    #[test]
    fn malformed_timestamps_degrade_gracefully() {
        let mut p = profile();
        p.last_active_at = Some("not a date".to_string());
        assert_eq!(trust_source(&p, None, now()), TrustLevel::Legacy);
    }
}
