//! Feature assembly: one immutable bundle per profile, built once per
//! cycle and shared read-only with the scoring shards.
//!
//! Verified intake data (Platinum) is the only source for offers/needs
//! when fresh; otherwise the profile's own free text is split into
//! sentence fragments. Transcript-inferred suggestions never feed
//! offers/needs — they only affect trust classification.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::db::{DbIntake, DbProfile, MatchDb};
use crate::error::MatchError;
use crate::freshness::{intake_is_platinum, trust_source};
use crate::types::{AntiPersona, MatchPreference, TrustLevel};
use crate::util::{normalize_text, parse_timestamp, split_sentences};

/// Everything the scorer needs to know about one profile.
#[derive(Debug, Clone)]
pub struct FeatureBundle {
    pub profile_id: String,
    pub name: String,
    pub offers: Vec<String>,
    pub needs: Vec<String>,
    pub preferences: BTreeSet<MatchPreference>,
    pub anti_personas: BTreeSet<AntiPersona>,
    /// Normalized niche; empty when unknown.
    pub niche: String,
    pub audience: String,
    /// `list_size + social_reach`; zero doubles as unknown.
    pub reach: i64,
    pub last_active_at: Option<DateTime<Utc>>,
    /// Event ids from intake history.
    pub events: BTreeSet<String>,
    pub trust: TrustLevel,
    /// Offers/needs came from a fresh verified intake.
    pub verified_intent: bool,
}

/// Immutable per-cycle feature bundle table, ordered by profile id for
/// deterministic iteration.
pub struct FeatureTable {
    bundles: Vec<FeatureBundle>,
    index: HashMap<String, usize>,
}

impl FeatureTable {
    pub fn get(&self, profile_id: &str) -> Option<&FeatureBundle> {
        self.index.get(profile_id).map(|&i| &self.bundles[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureBundle> {
        self.bundles.iter()
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn bundles(&self) -> &[FeatureBundle] {
        &self.bundles
    }
}

/// Build the feature table for the whole pool.
///
/// Returns the table plus the number of per-record data errors (profiles
/// skipped, invalid enum values dropped).
pub fn assemble(db: &MatchDb, now: DateTime<Utc>) -> Result<(FeatureTable, u32), MatchError> {
    let profiles = db.list_profiles()?;
    let latest_confirmed = db.load_latest_confirmed_intakes()?;
    let all_intakes = db.list_all_intakes()?;

    let mut events_by_profile: HashMap<String, BTreeSet<String>> = HashMap::new();
    for intake in &all_intakes {
        events_by_profile
            .entry(intake.profile_id.clone())
            .or_default()
            .insert(intake.event_id.clone());
    }

    // Profiles with no confirmed intake still need their newest intake row
    // for inferred-signal trust classification.
    let mut newest_any: HashMap<String, &DbIntake> = HashMap::new();
    for intake in &all_intakes {
        let entry = newest_any.entry(intake.profile_id.clone()).or_insert(intake);
        if intake.created_at > entry.created_at {
            *entry = intake;
        }
    }

    let mut bundles = Vec::with_capacity(profiles.len());
    let mut data_errors = 0u32;

    for profile in &profiles {
        if profile.list_size.is_some_and(|v| v < 0)
            || profile.social_reach.is_some_and(|v| v < 0)
        {
            log::warn!("Skipping profile '{}': negative reach", profile.id);
            data_errors += 1;
            continue;
        }

        let intake = latest_confirmed
            .get(&profile.id)
            .or_else(|| newest_any.get(&profile.id).copied());
        let events = events_by_profile
            .get(&profile.id)
            .cloned()
            .unwrap_or_default();

        let (bundle, dropped) = build_bundle(profile, intake, events, now);
        data_errors += dropped;
        bundles.push(bundle);
    }

    bundles.sort_by(|a, b| a.profile_id.cmp(&b.profile_id));
    let index = bundles
        .iter()
        .enumerate()
        .map(|(i, b)| (b.profile_id.clone(), i))
        .collect();

    Ok((FeatureTable { bundles, index }, data_errors))
}

fn build_bundle(
    profile: &DbProfile,
    intake: Option<&DbIntake>,
    events: BTreeSet<String>,
    now: DateTime<Utc>,
) -> (FeatureBundle, u32) {
    let mut dropped = 0u32;

    let platinum = intake.is_some_and(|i| intake_is_platinum(i, now));

    let offers = if platinum {
        intake.map(|i| i.verified_offers.clone()).unwrap_or_default()
    } else {
        profile
            .offering
            .as_deref()
            .map(split_sentences)
            .unwrap_or_default()
    };
    let needs = if platinum {
        intake.map(|i| i.verified_needs.clone()).unwrap_or_default()
    } else {
        profile
            .seeking
            .as_deref()
            .map(split_sentences)
            .unwrap_or_default()
    };

    let mut preferences: BTreeSet<MatchPreference> = BTreeSet::new();
    if let Some(intake) = intake {
        for raw in &intake.match_preference {
            match MatchPreference::parse(raw) {
                Some(pref) => {
                    preferences.insert(pref);
                }
                None => {
                    log::warn!(
                        "Profile '{}': dropping unknown match preference '{}'",
                        profile.id,
                        raw
                    );
                    dropped += 1;
                }
            }
        }
    }
    if preferences.is_empty() {
        preferences.insert(MatchPreference::PeerBundle);
    }

    let mut anti_personas: BTreeSet<AntiPersona> = BTreeSet::new();
    if let Some(intake) = intake {
        for raw in &intake.anti_personas {
            match AntiPersona::parse(raw) {
                Some(persona) => {
                    anti_personas.insert(persona);
                }
                None => {
                    log::warn!(
                        "Profile '{}': dropping unknown anti-persona '{}'",
                        profile.id,
                        raw
                    );
                    dropped += 1;
                }
            }
        }
    }

    let bundle = FeatureBundle {
        profile_id: profile.id.clone(),
        name: profile.name.clone(),
        offers,
        needs,
        preferences,
        anti_personas,
        niche: profile.niche.as_deref().map(normalize_text).unwrap_or_default(),
        audience: profile
            .audience
            .as_deref()
            .map(normalize_text)
            .unwrap_or_default(),
        reach: profile.reach(),
        last_active_at: profile.last_active_at.as_deref().and_then(parse_timestamp),
        events,
        trust: trust_source(profile, intake, now),
        verified_intent: platinum,
    };
    (bundle, dropped)
}
