//! Text normalization and id-derivation helpers shared across the pipeline.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

/// Business filler words stripped before token-overlap comparison.
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "is",
    "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did", "will", "would",
    "could", "should", "may", "might", "can", "this", "that", "these", "those", "i", "you", "he",
    "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your", "our", "their",
    "service", "services", "provider", "member", "non", "resource",
];

/// Unicode case-fold, collapse internal whitespace, trim.
pub fn normalize_text(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased, stop-word-stripped token set for Jaccard comparison.
/// Tokens shorter than 3 characters are dropped as noise.
pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() >= 3 && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Token-overlap Jaccard similarity in [0, 1].
pub fn jaccard(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let intersection = ta.intersection(&tb).count();
    let union = ta.union(&tb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Split free-text offering/seeking into sentence-level fragments.
///
/// Used when a profile has no recent verified intake and we fall back to
/// its directory free text.
pub fn split_sentences(text: &str) -> Vec<String> {
    text.split(['.', ';', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collapse a string to a lowercase dash-separated slug. Runs of
/// non-alphanumeric characters become a single dash; none leads or trails.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
    }
    if slug.ends_with('-') {
        slug.pop();
    }
    slug
}

/// Derive a stable profile id from an email address.
///
/// Example: "sarah.chen@acme.com" → "sarah-chen-acme-com"
pub fn profile_id_from_email(email: &str) -> String {
    slugify(&email.to_lowercase())
}

/// Derive a stable profile id from a name (and company, when present).
///
/// Used for records with no email so that re-ingesting the same batch
/// produces the same ids.
pub fn profile_id_from_name(name: &str, company: Option<&str>) -> String {
    match company {
        Some(c) if !c.trim().is_empty() => slugify(&format!("{} {}", name, c)),
        _ => slugify(name),
    }
}

/// Parse an RFC 3339 timestamp column. `None` on malformed data — stored
/// timestamps are advisory, not load-bearing enough to fail a cycle.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
