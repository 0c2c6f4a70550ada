//! Incoming candidate records for entity resolution.
//!
//! Two streams feed the resolver: directory CSV rows (manually curated,
//! Gold-source fields) and transcript-derived speaker records (inferred,
//! Bronze-source fields that only ever pre-fill intake suggestions).

use serde::{Deserialize, Serialize};

/// Where a candidate record came from. Controls merge behavior: directory
/// fields land on the profile, transcript offers/needs stay in intake
/// pre-fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Directory,
    Transcript,
}

impl RecordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordSource::Directory => "directory",
            RecordSource::Transcript => "transcript",
        }
    }
}

/// A candidate record entering the resolution cascade. Only `name` is
/// required; everything else is best-effort.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    pub source: RecordSource,
    pub name: String,
    pub email: Option<String>,
    pub company: Option<String>,
    pub website: Option<String>,
    pub linkedin: Option<String>,
    pub niche: Option<String>,
    pub audience: Option<String>,
    pub list_size: Option<i64>,
    pub social_reach: Option<i64>,
    pub what_you_do: Option<String>,
    pub offering: Option<String>,
    pub seeking: Option<String>,
    /// Transcript-inferred offers; pre-fill only.
    pub suggested_offers: Vec<String>,
    /// Transcript-inferred needs; pre-fill only.
    pub suggested_needs: Vec<String>,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    /// When the person was last seen active (transcript timestamp).
    pub observed_at: Option<String>,
}

impl SourceRecord {
    pub fn directory(name: impl Into<String>) -> Self {
        Self::empty(RecordSource::Directory, name)
    }

    pub fn transcript(name: impl Into<String>) -> Self {
        Self::empty(RecordSource::Transcript, name)
    }

    fn empty(source: RecordSource, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            email: None,
            company: None,
            website: None,
            linkedin: None,
            niche: None,
            audience: None,
            list_size: None,
            social_reach: None,
            what_you_do: None,
            offering: None,
            seeking: None,
            suggested_offers: Vec::new(),
            suggested_needs: Vec::new(),
            event_id: None,
            event_name: None,
            observed_at: None,
        }
    }
}

/// Parse directory count formats into an integer:
/// `"1,000"` → 1000, `"10k"` → 10_000, `"1.5M"` → 1_500_000.
/// Returns `None` for blanks and garbage.
pub fn parse_count(raw: &str) -> Option<i64> {
    let cleaned = raw.trim().to_lowercase().replace(',', "");
    if cleaned.is_empty() {
        return None;
    }

    if let Some(stripped) = cleaned.strip_suffix('k') {
        return stripped.parse::<f64>().ok().map(|v| (v * 1_000.0) as i64);
    }
    if let Some(stripped) = cleaned.strip_suffix('m') {
        return stripped
            .parse::<f64>()
            .ok()
            .map(|v| (v * 1_000_000.0) as i64);
    }

    cleaned.parse::<f64>().ok().map(|v| v as i64)
}
