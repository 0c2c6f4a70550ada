//! Shared domain enums: trust levels, relationship preferences,
//! anti-personas, suggestion status, rank tiers.

use serde::{Deserialize, Serialize};

/// Provenance classification for the data backing a profile or a match.
///
/// Variants are declared weakest-first so the derived `Ord` makes
/// `a.min(b)` pick the weaker side of a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Stale or unknown provenance.
    Legacy,
    /// Transcript-inferred signals only.
    Bronze,
    /// Manually populated profile fields, no recent verified intake.
    Gold,
    /// Verified intake confirmed within the freshness window.
    Platinum,
}

impl TrustLevel {
    /// Multiplicative score modifier. Only Platinum×Platinum pairs can
    /// reach a final score of 100.
    pub fn weight(self) -> f64 {
        match self {
            TrustLevel::Platinum => 1.0,
            TrustLevel::Gold => 0.5,
            TrustLevel::Bronze => 0.3,
            TrustLevel::Legacy => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrustLevel::Platinum => "platinum",
            TrustLevel::Gold => "gold",
            TrustLevel::Bronze => "bronze",
            TrustLevel::Legacy => "legacy",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "platinum" => Some(TrustLevel::Platinum),
            "gold" => Some(TrustLevel::Gold),
            "bronze" => Some(TrustLevel::Bronze),
            "legacy" => Some(TrustLevel::Legacy),
            _ => None,
        }
    }
}

/// Relationship shape a member wants from a partner match.
///
/// Stored as a set; legacy single-value rows become singleton sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPreference {
    /// Same-niche peers bundling audiences.
    PeerBundle,
    /// Wants partners who send clients their way.
    ReferralUpstream,
    /// Wants partners to send clients to.
    ReferralDownstream,
    /// Looking for (or offering) paid services.
    ServiceProvider,
}

impl MatchPreference {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPreference::PeerBundle => "peer_bundle",
            MatchPreference::ReferralUpstream => "referral_upstream",
            MatchPreference::ReferralDownstream => "referral_downstream",
            MatchPreference::ServiceProvider => "service_provider",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "peer_bundle" => Some(MatchPreference::PeerBundle),
            "referral_upstream" => Some(MatchPreference::ReferralUpstream),
            "referral_downstream" => Some(MatchPreference::ReferralDownstream),
            "service_provider" => Some(MatchPreference::ServiceProvider),
            _ => None,
        }
    }

    pub fn is_referral(self) -> bool {
        matches!(
            self,
            MatchPreference::ReferralUpstream | MatchPreference::ReferralDownstream
        )
    }
}

/// Classes of profiles a member opts out of being matched with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AntiPersona {
    NoBeginners,
    NoServiceProviders,
    NoCompetitors,
}

impl AntiPersona {
    pub fn as_str(self) -> &'static str {
        match self {
            AntiPersona::NoBeginners => "no_beginners",
            AntiPersona::NoServiceProviders => "no_service_providers",
            AntiPersona::NoCompetitors => "no_competitors",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "no_beginners" => Some(AntiPersona::NoBeginners),
            "no_service_providers" => Some(AntiPersona::NoServiceProviders),
            "no_competitors" => Some(AntiPersona::NoCompetitors),
            _ => None,
        }
    }
}

/// Lifecycle of a persisted suggestion. Transitions are monotone:
/// pending → viewed → contacted → (connected | dismissed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Pending,
    Viewed,
    Contacted,
    Connected,
    Dismissed,
}

impl MatchStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchStatus::Pending => "pending",
            MatchStatus::Viewed => "viewed",
            MatchStatus::Contacted => "contacted",
            MatchStatus::Connected => "connected",
            MatchStatus::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(MatchStatus::Pending),
            "viewed" => Some(MatchStatus::Viewed),
            "contacted" => Some(MatchStatus::Contacted),
            "connected" => Some(MatchStatus::Connected),
            "dismissed" => Some(MatchStatus::Dismissed),
            _ => None,
        }
    }

    fn stage(self) -> u8 {
        match self {
            MatchStatus::Pending => 0,
            MatchStatus::Viewed => 1,
            MatchStatus::Contacted => 2,
            MatchStatus::Connected | MatchStatus::Dismissed => 3,
        }
    }

    /// Whether moving to `next` respects the monotone lifecycle.
    pub fn can_transition_to(self, next: MatchStatus) -> bool {
        if self == next {
            return false;
        }
        match self {
            // Terminal states never move.
            MatchStatus::Connected | MatchStatus::Dismissed => false,
            // Dismissal is allowed from any non-terminal stage.
            _ if next == MatchStatus::Dismissed => true,
            _ => next.stage() == self.stage() + 1,
        }
    }
}

/// Display tier attached to a suggestion after fairness filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankTier {
    Gold,
    Silver,
    Bronze,
}

impl RankTier {
    /// Gold 1–3, Silver 4–8, Bronze 9+.
    pub fn for_rank(rank: u32) -> Self {
        match rank {
            1..=3 => RankTier::Gold,
            4..=8 => RankTier::Silver,
            _ => RankTier::Bronze,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RankTier::Gold => "gold",
            RankTier::Silver => "silver",
            RankTier::Bronze => "bronze",
        }
    }
}
