//! Attribution model: how a conversion was tied to a marketer.

use crate::domain::{CustomerId, MarketerId, TrackingCode};
use serde::{Deserialize, Serialize};

/// Attribution method recorded on a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributionMethod {
    /// Matched through click-ledger signals (session, fingerprint, IP).
    Cookie,
    /// Tracking code submitted through the customer portal.
    Portal,
    /// Tracking code delivered by a server-to-server callback.
    S2s,
    /// Not attributed.
    None,
}

impl AttributionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionMethod::Cookie => "cookie",
            AttributionMethod::Portal => "portal",
            AttributionMethod::S2s => "s2s",
            AttributionMethod::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cookie" => Some(AttributionMethod::Cookie),
            "portal" => Some(AttributionMethod::Portal),
            "s2s" => Some(AttributionMethod::S2s),
            "none" => Some(AttributionMethod::None),
            _ => None,
        }
    }
}

/// Which signal produced a match, in resolver priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchSignal {
    Direct,
    Session,
    Fingerprint,
    Ip,
}

/// Confidence tier derived from the matching signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributionConfidence {
    Low,
    Medium,
    High,
    Exact,
}

impl MatchSignal {
    pub fn confidence(&self) -> AttributionConfidence {
        match self {
            MatchSignal::Direct => AttributionConfidence::Exact,
            MatchSignal::Session => AttributionConfidence::High,
            MatchSignal::Fingerprint => AttributionConfidence::Medium,
            MatchSignal::Ip => AttributionConfidence::Low,
        }
    }
}

/// Input to the attribution resolver.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionCandidate {
    #[serde(default)]
    pub tracking_code: Option<TrackingCode>,
    pub customer_id: CustomerId,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Declared channel for a supplied tracking code: `portal` (default) or `s2s`.
    #[serde(default)]
    pub declared_method: Option<AttributionMethod>,
    /// Cookie attribution window; the configured default when absent.
    #[serde(default)]
    pub attribution_window_days: Option<i64>,
}

/// Outcome of attribution resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_code: Option<TrackingCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketer_id: Option<MarketerId>,
    pub method: AttributionMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<MatchSignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<AttributionConfidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_event_id: Option<i64>,
    pub window_days: i64,
}

impl AttributionResult {
    /// No signal matched.
    pub fn unattributed(window_days: i64) -> Self {
        AttributionResult {
            success: false,
            tracking_code: None,
            marketer_id: None,
            method: AttributionMethod::None,
            signal: None,
            confidence: None,
            click_event_id: None,
            window_days,
        }
    }

    pub fn matched(
        tracking_code: TrackingCode,
        marketer_id: MarketerId,
        method: AttributionMethod,
        signal: MatchSignal,
        click_event_id: Option<i64>,
        window_days: i64,
    ) -> Self {
        AttributionResult {
            success: true,
            tracking_code: Some(tracking_code),
            marketer_id: Some(marketer_id),
            method,
            signal: Some(signal),
            confidence: Some(signal.confidence()),
            click_event_id,
            window_days,
        }
    }
}
