//! Click ledger entries.

use crate::domain::{CustomerId, TimeMs, TrackingCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use woothee::parser::Parser;

/// A recorded referral-link click. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    /// Row id; zero until persisted.
    pub id: i64,
    pub tracking_code: TrackingCode,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_id: Option<CustomerId>,
    /// `sha256(ip|userAgent|sessionId)`, hex encoded.
    pub fingerprint: String,
    pub device: String,
    pub browser: String,
    pub os: String,
    pub timestamp: TimeMs,
}

/// Input for recording a click.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewClick {
    pub tracking_code: TrackingCode,
    pub ip_address: String,
    pub user_agent: String,
    #[serde(default)]
    pub referrer: Option<String>,
    pub session_id: String,
    #[serde(default)]
    pub customer_id: Option<CustomerId>,
}

impl ClickEvent {
    /// Build a click, deriving fingerprint and user-agent facets.
    pub fn from_new(click: NewClick, timestamp: TimeMs) -> Self {
        let fingerprint = compute_fingerprint(
            &click.ip_address,
            &click.user_agent,
            Some(click.session_id.as_str()),
        );
        let agent = UserAgentFacets::parse(&click.user_agent);
        ClickEvent {
            id: 0,
            tracking_code: click.tracking_code,
            ip_address: click.ip_address,
            user_agent: click.user_agent,
            referrer: click.referrer.filter(|r| !r.trim().is_empty()),
            session_id: click.session_id,
            customer_id: click.customer_id,
            fingerprint,
            device: agent.device,
            browser: agent.browser,
            os: agent.os,
            timestamp,
        }
    }
}

/// Browser fingerprint: `sha256(ip|userAgent|sessionId-or-empty)` as hex.
///
/// The same function is used when recording a click and when the attribution
/// resolver recomputes a fingerprint for a conversion candidate.
pub fn compute_fingerprint(ip_address: &str, user_agent: &str, session_id: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip_address.as_bytes());
    hasher.update(b"|");
    hasher.update(user_agent.as_bytes());
    hasher.update(b"|");
    hasher.update(session_id.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}

/// Device category, browser and OS extracted from a user-agent string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAgentFacets {
    pub device: String,
    pub browser: String,
    pub os: String,
}

impl UserAgentFacets {
    pub fn parse(user_agent: &str) -> Self {
        let result = Parser::new().parse(user_agent).unwrap_or_default();
        fn known(s: &str) -> String {
            if s.is_empty() || s == "UNKNOWN" {
                "unknown".to_string()
            } else {
                s.to_string()
            }
        }
        UserAgentFacets {
            device: known(&result.category),
            browser: known(&result.name),
            os: known(&result.os),
        }
    }
}
