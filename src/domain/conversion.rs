//! Conversion events and deduplication results.

use crate::domain::{
    Amount, AttributionCandidate, AttributionMethod, CustomerId, MarketerId, ProductId, TimeMs,
    TrackingCode,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default attribution window in days.
pub const DEFAULT_ATTRIBUTION_WINDOW_DAYS: i64 = 30;

/// Bounds accepted for an attribution window.
pub const ATTRIBUTION_WINDOW_RANGE: std::ops::RangeInclusive<i64> = 1..=90;

/// A recorded conversion. Financial event log entry; never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionEvent {
    /// Row id; zero until persisted.
    pub id: i64,
    /// Empty when the conversion was not attributed.
    pub tracking_code: String,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub initial_spend_amount: Amount,
    pub conversion_timestamp: TimeMs,
    pub attribution_method: AttributionMethod,
    pub commission_eligible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marketer_id: Option<MarketerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub click_event_id: Option<i64>,
    pub attribution_window_days: i64,
    pub deduplication_key: String,
}

/// Deterministic per-day key: `sha256(customerId|productId|YYYY-MM-DD)`.
///
/// Returns `None` when the timestamp has no calendar date.
pub fn deduplication_key(
    customer_id: &CustomerId,
    product_id: &ProductId,
    conversion_timestamp: TimeMs,
) -> Option<String> {
    let date = conversion_timestamp.utc_date()?;
    let mut hasher = Sha256::new();
    hasher.update(customer_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(product_id.as_str().as_bytes());
    hasher.update(b"|");
    hasher.update(date.as_bytes());
    Some(hex::encode(hasher.finalize()))
}

/// Input to the conversion recorder.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionCandidate {
    #[serde(flatten)]
    pub attribution: AttributionCandidate,
    pub product_id: ProductId,
    pub initial_spend_amount: Amount,
    /// Defaults to the time of recording.
    #[serde(default)]
    pub conversion_timestamp: Option<TimeMs>,
}

impl ConversionCandidate {
    pub fn tracking_code(&self) -> Option<&TrackingCode> {
        self.attribution.tracking_code.as_ref()
    }
}

/// Which heuristic duplicate rule fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DuplicateRule {
    /// Within one hour and within the hour amount tolerance.
    #[serde(rename = "same_customer_product_hour")]
    SameHour,
    /// Within 24 hours and within the day amount tolerance.
    #[serde(rename = "same_customer_product_day")]
    SameDay,
}

impl DuplicateRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateRule::SameHour => "same_customer_product_hour",
            DuplicateRule::SameDay => "same_customer_product_day",
        }
    }
}

impl std::fmt::Display for DuplicateRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the heuristic duplicate check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeduplicationResult {
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub existing_conversion_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DuplicateRule>,
}

impl DeduplicationResult {
    pub fn unique() -> Self {
        DeduplicationResult {
            is_duplicate: false,
            existing_conversion_id: None,
            reason: None,
        }
    }

    pub fn duplicate_of(existing_conversion_id: i64, reason: DuplicateRule) -> Self {
        DeduplicationResult {
            is_duplicate: true,
            existing_conversion_id: Some(existing_conversion_id),
            reason: Some(reason),
        }
    }
}
