//! Commission records, status machine, and commission rule shapes.

use crate::domain::{Amount, CommissionId, CustomerId, MarketerId, ProductId, TimeMs, TrackingCode};
use serde::{Deserialize, Serialize};

/// Default clearance period before a commission may be approved.
pub const DEFAULT_CLEARANCE_PERIOD_DAYS: i64 = 30;

/// Commission status. Moves forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    Pending,
    Approved,
    Rejected,
    Paid,
    ClawedBack,
}

impl CommissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommissionStatus::Pending => "pending",
            CommissionStatus::Approved => "approved",
            CommissionStatus::Rejected => "rejected",
            CommissionStatus::Paid => "paid",
            CommissionStatus::ClawedBack => "clawed_back",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommissionStatus::Pending),
            "approved" => Some(CommissionStatus::Approved),
            "rejected" => Some(CommissionStatus::Rejected),
            "paid" => Some(CommissionStatus::Paid),
            "clawed_back" => Some(CommissionStatus::ClawedBack),
            _ => None,
        }
    }

    /// Legal successor states.
    pub fn successors(&self) -> &'static [CommissionStatus] {
        use CommissionStatus::*;
        match self {
            Pending => &[Approved, Rejected, ClawedBack],
            Approved => &[Paid, ClawedBack],
            Paid => &[ClawedBack],
            Rejected | ClawedBack => &[],
        }
    }

    pub fn can_transition_to(&self, next: CommissionStatus) -> bool {
        self.successors().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.successors().is_empty()
    }

    pub fn all() -> [CommissionStatus; 5] {
        use CommissionStatus::*;
        [Pending, Approved, Rejected, Paid, ClawedBack]
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One band of a tiered commission schedule. `max_amount = None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionTier {
    pub min_amount: Amount,
    #[serde(default)]
    pub max_amount: Option<Amount>,
    pub rate: Amount,
}

impl CommissionTier {
    pub fn covers(&self, spend: Amount) -> bool {
        self.min_amount <= spend && self.max_amount.map_or(true, |max| spend <= max)
    }
}

/// Commission rule shape attached to a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommissionRules {
    Percentage { rate: Amount },
    Flat { amount: Amount },
    Tiered { tiers: Vec<CommissionTier> },
}

/// Caller-supplied values that replace the product rules when `override_rules` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionOverride {
    #[serde(default)]
    pub custom_rate: Option<Amount>,
    #[serde(default)]
    pub custom_amount: Option<Amount>,
    #[serde(default, rename = "override")]
    pub override_rules: bool,
}

/// Output of the commission calculator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionQuote {
    pub commission_amount: Amount,
    pub commission_rate: Amount,
}

/// A commission owed to a marketer for one conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Commission {
    pub id: CommissionId,
    pub marketer_id: MarketerId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub tracking_code: TrackingCode,
    pub initial_spend_amount: Amount,
    pub commission_rate: Amount,
    pub commission_amount: Amount,
    pub status: CommissionStatus,
    pub conversion_date: TimeMs,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_date: Option<TimeMs>,
    pub clearance_period_days: i64,
    pub eligible_for_payout_date: TimeMs,
    pub created_at: TimeMs,
    pub updated_at: TimeMs,
}

impl Commission {
    pub fn is_cleared(&self, now: TimeMs) -> bool {
        now >= self.eligible_for_payout_date
    }
}

/// Input for creating a commission.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCommission {
    pub marketer_id: MarketerId,
    pub customer_id: CustomerId,
    pub product_id: ProductId,
    pub tracking_code: TrackingCode,
    pub initial_spend_amount: Amount,
    pub conversion_date: TimeMs,
    #[serde(default)]
    pub clearance_period_days: Option<i64>,
    #[serde(flatten)]
    pub overrides: CommissionOverride,
}
