//! Catalog records owned by neighbouring subsystems (links, products, marketers).

use crate::domain::{Amount, CommissionRules, CommissionTier, MarketerId, ProductId, TimeMs, TrackingCode};
use serde::{Deserialize, Serialize};

/// A marketer's referral link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralLink {
    pub tracking_code: TrackingCode,
    pub marketer_id: MarketerId,
    pub product_id: ProductId,
    pub is_active: bool,
    #[serde(default)]
    pub expires_at: Option<TimeMs>,
}

impl ReferralLink {
    /// Active and not expired at `now`.
    pub fn is_live(&self, now: TimeMs) -> bool {
        self.is_active && self.expires_at.map_or(true, |exp| now < exp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionType {
    Percentage,
    Flat,
}

/// Product as stored by the catalog. Rule fields are loosely shaped here and
/// only become [`CommissionRules`] through [`Product::commission_rules`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub is_active: bool,
    pub commission_type: CommissionType,
    #[serde(default)]
    pub commission_rate: Option<Amount>,
    #[serde(default)]
    pub commission_flat_amount: Option<Amount>,
    #[serde(default)]
    pub tiers: Vec<CommissionTier>,
    #[serde(default)]
    pub minimum_spend: Option<Amount>,
}

/// A rule field required by the product's commission type is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("product {product_id} has commission type {commission_type:?} but no {field}")]
pub struct MissingRuleField {
    pub product_id: ProductId,
    pub commission_type: CommissionType,
    pub field: &'static str,
}

impl Product {
    /// Resolve the product's rule shape. Tiers take precedence over the flat type.
    pub fn commission_rules(&self) -> Result<CommissionRules, MissingRuleField> {
        if !self.tiers.is_empty() {
            let mut tiers = self.tiers.clone();
            tiers.sort_by(|a, b| a.min_amount.cmp(&b.min_amount));
            return Ok(CommissionRules::Tiered { tiers });
        }

        let missing = |field| MissingRuleField {
            product_id: self.id.clone(),
            commission_type: self.commission_type,
            field,
        };
        match self.commission_type {
            CommissionType::Percentage => self
                .commission_rate
                .map(|rate| CommissionRules::Percentage { rate })
                .ok_or_else(|| missing("commissionRate")),
            CommissionType::Flat => self
                .commission_flat_amount
                .map(|amount| CommissionRules::Flat { amount })
                .ok_or_else(|| missing("commissionFlatAmount")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketerStatus {
    Active,
    Suspended,
    Inactive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Marketer,
    Customer,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Marketer {
    pub id: MarketerId,
    pub status: MarketerStatus,
    pub role: UserRole,
}

impl Marketer {
    pub fn can_earn(&self) -> bool {
        self.status == MarketerStatus::Active && self.role == UserRole::Marketer
    }
}
