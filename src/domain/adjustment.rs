//! Commission adjustment ledger entries.

use crate::domain::{ActorId, Amount, CommissionId, TimeMs};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    Correction,
    Bonus,
    Payment,
    Clawback,
    StatusChange,
}

impl AdjustmentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdjustmentType::Correction => "correction",
            AdjustmentType::Bonus => "bonus",
            AdjustmentType::Payment => "payment",
            AdjustmentType::Clawback => "clawback",
            AdjustmentType::StatusChange => "status_change",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "correction" => Some(AdjustmentType::Correction),
            "bonus" => Some(AdjustmentType::Bonus),
            "payment" => Some(AdjustmentType::Payment),
            "clawback" => Some(AdjustmentType::Clawback),
            "status_change" => Some(AdjustmentType::StatusChange),
            _ => None,
        }
    }

    /// Whether the entry's amount is already folded into `commission_amount`.
    ///
    /// Corrections mutate the stored amount when applied, so counting them
    /// again on read would double the delta.
    pub fn is_applied_to_amount(&self) -> bool {
        matches!(self, AdjustmentType::Correction)
    }
}

/// Manual adjustments an admin may apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManualAdjustmentKind {
    Bonus,
    Correction,
}

impl From<ManualAdjustmentKind> for AdjustmentType {
    fn from(kind: ManualAdjustmentKind) -> Self {
        match kind {
            ManualAdjustmentKind::Bonus => AdjustmentType::Bonus,
            ManualAdjustmentKind::Correction => AdjustmentType::Correction,
        }
    }
}

/// Cause of a clawback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClawbackKind {
    Refund,
    Chargeback,
    Manual,
}

impl ClawbackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClawbackKind::Refund => "refund",
            ClawbackKind::Chargeback => "chargeback",
            ClawbackKind::Manual => "manual",
        }
    }
}

/// Append-only ledger entry against a commission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionAdjustment {
    pub id: i64,
    pub commission_id: CommissionId,
    pub adjustment_type: AdjustmentType,
    /// Signed; negative for clawbacks.
    pub amount: Amount,
    pub reason: String,
    /// Payment reference or clawback kind.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub admin_id: ActorId,
    pub created_at: TimeMs,
}

/// Entry to append; id and timestamp are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAdjustment {
    pub commission_id: CommissionId,
    pub adjustment_type: AdjustmentType,
    pub amount: Amount,
    pub reason: String,
    pub reference: Option<String>,
    pub admin_id: ActorId,
}

impl NewAdjustment {
    pub fn status_change(
        commission_id: CommissionId,
        from: crate::domain::CommissionStatus,
        to: crate::domain::CommissionStatus,
        reason: Option<&str>,
        admin_id: &ActorId,
    ) -> Self {
        let reason = match reason {
            Some(r) => format!("{} -> {}: {}", from, to, r),
            None => format!("{} -> {}", from, to),
        };
        NewAdjustment {
            commission_id,
            adjustment_type: AdjustmentType::StatusChange,
            amount: Amount::ZERO,
            reason,
            reference: None,
            admin_id: admin_id.clone(),
        }
    }
}
