//! Adjustment ledger arithmetic.

use crate::domain::{AdjustmentType, Amount, CommissionAdjustment};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};

/// What is owed on a commission: `max(0, commission_amount + Σ ledger entries)`.
///
/// Corrections are skipped in the sum because they were already written into
/// `commission_amount` when applied.
pub fn net_amount(
    commission_amount: Amount,
    adjustments: &[CommissionAdjustment],
) -> Result<Amount, LedgerError> {
    let entries = adjustments
        .iter()
        .filter(|a| !a.adjustment_type.is_applied_to_amount())
        .map(|a| a.amount);
    Amount::checked_sum(std::iter::once(commission_amount).chain(entries))
        .map(Amount::clamp_zero)
        .ok_or_else(|| LedgerError::validation("ledger total is out of range"))
}

/// Clawback statistics over a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClawbackStats {
    pub total_commissions: u64,
    pub affected_commissions: u64,
    /// `affected / total`; zero when there are no commissions.
    pub clawback_rate: Amount,
}

impl ClawbackStats {
    pub fn new(total_commissions: u64, affected_commissions: u64) -> Self {
        let clawback_rate = Amount::from_int(affected_commissions as i64)
            .checked_div(Amount::from_int(total_commissions as i64))
            .unwrap_or(Amount::ZERO);
        ClawbackStats {
            total_commissions,
            affected_commissions,
            clawback_rate,
        }
    }
}

/// Sum of clawback entries (negative or zero).
pub fn clawed_back_total(adjustments: &[CommissionAdjustment]) -> Result<Amount, LedgerError> {
    Amount::checked_sum(
        adjustments
            .iter()
            .filter(|a| a.adjustment_type == AdjustmentType::Clawback)
            .map(|a| a.amount),
    )
    .ok_or_else(|| LedgerError::validation("clawback total is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActorId, CommissionId, TimeMs};

    fn adj(adjustment_type: AdjustmentType, amount: i64) -> CommissionAdjustment {
        CommissionAdjustment {
            id: 0,
            commission_id: CommissionId(1),
            adjustment_type,
            amount: Amount::from_int(amount),
            reason: "test".to_string(),
            reference: None,
            admin_id: ActorId::new("admin"),
            created_at: TimeMs::new(0),
        }
    }

    #[test]
    fn test_bonus_increases_net_by_exact_amount() {
        let base = Amount::from_int(100);
        let before = net_amount(base, &[]).unwrap();
        let after = net_amount(base, &[adj(AdjustmentType::Bonus, 25)]).unwrap();
        assert_eq!(after - before, Amount::from_int(25));
    }

    #[test]
    fn test_clawback_decreases_net_by_exact_amount() {
        let base = Amount::from_int(100);
        let net = net_amount(
            base,
            &[adj(AdjustmentType::Bonus, 10), adj(AdjustmentType::Clawback, -40)],
        )
        .unwrap();
        assert_eq!(net, Amount::from_int(70));
    }

    #[test]
    fn test_net_is_floored_at_zero() {
        let net = net_amount(Amount::from_int(10), &[adj(AdjustmentType::Clawback, -50)]).unwrap();
        assert_eq!(net, Amount::ZERO);
    }

    #[test]
    fn test_corrections_are_not_double_counted() {
        let net = net_amount(
            Amount::from_int(120),
            &[adj(AdjustmentType::Correction, 20), adj(AdjustmentType::StatusChange, 0)],
        )
        .unwrap();
        assert_eq!(net, Amount::from_int(120));
    }

    #[test]
    fn test_overflowing_ledger_is_rejected() {
        let mut huge = adj(AdjustmentType::Bonus, 0);
        huge.amount = Amount::new(rust_decimal::Decimal::MAX);
        let err = net_amount(Amount::from_int(100), &[huge]).unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[test]
    fn test_clawback_rate() {
        let stats = ClawbackStats::new(8, 2);
        assert_eq!(stats.clawback_rate, Amount::parse("0.25").unwrap());
        assert_eq!(ClawbackStats::new(0, 0).clawback_rate, Amount::ZERO);
    }

    #[test]
    fn test_clawed_back_total_sums_only_clawbacks() {
        let total = clawed_back_total(&[
            adj(AdjustmentType::Clawback, -30),
            adj(AdjustmentType::Bonus, 5),
            adj(AdjustmentType::Clawback, -20),
        ])
        .unwrap();
        assert_eq!(total, Amount::from_int(-50));
    }
}
