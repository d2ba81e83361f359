//! Adjustment ledger: manual adjustments, clawbacks, and net-amount reads.

use crate::db::Repository;
use crate::domain::{
    ActorId, AdjustmentType, Amount, ClawbackKind, Commission, CommissionAdjustment,
    CommissionId, CommissionStatus, ManualAdjustmentKind, NewAdjustment, TimeMs,
};
use crate::engine::{clawed_back_total, net_amount, ClawbackStats};
use crate::error::LedgerError;
use crate::orchestration::lifecycle::load_or_not_found;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::info;

/// A commission with its full ledger and the amount actually owed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommissionStatement {
    pub commission: Commission,
    pub adjustments: Vec<CommissionAdjustment>,
    pub net_amount: Amount,
    /// Total deducted by clawbacks, as a positive amount.
    pub clawed_back: Amount,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAdjustmentRequest {
    pub amount: Amount,
    #[serde(rename = "type")]
    pub kind: ManualAdjustmentKind,
    pub reason: String,
    pub admin_id: ActorId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClawbackRequest {
    pub amount: Amount,
    pub reason: String,
    pub admin_id: ActorId,
    #[serde(rename = "type")]
    pub kind: ClawbackKind,
    /// Deduct without voiding the commission.
    #[serde(default)]
    pub partial: bool,
}

#[derive(Clone)]
pub struct AdjustmentLedger {
    repo: Arc<Repository>,
}

impl AdjustmentLedger {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Append a bonus or correction. Corrections rewrite `commission_amount`;
    /// bonuses only live in the ledger.
    pub async fn apply_manual_adjustment(
        &self,
        id: CommissionId,
        request: &ManualAdjustmentRequest,
        now: TimeMs,
    ) -> Result<CommissionStatement, LedgerError> {
        let reason = required_reason(&request.reason)?;
        if request.amount.is_zero() {
            return Err(LedgerError::validation("adjustment amount must not be zero"));
        }
        let adjustment_type = AdjustmentType::from(request.kind);

        let mut tx = self.repo.begin().await?;
        let commission = load_or_not_found(&mut tx, id).await?;
        if !matches!(
            commission.status,
            CommissionStatus::Pending | CommissionStatus::Approved | CommissionStatus::Paid
        ) {
            return Err(LedgerError::validation(format!(
                "commission {} is {}; adjustments are not allowed",
                id, commission.status
            )));
        }

        if adjustment_type == AdjustmentType::Correction {
            let corrected = commission
                .commission_amount
                .checked_add(request.amount)
                .ok_or_else(|| {
                    LedgerError::validation(format!(
                        "correction of {} puts commission amount out of range",
                        request.amount
                    ))
                })?;
            if corrected.is_negative() {
                return Err(LedgerError::validation(format!(
                    "correction of {} would drive commission amount {} below zero",
                    request.amount, commission.commission_amount
                )));
            }
            let updated = Repository::update_commission_amount_tx(
                &mut tx,
                id,
                commission.status,
                corrected,
                commission.commission_rate,
                now,
            )
            .await?;
            if updated == 0 {
                return Err(LedgerError::validation(format!(
                    "commission {} changed concurrently; retry the adjustment",
                    id
                )));
            }
        }

        Repository::insert_adjustment_tx(
            &mut tx,
            &NewAdjustment {
                commission_id: id,
                adjustment_type,
                amount: request.amount,
                reason: reason.to_string(),
                reference: None,
                admin_id: request.admin_id.clone(),
            },
            now,
        )
        .await?;

        let statement = statement_tx(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            commission_id = %id,
            adjustment = adjustment_type.as_str(),
            amount = %request.amount,
            net = %statement.net_amount,
            "Manual adjustment applied"
        );
        Ok(statement)
    }

    /// Full clawback: records the deduction and moves the commission to
    /// `clawed_back`.
    pub async fn process_clawback(
        &self,
        id: CommissionId,
        amount: Amount,
        reason: &str,
        admin_id: &ActorId,
        kind: ClawbackKind,
        now: TimeMs,
    ) -> Result<CommissionStatement, LedgerError> {
        self.clawback(id, amount, reason, admin_id, kind, false, now)
            .await
    }

    /// Partial clawback: records the deduction and leaves the status alone.
    pub async fn process_partial_clawback(
        &self,
        id: CommissionId,
        amount: Amount,
        reason: &str,
        admin_id: &ActorId,
        kind: ClawbackKind,
        now: TimeMs,
    ) -> Result<CommissionStatement, LedgerError> {
        self.clawback(id, amount, reason, admin_id, kind, true, now)
            .await
    }

    pub async fn apply_clawback_request(
        &self,
        id: CommissionId,
        request: &ClawbackRequest,
        now: TimeMs,
    ) -> Result<CommissionStatement, LedgerError> {
        self.clawback(
            id,
            request.amount,
            &request.reason,
            &request.admin_id,
            request.kind,
            request.partial,
            now,
        )
        .await
    }

    pub async fn get_commission_with_adjustments(
        &self,
        id: CommissionId,
    ) -> Result<CommissionStatement, LedgerError> {
        let mut conn = self.repo.pool().acquire().await?;
        statement_tx(&mut conn, id).await
    }

    /// Share of commissions converted in `[from, to)` with at least one clawback.
    pub async fn clawback_stats(
        &self,
        from: TimeMs,
        to: TimeMs,
    ) -> Result<ClawbackStats, LedgerError> {
        if to <= from {
            return Err(LedgerError::validation("period end must be after its start"));
        }
        let counts = self.repo.period_counts(from, to).await?;
        Ok(ClawbackStats::new(counts.total, counts.clawed_back))
    }

    #[allow(clippy::too_many_arguments)]
    async fn clawback(
        &self,
        id: CommissionId,
        amount: Amount,
        reason: &str,
        admin_id: &ActorId,
        kind: ClawbackKind,
        partial: bool,
        now: TimeMs,
    ) -> Result<CommissionStatement, LedgerError> {
        let reason = required_reason(reason)?;
        if !amount.is_positive() {
            return Err(LedgerError::validation("clawback amount must be positive"));
        }

        let mut tx = self.repo.begin().await?;
        let commission = load_or_not_found(&mut tx, id).await?;
        let from = commission.status;
        match from {
            CommissionStatus::Approved | CommissionStatus::Paid => {}
            CommissionStatus::Pending => {
                return Err(LedgerError::validation(format!(
                    "commission {} is pending; only approved or paid commissions can be clawed back",
                    id
                )))
            }
            CommissionStatus::Rejected | CommissionStatus::ClawedBack => {
                return Err(LedgerError::InvalidTransition {
                    from,
                    to: CommissionStatus::ClawedBack,
                })
            }
        }

        if partial {
            if amount >= commission.commission_amount {
                return Err(LedgerError::validation(format!(
                    "partial clawback amount {} must be less than commission amount {}",
                    amount, commission.commission_amount
                )));
            }
        } else if amount > commission.commission_amount {
            return Err(LedgerError::validation(format!(
                "clawback amount {} cannot exceed original commission amount {}",
                amount, commission.commission_amount
            )));
        }

        Repository::insert_adjustment_tx(
            &mut tx,
            &NewAdjustment {
                commission_id: id,
                adjustment_type: AdjustmentType::Clawback,
                amount: -amount,
                reason: reason.to_string(),
                reference: Some(kind.as_str().to_string()),
                admin_id: admin_id.clone(),
            },
            now,
        )
        .await?;

        if !partial {
            let updated = Repository::update_commission_status_tx(
                &mut tx,
                id,
                from,
                CommissionStatus::ClawedBack,
                None,
                now,
            )
            .await?;
            if updated == 0 {
                let current = load_or_not_found(&mut tx, id).await?;
                return Err(LedgerError::InvalidTransition {
                    from: current.status,
                    to: CommissionStatus::ClawedBack,
                });
            }
            Repository::insert_adjustment_tx(
                &mut tx,
                &NewAdjustment::status_change(
                    id,
                    from,
                    CommissionStatus::ClawedBack,
                    Some(kind.as_str()),
                    admin_id,
                ),
                now,
            )
            .await?;
        }

        let statement = statement_tx(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            commission_id = %id,
            amount = %amount,
            kind = kind.as_str(),
            partial,
            net = %statement.net_amount,
            "Clawback processed"
        );
        Ok(statement)
    }
}

fn required_reason(reason: &str) -> Result<&str, LedgerError> {
    let reason = reason.trim();
    if reason.is_empty() {
        Err(LedgerError::validation("a reason is required"))
    } else {
        Ok(reason)
    }
}

async fn statement_tx(
    conn: &mut SqliteConnection,
    id: CommissionId,
) -> Result<CommissionStatement, LedgerError> {
    let commission = load_or_not_found(&mut *conn, id).await?;
    let adjustments = Repository::list_adjustments_tx(&mut *conn, id).await?;
    let net_amount = net_amount(commission.commission_amount, &adjustments)?;
    let clawed_back = clawed_back_total(&adjustments)?.abs();
    Ok(CommissionStatement {
        commission,
        adjustments,
        net_amount,
        clawed_back,
    })
}
