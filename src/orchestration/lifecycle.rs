//! Commission lifecycle: creation, status transitions, recalculation and
//! bulk approval.
//!
//! Every write runs in one transaction covering the read, the status
//! compare-and-set, and the audit adjustment.

use crate::datasource::CatalogSource;
use crate::db::repo::is_unique_violation;
use crate::db::Repository;
use crate::domain::{
    ActorId, AdjustmentType, Amount, Commission, CommissionId, CommissionOverride,
    CommissionStatus, ConversionEvent, NewAdjustment, NewCommission, Product, TimeMs,
    TrackingCode,
};
use crate::engine::{calculate, override_quote};
use crate::error::LedgerError;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};

/// Status-changing action requested by an admin or a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionAction {
    Approve,
    Reject,
    MarkPaid,
}

impl CommissionAction {
    pub fn target(&self) -> CommissionStatus {
        match self {
            CommissionAction::Approve => CommissionStatus::Approved,
            CommissionAction::Reject => CommissionStatus::Rejected,
            CommissionAction::MarkPaid => CommissionStatus::Paid,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    pub action: CommissionAction,
    pub actor_id: ActorId,
    #[serde(default)]
    pub reason: Option<String>,
    /// Approve before the clearance period has elapsed.
    #[serde(default)]
    pub bypass_clearance: bool,
    #[serde(default)]
    pub payment_reference: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApprovalFailure {
    pub commission_id: CommissionId,
    pub error: String,
}

/// Outcome of one bulk approval run.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApprovalReport {
    pub approved: Vec<CommissionId>,
    /// Left the pending state before this run reached them.
    pub skipped: Vec<CommissionId>,
    pub failures: Vec<BulkApprovalFailure>,
}

#[derive(Clone)]
pub struct CommissionManager {
    repo: Arc<Repository>,
    catalog: Arc<dyn CatalogSource>,
    default_clearance_days: i64,
}

impl CommissionManager {
    pub fn new(
        repo: Arc<Repository>,
        catalog: Arc<dyn CatalogSource>,
        default_clearance_days: i64,
    ) -> Self {
        Self {
            repo,
            catalog,
            default_clearance_days,
        }
    }

    /// Create a pending commission.
    pub async fn create(&self, new: NewCommission, now: TimeMs) -> Result<Commission, LedgerError> {
        if new.tracking_code.as_str().trim().is_empty() {
            return Err(LedgerError::validation("trackingCode is required"));
        }
        if new.initial_spend_amount.is_negative() {
            return Err(LedgerError::validation(format!(
                "spend amount {} must not be negative",
                new.initial_spend_amount
            )));
        }
        let clearance_period_days = new
            .clearance_period_days
            .unwrap_or(self.default_clearance_days);
        if clearance_period_days < 0 {
            return Err(LedgerError::validation(
                "clearance period must not be negative",
            ));
        }

        let marketer = self
            .catalog
            .get_active_marketer(&new.marketer_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("marketer {}", new.marketer_id)))?;
        if !marketer.can_earn() {
            return Err(LedgerError::validation(format!(
                "marketer {} is not an active marketer",
                new.marketer_id
            )));
        }

        let product = self.load_product(&new).await?;
        if !product.is_active {
            return Err(LedgerError::validation(format!(
                "product {} is not active",
                product.id
            )));
        }
        if !new.overrides.override_rules {
            if let Some(minimum) = product.minimum_spend {
                if new.initial_spend_amount < minimum {
                    return Err(LedgerError::validation(format!(
                        "spend amount {} is below minimum required {}",
                        new.initial_spend_amount, minimum
                    )));
                }
            }
        }

        let quote = match override_quote(new.initial_spend_amount, &new.overrides)? {
            Some(quote) => quote,
            None => calculate(
                new.initial_spend_amount,
                &product.commission_rules()?,
                &new.overrides,
            )?,
        };

        let commission = Commission {
            id: CommissionId(0),
            marketer_id: new.marketer_id,
            customer_id: new.customer_id,
            product_id: new.product_id,
            tracking_code: new.tracking_code,
            initial_spend_amount: new.initial_spend_amount,
            commission_rate: quote.commission_rate,
            commission_amount: quote.commission_amount,
            status: CommissionStatus::Pending,
            conversion_date: new.conversion_date,
            approval_date: None,
            clearance_period_days,
            eligible_for_payout_date: new.conversion_date.plus_days(clearance_period_days),
            created_at: now,
            updated_at: now,
        };

        let mut tx = self.repo.begin().await?;
        if let Some(existing) = Repository::find_commission_for_triple_tx(
            &mut tx,
            &commission.customer_id,
            &commission.product_id,
            &commission.tracking_code,
        )
        .await?
        {
            return Err(LedgerError::duplicate(
                "a commission already exists for this customer, product and tracking code",
                Some(existing.id.0),
            ));
        }

        let id = match Repository::insert_commission_tx(&mut tx, &commission).await {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => {
                return Err(LedgerError::duplicate(
                    "a commission already exists for this customer, product and tracking code",
                    None,
                ))
            }
            Err(e) => return Err(e.into()),
        };
        tx.commit().await?;

        info!(
            commission_id = %id,
            marketer_id = %commission.marketer_id,
            amount = %commission.commission_amount,
            "Commission created"
        );
        Ok(Commission { id, ..commission })
    }

    /// Create the commission owed for a recorded, attributed conversion.
    pub async fn create_from_conversion(
        &self,
        conversion: &ConversionEvent,
        overrides: CommissionOverride,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        if !conversion.commission_eligible {
            return Err(LedgerError::validation(format!(
                "conversion {} is not eligible for commission",
                conversion.id
            )));
        }
        let marketer_id = conversion.marketer_id.clone().ok_or_else(|| {
            LedgerError::validation(format!("conversion {} has no marketer", conversion.id))
        })?;
        if conversion.tracking_code.is_empty() {
            return Err(LedgerError::validation(format!(
                "conversion {} has no tracking code",
                conversion.id
            )));
        }

        self.create(
            NewCommission {
                marketer_id,
                customer_id: conversion.customer_id.clone(),
                product_id: conversion.product_id.clone(),
                tracking_code: TrackingCode::new(conversion.tracking_code.clone()),
                initial_spend_amount: conversion.initial_spend_amount,
                conversion_date: conversion.conversion_timestamp,
                clearance_period_days: None,
                overrides,
            },
            now,
        )
        .await
    }

    pub async fn get(&self, id: CommissionId) -> Result<Commission, LedgerError> {
        self.repo
            .get_commission(id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("commission {}", id)))
    }

    /// Approve a pending commission once its clearance period has elapsed,
    /// or earlier when `bypass_clearance` is set.
    pub async fn approve(
        &self,
        id: CommissionId,
        actor: &ActorId,
        bypass_clearance: bool,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        self.apply_transition(
            id,
            CommissionStatus::Approved,
            actor,
            None,
            None,
            bypass_clearance,
            now,
        )
        .await
    }

    pub async fn reject(
        &self,
        id: CommissionId,
        actor: &ActorId,
        reason: &str,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(LedgerError::validation("a reason is required to reject"));
        }
        self.apply_transition(
            id,
            CommissionStatus::Rejected,
            actor,
            Some(reason),
            None,
            false,
            now,
        )
        .await
    }

    pub async fn mark_paid(
        &self,
        id: CommissionId,
        actor: &ActorId,
        payment_reference: Option<&str>,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        let payment_reference = payment_reference.map(str::trim).filter(|r| !r.is_empty());
        self.apply_transition(
            id,
            CommissionStatus::Paid,
            actor,
            None,
            payment_reference,
            false,
            now,
        )
        .await
    }

    /// Dispatch a status change by action name.
    pub async fn transition(
        &self,
        id: CommissionId,
        request: &TransitionRequest,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        match request.action {
            CommissionAction::Approve => {
                self.approve(id, &request.actor_id, request.bypass_clearance, now)
                    .await
            }
            CommissionAction::Reject => {
                self.reject(
                    id,
                    &request.actor_id,
                    request.reason.as_deref().unwrap_or(""),
                    now,
                )
                .await
            }
            CommissionAction::MarkPaid => {
                self.mark_paid(id, &request.actor_id, request.payment_reference.as_deref(), now)
                    .await
            }
        }
    }

    /// Re-derive amount and rate for a pending commission and record the
    /// delta as a correction.
    pub async fn recalculate(
        &self,
        id: CommissionId,
        actor: &ActorId,
        overrides: CommissionOverride,
        reason: Option<&str>,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        let current = self.get(id).await?;
        if current.status != CommissionStatus::Pending {
            return Err(LedgerError::validation(format!(
                "commission {} is {}; only pending commissions can be recalculated",
                id, current.status
            )));
        }

        let overrides = CommissionOverride {
            override_rules: true,
            ..overrides
        };
        let quote = match override_quote(current.initial_spend_amount, &overrides)? {
            Some(quote) => quote,
            None => {
                let product = self
                    .catalog
                    .get_active_product(&current.product_id)
                    .await?
                    .ok_or_else(|| {
                        LedgerError::not_found(format!("product {}", current.product_id))
                    })?;
                calculate(
                    current.initial_spend_amount,
                    &product.commission_rules()?,
                    &overrides,
                )?
            }
        };

        let mut tx = self.repo.begin().await?;
        let commission = load_or_not_found(&mut tx, id).await?;
        let delta = quote.commission_amount - commission.commission_amount;

        let updated = Repository::update_commission_amount_tx(
            &mut tx,
            id,
            CommissionStatus::Pending,
            quote.commission_amount,
            quote.commission_rate,
            now,
        )
        .await?;
        if updated == 0 {
            return Err(LedgerError::validation(format!(
                "commission {} is {}; only pending commissions can be recalculated",
                id, commission.status
            )));
        }

        let reason = match reason.map(str::trim).filter(|r| !r.is_empty()) {
            Some(r) => format!("recalculated: {}", r),
            None => "recalculated".to_string(),
        };
        Repository::insert_adjustment_tx(
            &mut tx,
            &NewAdjustment {
                commission_id: id,
                adjustment_type: AdjustmentType::Correction,
                amount: delta,
                reason,
                reference: None,
                admin_id: actor.clone(),
            },
            now,
        )
        .await?;

        let commission = load_or_not_found(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            commission_id = %id,
            delta = %delta,
            amount = %commission.commission_amount,
            "Commission recalculated"
        );
        Ok(commission)
    }

    /// Approve every pending commission whose clearance period has elapsed.
    /// Each approval commits on its own; failures are collected.
    pub async fn bulk_approve_eligible(
        &self,
        actor: &ActorId,
        now: TimeMs,
    ) -> Result<BulkApprovalReport, LedgerError> {
        let eligible = self.repo.list_eligible_pending(now).await?;
        let mut report = BulkApprovalReport::default();

        for commission in eligible {
            match self.approve(commission.id, actor, false, now).await {
                Ok(_) => report.approved.push(commission.id),
                Err(LedgerError::InvalidTransition { .. }) => report.skipped.push(commission.id),
                Err(e) => {
                    warn!(commission_id = %commission.id, error = %e, "Bulk approval failed");
                    report.failures.push(BulkApprovalFailure {
                        commission_id: commission.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            approved = report.approved.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Bulk approval finished"
        );
        Ok(report)
    }

    async fn load_product(&self, new: &NewCommission) -> Result<Product, LedgerError> {
        self.catalog
            .get_active_product(&new.product_id)
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("product {}", new.product_id)))
    }

    #[allow(clippy::too_many_arguments)]
    async fn apply_transition(
        &self,
        id: CommissionId,
        to: CommissionStatus,
        actor: &ActorId,
        reason: Option<&str>,
        payment_reference: Option<&str>,
        bypass_clearance: bool,
        now: TimeMs,
    ) -> Result<Commission, LedgerError> {
        let mut tx = self.repo.begin().await?;
        let commission = load_or_not_found(&mut tx, id).await?;
        let from = commission.status;

        if !from.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition { from, to });
        }
        if to == CommissionStatus::Approved && !bypass_clearance && !commission.is_cleared(now) {
            return Err(LedgerError::validation(format!(
                "commission {} is in its clearance period until {}",
                id, commission.eligible_for_payout_date
            )));
        }

        let approval_date = (to == CommissionStatus::Approved).then_some(now);
        let updated =
            Repository::update_commission_status_tx(&mut tx, id, from, to, approval_date, now)
                .await?;
        if updated == 0 {
            let current = load_or_not_found(&mut tx, id).await?;
            return Err(LedgerError::InvalidTransition {
                from: current.status,
                to,
            });
        }

        let audit_reason = match (bypass_clearance && to == CommissionStatus::Approved, reason) {
            (true, Some(r)) => Some(format!("clearance bypassed; {}", r)),
            (true, None) => Some("clearance bypassed".to_string()),
            (false, r) => r.map(str::to_string),
        };
        Repository::insert_adjustment_tx(
            &mut tx,
            &NewAdjustment::status_change(id, from, to, audit_reason.as_deref(), actor),
            now,
        )
        .await?;

        if let Some(reference) = payment_reference {
            Repository::insert_adjustment_tx(
                &mut tx,
                &NewAdjustment {
                    commission_id: id,
                    adjustment_type: AdjustmentType::Payment,
                    amount: Amount::ZERO,
                    reason: "payout".to_string(),
                    reference: Some(reference.to_string()),
                    admin_id: actor.clone(),
                },
                now,
            )
            .await?;
        }

        let commission = load_or_not_found(&mut tx, id).await?;
        tx.commit().await?;

        info!(
            commission_id = %id,
            from = %from,
            to = %to,
            actor = %actor,
            "Commission status changed"
        );
        Ok(commission)
    }
}

pub(crate) async fn load_or_not_found(
    conn: &mut SqliteConnection,
    id: CommissionId,
) -> Result<Commission, LedgerError> {
    Repository::load_commission_tx(conn, id)
        .await?
        .ok_or_else(|| LedgerError::not_found(format!("commission {}", id)))
}
