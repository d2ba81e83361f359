use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use super::AppState;
use crate::domain::{
    ActorId, Amount, Commission, CommissionId, CommissionOverride, CommissionQuote,
    CommissionRules, NewCommission, ProductId, TimeMs,
};
use crate::engine::{calculate, ClawbackStats};
use crate::error::{AppError, LedgerError};
use crate::orchestration::{
    BulkApprovalReport, ClawbackRequest, CommissionStatement, ManualAdjustmentRequest,
    TransitionRequest,
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub spend_amount: Amount,
    /// Inline rules; takes precedence over `product_id`.
    #[serde(default)]
    pub rules: Option<CommissionRules>,
    #[serde(default)]
    pub product_id: Option<ProductId>,
    #[serde(flatten)]
    pub overrides: CommissionOverride,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecalculateRequest {
    pub actor_id: ActorId,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub overrides: CommissionOverride,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkApproveRequest {
    pub actor_id: ActorId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClawbackStatsParams {
    pub from_ms: i64,
    pub to_ms: i64,
}

pub async fn quote(
    State(state): State<AppState>,
    Json(request): Json<QuoteRequest>,
) -> Result<Json<CommissionQuote>, AppError> {
    let rules = match (request.rules, request.product_id) {
        (Some(rules), _) => rules,
        (None, Some(product_id)) => {
            let product = state
                .catalog
                .get_active_product(&product_id)
                .await
                .map_err(LedgerError::from)?
                .ok_or_else(|| LedgerError::not_found(format!("product {}", product_id)))?;
            product.commission_rules().map_err(LedgerError::from)?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "either rules or productId is required".to_string(),
            ))
        }
    };

    let quote = calculate(request.spend_amount, &rules, &request.overrides)?;
    Ok(Json(quote))
}

pub async fn create_commission(
    State(state): State<AppState>,
    Json(new): Json<NewCommission>,
) -> Result<(StatusCode, Json<Commission>), AppError> {
    let commission = state.commissions.create(new, TimeMs::now()).await?;
    Ok((StatusCode::CREATED, Json(commission)))
}

pub async fn create_from_conversion(
    Path(conversion_id): Path<i64>,
    State(state): State<AppState>,
    body: Option<Json<CommissionOverride>>,
) -> Result<(StatusCode, Json<Commission>), AppError> {
    let conversion = state
        .repo
        .get_conversion(conversion_id)
        .await
        .map_err(LedgerError::from)?
        .ok_or_else(|| LedgerError::not_found(format!("conversion {}", conversion_id)))?;
    let overrides = body.map(|Json(o)| o).unwrap_or_default();

    let commission = state
        .commissions
        .create_from_conversion(&conversion, overrides, TimeMs::now())
        .await?;
    Ok((StatusCode::CREATED, Json(commission)))
}

pub async fn get_commission(
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<Json<CommissionStatement>, AppError> {
    let statement = state
        .ledger
        .get_commission_with_adjustments(CommissionId(id))
        .await?;
    Ok(Json(statement))
}

pub async fn transition(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<TransitionRequest>,
) -> Result<Json<Commission>, AppError> {
    let commission = state
        .commissions
        .transition(CommissionId(id), &request, TimeMs::now())
        .await?;
    Ok(Json(commission))
}

pub async fn recalculate(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<RecalculateRequest>,
) -> Result<Json<Commission>, AppError> {
    let commission = state
        .commissions
        .recalculate(
            CommissionId(id),
            &request.actor_id,
            request.overrides,
            request.reason.as_deref(),
            TimeMs::now(),
        )
        .await?;
    Ok(Json(commission))
}

pub async fn apply_adjustment(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<ManualAdjustmentRequest>,
) -> Result<(StatusCode, Json<CommissionStatement>), AppError> {
    let statement = state
        .ledger
        .apply_manual_adjustment(CommissionId(id), &request, TimeMs::now())
        .await?;
    Ok((StatusCode::CREATED, Json(statement)))
}

pub async fn clawback(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Json(request): Json<ClawbackRequest>,
) -> Result<(StatusCode, Json<CommissionStatement>), AppError> {
    let statement = state
        .ledger
        .apply_clawback_request(CommissionId(id), &request, TimeMs::now())
        .await?;
    Ok((StatusCode::CREATED, Json(statement)))
}

pub async fn bulk_approve(
    State(state): State<AppState>,
    Json(request): Json<BulkApproveRequest>,
) -> Result<Json<BulkApprovalReport>, AppError> {
    let report = state
        .commissions
        .bulk_approve_eligible(&request.actor_id, TimeMs::now())
        .await?;
    Ok(Json(report))
}

pub async fn clawback_stats(
    Query(params): Query<ClawbackStatsParams>,
    State(state): State<AppState>,
) -> Result<Json<ClawbackStats>, AppError> {
    let stats = state
        .ledger
        .clawback_stats(TimeMs(params.from_ms), TimeMs(params.to_ms))
        .await?;
    Ok(Json(stats))
}
