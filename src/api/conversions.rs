use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::AppState;
use crate::domain::{ConversionCandidate, DeduplicationResult, TimeMs};
use crate::error::AppError;
use crate::orchestration::RecordedConversion;

pub async fn record_conversion(
    State(state): State<AppState>,
    Json(candidate): Json<ConversionCandidate>,
) -> Result<(StatusCode, Json<RecordedConversion>), AppError> {
    let recorded = state.recorder.record(candidate, TimeMs::now()).await?;
    Ok((StatusCode::CREATED, Json(recorded)))
}

pub async fn check_deduplication(
    State(state): State<AppState>,
    Json(candidate): Json<ConversionCandidate>,
) -> Result<Json<DeduplicationResult>, AppError> {
    let result = state
        .recorder
        .check_deduplication(&candidate, TimeMs::now())
        .await;
    Ok(Json(result))
}
