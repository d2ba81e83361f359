use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

use super::AppState;
use crate::domain::{ClickEvent, NewClick, TimeMs};
use crate::error::{AppError, LedgerError};

pub async fn record_click(
    State(state): State<AppState>,
    Json(click): Json<NewClick>,
) -> Result<(StatusCode, Json<ClickEvent>), AppError> {
    if click.tracking_code.as_str().trim().is_empty() {
        return Err(AppError::BadRequest("trackingCode is required".to_string()));
    }
    if click.session_id.trim().is_empty() {
        return Err(AppError::BadRequest("sessionId is required".to_string()));
    }

    let event = state
        .repo
        .record_click(click, TimeMs::now())
        .await
        .map_err(LedgerError::from)?;
    Ok((StatusCode::CREATED, Json(event)))
}
