use crate::datasource::DataSourceError;
use crate::domain::{CommissionStatus, MissingRuleField};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Error taxonomy of the attribution and commission core.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Commission rules are missing a required field. Not retryable.
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("{0}")]
    Validation(String),
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        from: CommissionStatus,
        to: CommissionStatus,
    },
    #[error("not found: {0}")]
    NotFound(String),
    /// The record already exists. Distinct from validation so callers can
    /// branch on "already recorded".
    #[error("duplicate: {message}")]
    Duplicate {
        message: String,
        existing_id: Option<i64>,
    },
    /// Datastore unavailable or failing. Writes must be retried by the caller.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        LedgerError::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        LedgerError::NotFound(msg.into())
    }

    pub fn duplicate(msg: impl Into<String>, existing_id: Option<i64>) -> Self {
        LedgerError::Duplicate {
            message: msg.into(),
            existing_id,
        }
    }

    /// Short machine-readable tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::Configuration(_) => "configuration",
            LedgerError::Validation(_) => "validation",
            LedgerError::InvalidTransition { .. } => "invalid_transition",
            LedgerError::NotFound(_) => "not_found",
            LedgerError::Duplicate { .. } => "duplicate",
            LedgerError::Infrastructure(_) => "infrastructure",
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Infrastructure(err.to_string())
    }
}

impl From<DataSourceError> for LedgerError {
    fn from(err: DataSourceError) -> Self {
        LedgerError::Infrastructure(err.to_string())
    }
}

impl From<MissingRuleField> for LedgerError {
    fn from(err: MissingRuleField) -> Self {
        LedgerError::Configuration(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, kind, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Ledger(err) => {
                let status = match &err {
                    LedgerError::Configuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    LedgerError::Validation(_) | LedgerError::InvalidTransition { .. } => {
                        StatusCode::BAD_REQUEST
                    }
                    LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
                    LedgerError::Duplicate { .. } => StatusCode::CONFLICT,
                    LedgerError::Infrastructure(_) => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, err.kind(), err.to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_map_to_status_codes() {
        let cases = [
            (LedgerError::Configuration("x".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (LedgerError::validation("x"), StatusCode::BAD_REQUEST),
            (
                LedgerError::InvalidTransition {
                    from: CommissionStatus::Rejected,
                    to: CommissionStatus::Approved,
                },
                StatusCode::BAD_REQUEST,
            ),
            (LedgerError::not_found("x"), StatusCode::NOT_FOUND),
            (LedgerError::duplicate("x", Some(1)), StatusCode::CONFLICT),
            (
                LedgerError::Infrastructure("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, expected) in cases {
            let resp = AppError::from(err).into_response();
            assert_eq!(resp.status(), expected);
        }
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = LedgerError::InvalidTransition {
            from: CommissionStatus::Paid,
            to: CommissionStatus::Approved,
        };
        assert_eq!(err.to_string(), "invalid transition from paid to approved");
    }
}
