//! Maps engine errors onto the HTTP envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::OracleError;

use super::envelope::{meta_now, Envelope};

/// Thin wrapper so handlers can return `Result<T, ApiError>` and rely on
/// `?` from both `OracleError` and ad hoc validation failures.
#[derive(Debug)]
pub struct ApiError(OracleError);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            OracleError::Validation(_) | OracleError::TomlDe(_) => StatusCode::BAD_REQUEST,
            OracleError::NotFound(_) => StatusCode::NOT_FOUND,
            OracleError::BudgetExceeded(_) => StatusCode::PAYMENT_REQUIRED,
            OracleError::Forbidden(_) => StatusCode::FORBIDDEN,
            OracleError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            OracleError::Database(_)
            | OracleError::Migration(_)
            | OracleError::Io(_)
            | OracleError::Serialization(_)
            | OracleError::Config(_)
            | OracleError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match &self.0 {
            OracleError::Database(_) | OracleError::Migration(_) | OracleError::Io(_) | OracleError::Internal(_) => {
                "internal error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<OracleError> for ApiError {
    fn from(err: OracleError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    meta: super::envelope::ResponseMeta,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            success: false,
            error: self.message(),
            meta: meta_now(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Envelope<T>, ApiError>;
