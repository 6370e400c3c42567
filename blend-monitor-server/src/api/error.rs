use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use super::types::{ErrorDetails, ErrorResponse};
use crate::db::DbError;
use crate::sync::SourcesUnavailable;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    SourcesUnavailable(#[from] SourcesUnavailable),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::SourcesUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            DbError::Conflict(reason) => ApiError::Conflict(reason),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::SourcesUnavailable(e) => ErrorResponse {
                success: false,
                error: format!("Failed to load {}", e.kind),
                details: Some(ErrorDetails {
                    database: e.database,
                    npm: e.npm,
                    suggestion: "Check database connectivity and registry reachability, then run POST /api/npm/sync".to_string(),
                }),
            },
            other => {
                if status.is_server_error() {
                    tracing::error!("Request failed ({}): {}", status, other);
                }
                ErrorResponse {
                    success: false,
                    error: other.to_string(),
                    details: None,
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
