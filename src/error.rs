use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::dataset::DatasetError;

/// Closed error taxonomy surfaced by the API, each variant with its own
/// status code.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A source CSV is missing, unreadable, or empty after filtering (503).
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    /// A source CSV does not match the expected column layout (422).
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The model cache could not be populated (503).
    #[error("Model not trained: {0}")]
    ModelNotTrained(String),

    /// Anything else (500).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::DataUnavailable(_) | ApiError::ModelNotTrained(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::SchemaMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = axum::Json(json!({
            "error": self.to_string(),
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<DatasetError> for ApiError {
    fn from(error: DatasetError) -> Self {
        match error {
            DatasetError::Io { .. } | DatasetError::Empty(_) => {
                ApiError::DataUnavailable(error.to_string())
            }
            DatasetError::Csv { .. } | DatasetError::Schema(_) => {
                ApiError::SchemaMismatch(error.to_string())
            }
        }
    }
}

/// Result type alias for route handlers.
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;

    #[test]
    fn status_codes_follow_taxonomy() {
        let cases = [
            (
                ApiError::DataUnavailable("keystats.csv".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::SchemaMismatch("missing Ticker".into()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::ModelNotTrained("no rows".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            let response = error.into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
