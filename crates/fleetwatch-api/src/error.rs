use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use fleetwatch_domain::ValidationErrors;

/// API error type mapped onto HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed input; carries every violated field
    Validation(ValidationErrors),
    /// Downstream failure (event bus, collaborators)
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                let body = json!({
                    "error": "validation_failed",
                    "errors": errors.errors,
                });
                (StatusCode::BAD_REQUEST, Json(body)).into_response()
            }
            Self::Internal(message) => {
                tracing::error!(error = %message, "internal API error");
                let body = json!({ "error": "internal_error" });
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}
