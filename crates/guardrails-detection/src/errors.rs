use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use guardrails_shared::GuardrailsError;
use serde_json::json;

/// Thin wrapper giving `GuardrailsError` an `IntoResponse` impl local to this
/// binary, matching the teacher's per-service error-to-status mapping.
pub struct ApiError(pub GuardrailsError);

impl From<GuardrailsError> for ApiError {
    fn from(e: GuardrailsError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            GuardrailsError::AuthenticationFailed => StatusCode::UNAUTHORIZED,
            GuardrailsError::AuthorizationFailed => StatusCode::FORBIDDEN,
            GuardrailsError::TenantNotFound | GuardrailsError::NotFound(_) => StatusCode::NOT_FOUND,
            GuardrailsError::ValidationError(_) | GuardrailsError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GuardrailsError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            GuardrailsError::Banned { .. } => StatusCode::FORBIDDEN,
            GuardrailsError::ImageError(_) => StatusCode::BAD_REQUEST,
            GuardrailsError::ClassifierError(_) | GuardrailsError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            GuardrailsError::DatabaseError(_)
            | GuardrailsError::InternalError(_)
            | GuardrailsError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if matches!(status, StatusCode::INTERNAL_SERVER_ERROR | StatusCode::BAD_GATEWAY) {
            tracing::error!(error = %self.0, "request failed");
        }

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}
