use axum::Json;
use axum::http::StatusCode;
use serde::Serialize;

use crate::modules::registration::schema::{FieldError, FieldErrors};

/// Canonical JSON payload for error responses. Validation failures carry
/// their field-scoped details alongside the summary message.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldError>,
}

impl ApiMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(message: impl Into<String>, errors: FieldErrors) -> Self {
        Self {
            message: message.into(),
            details: errors.into_vec(),
        }
    }
}

/// Helper for controllers that need to return `(StatusCode, Json<ApiMessage>)`.
pub fn json_error(
    status: StatusCode,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiMessage>) {
    (status, Json(ApiMessage::new(message)))
}

/// 400 response carrying every failing field from a validation pass.
pub fn json_validation_error(
    message: impl Into<String>,
    errors: FieldErrors,
) -> (StatusCode, Json<ApiMessage>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ApiMessage::with_details(message, errors)),
    )
}
