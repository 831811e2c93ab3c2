//! API error type and the `{status, message, data}` response envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::booking::BookingError;
use crate::core_state::CoreError;
use crate::webhook::WebhookError;

/// Message shown for every internal failure.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

// ═══════════════════════════════════════════════════════════
// Success envelope
// ═══════════════════════════════════════════════════════════

/// Successful response: `{ "status": 200, "message": "...", "data": ... }`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    #[serde(skip)]
    code: StatusCode,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::OK, message, Some(data))
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self::with_status(StatusCode::CREATED, message, Some(data))
    }

    fn with_status(code: StatusCode, message: impl Into<String>, data: Option<T>) -> Self {
        Self {
            code,
            status: code.as_u16(),
            message: message.into(),
            data,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self::with_status(StatusCode::OK, message, None)
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}

// ═══════════════════════════════════════════════════════════
// Error envelope
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub status: u16,
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// API-level errors with HTTP status mapping.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,
    /// Authenticated, but not one of the parties the resource belongs to.
    #[error("You're not authorized!")]
    NotAuthorized,
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    /// A search or listing came back empty: 404 with `data: []`.
    #[error("Empty result: {0}")]
    Empty(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The operation failed in a way the client must hear about; the
    /// message is safe to show.
    #[error("Operation failed: {0}")]
    Failed(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "AUTH_REQUIRED",
                "Authentication required".to_string(),
            ),
            ApiError::NotAuthorized => (
                StatusCode::UNAUTHORIZED,
                "NOT_AUTHORIZED",
                "You're not authorized!".to_string(),
            ),
            ApiError::BadRequest(detail) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", detail.clone()),
            ApiError::Forbidden(detail) => (StatusCode::FORBIDDEN, "FORBIDDEN", detail.clone()),
            ApiError::NotFound(detail) | ApiError::Empty(detail) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", detail.clone())
            }
            ApiError::Conflict(detail) => (StatusCode::CONFLICT, "CONFLICT", detail.clone()),
            ApiError::Failed(detail) => (StatusCode::INTERNAL_SERVER_ERROR, "FAILED", detail.clone()),
            ApiError::Internal(detail) => {
                tracing::error!(detail, "API internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    INTERNAL_MESSAGE.to_string(),
                )
            }
        };

        let data = match &self {
            ApiError::Empty(_) => Some(Value::Array(Vec::new())),
            _ => None,
        };

        let body = ErrorBody {
            status: status.as_u16(),
            code,
            message,
            data,
        };
        (status, Json(body)).into_response()
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Validation(msg) | BookingError::IllegalTransition(msg) => {
                ApiError::BadRequest(msg)
            }
            BookingError::NotFound(msg) => ApiError::NotFound(msg),
            BookingError::Conflict => ApiError::Conflict(BookingError::Conflict.to_string()),
            BookingError::Forbidden(msg) => ApiError::Forbidden(msg),
            BookingError::NotificationFailure(ref reason) => {
                tracing::error!(reason = %reason, "Approval notification failed");
                ApiError::Failed(err.to_string())
            }
            BookingError::PartialFailure {
                appointment_id,
                ref reason,
            } => {
                tracing::error!(%appointment_id, reason = %reason, "Appointment deleted with stale list entries");
                ApiError::Failed(err.to_string())
            }
            BookingError::Database(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<rusqlite::Error> for ApiError {
    fn from(err: rusqlite::Error) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<crate::db::DatabaseError> for ApiError {
    fn from(err: crate::db::DatabaseError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        match err {
            WebhookError::MalformedBody(_) => ApiError::BadRequest(err.to_string()),
            other => {
                tracing::warn!(error = %other, "Webhook rejected");
                ApiError::Unauthorized
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use uuid::Uuid;

    async fn body_json(response: Response) -> Value {
        let body = to_bytes(response.into_body(), 4096).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn unauthorized_returns_401() {
        let response = ApiError::Unauthorized.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["code"], "AUTH_REQUIRED");
        assert_eq!(json["status"], 401);
    }

    #[tokio::test]
    async fn internal_hides_detail() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], INTERNAL_MESSAGE);
    }

    #[tokio::test]
    async fn empty_result_is_404_with_empty_data() {
        let response = ApiError::Empty("No reviews found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["message"], "No reviews found");
        assert_eq!(json["data"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn booking_conflict_maps_to_409() {
        let response = ApiError::from(BookingError::Conflict).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let json = body_json(response).await;
        assert_eq!(
            json["message"],
            "Appointment time range conflicts with an existing appointment."
        );
    }

    #[tokio::test]
    async fn illegal_transition_maps_to_400() {
        let err = BookingError::IllegalTransition("Appointment has expired!".into());
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Appointment has expired!");
    }

    #[tokio::test]
    async fn partial_failure_is_500_with_visible_message() {
        let err = BookingError::PartialFailure {
            appointment_id: Uuid::new_v4(),
            reason: "no such table".into(),
        };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(response).await;
        assert_eq!(json["message"], "An error occurred while deleting the appointment");
    }

    #[tokio::test]
    async fn success_envelope_carries_status_and_data() {
        let response = ApiResponse::created("Created", serde_json::json!({"id": 1})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        let json = body_json(response).await;
        assert_eq!(json["status"], 201);
        assert_eq!(json["data"]["id"], 1);
    }

    #[tokio::test]
    async fn bad_signature_maps_to_401() {
        let response = ApiError::from(WebhookError::InvalidSignature).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
