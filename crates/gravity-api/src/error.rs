//! API error types and JSON error response formatting.
//!
//! Every failure leaves the server as `{"error": code, "message": text}`
//! with a status code chosen by what the caller can do about it.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::error;

use gravity_action::ActionError;
use gravity_chat::ChatError;

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. "conflict", "gone").
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - malformed body or message.
    BadRequest(String),
    /// 404 - unknown session or action.
    NotFound(String),
    /// 409 - the action is no longer awaiting confirmation.
    Conflict(String),
    /// 410 - the confirmation window has passed.
    Gone(String),
    /// 422 - action parameters failed validation.
    UnprocessableEntity(String),
    /// 500
    Internal(String),
    /// 502 - the external system rejected the mutation.
    BadGateway(String),
    /// 503 - no source could answer, or nothing can execute the action.
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Gone(msg) => (StatusCode::GONE, "gone", msg),
            ApiError::UnprocessableEntity(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "unprocessable_entity", msg)
            }
            ApiError::Internal(msg) => {
                error!(error = %msg, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "action_failed", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        let message = err.to_string();
        match err {
            ChatError::EmptyMessage | ChatError::MessageTooLong(_) => ApiError::BadRequest(message),
            ChatError::NoSourcesAvailable(_) => ApiError::ServiceUnavailable(message),
            ChatError::Action(action) => action.into(),
            ChatError::Vector(_)
            | ChatError::Classifier(_)
            | ChatError::Synthesis(_)
            | ChatError::SessionLock(_) => ApiError::Internal(message),
        }
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        let message = err.to_string();
        match err {
            ActionError::Validation(_) => ApiError::UnprocessableEntity(message),
            ActionError::Stale(_) => ApiError::Conflict(message),
            ActionError::Expired(_) => ApiError::Gone(message),
            ActionError::Execution { .. } => ApiError::BadGateway(message),
            ActionError::NoConnector(_) => ApiError::ServiceUnavailable(message),
            ActionError::InvalidTransition(..) | ActionError::Ledger(_) => {
                ApiError::Internal(message)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
