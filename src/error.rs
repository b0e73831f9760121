use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{coordinator::CoordinatorError, dao::storage::StorageError, state::lifecycle::QuizState};

/// Engine-level error taxonomy. Hot-path handlers translate every variant
/// into the normalized envelope with a stable string code.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("authentication required: {0}")]
    AuthRequired(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("illegal quiz transition {from:?} -> {to:?}")]
    InvalidTransition { from: QuizState, to: QuizState },
    #[error("quiz is not live")]
    QuizNotLive,
    #[error("attempt already finalized")]
    AlreadyFinalized,
    #[error("submitted question is not in the user's slot order")]
    QuestionNotInOrder,
    #[error("the quiz has advanced past this slot")]
    AdvancedPastSlot,
    #[error("answer window for this question has expired")]
    TimeExpired,
    #[error("answer arrived faster than the allowed floor")]
    RapidAnswer,
    #[error("device does not match the one bound to this attempt")]
    DeviceMismatch,
    #[error("too many concurrent join requests, retry shortly")]
    JoinThrottled,
    #[error("rate limited")]
    RateLimited,
    #[error("upstream failure: {0}")]
    Upstream(String),
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code surfaced in the error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "VALIDATION",
            ServiceError::AuthRequired(_) => "AUTH_REQUIRED",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::InvalidTransition { .. } => "INVALID_TRANSITION",
            ServiceError::QuizNotLive => "QUIZ_NOT_LIVE",
            ServiceError::AlreadyFinalized => "ALREADY_FINALIZED",
            ServiceError::QuestionNotInOrder => "QUESTION_NOT_IN_ORDER",
            ServiceError::AdvancedPastSlot => "ADVANCED_PAST_SLOT",
            ServiceError::TimeExpired => "TIME_EXPIRED",
            ServiceError::RapidAnswer => "RAPID_ANSWER",
            ServiceError::DeviceMismatch => "DEVICE_MISMATCH",
            ServiceError::JoinThrottled => "JOIN_THROTTLED",
            ServiceError::RateLimited => "RATE_LIMITED",
            ServiceError::Upstream(_) => "UPSTREAM",
            ServiceError::Degraded => "DEGRADED",
            ServiceError::Internal(_) => "INTERNAL",
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Conflict { message } => ServiceError::Conflict(message),
            StorageError::NotFound { message } => ServiceError::NotFound(message),
            other => ServiceError::Upstream(other.to_string()),
        }
    }
}

impl From<CoordinatorError> for ServiceError {
    fn from(err: CoordinatorError) -> Self {
        ServiceError::Upstream(err.to_string())
    }
}

/// HTTP-facing error wrapper carrying the response status.
#[derive(Debug, Error)]
#[error("{source}")]
pub struct AppError {
    #[source]
    source: ServiceError,
}

impl From<ServiceError> for AppError {
    fn from(source: ServiceError) -> Self {
        Self { source }
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match &self.source {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::AuthRequired(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) | ServiceError::DeviceMismatch => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) | ServiceError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            ServiceError::QuizNotLive
            | ServiceError::AlreadyFinalized
            | ServiceError::QuestionNotInOrder
            | ServiceError::AdvancedPastSlot
            | ServiceError::TimeExpired
            | ServiceError::RapidAnswer => StatusCode::PRECONDITION_FAILED,
            ServiceError::JoinThrottled | ServiceError::RateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            ServiceError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Degraded => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        let payload = Json(json!({
            "success": false,
            "error": ErrorBody {
                code: self.source.code(),
                message: self.source.to_string(),
            },
            "meta": {},
        }));

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ServiceError::QuizNotLive.code(), "QUIZ_NOT_LIVE");
        assert_eq!(ServiceError::TimeExpired.code(), "TIME_EXPIRED");
        assert_eq!(ServiceError::DeviceMismatch.code(), "DEVICE_MISMATCH");
    }

    #[test]
    fn precondition_failures_map_to_412() {
        let err: AppError = ServiceError::AdvancedPastSlot.into();
        assert_eq!(err.status(), StatusCode::PRECONDITION_FAILED);
        let err: AppError = ServiceError::JoinThrottled.into();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
