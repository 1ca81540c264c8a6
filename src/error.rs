use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Malformed event payload: {0}")]
    MalformedEvent(String),

    #[error("Unknown event type: {0}")]
    UnknownEventType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Template render error: {0}")]
    TemplateRender(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Event log unavailable: {0}")]
    EventLogUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Rate limiter store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::MalformedEvent(msg) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_EVENT", msg.clone())
            }
            AppError::UnknownEventType(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_EVENT_TYPE",
                msg.clone(),
            ),
            AppError::InvalidPayload(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", msg.clone())
            }
            AppError::TemplateRender(msg) => {
                tracing::warn!("template render error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "TEMPLATE_RENDER_ERROR",
                    "failed to render notification content".to_string(),
                )
            }
            AppError::ProviderError(msg) => {
                tracing::warn!("provider error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "PROVIDER_ERROR",
                    msg.clone(),
                )
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                self.to_string(),
            ),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::EventLogUnavailable(msg) => {
                tracing::error!("event log unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "EVENT_LOG_UNAVAILABLE",
                    msg.clone(),
                )
            }
            AppError::Config(msg) => {
                tracing::error!("configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "server configuration error".to_string(),
                )
            }
            AppError::Database(e) => {
                tracing::error!("database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "a database error occurred".to_string(),
                )
            }
            AppError::Request(e) => {
                tracing::warn!("request error: {:?}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "REQUEST_ERROR",
                    "an upstream request failed".to_string(),
                )
            }
            AppError::Redis(e) => {
                tracing::error!("redis error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "RATE_LIMITER_UNAVAILABLE",
                    "rate limiter store unreachable".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "an internal error occurred".to_string(),
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl AppError {
    pub fn with_details(self, details: serde_json::Value) -> AppErrorWithDetails {
        AppErrorWithDetails {
            error: self,
            details: Some(details),
        }
    }

    /// True if retrying later could plausibly succeed; false for
    /// deterministic parse/validation failures that redelivery can't fix.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AppError::MalformedEvent(_)
                | AppError::UnknownEventType(_)
                | AppError::InvalidPayload(_)
        )
    }
}

pub struct AppErrorWithDetails {
    error: AppError,
    details: Option<serde_json::Value>,
}

impl IntoResponse for AppErrorWithDetails {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self.error {
            AppError::MalformedEvent(msg) => {
                (StatusCode::BAD_REQUEST, "MALFORMED_EVENT", msg.clone())
            }
            AppError::UnknownEventType(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNKNOWN_EVENT_TYPE",
                msg.clone(),
            ),
            AppError::InvalidPayload(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_PAYLOAD", msg.clone())
            }
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                self.error.to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "an internal error occurred".to_string(),
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details: self.details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<AppError> for AppErrorWithDetails {
    fn from(error: AppError) -> Self {
        AppErrorWithDetails {
            error,
            details: None,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
