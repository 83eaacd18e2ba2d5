use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Category of a failure reported by the payment processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentErrorKind {
    Card,
    InvalidRequest,
    Authentication,
    RateLimit,
    Api,
    Connection,
}

impl PaymentErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            PaymentErrorKind::Card => StatusCode::PAYMENT_REQUIRED,
            PaymentErrorKind::InvalidRequest => StatusCode::BAD_REQUEST,
            PaymentErrorKind::Authentication => StatusCode::UNAUTHORIZED,
            PaymentErrorKind::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            PaymentErrorKind::Api | PaymentErrorKind::Connection => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Payment error ({kind:?}): {message}")]
    Payment {
        kind: PaymentErrorKind,
        message: String,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Validation error: {0}")]
    InvalidFields(#[from] validator::ValidationErrors),

    #[error("Too many requests")]
    RateLimited { retry_after_secs: u64 },
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) => "validation_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Unauthorized => "authentication_error",
            AppError::Forbidden(_) => "authorization_error",
            AppError::NotFound(_) => "not_found",
            AppError::Payment { .. } => "payment_error",
            AppError::RateLimited { .. } => "rate_limit_exceeded",
            AppError::Database(_) | AppError::Internal(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::InvalidFields(_) | AppError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Payment { kind, .. } => kind.status(),
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, details): (String, Option<Value>) = match &self {
            AppError::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                ("Database error occurred".to_string(), None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                ("Internal server error".to_string(), None)
            }
            AppError::Payment { kind, message } => {
                tracing::warn!("Payment processor error ({:?}): {}", kind, message);
                (message.clone(), None)
            }
            AppError::InvalidFields(errors) => (
                "Request validation failed".to_string(),
                serde_json::to_value(errors.field_errors()).ok(),
            ),
            AppError::Unauthorized => ("Authentication required".to_string(), None),
            AppError::RateLimited { .. } => {
                ("Too many requests, please try again later".to_string(), None)
            }
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg) => (msg.clone(), None),
        };

        let mut error = json!({
            "code": self.code(),
            "message": message,
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        let mut response = (status, Json(json!({ "error": error }))).into_response();
        if let AppError::RateLimited { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
