use axum::{
    extract::rejection::{FormRejection, JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::payments::FailureReason;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Product unavailable: {0}")]
    ProductUnavailable(String),

    #[error("Cart invalid")]
    CartInvalid { reasons: Vec<String> },

    #[error("Order creation failed: {0}")]
    OrderCreation(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Gateway error ({reason}): {message}")]
    Gateway {
        reason: FailureReason,
        message: String,
    },

    #[error("Webhook verification failed: {0}")]
    WebhookVerification(String),

    #[error("Reconciliation anomaly: {0}")]
    Anomaly(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Classify a reqwest failure into a gateway failure reason.
    ///
    /// Timeouts and connection failures are retryable network errors;
    /// everything else is a generic gateway error.
    pub fn from_gateway_http(err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() || err.is_connect() {
            FailureReason::NetworkError
        } else {
            FailureReason::GatewayError
        };
        AppError::Gateway {
            reason,
            message: err.to_string(),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reasons: Option<Vec<String>>,
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details, reasons) = match &self {
            AppError::NotFound(msg) => {
                (StatusCode::NOT_FOUND, "Not found", Some(msg.clone()), None)
            }
            AppError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "Bad request",
                Some(msg.clone()),
                None,
            ),
            AppError::ProductUnavailable(msg) => (
                StatusCode::CONFLICT,
                "Product unavailable",
                Some(msg.clone()),
                None,
            ),
            AppError::CartInvalid { reasons } => (
                StatusCode::CONFLICT,
                "Cart invalid",
                None,
                Some(reasons.clone()),
            ),
            AppError::OrderCreation(msg) => {
                tracing::error!("Order creation error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Could not create order, please contact support",
                    None,
                    None,
                )
            }
            AppError::InvalidTransition(msg) => {
                tracing::warn!("Rejected status transition: {}", msg);
                (
                    StatusCode::CONFLICT,
                    "Invalid status transition",
                    Some(msg.clone()),
                    None,
                )
            }
            AppError::Gateway { reason, message } => {
                tracing::error!("Gateway error ({}): {}", reason.as_str(), message);
                (
                    StatusCode::BAD_GATEWAY,
                    "Payment gateway error",
                    Some(reason.as_str().to_string()),
                    None,
                )
            }
            AppError::WebhookVerification(msg) => {
                tracing::warn!("Webhook verification failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Webhook verification failed",
                    None,
                    None,
                )
            }
            AppError::Anomaly(msg) => {
                tracing::error!("Reconciliation anomaly: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Reconciliation anomaly",
                    None,
                    None,
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid JSON",
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                    None,
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
            reasons,
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience for turning `Option<T>` lookups into `NotFound` errors.
pub trait OptionExt<T> {
    fn or_not_found(self, what: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn or_not_found(self, what: &str) -> Result<T> {
        self.ok_or_else(|| AppError::NotFound(what.to_string()))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
