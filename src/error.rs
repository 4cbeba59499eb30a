use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::ports::RepositoryError;
use crate::use_cases::create_transaction::CreateTransactionError;

/// Error type for the merchant-facing JSON endpoints.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Upstream error: {0}")]
    Upstream(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::Conflict(what) => AppError::Conflict(what),
            other => AppError::Database(other.to_string()),
        }
    }
}

impl From<CreateTransactionError> for AppError {
    fn from(e: CreateTransactionError) -> Self {
        match e {
            CreateTransactionError::Invalid(msg) => AppError::Validation(msg),
            CreateTransactionError::UnsupportedProvider(_) => AppError::Validation(e.to_string()),
            CreateTransactionError::MerchantNotFound(id) => {
                AppError::NotFound(format!("merchant {}", id))
            }
            CreateTransactionError::DuplicateOrder(_) => AppError::Conflict(e.to_string()),
            CreateTransactionError::Gateway(inner) => AppError::Upstream(inner.to_string()),
            CreateTransactionError::Repository(inner) => inner.into(),
        }
    }
}

/// Why an inbound provider notification was refused.
///
/// None of these are retried internally; redelivery is up to the provider.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("Unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl NotificationError {
    /// Transient failures that a provider redelivery may get past.
    pub fn is_transient(&self) -> bool {
        matches!(self, NotificationError::StoreUnavailable(_))
    }

    fn status_code(&self) -> StatusCode {
        // Providers retry-storm on non-2xx, so every processing outcome is a 200
        // and the envelope carries the verdict.
        StatusCode::OK
    }
}

/// Provider-agnostic response envelope for notification endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: String,
    pub message: String,
}

impl Envelope {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success".to_string(),
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(Envelope::error(self.to_string()))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_status_codes() {
        assert_eq!(
            AppError::Validation("bad".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::NotFound("tx".to_string()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(CreateTransactionError::DuplicateOrder("ORD-1".to_string())).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(RepositoryError::Database("down".to_string())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_every_notification_error_is_http_200() {
        let errors = [
            NotificationError::UnsupportedProvider("paypal".to_string()),
            NotificationError::InvalidSignature,
            NotificationError::MalformedPayload("order_id missing".to_string()),
            NotificationError::TransactionNotFound("ORD-1".to_string()),
            NotificationError::StoreUnavailable("timeout".to_string()),
        ];
        for error in errors {
            assert_eq!(error.status_code(), StatusCode::OK);
        }
    }

    #[test]
    fn test_only_store_errors_are_transient() {
        assert!(NotificationError::StoreUnavailable("down".to_string()).is_transient());
        assert!(!NotificationError::InvalidSignature.is_transient());
    }

    #[tokio::test]
    async fn test_error_response_envelope() {
        let response = NotificationError::InvalidSignature.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let envelope: Envelope = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(envelope, Envelope::error("Invalid signature"));
    }
}
