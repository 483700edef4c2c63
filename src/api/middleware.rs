use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    /// No adapter is registered under the alias
    #[error("Not found: {0}")]
    NotFound(String),

    /// The adapter exists but its compatibility check failed
    #[error("Incompatible source {alias}: {message}")]
    IncompatibleSource { alias: String, message: String },

    /// The adapter's remote call failed (network, auth, malformed response)
    #[error("Fetch failed: {0}")]
    Fetch(String),

    /// A fetch-or-cache transaction could not obtain data from its source
    #[error("Data unavailable: {0}")]
    DataUnavailable(#[source] Box<AppError>),

    /// The backing store rejected a write-back; nothing was committed
    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid SQL: {0}")]
    InvalidSql(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a failure from the populate step of a fetch-or-cache transaction.
    /// Already-wrapped errors are passed through unchanged.
    pub fn data_unavailable(err: AppError) -> Self {
        match err {
            AppError::DataUnavailable(_) => err,
            other => AppError::DataUnavailable(Box::new(other)),
        }
    }

    /// Stable machine-readable code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::IncompatibleSource { .. } => "INCOMPATIBLE_SOURCE",
            AppError::Fetch(_) => "FETCH_ERROR",
            AppError::DataUnavailable(_) => "DATA_UNAVAILABLE",
            AppError::StoreWrite(_) => "STORE_WRITE_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Conflict(_) => "CONFLICT",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::InvalidSql(_) => "INVALID_SQL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::IncompatibleSource { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Fetch(_) | AppError::DataUnavailable(_) | AppError::Connection(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidSql(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::StoreWrite(_) | AppError::Database(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

/// Error response format
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut detail = ErrorDetail::new(self.code(), self.to_string());

        // Surface the underlying adapter failure separately so clients can tell
        // a cache-layer abort from the source error that caused it
        if let AppError::DataUnavailable(inner) = &self {
            detail = detail.with_details(format!("{}: {}", inner.code(), inner));
        }

        if status.is_server_error() {
            tracing::error!("Request failed with {}: {}", status, self);
        }

        (status, Json(ErrorResponse { error: detail })).into_response()
    }
}

/// Convert anyhow::Error to AppError
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// Convert rusqlite::Error to AppError
impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}
