//! Application error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Gateway errors.
///
/// Every failure surfaced to a client maps onto exactly one variant; the
/// HTTP status and `{status, message}` body are derived in `IntoResponse`.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The filter input was rejected; `path` points at the offending node.
    #[error("bad filter at {path}: {message}")]
    BadFilter { path: String, message: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("no results found")]
    NotFound,

    /// The catalogue reported the session as gone. Recovered internally by
    /// retrying once with a fresh pool session; surfaces as 401 if the retry
    /// also fails.
    #[error("catalogue session expired")]
    SessionExpired,

    #[error("no catalogue session available within the borrow timeout")]
    PoolExhausted,

    #[error("catalogue unavailable")]
    CatalogueUnavailable,

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    message: String,
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BadFilter { .. } | GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::AuthenticationFailed | GatewayError::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            GatewayError::Forbidden(_) => StatusCode::FORBIDDEN,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::PoolExhausted | GatewayError::CatalogueUnavailable => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 5xx details stay in the logs; clients get the generic message.
        let message = match &self {
            GatewayError::Internal(e) => {
                tracing::error!(error = %e, "internal server error");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (
            status,
            Json(ErrorBody {
                status: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}

/// Result type alias using GatewayError.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        let err = GatewayError::BadFilter {
            path: "where.size.between".to_string(),
            message: "expected exactly two elements".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("where.size.between"));

        assert_eq!(
            GatewayError::PoolExhausted.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::SessionExpired.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(GatewayError::NotFound.status_code(), StatusCode::NOT_FOUND);
    }
}
