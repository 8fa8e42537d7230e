//! Error handling for the gasless faucet.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use thiserror::Error;

/// Faucet error types
///
/// Eligibility denials are not errors; they travel as
/// [`DenyReason`](crate::eligibility::DenyReason) values. These variants cover
/// failures of the collaborators the faucet talks to.
#[derive(Error, Debug)]
pub enum FaucetError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Chain request failed: {0}")]
    Chain(String),

    #[error("Transaction submission failed: {0}")]
    Transaction(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for FaucetError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            FaucetError::InvalidRequest(message) => (StatusCode::BAD_REQUEST, message),
            FaucetError::Chain(_) | FaucetError::Transaction(_) => {
                (StatusCode::BAD_GATEWAY, "Upstream chain error".to_string())
            }
            FaucetError::Timeout(_) => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
            FaucetError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            FaucetError::ConfigError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

/// Result type alias for faucet operations
pub type FaucetResult<T> = Result<T, FaucetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_message() {
        let response = FaucetError::InvalidRequest("missing field `timestamp`".to_string())
            .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_config_error_from_source() {
        let error: FaucetError = config::ConfigError::Message("bad window".to_string()).into();
        assert!(matches!(error, FaucetError::ConfigError(_)));
        assert_eq!(error.to_string(), "Configuration error: bad window");
    }

    #[test]
    fn test_upstream_errors_are_masked() {
        let response = FaucetError::Chain("connection refused".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = FaucetError::Internal(anyhow::anyhow!("boom")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_timeout_display() {
        assert_eq!(FaucetError::Timeout("balance query").to_string(), "balance query timed out");
    }
}
