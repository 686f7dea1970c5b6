use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// The main error type for Quotewise handlers and services
#[derive(Debug, thiserror::Error)]
pub enum QuotewiseError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Too many requests: {0}")]
    TooManyRequests(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Standard error response body for API errors.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    error_id: String,
}

impl QuotewiseError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// Whether a failed operation is worth retrying.
    ///
    /// Covers upstream unavailability, timeouts, and rate limiting. Client
    /// errors are never retryable.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServiceUnavailable(_) | Self::RequestTimeout | Self::TooManyRequests(_)
        )
    }

    pub(crate) fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Internal(_) | Self::Anyhow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
        }
    }

    /// Returns a message safe for client responses in production.
    ///
    /// Client errors (4xx) expose their message; server errors (5xx) return
    /// a generic message while full details stay in the server logs (CWE-209).
    fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Unauthorized(msg) => format!("Unauthorized: {}", msg),
            Self::Forbidden(msg) => format!("Forbidden: {}", msg),
            Self::TooManyRequests(msg) => format!("Too many requests: {}", msg),
            Self::RequestTimeout => "Request timeout".to_string(),
            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
        }
    }
}

impl IntoResponse for QuotewiseError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_id = uuid::Uuid::new_v4().to_string();

        // Full details go to the server logs only.
        tracing::error!(
            status = status.as_u16(),
            error_id = %error_id,
            error = %self,
            "Request failed"
        );

        let body = Json(ErrorResponse {
            error: self.safe_message(),
            error_id,
        });

        (status, body).into_response()
    }
}

/// Result type alias for Quotewise handlers
pub type Result<T> = std::result::Result<T, QuotewiseError>;

// Common error type conversions

impl From<serde_json::Error> for QuotewiseError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            QuotewiseError::BadRequest(format!("JSON error: {}", err))
        } else {
            QuotewiseError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<reqwest::Error> for QuotewiseError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            QuotewiseError::RequestTimeout
        } else if err.is_connect() {
            QuotewiseError::ServiceUnavailable(format!("Connection error: {}", err))
        } else if err.is_status() {
            match err.status().map(|s| s.as_u16()) {
                Some(401) => QuotewiseError::Unauthorized("Upstream authentication failed".to_string()),
                Some(404) => QuotewiseError::NotFound("Upstream resource not found".to_string()),
                Some(429) => QuotewiseError::TooManyRequests("Upstream rate limit exceeded".to_string()),
                Some(503) => QuotewiseError::ServiceUnavailable("Upstream service unavailable".to_string()),
                _ => QuotewiseError::Internal(format!("Upstream error: {}", err)),
            }
        } else {
            QuotewiseError::Internal(format!("Request error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let err = QuotewiseError::not_found("Invoice");
        assert!(matches!(err, QuotewiseError::NotFound(_)));
        assert_eq!(err.to_string(), "Not found: Invoice");
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_bad_request_error() {
        let err = QuotewiseError::bad_request("Invalid input");
        assert_eq!(err.to_string(), "Bad request: Invalid input");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_anyhow_error() {
        let err: QuotewiseError = anyhow::anyhow!("Something unexpected").into();
        assert!(matches!(err, QuotewiseError::Anyhow(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_is_transient() {
        assert!(QuotewiseError::service_unavailable("down").is_transient());
        assert!(QuotewiseError::RequestTimeout.is_transient());
        assert!(QuotewiseError::TooManyRequests("slow down".into()).is_transient());
        assert!(!QuotewiseError::bad_request("nope").is_transient());
        assert!(!QuotewiseError::internal("boom").is_transient());
    }

    #[test]
    fn test_safe_message_client_errors_exposed() {
        assert_eq!(
            QuotewiseError::not_found("Dispute").safe_message(),
            "Not found: Dispute"
        );
        assert_eq!(
            QuotewiseError::bad_request("Invalid price").safe_message(),
            "Bad request: Invalid price"
        );
    }

    #[test]
    fn test_safe_message_server_errors_hidden() {
        assert_eq!(
            QuotewiseError::internal("Connection to db-prod-01:5432 failed").safe_message(),
            "Internal server error"
        );
        assert_eq!(
            QuotewiseError::service_unavailable("provider at api.internal unreachable").safe_message(),
            "Service unavailable"
        );
    }

    #[test]
    fn test_from_serde_json_syntax_error() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("{ nope }");
        let err: QuotewiseError = result.unwrap_err().into();
        assert!(matches!(err, QuotewiseError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_into_response_not_found() {
        let response = QuotewiseError::not_found("Customer").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_into_response_hides_internal_details() {
        let err = QuotewiseError::internal("Sensitive: provider key sk_live_123");
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Internal server error");
        assert!(json["error_id"].as_str().is_some());
    }
}
