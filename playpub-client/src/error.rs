//! Error types for the publisher client

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when using the publisher client
#[derive(Debug, Error)]
pub enum ClientError {
    /// The server could not be reached
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with an error status; `detail` is its message
    #[error("{detail}")]
    Api {
        /// HTTP status code
        status: u16,
        /// `detail` from the error body, or the raw body
        detail: String,
    },

    /// Failed to parse response
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Invalid request
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Gave up waiting for a build to finish
    #[error("Timed out waiting for build {0}")]
    Timeout(Uuid),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, detail: impl Into<String>) -> Self {
        Self::Api {
            status,
            detail: detail.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Api { status: 404, .. })
    }

    /// Check if the request never got an answer
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Api { status, .. } if (400..500).contains(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_displays_detail_verbatim() {
        let err = ClientError::api_error(400, "appName is required");
        assert_eq!(err.to_string(), "appName is required");
        assert!(err.is_client_error());
        assert!(!err.is_not_found());
        assert!(!err.is_transport());
    }

    #[test]
    fn test_not_found() {
        assert!(ClientError::api_error(404, "Build x not found").is_not_found());
        assert!(!ClientError::api_error(500, "Internal server error").is_client_error());
    }
}
