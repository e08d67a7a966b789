//! Error types for the lab client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// How the poll loop should react to a failed request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; issue the same request again on the next iteration
    Retryable,
    /// Ends the session
    Fatal,
}

/// Errors that can occur when talking to the lab server
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed below the HTTP layer (timeout, DNS, refused, reset)
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// Server answered with a status it may recover from (5xx)
    #[error("server unavailable (status {status}): {message}")]
    Unavailable {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Server answered with any other error status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// Reply body could not be understood
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Configured server address is unusable
    #[error("Invalid server address: {0}")]
    InvalidAddress(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// HTTP status of the failed request, if the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unavailable { status, .. } | Self::ApiError { status, .. } => Some(*status),
            Self::RequestFailed(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Classifies the failure for the poll loop
    pub fn classify(&self) -> ErrorClass {
        match self {
            Self::RequestFailed(e) if e.is_decode() || e.is_builder() || e.is_redirect() => {
                ErrorClass::Fatal
            }
            Self::RequestFailed(_) | Self::Unavailable { .. } => ErrorClass::Retryable,
            Self::ApiError { .. } | Self::ParseError(_) | Self::InvalidAddress(_) => {
                ErrorClass::Fatal
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.classify() == ErrorClass::Retryable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            ClientError::Unavailable {
                status: 503,
                message: String::new()
            }
            .classify(),
            ErrorClass::Retryable
        );
        assert_eq!(ClientError::api_error(403, "forbidden").classify(), ErrorClass::Fatal);
        assert_eq!(
            ClientError::ParseError("not json".to_string()).classify(),
            ErrorClass::Fatal
        );
        assert_eq!(
            ClientError::InvalidAddress("ftp://x".to_string()).classify(),
            ErrorClass::Fatal
        );
    }

    #[test]
    fn test_status() {
        assert_eq!(ClientError::api_error(404, "").status(), Some(404));
        assert_eq!(ClientError::ParseError(String::new()).status(), None);
    }
}
