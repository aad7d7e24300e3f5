//! Error types for remote API operations.
//!
//! Errors are categorized so the CLI can print actionable advice next to
//! the message.

use std::fmt;

/// Result type alias for remote operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of remote errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Connection failures and server errors (transient).
    Network,
    /// Resource does not exist on the server.
    NotFound,
    /// Rejected credentials.
    Auth,
    /// Missing configuration or malformed responses.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::NotFound => "Resource not found",
            Self::Auth => "Authentication failed",
            Self::Other => "Unexpected error",
        }
    }

    /// Actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check that the API endpoint is reachable and try again",
            Self::NotFound => "Verify the resource kind and name, or create it with apply",
            Self::Auth => "Check that the token environment variable holds a valid token",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the backup server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Target resource does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    /// Response body did not have the expected shape.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// Required connection setting is absent.
    #[error("missing configuration: {0}")]
    MissingConfig(String),
}

impl Error {
    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http {
                status: Some(401 | 403),
                ..
            } => ErrorCategory::Auth,
            Error::Http {
                status: Some(404), ..
            } => ErrorCategory::NotFound,
            Error::Http { .. } => ErrorCategory::Network,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::InvalidResponse(_) | Error::MissingConfig(_) => ErrorCategory::Other,
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Auth.is_retryable());
        assert!(!ErrorCategory::Other.is_retryable());
    }

    #[test]
    fn test_http_status_categories() {
        assert_eq!(Error::http("x", Some(401)).category(), ErrorCategory::Auth);
        assert_eq!(Error::http("x", Some(403)).category(), ErrorCategory::Auth);
        assert_eq!(Error::http("x", Some(404)).category(), ErrorCategory::NotFound);
        assert_eq!(Error::http("x", Some(503)).category(), ErrorCategory::Network);
        assert_eq!(Error::http("reset", None).category(), ErrorCategory::Network);
        assert!(Error::http("x", Some(502)).is_retryable());
    }

    #[test]
    fn test_not_found_display() {
        let err = Error::NotFound {
            kind: "BackupJob".to_string(),
            name: "nightly".to_string(),
        };
        assert_eq!(err.to_string(), "BackupJob 'nightly' not found");
        assert_eq!(err.category(), ErrorCategory::NotFound);
    }

    #[test]
    fn test_advice_is_present() {
        for category in [
            ErrorCategory::Network,
            ErrorCategory::NotFound,
            ErrorCategory::Auth,
            ErrorCategory::Other,
        ] {
            assert!(!category.advice().is_empty());
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::InvalidResponse(_)));
    }
}
