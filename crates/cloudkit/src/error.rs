//! Error types for provider operations.
//!
//! Errors are categorized so callers can give operators actionable feedback.
//! Nothing in this crate retries: a failed provider call is reported as-is.

use std::fmt;

/// Result type alias for provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of provider errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Network-related errors (connection, timeout, 5xx, rate limiting).
    Network,
    /// The API token was rejected or lacks the needed scope.
    Auth,
    /// The provider rejected the request payload.
    Validation,
    /// A referenced resource does not exist.
    NotFound,
    /// The response could not be understood.
    Format,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this category is usually transient.
    ///
    /// Informational only; reconciliation never retries on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Network connectivity issue",
            Self::Auth => "Authentication failed",
            Self::Validation => "Request rejected by provider",
            Self::NotFound => "Resource not found",
            Self::Format => "Unexpected provider response",
            Self::Other => "Provider error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Network => "Check connectivity to the provider API and run again",
            Self::Auth => "Check that the API token is valid and has read/write scopes",
            Self::Validation => "Check the instance and DNS settings in your configuration",
            Self::NotFound => "The resource may have been deleted outside of landfall",
            Self::Format => "The provider API may have changed; check for an update",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while talking to the provider.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The HTTP exchange itself failed (DNS, connect, TLS, timeout).
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// The provider answered with a non-success status.
    #[error("provider API error ({status}): {}", reasons.join("; "))]
    Api {
        /// HTTP status code.
        status: u16,
        /// Reasons reported by the provider.
        reasons: Vec<String>,
    },

    /// The response body did not match the expected shape.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A resource the caller referenced does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Resource kind ("domain", "record", ...).
        kind: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an HTTP transport error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Http { .. } => ErrorCategory::Network,
            Error::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Auth,
                404 => ErrorCategory::NotFound,
                400 | 409 | 422 => ErrorCategory::Validation,
                429 | 500..=599 => ErrorCategory::Network,
                _ => ErrorCategory::Other,
            },
            Error::InvalidResponse(_) => ErrorCategory::Format,
            Error::NotFound { .. } => ErrorCategory::NotFound,
            Error::Other(_) => ErrorCategory::Other,
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Api {
                status: code,
                reasons: Vec::new(),
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
