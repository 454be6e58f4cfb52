//! Error types for Controller API calls.

use std::fmt;

/// Result type alias for Controller operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of Controller errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Controller unreachable, timing out, or answering 5xx.
    Network,
    /// The resource does not exist.
    NotFound,
    /// Missing or rejected credentials.
    Auth,
    /// The Controller rejected the request body.
    Input,
    /// Anything else.
    Other,
}

impl ErrorCategory {
    /// Whether retrying may help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Network => "Controller unreachable",
            Self::NotFound => "Resource not found",
            Self::Auth => "Authentication failed",
            Self::Input => "Request rejected",
            Self::Other => "Unexpected error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Errors returned by the Controller client.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The named resource does not exist.
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource collection or kind.
        kind: String,
        /// Resource name.
        name: String,
    },

    /// HTTP-level failure.
    #[error("{method} {path}: {message}")]
    Http {
        /// HTTP method.
        method: String,
        /// Request path.
        path: String,
        /// Error message or response body.
        message: String,
        /// Status code, if a response was received.
        status: Option<u16>,
    },

    /// No session and no credentials to open one.
    #[error("not logged in to {0}")]
    NotLoggedIn(String),

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Http { status: None, .. } => ErrorCategory::Network,
            Self::Http {
                status: Some(code), ..
            } => match code {
                401 | 403 => ErrorCategory::Auth,
                404 => ErrorCategory::NotFound,
                400 | 409 | 422 => ErrorCategory::Input,
                500..=599 => ErrorCategory::Network,
                _ => ErrorCategory::Other,
            },
            Self::NotLoggedIn(_) => ErrorCategory::Auth,
            Self::InvalidResponse(_) | Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether retrying may help.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
