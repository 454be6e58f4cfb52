//! Error types for image distribution.
//!
//! Errors are categorized so callers can tell input mistakes (reported
//! before any side effect) from transient infrastructure failures and from
//! integrity problems (which only ever trigger a cache refresh).

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for airgap operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of airgap errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad user input: unsupported platform, engine, reference.
    Input,
    /// Registry or HTTP connectivity (transient).
    Network,
    /// Image, tag or platform not present in the registry.
    NotFound,
    /// Checksum, digest or size mismatch.
    Integrity,
    /// SSH connection or remote command failure.
    Remote,
    /// Operation cancelled by the caller.
    Cancelled,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network | Self::Remote)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Invalid input",
            Self::Network => "Registry connectivity issue",
            Self::NotFound => "Image not found",
            Self::Integrity => "Integrity check failed",
            Self::Remote => "Remote host failure",
            Self::Cancelled => "Cancelled",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Input => "Check the image reference, agent architecture and container engine",
            Self::Network => "Check registry reachability and credentials, then re-run",
            Self::NotFound => "Verify the image name, tag and that it is published for the platform",
            Self::Integrity => "The cached artifact will be refreshed on the next run",
            Self::Remote => "Check SSH access to the agent and re-run against the failed targets",
            Self::Cancelled => "Re-run the command to resume",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while fetching, caching or transferring images.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Platform string is not `os/arch[/variant]` or not supported.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Agent architecture code has no platform mapping.
    #[error("unsupported fog type {0} (expected 1 for x86 or 2 for arm)")]
    UnsupportedFogType(i64),

    /// Container engine is neither docker nor podman.
    #[error("unsupported container engine: {0:?} (expected docker or podman)")]
    UnsupportedEngine(String),

    /// Image reference could not be parsed.
    #[error("invalid image reference {reference:?}: {reason}")]
    InvalidReference {
        /// The reference as given.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Two plans ask for different images on the same platform.
    #[error("conflicting images for {platform}: {first} and {second}")]
    ConflictingImages {
        /// Shared platform.
        platform: String,
        /// Image requested first.
        first: String,
        /// Conflicting image.
        second: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Registry returned something unusable.
    #[error("registry error for {image}: {message}")]
    Registry {
        /// Image being resolved.
        image: String,
        /// Error message.
        message: String,
    },

    /// Manifest list has no entry for the requested platform.
    #[error("{image} has no manifest for platform {platform}")]
    PlatformNotFound {
        /// Image being resolved.
        image: String,
        /// Requested platform.
        platform: String,
    },

    /// Downloaded content does not hash to its advertised digest.
    #[error("digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch {
        /// Digest advertised by the registry.
        expected: String,
        /// Digest of the bytes received.
        actual: String,
    },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Invalid JSON from a registry or cache file.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Remote execution failed.
    #[error("{target}: {message}")]
    Remote {
        /// Target host or agent name.
        target: String,
        /// Error message.
        message: String,
    },

    /// No artifact was produced for a plan's platform.
    #[error("no image artifact available for platform {0}")]
    MissingArtifact(String),

    /// Failure while preparing an artifact, with image and platform attached.
    #[error("failed to prepare {image} for {platform}: {source}")]
    Artifact {
        /// Image reference.
        image: String,
        /// Platform.
        platform: String,
        /// Underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Create a remote execution error.
    pub fn remote(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Remote {
            target: target.into(),
            message: message.into(),
        }
    }

    /// Attach image and platform to an error.
    pub fn artifact(image: impl Into<String>, platform: impl fmt::Display, source: Error) -> Self {
        Self::Artifact {
            image: image.into(),
            platform: platform.to_string(),
            source: Box::new(source),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::UnsupportedPlatform(_)
            | Error::UnsupportedFogType(_)
            | Error::UnsupportedEngine(_)
            | Error::InvalidReference { .. }
            | Error::ConflictingImages { .. } => ErrorCategory::Input,
            Error::Http { status: Some(404), .. } => ErrorCategory::NotFound,
            Error::Http { .. } | Error::Registry { .. } => ErrorCategory::Network,
            Error::PlatformNotFound { .. } => ErrorCategory::NotFound,
            Error::DigestMismatch { .. } => ErrorCategory::Integrity,
            Error::Io { .. } | Error::Other(_) => ErrorCategory::Other,
            Error::InvalidResponse(_) => ErrorCategory::Network,
            Error::Remote { .. } => ErrorCategory::Remote,
            Error::MissingArtifact(_) => ErrorCategory::Other,
            Error::Artifact { source, .. } => source.category(),
            Error::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Whether this error was raised by input validation.
    #[must_use]
    pub fn is_input(&self) -> bool {
        self.category() == ErrorCategory::Input
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {}", code),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::Io {
            path: PathBuf::new(),
            source: err,
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
        assert!(ErrorCategory::Remote.is_retryable());
        assert!(!ErrorCategory::Input.is_retryable());
        assert!(!ErrorCategory::Integrity.is_retryable());
        assert!(!ErrorCategory::Cancelled.is_retryable());
    }

    #[test]
    fn test_error_category_advice() {
        assert!(!ErrorCategory::Network.advice().is_empty());
        assert!(!ErrorCategory::Remote.advice().is_empty());
        assert!(format!("{}", ErrorCategory::Integrity).contains("Integrity"));
    }

    #[test]
    fn test_input_errors() {
        assert!(Error::UnsupportedFogType(7).is_input());
        assert!(Error::UnsupportedEngine("containerd".into()).is_input());
        assert!(Error::UnsupportedPlatform("plan9/mips".into()).is_input());
    }

    #[test]
    fn test_http_404_is_not_found() {
        let err = Error::http("manifest unknown", Some(404));
        assert_eq!(err.category(), ErrorCategory::NotFound);
        assert_eq!(Error::http("reset", None).category(), ErrorCategory::Network);
    }

    #[test]
    fn test_artifact_wraps_category_and_message() {
        let err = Error::artifact(
            "nginx:1.25",
            "linux/arm64",
            Error::http("connection refused", None),
        );
        assert_eq!(err.category(), ErrorCategory::Network);
        let message = err.to_string();
        assert!(message.contains("nginx:1.25"));
        assert!(message.contains("linux/arm64"));
        assert!(message.contains("connection refused"));
    }

    #[test]
    fn test_from_io_error() {
        let err: Error = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        match err {
            Error::Io { path, .. } => assert_eq!(path, PathBuf::new()),
            _ => panic!("Expected Error::Io"),
        }
    }
}
