//! Error taxonomy for upload operations.
//!
//! Every provider translates its native errors into [`Error`] at its own
//! boundary. The orchestrator only ever inspects this enum.

use std::fmt;

use thiserror::Error;

/// Boxed cause carried by unclassified upload failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for upload operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Source file is missing, not a regular file, or too large.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Target path is occupied by something that cannot be written over.
    #[error("Structural conflict: {0}")]
    StructuralConflict(String),

    /// Credentials are absent or were rejected by the backend.
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Network or API hiccup that survived local retries.
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// Unclassified backend failure.
    #[error("Upload failed: {message}")]
    Upload {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Every provider in a chain failed.
    #[error("All providers failed: {}", FailureList(.0))]
    AllProvidersFailed(Vec<ProviderFailure>),
}

impl Error {
    /// Build an [`Error::Upload`] without a cause.
    pub fn upload(message: impl Into<String>) -> Self {
        Self::Upload {
            message: message.into(),
            source: None,
        }
    }

    /// Build an [`Error::Upload`] wrapping the original cause.
    pub fn upload_with_source(
        message: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Upload {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Input-level faults that no other backend can fix.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::StructuralConflict(_))
    }

    /// Faults worth retrying against the same backend.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::upload_with_source(format!("I/O error: {}", err), err)
    }
}

/// Why a single provider in a chain did not produce a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// Provider identity.
    pub provider: String,
    /// Human readable reason.
    pub reason: String,
}

impl ProviderFailure {
    pub fn new(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.provider, self.reason)
    }
}

struct FailureList<'a>(&'a [ProviderFailure]);

impl fmt::Display for FailureList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "no providers were tried");
        }
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
