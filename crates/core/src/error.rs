//! Error types for the Diarist domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum; the top-level [`Error`]
//! wraps them and classifies every failure into an [`ErrorKind`] so the
//! HTTP layer can map it to a status code without matching on details.

use thiserror::Error;

/// The top-level error type for all Diarist operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing caller input. Raised before any external call is made.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // --- Provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Document store errors ---
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    // --- Media storage errors ---
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    // --- Authentication errors ---
    #[error("Authentication error: {0}")]
    Auth(#[from] AuthError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used for propagation policy and status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// User-correctable input problem (4xx).
    Validation,
    /// Missing entity (404).
    NotFound,
    /// Missing or rejected credential (401).
    Unauthorized,
    /// Store or model invocation failed; the caller may retry (503).
    UpstreamUnavailable,
    /// Anything else (500).
    Internal,
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Auth(_) => ErrorKind::Unauthorized,
            Self::Provider(ProviderError::NotConfigured(_)) => ErrorKind::Internal,
            Self::Provider(_) | Self::Store(_) => ErrorKind::UpstreamUnavailable,
            Self::Media(MediaError::TooLarge { .. }) => ErrorKind::Validation,
            Self::Media(_) => ErrorKind::UpstreamUnavailable,
            Self::Config { .. } | Self::Serialization(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider returned no text: {0}")]
    EmptyCompletion(String),
}

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(String),

    #[error("Document already exists: {0}")]
    AlreadyExists(String),

    #[error("Corrupt document at {path}: {reason}")]
    Corrupt { path: String, reason: String },

    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

#[derive(Debug, Clone, Error)]
pub enum MediaError {
    #[error("Media uploads are disabled")]
    Disabled,

    #[error("Upload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Media storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Error)]
pub enum AuthError {
    #[error("Missing credential")]
    MissingCredential,

    #[error("Invalid or revoked credential")]
    InvalidCredential,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn classification_follows_taxonomy() {
        assert_eq!(Error::validation("empty").kind(), ErrorKind::Validation);
        assert_eq!(Error::not_found("entry").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::Provider(ProviderError::Network("reset".into())).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(
            Error::Store(StoreError::Storage("disk".into())).kind(),
            ErrorKind::UpstreamUnavailable
        );
        assert_eq!(Error::Auth(AuthError::MissingCredential).kind(), ErrorKind::Unauthorized);
        assert_eq!(Error::Internal("boom".into()).kind(), ErrorKind::Internal);
    }

    #[test]
    fn unconfigured_provider_is_not_retriable() {
        let err = Error::Provider(ProviderError::NotConfigured("gemini".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }
}
