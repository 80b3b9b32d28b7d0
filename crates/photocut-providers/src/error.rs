//! Error types for credential and photo library operations.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// No usable session: missing credential, expired token, failed refresh.
    Unauthenticated,
    /// The authorization code was rejected by the provider.
    InvalidCode,
    /// Network error - connection failed, timeout, DNS resolution, etc.
    NetworkError,
    /// Rate limit exceeded - too many requests.
    RateLimited,
    /// The provider answered with a non-success status.
    ApiError,
    /// Invalid response from the server - parse error, unexpected format.
    InvalidResponse,
    /// Media item not found (404).
    NotFound,
    /// Configuration error - missing or invalid config.
    ConfigurationError,
    /// Local file could not be read or written.
    StorageError,
    /// Internal provider error - unexpected state, bug.
    InternalError,
}

impl ProviderErrorCode {
    /// Returns a machine-friendly name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::InvalidCode => "invalid_code",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ApiError => "api_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::ConfigurationError => "configuration_error",
            Self::StorageError => "storage_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to the photo provider or its token store.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// The provider that generated this error (e.g., "google-photos").
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    /// Creates an unauthenticated error.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Unauthenticated, message)
    }

    /// Creates an invalid authorization code error.
    pub fn invalid_code(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidCode, message)
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    /// Creates a rate limit error.
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    /// Creates an API error for a non-success response.
    pub fn api(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ApiError, message)
    }

    /// Creates an invalid response error.
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    /// Creates a local storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::StorageError, message)
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if the session is missing or no longer usable.
    pub fn is_unauthenticated(&self) -> bool {
        self.code == ProviderErrorCode::Unauthenticated
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_names() {
        assert_eq!(ProviderErrorCode::InvalidCode.to_string(), "invalid_code");
        assert_eq!(ProviderErrorCode::NetworkError.as_str(), "network_error");
        assert_eq!(ProviderErrorCode::StorageError.as_str(), "storage_error");
    }

    #[test]
    fn unauthenticated_error() {
        let err = ProviderError::unauthenticated("no credential stored");
        assert_eq!(err.code(), ProviderErrorCode::Unauthenticated);
        assert!(err.is_unauthenticated());
        assert_eq!(err.message(), "no credential stored");
        assert!(err.provider().is_none());
    }

    #[test]
    fn provider_error_display() {
        let err = ProviderError::api("search failed (500): backend error").with_provider("google-photos");
        let display = format!("{}", err);
        assert_eq!(display, "[google-photos] api_error: search failed (500): backend error");
    }

    #[test]
    fn provider_error_with_source() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::storage("failed to write video").with_source(io_err);
        assert!(err.source().is_some());
        assert!(!err.is_unauthenticated());
    }
}
