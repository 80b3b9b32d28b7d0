//! Google Photos provider configuration.

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

/// OAuth 2.0 client credentials registered in the Google Cloud Console.
#[derive(Clone)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID.
    pub client_id: String,
    /// The OAuth 2.0 client secret.
    pub client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks that both values are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.trim().is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.trim().is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Configuration for the Google Photos provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth credentials for API access.
    pub credentials: OAuthCredentials,

    /// Redirect URI registered for the OAuth client.
    ///
    /// The user copies the `code` parameter from this page into `/auth`.
    pub redirect_uri: String,

    /// Path of the persisted credential file. Defaults to `token.json`.
    pub token_path: PathBuf,

    /// Request timeout for every API call.
    pub timeout: Duration,

    /// User agent string for API requests.
    pub user_agent: String,

    /// OAuth scopes to request.
    pub scopes: Vec<String>,

    /// OAuth token endpoint.
    pub token_url: String,

    /// Photos Library API base URL.
    pub api_base: String,
}

impl GoogleConfig {
    /// Default timeout in seconds.
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    /// Read-only access to the photo library.
    pub const DEFAULT_SCOPE: &'static str =
        "https://www.googleapis.com/auth/photoslibrary.readonly";

    /// Google's OAuth token endpoint.
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Photos Library API v1.
    pub const DEFAULT_API_BASE: &'static str = "https://photoslibrary.googleapis.com/v1";

    /// Default credential file, relative to the working directory.
    pub const DEFAULT_TOKEN_PATH: &'static str = "token.json";

    /// Creates a configuration with defaults for everything but the client.
    pub fn new(credentials: OAuthCredentials, redirect_uri: impl Into<String>) -> Self {
        Self {
            credentials,
            redirect_uri: redirect_uri.into(),
            token_path: PathBuf::from(Self::DEFAULT_TOKEN_PATH),
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("photocut/{}", env!("CARGO_PKG_VERSION")),
            scopes: vec![Self::DEFAULT_SCOPE.to_string()],
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
            api_base: Self::DEFAULT_API_BASE.to_string(),
        }
    }

    /// Sets the credential file path.
    pub fn with_token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_path = path.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the user agent string.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Sets the OAuth scopes.
    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Points the client at different OAuth and API endpoints.
    pub fn with_endpoints(mut self, token_url: impl Into<String>, api_base: impl Into<String>) -> Self {
        self.token_url = token_url.into();
        self.api_base = api_base.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.credentials
            .validate()
            .map_err(|e| format!("invalid credentials: {}", e))?;

        Url::parse(&self.redirect_uri)
            .map_err(|e| format!("invalid redirect URI '{}': {}", self.redirect_uri, e))?;

        for endpoint in [&self.token_url, &self.api_base] {
            Url::parse(endpoint).map_err(|e| format!("invalid endpoint '{}': {}", endpoint, e))?;
        }

        if self.scopes.is_empty() {
            return Err("at least one OAuth scope is required".to_string());
        }

        Ok(())
    }
}
