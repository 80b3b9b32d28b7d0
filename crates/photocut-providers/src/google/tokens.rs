//! OAuth token persistence.
//!
//! The credential lives in a single JSON file. It is re-read on every
//! operation that needs it, so `/clear` or a failed refresh take effect
//! immediately for all later commands.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

/// Refresh this long before the provider-reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// The persisted OAuth token set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenInfo {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default, rename = "expiry", skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the tokens were last obtained or refreshed.
    #[serde(default = "Utc::now")]
    pub last_refresh: DateTime<Utc>,
}

impl TokenInfo {
    /// Creates a token set from a token endpoint response.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token,
            expires_at: expires_in_secs.map(expiry_from_now),
            scopes,
            last_refresh: Utc::now(),
        }
    }

    /// Returns true if the access token is expired or about to expire.
    ///
    /// Tokens without an expiry are treated as valid.
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| Utc::now() >= expires_at)
    }

    /// Replaces the access token after a refresh.
    ///
    /// Google may rotate the refresh token; a new one replaces the old.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) {
        self.access_token = access_token.into();
        self.expires_at = expires_in_secs.map(expiry_from_now);
        if refresh_token.is_some() {
            self.refresh_token = refresh_token;
        }
        self.last_refresh = Utc::now();
    }
}

fn expiry_from_now(secs: i64) -> DateTime<Utc> {
    Utc::now() + Duration::seconds(secs) - Duration::seconds(EXPIRY_MARGIN_SECS)
}

/// File-backed token storage.
#[derive(Debug, Clone)]
pub struct TokenStorage {
    path: PathBuf,
}

impl TokenStorage {
    /// Creates a storage handle for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the token file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the token file.
    ///
    /// Returns `Ok(None)` when no file exists. An unparseable file is
    /// reported as `Unauthenticated` so the user is sent through
    /// authorization again, which overwrites it.
    pub async fn load(&self) -> ProviderResult<Option<TokenInfo>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no token file");
                return Ok(None);
            }
            Err(e) => {
                return Err(ProviderError::storage(format!(
                    "failed to read token file {}: {}",
                    self.path.display(),
                    e
                ))
                .with_source(e));
            }
        };

        let tokens: TokenInfo = serde_json::from_str(&content).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "token file is not valid JSON");
            ProviderError::unauthenticated(format!("failed to parse token file: {}", e))
                .with_source(e)
        })?;

        debug!(path = %self.path.display(), "loaded tokens");
        Ok(Some(tokens))
    }

    /// Writes the tokens atomically (temp file + rename).
    pub async fn save(&self, tokens: &TokenInfo) -> ProviderResult<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProviderError::storage(format!("failed to create token directory: {}", e))
                    .with_source(e)
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(tokens)
            .map_err(|e| ProviderError::internal(format!("failed to serialize tokens: {}", e)))?;

        tokio::fs::write(&temp_path, &content).await.map_err(|e| {
            ProviderError::storage(format!("failed to write token file: {}", e)).with_source(e)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = tokio::fs::set_permissions(&temp_path, perms).await {
                warn!(path = %temp_path.display(), error = %e, "failed to restrict token file permissions");
            }
        }

        tokio::fs::rename(&temp_path, &self.path).await.map_err(|e| {
            ProviderError::storage(format!("failed to rename token file: {}", e)).with_source(e)
        })?;

        debug!(path = %self.path.display(), "saved tokens");
        Ok(())
    }

    /// Deletes the token file. A missing file is not an error.
    pub async fn clear(&self) -> ProviderResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!(path = %self.path.display(), "cleared tokens");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProviderError::storage(format!(
                "failed to remove token file: {}",
                e
            ))
            .with_source(e)),
        }
    }
}
