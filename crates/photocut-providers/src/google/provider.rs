//! Google Photos implementation of [`CredentialStore`] and [`PhotoLibrary`].

use std::path::Path;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use photocut_core::VideoItem;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::{BoxFuture, CredentialStore, PendingAuthorization, PhotoLibrary, Session};

use super::client::PhotosClient;
use super::config::GoogleConfig;
use super::oauth::{AuthorizationResponse, OAuthClient};
use super::tokens::TokenStorage;

/// Name attached to errors raised by this provider.
const PROVIDER_NAME: &str = "google-photos";

/// Google Photos provider.
///
/// Owns the credential file and the HTTP clients. All requests share one
/// `reqwest::Client` whose connect and idle limits come from
/// [`GoogleConfig::timeout`]. The same value caps token and JSON calls as a
/// whole, while video downloads may take as long as they keep progressing.
pub struct GooglePhotos {
    config: GoogleConfig,
    token_storage: TokenStorage,
    oauth_client: OAuthClient,
    photos_client: PhotosClient,
    /// Serializes load/refresh so concurrent commands refresh at most once.
    refresh_lock: Mutex<()>,
}

impl GooglePhotos {
    /// Creates a provider from validated configuration.
    ///
    /// Does not touch the network or the credential file.
    pub fn new(config: GoogleConfig) -> ProviderResult<Self> {
        config.validate().map_err(ProviderError::configuration)?;

        let http_client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;

        let token_storage = TokenStorage::new(&config.token_path);
        let oauth_client = OAuthClient::new(
            config.credentials.clone(),
            config.redirect_uri.clone(),
            config.token_url.clone(),
            http_client.clone(),
            config.timeout,
        );
        let photos_client =
            PhotosClient::new(http_client, config.api_base.clone(), config.timeout);

        Ok(Self {
            config,
            token_storage,
            oauth_client,
            photos_client,
            refresh_lock: Mutex::new(()),
        })
    }

    /// Returns the credential file path.
    pub fn token_path(&self) -> &Path {
        self.token_storage.path()
    }

    async fn load_session(&self) -> ProviderResult<Session> {
        let _guard = self.refresh_lock.lock().await;

        let mut tokens = self
            .token_storage
            .load()
            .await?
            .ok_or_else(|| ProviderError::unauthenticated("no stored credential"))?;

        if tokens.access_token.is_empty() {
            return Err(ProviderError::unauthenticated("stored access token is empty"));
        }

        if !tokens.is_expired() {
            return Ok(Session::new(tokens.access_token));
        }

        let Some(refresh_token) = tokens.refresh_token.clone() else {
            return Err(ProviderError::unauthenticated(
                "access token expired and no refresh token is stored",
            ));
        };

        debug!("refreshing expired access token");
        let refreshed = match self.oauth_client.refresh_token(&refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                warn!(error = %e, "token refresh failed, clearing stored credential");
                if let Err(clear_err) = self.token_storage.clear().await {
                    warn!(error = %clear_err, "failed to clear stored credential");
                }
                return Err(
                    ProviderError::unauthenticated("token refresh failed, authorization required")
                        .with_source(e),
                );
            }
        };

        tokens.apply_refresh(
            refreshed.access_token,
            refreshed.expires_in,
            refreshed.refresh_token,
        );
        self.token_storage.save(&tokens).await?;

        Ok(Session::new(tokens.access_token))
    }

    async fn complete(
        &self,
        pending: &PendingAuthorization,
        input: &str,
    ) -> ProviderResult<Session> {
        let response = AuthorizationResponse::parse(input);
        if let Err(e) = response.verify_state(&pending.state) {
            warn!("pasted redirect carries a foreign state, not exchanging");
            return Err(e);
        }

        let tokens = self
            .oauth_client
            .exchange_code(&response.code, &pending.verifier, &self.config.scopes)
            .await?;

        if tokens.refresh_token.is_none() {
            warn!("no refresh token issued, authorization will be needed again on expiry");
        }

        self.token_storage.save(&tokens).await?;
        info!(path = %self.token_storage.path().display(), "stored new credential");
        Ok(Session::new(tokens.access_token))
    }

    async fn download(
        &self,
        session: &Session,
        item_id: &str,
        destination: &Path,
    ) -> ProviderResult<u64> {
        if session.access_token().is_empty() {
            return Err(ProviderError::unauthenticated("access token is empty"));
        }

        let item = self
            .photos_client
            .get_media_item(session.access_token(), item_id)
            .await?;

        let base_url = item.base_url.as_deref().ok_or_else(|| {
            ProviderError::invalid_response(format!("media item {} has no base URL", item_id))
        })?;

        if let Some(mime) = item.mime_type.as_deref()
            && !mime.starts_with("video/")
        {
            warn!(item_id, mime, "media item is not a video");
        }

        let written = self
            .photos_client
            .download_video(base_url, destination)
            .await?;
        info!(item_id, bytes = written, path = %destination.display(), "downloaded video");
        Ok(written)
    }
}

fn tag(e: ProviderError) -> ProviderError {
    match e.provider() {
        Some(_) => e,
        None => e.with_provider(PROVIDER_NAME),
    }
}

impl CredentialStore for GooglePhotos {
    fn load(&self) -> BoxFuture<'_, ProviderResult<Session>> {
        Box::pin(async move { self.load_session().await.map_err(tag) })
    }

    fn begin_authorization(&self) -> PendingAuthorization {
        info!("starting Google Photos authorization");
        self.oauth_client.begin(&self.config.scopes)
    }

    fn complete_authorization<'a>(
        &'a self,
        pending: &'a PendingAuthorization,
        code: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>> {
        Box::pin(async move { self.complete(pending, code).await.map_err(tag) })
    }

    fn clear(&self) -> BoxFuture<'_, ProviderResult<()>> {
        Box::pin(async move { self.token_storage.clear().await.map_err(tag) })
    }
}

impl PhotoLibrary for GooglePhotos {
    fn list_recent_videos<'a>(
        &'a self,
        session: &'a Session,
        count: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<VideoItem>>> {
        Box::pin(async move {
            if count == 0 {
                return Ok(Vec::new());
            }
            if session.access_token().is_empty() {
                return Err(tag(ProviderError::unauthenticated("access token is empty")));
            }
            self.photos_client
                .search_videos(session.access_token(), count)
                .await
                .map_err(tag)
        })
    }

    fn fetch_and_store<'a>(
        &'a self,
        session: &'a Session,
        item_id: &'a str,
        destination: &'a Path,
    ) -> BoxFuture<'a, ProviderResult<u64>> {
        Box::pin(async move { self.download(session, item_id, destination).await.map_err(tag) })
    }
}
