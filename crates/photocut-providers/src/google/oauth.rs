//! OAuth 2.0 authorization code flow with PKCE for Google APIs.
//!
//! The bot cannot receive the redirect itself, so the flow is split in two:
//!
//! 1. [`OAuthClient::begin`] builds the consent URL (PKCE S256 challenge,
//!    random state, offline access) which is sent to the chat.
//! 2. The user grants access, copies the `code` from the redirect page and
//!    sends `/auth <code>`; [`OAuthClient::exchange_code`] trades it, with
//!    the stored verifier, for access and refresh tokens.
//!
//! When the whole redirect URL is pasted instead of the bare code, its
//! `state` parameter must match the one sent in step 1.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::PendingAuthorization;

use super::config::OAuthCredentials;
use super::tokens::TokenInfo;

/// Google's consent page.
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// OAuth client for Google APIs.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    redirect_uri: String,
    token_url: String,
    http_client: reqwest::Client,
    request_timeout: Duration,
}

/// Tokens returned by a refresh.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    /// The new access token.
    pub access_token: String,
    /// Lifetime of the new token in seconds.
    pub expires_in: Option<i64>,
    /// A rotated refresh token, when the provider issued one.
    pub refresh_token: Option<String>,
}

impl OAuthClient {
    /// Creates a new OAuth client sharing the given HTTP client.
    ///
    /// `request_timeout` bounds each call to the token endpoint.
    pub fn new(
        credentials: OAuthCredentials,
        redirect_uri: impl Into<String>,
        token_url: impl Into<String>,
        http_client: reqwest::Client,
        request_timeout: Duration,
    ) -> Self {
        Self {
            credentials,
            redirect_uri: redirect_uri.into(),
            token_url: token_url.into(),
            http_client,
            request_timeout,
        }
    }

    /// Starts an authorization: fresh PKCE values and the consent URL.
    pub fn begin(&self, scopes: &[String]) -> PendingAuthorization {
        let pkce = PkceFlow::new();
        let url = pkce.build_auth_url(&self.credentials.client_id, &self.redirect_uri, scopes);
        debug!("built authorization URL");

        PendingAuthorization {
            url,
            verifier: pkce.verifier,
            state: pkce.state,
        }
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// A rejected code yields an `InvalidCode` error.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        scopes: &[String],
    ) -> ProviderResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let (status, body) = self.post_form(&params, "token exchange").await?;

        if !status.is_success() {
            return Err(ProviderError::invalid_code(format!(
                "token exchange failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        let scopes = token_response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| scopes.to_vec());

        info!(
            has_refresh_token = token_response.refresh_token.is_some(),
            "obtained tokens"
        );
        Ok(TokenInfo::new(
            token_response.access_token,
            token_response.refresh_token,
            token_response.expires_in,
            scopes,
        ))
    }

    /// Refreshes an expired access token.
    ///
    /// A rejected refresh token yields an `Unauthenticated` error.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let (status, body) = self.post_form(&params, "token refresh").await?;

        if !status.is_success() {
            return Err(ProviderError::unauthenticated(format!(
                "token refresh failed ({}): {}",
                status, body
            )));
        }

        let token_response: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })?;

        info!("refreshed access token");
        Ok(RefreshedToken {
            access_token: token_response.access_token,
            expires_in: token_response.expires_in,
            refresh_token: token_response.refresh_token,
        })
    }

    async fn post_form(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<(reqwest::StatusCode, String)> {
        let response = self
            .http_client
            .post(&self.token_url)
            .timeout(self.request_timeout)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                ProviderError::network(format!("{} request failed: {}", what, e)).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_source(e)
        })?;

        Ok((status, body))
    }
}

/// What the user pasted back after granting access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// The authorization code to exchange.
    pub code: String,
    /// The `state` echoed in the redirect URL, when a URL was pasted.
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Parses the bare code, a percent-encoded code, or the whole redirect
    /// URL (`...?state=...&code=...&scope=...`).
    pub fn parse(input: &str) -> Self {
        let input = input.trim();

        if let Ok(url) = Url::parse(input)
            && let Some((_, code)) = url.query_pairs().find(|(key, _)| key == "code")
        {
            let state = url
                .query_pairs()
                .find(|(key, _)| key == "state")
                .map(|(_, state)| state.into_owned());
            return Self {
                code: code.into_owned(),
                state,
            };
        }

        let code = match urlencoding::decode(input) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => input.to_string(),
        };
        Self { code, state: None }
    }

    /// Rejects a response whose `state` differs from the one that was sent.
    ///
    /// A bare code carries no state and is accepted.
    pub fn verify_state(&self, expected: &str) -> ProviderResult<()> {
        match self.state.as_deref() {
            Some(state) if state != expected => Err(ProviderError::invalid_code(
                "state parameter does not match the pending authorization",
            )),
            _ => Ok(()),
        }
    }
}

/// PKCE flow values (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 hash of verifier, base64url encoded).
    pub challenge: String,
    /// Random state echoed back by the provider.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = Self::generate_verifier();
        let challenge = Self::compute_challenge(&verifier);
        let state = Self::generate_state();

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn generate_verifier() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..CODE_VERIFIER_LENGTH).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    fn generate_state() -> String {
        let mut rng = rand::rng();
        let bytes: Vec<u8> = (0..16).map(|_| rng.random()).collect();
        URL_SAFE_NO_PAD.encode(&bytes)
    }

    /// Builds the Google consent page URL.
    pub fn build_auth_url(&self, client_id: &str, redirect_uri: &str, scopes: &[String]) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            GOOGLE_AUTH_URL,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}
