//! Credential and photo library traits.
//!
//! The bot talks to its photo backend through two seams:
//!
//! - [`CredentialStore`] owns the persisted credential and the authorization
//!   code exchange.
//! - [`PhotoLibrary`] lists media items and downloads their bytes, given a
//!   [`Session`] obtained from the store.
//!
//! Both are object-safe so the dispatcher can hold them as `Arc<dyn ...>`
//! and tests can substitute in-memory fakes.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use photocut_core::VideoItem;

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Using boxed futures keeps the traits object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A usable access token for the photo provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    access_token: String,
}

impl Session {
    /// Wraps an access token.
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
        }
    }

    /// Returns the bearer token.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }
}

// Keep tokens out of logs.
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// An authorization that was started but not yet completed.
///
/// Holds the URL the user must open plus the PKCE verifier and CSRF state
/// needed to finish the code exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    /// The consent page URL to send to the user.
    pub url: String,
    /// PKCE code verifier matching the challenge embedded in `url`.
    pub verifier: String,
    /// Random state embedded in `url`.
    pub state: String,
}

/// Access to the persisted credential.
pub trait CredentialStore: Send + Sync {
    /// Loads the stored credential, refreshing it when expired.
    ///
    /// Returns an `Unauthenticated` error when no usable credential exists.
    /// A failed refresh deletes the stored credential.
    fn load(&self) -> BoxFuture<'_, ProviderResult<Session>>;

    /// Starts a new authorization and returns the link for the user.
    fn begin_authorization(&self) -> PendingAuthorization;

    /// Exchanges an authorization code and persists the resulting credential.
    fn complete_authorization<'a>(
        &'a self,
        pending: &'a PendingAuthorization,
        code: &'a str,
    ) -> BoxFuture<'a, ProviderResult<Session>>;

    /// Deletes the stored credential. Succeeds when nothing is stored.
    fn clear(&self) -> BoxFuture<'_, ProviderResult<()>>;
}

/// Read access to the user's media library.
pub trait PhotoLibrary: Send + Sync {
    /// Returns up to `count` of the most recent videos, in provider order.
    fn list_recent_videos<'a>(
        &'a self,
        session: &'a Session,
        count: usize,
    ) -> BoxFuture<'a, ProviderResult<Vec<VideoItem>>>;

    /// Downloads the original bytes of a media item to `destination`.
    ///
    /// Returns the number of bytes written. Parent directories are created
    /// and a partially written file is removed on failure.
    fn fetch_and_store<'a>(
        &'a self,
        session: &'a Session,
        item_id: &'a str,
        destination: &'a Path,
    ) -> BoxFuture<'a, ProviderResult<u64>>;
}
