//! Google Photos provider implementation.
//!
//! # Authentication Flow
//!
//! 1. The operator registers an OAuth client and its redirect URI
//! 2. `/start` produces a consent URL with a PKCE challenge
//! 3. The user grants read-only library access in the browser
//! 4. Google redirects to the registered URI with a `code` parameter
//! 5. The user sends `/auth <code>` and the code is exchanged for tokens
//! 6. Tokens are persisted and refreshed when they expire
//!
//! # Example
//!
//! ```ignore
//! use photocut_providers::google::{GoogleConfig, GooglePhotos, OAuthCredentials};
//!
//! let config = GoogleConfig::new(
//!     OAuthCredentials::new("id.apps.googleusercontent.com", "secret"),
//!     "http://localhost:3000/oauth2callback",
//! );
//! let photos = GooglePhotos::new(config)?;
//! let session = photos.load().await?;
//! let videos = photos.list_recent_videos(&session, 5).await?;
//! ```

mod client;
mod config;
mod oauth;
mod provider;
mod tokens;

pub use client::{MAX_PAGE_SIZE, MediaItem, PhotosClient, download_url};
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::{AuthorizationResponse, OAuthClient, PkceFlow, RefreshedToken};
pub use provider::GooglePhotos;
pub use tokens::{TokenInfo, TokenStorage};
