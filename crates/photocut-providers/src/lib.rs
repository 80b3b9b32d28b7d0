//! Credential store and photo library abstractions.
//!
//! - [`CredentialStore`] - persisted OAuth credential, authorization and refresh
//! - [`PhotoLibrary`] - video listing and download
//! - [`ProviderError`] - error type shared by both
//!
//! ```text
//! ┌──────────────────────────┐
//! │ Google Photos Library API│
//! └────────────┬─────────────┘
//!              │
//!              ▼
//!      ┌───────────────┐
//!      │ GooglePhotos  │
//!      └───┬───────┬───┘
//!          │       │
//!          ▼       ▼
//! CredentialStore  PhotoLibrary
//! ```

pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod provider;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use provider::{BoxFuture, CredentialStore, PendingAuthorization, PhotoLibrary, Session};
