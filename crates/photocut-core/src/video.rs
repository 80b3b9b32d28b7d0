//! Video item model.
//!
//! A [`VideoItem`] is the provider-agnostic view of a catalogued video: its
//! metadata only, never the bytes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata of a video stored in the photo library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoItem {
    /// Opaque provider-assigned identifier.
    pub id: String,
    /// Original filename.
    pub filename: String,
    /// When the video was created.
    pub created: DateTime<Utc>,
    /// Human-viewable URL of the item in the provider's UI.
    pub url: String,
}

impl VideoItem {
    /// Creates a new video item.
    pub fn new(
        id: impl Into<String>,
        filename: impl Into<String>,
        created: DateTime<Utc>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            filename: filename.into(),
            created,
            url: url.into(),
        }
    }
}

/// Returns true if `id` is safe to use as a file stem in the download directory.
///
/// Provider ids are URL-safe base64-like strings; anything else is rejected so
/// an id can never escape the working directory.
pub fn is_valid_item_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}
