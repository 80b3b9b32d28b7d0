//! Google Photos Library API client.
//!
//! Low-level HTTP calls: media item search, metadata lookup and byte
//! download. Authentication is handled by the caller, which passes the
//! access token to each call.
//!
//! JSON calls are bounded by a total request timeout. Video downloads are
//! not: they only rely on the connect and idle limits of the shared
//! `reqwest::Client`, so a large but progressing transfer is never cut off.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use photocut_core::VideoItem;

use crate::error::{ProviderError, ProviderResult};

/// Largest page size accepted by `mediaItems:search`.
pub const MAX_PAGE_SIZE: usize = 100;

/// Suffix appended to a video's base URL to download its original bytes.
const VIDEO_DOWNLOAD_SUFFIX: &str = "=dv";

/// Google Photos Library API client.
#[derive(Debug, Clone)]
pub struct PhotosClient {
    http_client: reqwest::Client,
    api_base: String,
    request_timeout: Duration,
}

impl PhotosClient {
    /// Creates a client for the API at `api_base`, sharing the given HTTP client.
    ///
    /// `request_timeout` bounds each search and metadata call.
    pub fn new(
        http_client: reqwest::Client,
        api_base: impl Into<String>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            request_timeout,
        }
    }

    /// Lists up to `count` videos, newest first as returned by the provider.
    ///
    /// Follows `nextPageToken` until enough items are collected. Items
    /// without a usable creation time are skipped.
    pub async fn search_videos(
        &self,
        access_token: &str,
        count: usize,
    ) -> ProviderResult<Vec<VideoItem>> {
        let mut videos = Vec::new();
        let mut page_token: Option<String> = None;

        while videos.len() < count {
            let page_size = (count - videos.len()).min(MAX_PAGE_SIZE);
            let page = self
                .search_page(access_token, page_size, page_token.as_deref())
                .await?;

            videos.extend(page.media_items.into_iter().filter_map(convert_media_item));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        videos.truncate(count);
        debug!(count = videos.len(), "fetched videos");
        Ok(videos)
    }

    /// Fetches a single page of video search results.
    async fn search_page(
        &self,
        access_token: &str,
        page_size: usize,
        page_token: Option<&str>,
    ) -> ProviderResult<SearchResponse> {
        let url = format!("{}/mediaItems:search", self.api_base);
        let body = SearchRequest::videos(page_size, page_token);

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(access_token)
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response, "media item search").await?;
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_source(e)
        })?;

        parse_search_response(&body)
    }

    /// Fetches metadata for a single media item.
    pub async fn get_media_item(
        &self,
        access_token: &str,
        item_id: &str,
    ) -> ProviderResult<MediaItem> {
        let url = format!(
            "{}/mediaItems/{}",
            self.api_base,
            urlencoding::encode(item_id)
        );

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(access_token)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(request_error)?;

        let response = check_status(response, "media item lookup").await?;
        let body = response.text().await.map_err(|e| {
            ProviderError::network(format!("failed to read response: {}", e)).with_source(e)
        })?;

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("failed to parse media item: {}", e))
        })
    }

    /// Streams the original bytes of a video to `destination`.
    ///
    /// The download URL is pre-authorized, so no bearer token is sent.
    /// Returns the number of bytes written. The partial file is removed if
    /// the transfer fails.
    pub async fn download_video(&self, base_url: &str, destination: &Path) -> ProviderResult<u64> {
        let url = download_url(base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(request_error)?;
        let response = check_status(response, "video download").await?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ProviderError::storage(format!(
                    "failed to create directory {}: {}",
                    parent.display(),
                    e
                ))
                .with_source(e)
            })?;
        }

        match stream_to_file(response, destination).await {
            Ok(written) => Ok(written),
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(destination).await
                    && remove_err.kind() != std::io::ErrorKind::NotFound
                {
                    warn!(
                        path = %destination.display(),
                        error = %remove_err,
                        "failed to remove partial download"
                    );
                }
                Err(e)
            }
        }
    }
}

async fn stream_to_file(mut response: reqwest::Response, destination: &Path) -> ProviderResult<u64> {
    let storage_error = |e: std::io::Error| {
        ProviderError::storage(format!(
            "failed to write {}: {}",
            destination.display(),
            e
        ))
        .with_source(e)
    };

    let mut file = tokio::fs::File::create(destination)
        .await
        .map_err(storage_error)?;
    let mut written: u64 = 0;

    while let Some(chunk) = response.chunk().await.map_err(|e| {
        ProviderError::network(format!("download interrupted: {}", e)).with_source(e)
    })? {
        file.write_all(&chunk).await.map_err(storage_error)?;
        written += chunk.len() as u64;
    }

    file.flush().await.map_err(storage_error)?;
    debug!(path = %destination.display(), bytes = written, "download complete");
    Ok(written)
}

/// Maps a transport-level reqwest failure to a network error.
fn request_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    };
    ProviderError::network(message).with_source(e)
}

/// Turns a non-success response into the matching error, keeping the body.
async fn check_status(
    response: reqwest::Response,
    what: &str,
) -> ProviderResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{} failed ({}): {}", what, status, body);

    Err(match status {
        reqwest::StatusCode::UNAUTHORIZED => ProviderError::unauthenticated(message),
        reqwest::StatusCode::NOT_FOUND => ProviderError::not_found(message),
        reqwest::StatusCode::TOO_MANY_REQUESTS => ProviderError::rate_limited(message),
        _ => ProviderError::api(message),
    })
}

/// Derives the transient download URL for a video's base URL.
pub fn download_url(base_url: &str) -> String {
    format!("{}{}", base_url, VIDEO_DOWNLOAD_SUFFIX)
}

fn parse_search_response(body: &str) -> ProviderResult<SearchResponse> {
    serde_json::from_str(body).map_err(|e| {
        ProviderError::invalid_response(format!("failed to parse search response: {}", e))
    })
}

/// Converts an API media item, dropping items that cannot be listed.
fn convert_media_item(item: MediaItem) -> Option<VideoItem> {
    let created = match item.creation_time() {
        Some(created) => created,
        None => {
            warn!(item_id = %item.id, "media item has no usable creation time, skipping");
            return None;
        }
    };

    Some(VideoItem::new(
        item.id,
        item.filename.unwrap_or_default(),
        created,
        item.product_url.unwrap_or_default(),
    ))
}

// API request and response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    page_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
    filters: SearchFilters,
}

impl<'a> SearchRequest<'a> {
    fn videos(page_size: usize, page_token: Option<&'a str>) -> Self {
        Self {
            page_size,
            page_token,
            filters: SearchFilters {
                media_type_filter: MediaTypeFilter {
                    media_types: vec!["VIDEO"],
                },
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchFilters {
    media_type_filter: MediaTypeFilter,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaTypeFilter {
    media_types: Vec<&'static str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    media_items: Vec<MediaItem>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// A media item as returned by the Photos Library API.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Opaque item id.
    pub id: String,
    /// Original filename.
    #[serde(default)]
    pub filename: Option<String>,
    /// Link to the item in the Google Photos UI.
    #[serde(default)]
    pub product_url: Option<String>,
    /// Short-lived base URL for the item's bytes.
    #[serde(default)]
    pub base_url: Option<String>,
    /// MIME type, e.g. `video/mp4`.
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    media_metadata: Option<MediaMetadata>,
}

impl MediaItem {
    /// Returns the creation time, if present and parseable.
    pub fn creation_time(&self) -> Option<DateTime<Utc>> {
        let raw = self.media_metadata.as_ref()?.creation_time.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| warn!(item_id = %self.id, error = %e, "invalid creation time"))
            .ok()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaMetadata {
    #[serde(default)]
    creation_time: Option<String>,
}
