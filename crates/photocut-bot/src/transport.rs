//! Outbound chat messaging.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use photocut_providers::BoxFuture;

/// Identifier of the chat a command came from and replies go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from the chat platform.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP request could not be completed.
    #[error("chat request failed: {0}")]
    Request(String),

    /// The chat API answered with `ok: false`.
    #[error("chat API error{}: {description}", error_code_suffix(.code))]
    Api {
        /// Platform error code, when given.
        code: Option<i64>,
        /// Human-readable reason.
        description: String,
    },

    /// The response could not be decoded.
    #[error("invalid chat API response: {0}")]
    InvalidResponse(String),

    /// A file to upload could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// The file that was being read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

fn error_code_suffix(code: &Option<i64>) -> String {
    match code {
        Some(code) => format!(" {}", code),
        None => String::new(),
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Sends replies to a chat.
pub trait ChatTransport: Send + Sync {
    /// Sends a plain text message.
    fn send_message<'a>(&'a self, chat: ChatId, text: &'a str) -> BoxFuture<'a, TransportResult<()>>;

    /// Uploads a video file with a caption.
    fn send_video<'a>(
        &'a self,
        chat: ChatId,
        path: &'a Path,
        caption: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>>;
}
