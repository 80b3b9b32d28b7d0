//! Telegram Bot API client and update loop.
//!
//! Only the handful of methods the bot needs are wrapped: `getMe`,
//! `getUpdates` (long polling), `sendMessage` and `sendVideo`. Every
//! response is an envelope `{ "ok": bool, "result": ..., "description": ... }`;
//! `ok == false` becomes a [`TransportError::Api`].
//!
//! `getMe` and `sendMessage` are capped by the request timeout as a whole.
//! `sendVideo` only has the connect and idle limits, since an upload may
//! legitimately take longer than any fixed cap.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use photocut_providers::BoxFuture;

use crate::dispatcher::Dispatcher;
use crate::signals::ShutdownHandle;
use crate::transport::{ChatId, ChatTransport, TransportError, TransportResult};

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Extra time allowed on top of the long-poll timeout.
const POLL_MARGIN: Duration = Duration::from_secs(10);

/// Pause after a failed `getUpdates` call.
const POLL_ERROR_PAUSE: Duration = Duration::from_secs(5);

/// Telegram Bot API client.
pub struct TelegramClient {
    http_client: reqwest::Client,
    /// `<api_url>/bot<token>`; never logged.
    base_url: String,
    request_timeout: Duration,
    poll_timeout: Duration,
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .finish()
    }
}

impl TelegramClient {
    /// Creates a client for the bot identified by `token`.
    pub fn new(
        token: &str,
        api_url: &str,
        request_timeout: Duration,
        poll_timeout: Duration,
    ) -> TransportResult<Self> {
        // A long poll is silent until an update arrives, so the idle limit
        // has to cover it.
        let http_client = reqwest::Client::builder()
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout.max(poll_timeout + POLL_MARGIN))
            .user_agent(format!("photocut/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Request(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
            poll_timeout,
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    /// Returns the bot's own account, validating the token.
    pub async fn get_me(&self) -> TransportResult<User> {
        let request = self
            .http_client
            .post(self.method_url("getMe"))
            .timeout(self.request_timeout);
        self.call(request).await
    }

    /// Long-polls for updates with ids at or above `offset`.
    pub async fn get_updates(&self, offset: Option<i64>) -> TransportResult<Vec<Update>> {
        let body = GetUpdates {
            offset,
            timeout: self.poll_timeout.as_secs(),
            allowed_updates: &["message"],
        };
        let request = self
            .http_client
            .post(self.method_url("getUpdates"))
            .timeout(self.poll_timeout + POLL_MARGIN)
            .json(&body);
        self.call(request).await
    }

    async fn post_message(&self, chat: ChatId, text: &str) -> TransportResult<()> {
        let body = SendMessage {
            chat_id: chat.0,
            text,
        };
        let request = self
            .http_client
            .post(self.method_url("sendMessage"))
            .timeout(self.request_timeout)
            .json(&body);
        let _: Message = self.call(request).await?;
        debug!(chat_id = %chat, chars = text.chars().count(), "sent message");
        Ok(())
    }

    async fn post_video(&self, chat: ChatId, path: &Path, caption: &str) -> TransportResult<()> {
        let data = tokio::fs::read(path).await.map_err(|source| TransportError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let size = data.len();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "video.mp4".to_string());

        let video = reqwest::multipart::Part::bytes(data)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| TransportError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat.0.to_string())
            .text("caption", caption.to_string())
            .part("video", video);

        let request = self
            .http_client
            .post(self.method_url("sendVideo"))
            .multipart(form);
        let _: Message = self.call(request).await?;
        info!(chat_id = %chat, bytes = size, "sent video");
        Ok(())
    }

    /// Sends a request and unwraps the response envelope.
    async fn call<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> TransportResult<T> {
        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError::Request(e.without_url().to_string()))?;

        parse_envelope(status, &body)
    }
}

/// Decodes a Bot API response body.
fn parse_envelope<T: DeserializeOwned>(
    status: reqwest::StatusCode,
    body: &str,
) -> TransportResult<T> {
    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(TransportError::Api {
                code: Some(i64::from(status.as_u16())),
                description: body.trim().to_string(),
            });
        }
        Err(e) => return Err(TransportError::InvalidResponse(e.to_string())),
    };

    if !envelope.ok {
        return Err(TransportError::Api {
            code: envelope.error_code,
            description: envelope
                .description
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }

    envelope
        .result
        .ok_or_else(|| TransportError::InvalidResponse("missing result".to_string()))
}

impl ChatTransport for TelegramClient {
    fn send_message<'a>(&'a self, chat: ChatId, text: &'a str) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.post_message(chat, text))
    }

    fn send_video<'a>(
        &'a self,
        chat: ChatId,
        path: &'a Path,
        caption: &'a str,
    ) -> BoxFuture<'a, TransportResult<()>> {
        Box::pin(self.post_video(chat, path, caption))
    }
}

/// Receives updates until shutdown and hands each text message to the dispatcher.
///
/// Every message is handled on its own task so a slow `/cut` does not hold
/// up other commands. Once shutdown is signaled no new updates are fetched,
/// and the call returns only after every handler already started has
/// finished.
pub async fn run_polling(
    client: Arc<TelegramClient>,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownHandle,
) {
    let mut offset: Option<i64> = None;
    let mut handlers = JoinSet::new();
    info!("polling for updates");

    while !shutdown.is_shutdown() {
        while let Some(result) = handlers.try_join_next() {
            log_handler_exit(result);
        }

        let updates = tokio::select! {
            _ = shutdown.wait().wait() => break,
            result = client.get_updates(offset) => result,
        };

        let updates = match updates {
            Ok(updates) => updates,
            Err(e) => {
                warn!(error = %e, "failed to fetch updates");
                tokio::select! {
                    _ = shutdown.wait().wait() => break,
                    _ = tokio::time::sleep(POLL_ERROR_PAUSE) => continue,
                }
            }
        };

        for update in updates {
            offset = Some(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            let Some(text) = message.text else {
                continue;
            };

            let chat = ChatId(message.chat.id);
            debug!(chat_id = %chat, update_id = update.update_id, "received message");

            let dispatcher = dispatcher.clone();
            handlers.spawn(async move {
                dispatcher.handle_text(chat, &text).await;
            });
        }
    }

    if !handlers.is_empty() {
        info!(in_flight = handlers.len(), "waiting for running commands to finish");
    }
    while let Some(result) = handlers.join_next().await {
        log_handler_exit(result);
    }

    info!("stopped polling");
}

fn log_handler_exit(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "command handler did not complete");
    }
}

// Bot API types

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: &'static [&'static str],
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
}

/// An incoming update.
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New incoming message, if this update carries one.
    #[serde(default)]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    /// Message id within the chat.
    pub message_id: i64,
    /// The chat the message belongs to.
    pub chat: Chat,
    /// Text content, absent for media messages.
    #[serde(default)]
    pub text: Option<String>,
}

/// A Telegram chat.
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    /// Chat id, used as the reply target.
    pub id: i64,
}

/// A Telegram user or bot account.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    /// Account id.
    pub id: i64,
    /// Username without the leading `@`.
    #[serde(default)]
    pub username: Option<String>,
}
