//! Telegram front end: command dispatch, excerpts, configuration.
//!
//! ```text
//! Telegram ──getUpdates──► run_polling ──► Dispatcher ──► CredentialStore
//!    ▲                                        │       └──► PhotoLibrary
//!    └──────sendMessage / sendVideo───────────┘       └──► Excerpter (ffmpeg)
//! ```

pub mod cli;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod excerpt;
pub mod session;
pub mod signals;
pub mod telegram;
pub mod transport;
pub mod workspace;

use std::sync::Arc;

use tracing::info;

use photocut_providers::google::GooglePhotos;

pub use config::{BotConfig, ConfigError, FileConfig};
pub use dispatcher::Dispatcher;
pub use error::{BotError, BotResult};
pub use excerpt::{ExcerptError, Excerpter, Ffmpeg};
pub use session::AuthSession;
pub use signals::{ShutdownHandle, ShutdownSignal, SignalHandler};
pub use telegram::{TelegramClient, run_polling};
pub use transport::{ChatId, ChatTransport, TransportError, TransportResult};
pub use workspace::SourceCache;

/// Runs the bot until SIGINT or SIGTERM.
///
/// Fails early when ffmpeg cannot be run, the download directory cannot be
/// prepared or the bot token is rejected.
pub async fn run(config: BotConfig) -> BotResult<()> {
    let ffmpeg = Ffmpeg::new(&config.ffmpeg);
    ffmpeg.check_available().await?;

    let google = Arc::new(GooglePhotos::new(config.google.clone())?);
    info!(token_path = %google.token_path().display(), "credential store ready");

    let cache = SourceCache::open(&config.download_dir).await?;

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram_token,
        &config.telegram_api_url,
        config.request_timeout,
        config.poll_timeout,
    )?);
    let me = telegram.get_me().await?;
    info!(
        bot_id = me.id,
        username = me.username.as_deref().unwrap_or_default(),
        "connected to Telegram"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        google.clone(),
        google,
        Arc::new(ffmpeg),
        telegram.clone(),
        cache,
    ));

    let signals = SignalHandler::new();
    signals.spawn_listener();

    run_polling(telegram, dispatcher, signals.shutdown_handle()).await;
    Ok(())
}
