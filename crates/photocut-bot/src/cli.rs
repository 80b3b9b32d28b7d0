//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

/// photocut - list Google Photos videos and send excerpts over Telegram
///
/// Required settings may come from flags, the environment or a `.env` file.
#[derive(Debug, Parser)]
#[command(name = "photocut")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "PHOTOCUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Log output format (pretty, compact, json)
    #[arg(long, env = "PHOTOCUT_LOG_FORMAT")]
    pub log_format: Option<String>,

    // --- Required settings ---
    /// Telegram bot token
    #[arg(long, env = "TELEGRAM_BOT_TOKEN", hide_env_values = true)]
    pub telegram_token: Option<String>,

    /// Google OAuth client ID
    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    pub google_client_id: Option<String>,

    /// Google OAuth client secret
    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    pub google_client_secret: Option<String>,

    /// OAuth redirect URI registered for the client
    #[arg(long, env = "GOOGLE_REDIRECT_URI")]
    pub google_redirect_uri: Option<String>,

    // --- Paths ---
    /// Where the OAuth credential is stored [default: token.json]
    #[arg(long, env = "PHOTOCUT_TOKEN_PATH")]
    pub token_path: Option<PathBuf>,

    /// Where downloaded videos and excerpts are written [default: downloads]
    #[arg(long, env = "PHOTOCUT_DOWNLOAD_DIR")]
    pub download_dir: Option<PathBuf>,

    /// ffmpeg program to run [default: ffmpeg]
    #[arg(long, env = "PHOTOCUT_FFMPEG")]
    pub ffmpeg: Option<PathBuf>,
}
