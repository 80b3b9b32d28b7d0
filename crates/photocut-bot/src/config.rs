//! Bot configuration.
//!
//! Required settings (bot token, OAuth client, redirect URI) come from the
//! command line or the environment, a `.env` file included. Optional settings
//! can also live in a `config.toml` file at
//! `~/.config/photocut/config.toml` by default:
//!
//! ```toml
//! token_path = "/var/lib/photocut/token.json"
//! download_dir = "/var/lib/photocut/downloads"
//! ffmpeg = "/usr/bin/ffmpeg"
//! request_timeout_secs = 30
//! poll_timeout_secs = 50
//! log_format = "json"
//! ```
//!
//! Command line and environment win over the file, the file wins over
//! built-in defaults.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use photocut_core::LogFormat;
use photocut_providers::google::{GoogleConfig, OAuthCredentials};

use crate::cli::Cli;
use crate::excerpt::FFMPEG;
use crate::telegram::DEFAULT_API_URL;

/// Default download directory, relative to the working directory.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 50;

/// Errors from loading or resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required settings were not provided.
    #[error("missing required settings: {}", .0.join(", "))]
    MissingRequired(Vec<&'static str>),

    /// The configuration file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// The file that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        /// The file that was parsed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Optional settings read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Where the OAuth credential is stored.
    pub token_path: Option<PathBuf>,
    /// Where source videos and excerpts are written.
    pub download_dir: Option<PathBuf>,
    /// Transcoder program.
    pub ffmpeg: Option<PathBuf>,
    /// Timeout for regular HTTP requests, in seconds.
    pub request_timeout_secs: Option<u64>,
    /// Long-poll timeout for `getUpdates`, in seconds.
    pub poll_timeout_secs: Option<u64>,
    /// Log output format: `pretty`, `compact` or `json`.
    pub log_format: Option<String>,
    /// Bot API base URL, for self-hosted Bot API servers.
    pub telegram_api_url: Option<String>,
}

impl FileConfig {
    /// Loads the file at `path`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads the file at the default path, or returns defaults if it is absent.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("photocut")
            .join("config.toml")
    }
}

/// Fully resolved bot configuration.
#[derive(Clone)]
pub struct BotConfig {
    /// Telegram bot token.
    pub telegram_token: String,
    /// Bot API base URL.
    pub telegram_api_url: String,
    /// Google Photos provider configuration.
    pub google: GoogleConfig,
    /// Download directory.
    pub download_dir: PathBuf,
    /// Transcoder program.
    pub ffmpeg: PathBuf,
    /// Timeout for regular HTTP requests.
    pub request_timeout: Duration,
    /// Long-poll timeout.
    pub poll_timeout: Duration,
    /// Log format, when one was chosen explicitly.
    pub log_format: Option<LogFormat>,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("telegram_token", &"<redacted>")
            .field("telegram_api_url", &self.telegram_api_url)
            .field("google", &self.google)
            .field("download_dir", &self.download_dir)
            .field("ffmpeg", &self.ffmpeg)
            .field("request_timeout", &self.request_timeout)
            .field("poll_timeout", &self.poll_timeout)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl BotConfig {
    /// Loads the file named by `--config` (or the default file) and resolves.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let file = match cli.config {
            Some(ref path) => FileConfig::load_from(path)?,
            None => FileConfig::load_default()?,
        };
        Self::resolve(cli, file)
    }

    /// Combines command line values with file values and defaults.
    ///
    /// Every missing required setting is reported at once.
    pub fn resolve(cli: &Cli, file: FileConfig) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        let mut required = |value: &Option<String>, name: &'static str| -> String {
            match value.as_deref().map(str::trim) {
                Some(v) if !v.is_empty() => v.to_string(),
                _ => {
                    missing.push(name);
                    String::new()
                }
            }
        };

        let telegram_token = required(&cli.telegram_token, "TELEGRAM_BOT_TOKEN");
        let client_id = required(&cli.google_client_id, "GOOGLE_CLIENT_ID");
        let client_secret = required(&cli.google_client_secret, "GOOGLE_CLIENT_SECRET");
        let redirect_uri = required(&cli.google_redirect_uri, "GOOGLE_REDIRECT_URI");

        if !missing.is_empty() {
            return Err(ConfigError::MissingRequired(missing));
        }

        let request_timeout = Duration::from_secs(
            file.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        );
        let poll_timeout =
            Duration::from_secs(file.poll_timeout_secs.unwrap_or(DEFAULT_POLL_TIMEOUT_SECS));
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }

        let log_format = cli
            .log_format
            .as_deref()
            .or(file.log_format.as_deref())
            .map(|s| s.parse::<LogFormat>())
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let token_path = cli
            .token_path
            .clone()
            .or(file.token_path)
            .unwrap_or_else(|| PathBuf::from(GoogleConfig::DEFAULT_TOKEN_PATH));

        let google = GoogleConfig::new(
            OAuthCredentials::new(client_id, client_secret),
            redirect_uri,
        )
        .with_token_path(token_path)
        .with_timeout(request_timeout);
        google.validate().map_err(ConfigError::Invalid)?;

        Ok(Self {
            telegram_token,
            telegram_api_url: file
                .telegram_api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            google,
            download_dir: cli
                .download_dir
                .clone()
                .or(file.download_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DOWNLOAD_DIR)),
            ffmpeg: cli
                .ffmpeg
                .clone()
                .or(file.ffmpeg)
                .unwrap_or_else(|| PathBuf::from(FFMPEG)),
            request_timeout,
            poll_timeout,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["photocut"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn complete_cli(extra: &[&str]) -> Cli {
        let mut args = vec![
            "--telegram-token",
            "123:abc",
            "--google-client-id",
            "client.apps.googleusercontent.com",
            "--google-client-secret",
            "secret",
            "--google-redirect-uri",
            "http://localhost:8080/callback",
        ];
        args.extend_from_slice(extra);
        cli(&args)
    }

    #[test]
    fn defaults() {
        let config = BotConfig::resolve(&complete_cli(&[]), FileConfig::default()).unwrap();

        assert_eq!(config.telegram_token, "123:abc");
        assert_eq!(config.telegram_api_url, DEFAULT_API_URL);
        assert_eq!(config.download_dir, PathBuf::from("downloads"));
        assert_eq!(config.ffmpeg, PathBuf::from("ffmpeg"));
        assert_eq!(config.google.token_path, PathBuf::from("token.json"));
        assert_eq!(config.google.timeout, Duration::from_secs(30));
        assert_eq!(config.poll_timeout, Duration::from_secs(50));
        assert!(config.log_format.is_none());
    }

    #[test]
    fn debug_hides_token() {
        let config = BotConfig::resolve(&complete_cli(&[]), FileConfig::default()).unwrap();
        let debug = format!("{:?}", config);
        assert!(!debug.contains("123:abc"));
        assert!(!debug.contains("\"secret\""));
    }

    #[test]
    fn missing_settings_are_listed_together() {
        let cli = Cli {
            telegram_token: Some("123:abc".to_string()),
            google_client_secret: Some("   ".to_string()),
            ..cli(&[])
        };
        let err = BotConfig::resolve(&cli, FileConfig::default()).unwrap_err();

        match err {
            ConfigError::MissingRequired(ref names) => assert_eq!(
                names,
                &["GOOGLE_CLIENT_ID", "GOOGLE_CLIENT_SECRET", "GOOGLE_REDIRECT_URI"]
            ),
            ref other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(
            err.to_string(),
            "missing required settings: GOOGLE_CLIENT_ID, GOOGLE_CLIENT_SECRET, GOOGLE_REDIRECT_URI"
        );
    }

    #[test]
    fn cli_overrides_file() {
        let file = FileConfig {
            token_path: Some(PathBuf::from("/var/lib/photocut/token.json")),
            download_dir: Some(PathBuf::from("/var/lib/photocut/downloads")),
            ffmpeg: Some(PathBuf::from("/usr/bin/ffmpeg")),
            log_format: Some("pretty".to_string()),
            ..FileConfig::default()
        };
        let cli = complete_cli(&["--download-dir", "/tmp/cuts", "--log-format", "json"]);

        let config = BotConfig::resolve(&cli, file).unwrap();

        assert_eq!(config.download_dir, PathBuf::from("/tmp/cuts"));
        assert_eq!(config.ffmpeg, PathBuf::from("/usr/bin/ffmpeg"));
        assert_eq!(
            config.google.token_path,
            PathBuf::from("/var/lib/photocut/token.json")
        );
        assert_eq!(config.log_format, Some(LogFormat::Json));
    }

    #[test]
    fn invalid_values() {
        let file = FileConfig {
            log_format: Some("xml".to_string()),
            ..FileConfig::default()
        };
        let err = BotConfig::resolve(&complete_cli(&[]), file).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let cli = Cli {
            google_redirect_uri: Some("not a url".to_string()),
            ..complete_cli(&[])
        };
        let err = BotConfig::resolve(&cli, FileConfig::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let file = FileConfig {
            request_timeout_secs: Some(0),
            ..FileConfig::default()
        };
        let err = BotConfig::resolve(&complete_cli(&[]), file).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "download_dir = \"/srv/photocut\"\npoll_timeout_secs = 20\nlog_format = \"json\"\n",
        )
        .unwrap();

        let file = FileConfig::load_from(&path).unwrap();
        assert_eq!(file.download_dir, Some(PathBuf::from("/srv/photocut")));
        assert_eq!(file.poll_timeout_secs, Some(20));
        assert_eq!(file.log_format.as_deref(), Some("json"));
        assert!(file.ffmpeg.is_none());
    }

    #[test]
    fn load_file_errors() {
        let dir = tempfile::tempdir().unwrap();

        let err = FileConfig::load_from(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));

        let path = dir.path().join("config.toml");
        std::fs::write(&path, "unknown_key = 1\n").unwrap();
        let err = FileConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
