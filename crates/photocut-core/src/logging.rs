//! Log output for the photocut binary.
//!
//! Everything goes to stderr through one `tracing_subscriber` fmt layer.
//! Our own crates log at `info` (or `debug` with `--debug`) while HTTP and
//! runtime dependencies are held at `warn`; `RUST_LOG` replaces that
//! default entirely.
//!
//! ```ignore
//! use photocut_core::logging::{LogFormat, LogSettings, init_logging};
//!
//! init_logging(LogSettings::new(false).with_format(LogFormat::Json))?;
//! ```

use std::str::FromStr;

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Target prefix shared by every crate in the workspace.
const OWN_TARGET: &str = "photocut";

/// Why logging could not be set up.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to install log subscriber: {0}")]
    Install(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("unknown log format '{0}', expected pretty, compact or json")]
    UnknownFormat(String),
}

/// How each log line is rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Multi-line, for reading in a terminal.
    Pretty,
    /// One line per event.
    #[default]
    Compact,
    /// One JSON object per event, for log shippers.
    Json,
}

impl FromStr for LogFormat {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "compact" => Ok(Self::Compact),
            "json" => Ok(Self::Json),
            other => Err(LogError::UnknownFormat(other.to_string())),
        }
    }
}

/// Log settings resolved from the command line and config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Debug level for our crates, with source file and line.
    pub verbose: bool,
    pub format: LogFormat,
    /// Explicit filter directive; wins over `RUST_LOG` and `verbose`.
    pub filter: Option<String>,
}

impl LogSettings {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            format: LogFormat::default(),
            filter: None,
        }
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    fn own_level(&self) -> Level {
        if self.verbose { Level::DEBUG } else { Level::INFO }
    }

    /// Filter used when neither `filter` nor `RUST_LOG` is set.
    fn default_directive(&self) -> String {
        format!("warn,{}={}", OWN_TARGET, self.own_level())
    }

    fn env_filter(&self) -> Result<EnvFilter, LogError> {
        if let Some(directive) = &self.filter {
            return Ok(EnvFilter::try_new(directive)?);
        }
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(self.default_directive()))
            .map_err(LogError::from)
    }
}

/// Installs the global subscriber. Call once, before the first event.
pub fn init_logging(settings: LogSettings) -> Result<(), LogError> {
    let filter = settings.env_filter()?;

    let lines = fmt::layer()
        .with_writer(std::io::stderr)
        .with_file(settings.verbose)
        .with_line_number(settings.verbose);
    let lines = match settings.format {
        LogFormat::Pretty => lines.pretty().boxed(),
        LogFormat::Compact => lines.compact().boxed(),
        LogFormat::Json => lines.json().boxed(),
    };

    tracing::subscriber::set_global_default(tracing_subscriber::registry().with(filter).with(lines))?;
    Ok(())
}
