//! Bot error types.

use std::io;

use thiserror::Error;

use photocut_core::CommandKind;
use photocut_providers::ProviderError;

use crate::config::ConfigError;
use crate::excerpt::ExcerptError;
use crate::transport::TransportError;

/// Result type for bot operations.
pub type BotResult<T> = Result<T, BotError>;

/// Errors that can occur while running the bot or handling a command.
#[derive(Debug, Error)]
pub enum BotError {
    /// Startup configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Credential or photo library failure.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Chat platform failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The transcoder failed.
    #[error("processing error: {0}")]
    Excerpt(#[from] ExcerptError),

    /// Local file operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A command arrived in a state that does not accept it.
    #[error("{command} is not valid now: {reason}")]
    OutOfOrder {
        /// The rejected command.
        command: CommandKind,
        /// Why it was rejected.
        reason: String,
    },
}

impl BotError {
    /// Creates an out-of-order error.
    pub fn out_of_order(command: CommandKind, reason: impl Into<String>) -> Self {
        Self::OutOfOrder {
            command,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_display() {
        let err = BotError::out_of_order(CommandKind::Auth, "no authorization is pending");
        assert_eq!(err.to_string(), "/auth is not valid now: no authorization is pending");
    }

    #[test]
    fn provider_error_converts() {
        let err: BotError = ProviderError::unauthenticated("no stored credential").into();
        assert!(matches!(err, BotError::Provider(ref e) if e.is_unauthenticated()));
    }
}
