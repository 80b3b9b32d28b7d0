//! Chat command parsing.
//!
//! Incoming chat text is matched against a fixed set of command shapes:
//!
//! | Command                              | Meaning                               |
//! |--------------------------------------|---------------------------------------|
//! | `/start`                             | begin or confirm authentication       |
//! | `/auth <code>`                       | complete authentication               |
//! | `/clear`                             | forget the stored credential          |
//! | `/list <count>`                      | list recent videos                    |
//! | `/cut <id> <HH:MM:SS> <HH:MM:SS>`    | send an excerpt of a video            |
//! | `/help`                              | show usage                            |
//!
//! Telegram may suffix the command with the bot's name (`/list@my_bot 5`);
//! the suffix is ignored.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::time::{ExcerptRange, RangeError};

static AUTH_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+)$").expect("Invalid auth regex"));

static LIST_ARGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)$").expect("Invalid list regex"));

static CUT_ARGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z0-9_-]+)\s+(\d{2}:\d{2}:\d{2})\s+(\d{2}:\d{2}:\d{2})$")
        .expect("Invalid cut regex")
});

/// Usage summary sent for `/help` and unknown commands.
pub const HELP_TEXT: &str = "Available commands:\n\
    /start - connect your photo library\n\
    /auth <code> - finish connecting with the code from the authorization page\n\
    /clear - forget the stored credential\n\
    /list <count> - list your most recent videos\n\
    /cut <itemId> <HH:MM:SS> <HH:MM:SS> - receive an excerpt of a video";

/// The command keywords understood by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `/start`
    Start,
    /// `/auth`
    Auth,
    /// `/clear`
    Clear,
    /// `/list`
    List,
    /// `/cut`
    Cut,
    /// `/help`
    Help,
}

impl CommandKind {
    /// Looks up a keyword (without the leading slash).
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "start" => Some(Self::Start),
            "auth" => Some(Self::Auth),
            "clear" => Some(Self::Clear),
            "list" => Some(Self::List),
            "cut" => Some(Self::Cut),
            "help" => Some(Self::Help),
            _ => None,
        }
    }

    /// Returns the keyword, without the leading slash.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Auth => "auth",
            Self::Clear => "clear",
            Self::List => "list",
            Self::Cut => "cut",
            Self::Help => "help",
        }
    }

    /// Returns the usage line for this command.
    pub fn usage(&self) -> &'static str {
        match self {
            Self::Start => "Usage: /start",
            Self::Auth => "Usage: /auth <code>\nPaste the code shown after granting access.",
            Self::Clear => "Usage: /clear",
            Self::List => "Usage: /list <count>\nExample: /list 5",
            Self::Cut => {
                "Please provide a valid media item ID and start/end times in HH:MM:SS format.\n\
                 Usage: /cut <itemId> <HH:MM:SS> <HH:MM:SS>"
            }
            Self::Help => HELP_TEXT,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.as_str())
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Begin or confirm authentication.
    Start,
    /// Complete authentication with an authorization code.
    Auth {
        /// The free-form code returned by the provider.
        code: String,
    },
    /// Delete the stored credential.
    Clear,
    /// List the most recent videos.
    List {
        /// How many videos to list.
        count: usize,
    },
    /// Produce and send an excerpt.
    Cut {
        /// The provider item id.
        item_id: String,
        /// The validated excerpt window.
        range: ExcerptRange,
    },
    /// Show usage.
    Help,
}

impl Command {
    /// Returns the keyword this command was parsed from.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Start => CommandKind::Start,
            Self::Auth { .. } => CommandKind::Auth,
            Self::Clear => CommandKind::Clear,
            Self::List { .. } => CommandKind::List,
            Self::Cut { .. } => CommandKind::Cut,
            Self::Help => CommandKind::Help,
        }
    }
}

/// Reasons a slash command could not be turned into a [`Command`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The keyword is known but its arguments have the wrong shape.
    #[error("malformed {0} command")]
    Usage(CommandKind),

    /// The keyword is not one the bot understands.
    #[error("unknown command /{0}")]
    Unknown(String),

    /// A `/cut` request with an unusable time window.
    #[error(transparent)]
    InvalidRange(#[from] RangeError),
}

/// Parses chat text into a command.
///
/// Returns `None` for text that is not a slash command at all.
pub fn parse_command(text: &str) -> Option<Result<Command, CommandError>> {
    let text = text.trim();
    let rest = text.strip_prefix('/')?;

    let (head, args) = match rest.split_once(char::is_whitespace) {
        Some((head, args)) => (head, args.trim()),
        None => (rest, ""),
    };
    let keyword = head.split_once('@').map_or(head, |(keyword, _bot)| keyword);

    let Some(kind) = CommandKind::from_keyword(keyword) else {
        return Some(Err(CommandError::Unknown(keyword.to_string())));
    };

    Some(parse_args(kind, args))
}

fn parse_args(kind: CommandKind, args: &str) -> Result<Command, CommandError> {
    let usage = || CommandError::Usage(kind);

    match kind {
        CommandKind::Start => Ok(Command::Start),
        CommandKind::Clear => Ok(Command::Clear),
        CommandKind::Help => Ok(Command::Help),
        CommandKind::Auth => {
            let caps = AUTH_ARGS.captures(args).ok_or_else(usage)?;
            Ok(Command::Auth {
                code: caps[1].to_string(),
            })
        }
        CommandKind::List => {
            let caps = LIST_ARGS.captures(args).ok_or_else(usage)?;
            let count = caps[1].parse().map_err(|_| usage())?;
            Ok(Command::List { count })
        }
        CommandKind::Cut => {
            let caps = CUT_ARGS.captures(args).ok_or_else(usage)?;
            let range = ExcerptRange::parse(&caps[2], &caps[3])?;
            Ok(Command::Cut {
                item_id: caps[1].to_string(),
                range,
            })
        }
    }
}
