//! Core types: timestamps, video items, chat commands, formatting

pub mod command;
pub mod format;
pub mod logging;
pub mod time;
pub mod video;

pub use command::{parse_command, Command, CommandError, CommandKind, HELP_TEXT};
pub use format::{format_video_entry, format_video_list, paginate, ENTRY_SEPARATOR, MESSAGE_LIMIT};
pub use time::{format_creation_time, ExcerptRange, RangeError, Timestamp};
pub use logging::{init_logging, LogError, LogFormat, LogSettings};
pub use video::{is_valid_item_id, VideoItem};
