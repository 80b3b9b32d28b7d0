//! Chat output formatting.
//!
//! Video listings are rendered as numbered multi-line blocks and packed into
//! messages that respect the chat transport's size limit.

use crate::time::format_creation_time;
use crate::video::VideoItem;

/// Maximum number of characters in a single chat message.
pub const MESSAGE_LIMIT: usize = 4096;

/// Separator placed between two entries of the same message.
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// Renders one listing entry. `position` is 1-based.
pub fn format_video_entry(position: usize, item: &VideoItem) -> String {
    format!(
        "{}. {}\nID: {}\nURL: {}\nCreated: {}",
        position,
        item.filename,
        item.id,
        item.url,
        format_creation_time(&item.created)
    )
}

/// Renders every item of a listing, numbered from 1.
pub fn format_video_list(items: &[VideoItem]) -> Vec<String> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format_video_entry(i + 1, item))
        .collect()
}

/// Packs entries into messages of at most `limit` characters.
///
/// Entries are appended to a buffer that is flushed whenever the next entry
/// would push it past the limit; whatever remains is flushed at the end. An
/// entry never straddles two messages unless it is longer than `limit` by
/// itself, in which case it is cut at character boundaries.
pub fn paginate<S: AsRef<str>>(entries: &[S], limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let separator_len = ENTRY_SEPARATOR.chars().count();

    let mut messages = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0;

    for entry in entries {
        let entry = entry.as_ref();
        let entry_len = entry.chars().count();

        if !buffer.is_empty() && buffer_len + separator_len + entry_len > limit {
            messages.push(std::mem::take(&mut buffer));
            buffer_len = 0;
        }

        if entry_len > limit {
            let mut pieces = split_at_chars(entry, limit);
            if let Some(last) = pieces.pop() {
                messages.extend(pieces);
                buffer_len = last.chars().count();
                buffer = last;
            }
            continue;
        }

        if !buffer.is_empty() {
            buffer.push_str(ENTRY_SEPARATOR);
            buffer_len += separator_len;
        }
        buffer.push_str(entry);
        buffer_len += entry_len;
    }

    if !buffer.is_empty() {
        messages.push(buffer);
    }

    messages
}

/// Splits `text` into pieces of at most `size` characters.
fn split_at_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|chunk| chunk.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn item(id: &str, filename: &str) -> VideoItem {
        VideoItem::new(
            id,
            filename,
            Utc.with_ymd_and_hms(2024, 10, 27, 15, 59, 5).unwrap(),
            format!("https://photos.google.com/lr/photo/{}", id),
        )
    }

    #[test]
    fn entry_layout() {
        let entry = format_video_entry(1, &item("A", "v1.mp4"));
        insta::assert_snapshot!(entry, @r"
        1. v1.mp4
        ID: A
        URL: https://photos.google.com/lr/photo/A
        Created: 2024-10-27T15:59:05Z
        ");
    }

    #[test]
    fn two_items_fit_in_one_message() {
        let entries = format_video_list(&[item("A", "v1.mp4"), item("B", "v2.mp4")]);
        let messages = paginate(&entries, MESSAGE_LIMIT);

        assert_eq!(messages.len(), 1);
        insta::assert_snapshot!(messages[0], @r"
        1. v1.mp4
        ID: A
        URL: https://photos.google.com/lr/photo/A
        Created: 2024-10-27T15:59:05Z

        2. v2.mp4
        ID: B
        URL: https://photos.google.com/lr/photo/B
        Created: 2024-10-27T15:59:05Z
        ");
    }

    #[test]
    fn empty_list_produces_no_messages() {
        let entries: Vec<String> = Vec::new();
        assert!(paginate(&entries, MESSAGE_LIMIT).is_empty());
    }

    #[test]
    fn long_listing_is_split_on_entry_boundaries() {
        let items: Vec<VideoItem> = (0..200)
            .map(|i| item(&format!("AF1Qip{:04}", i), &format!("VID_2024_{:04}.mp4", i)))
            .collect();
        let entries = format_video_list(&items);
        let messages = paginate(&entries, MESSAGE_LIMIT);

        assert!(messages.len() > 1);
        for message in &messages {
            assert!(message.chars().count() <= MESSAGE_LIMIT);
            assert!(message.starts_with(|c: char| c.is_ascii_digit()));
        }
        assert_eq!(messages.join(ENTRY_SEPARATOR), entries.join(ENTRY_SEPARATOR));
    }

    #[test]
    fn flushes_exactly_at_limit() {
        let entries = vec!["a".repeat(5), "b".repeat(5), "c".repeat(5)];
        // "aaaaa\n\nbbbbb" is 12 characters
        let messages = paginate(&entries, 12);
        assert_eq!(messages, vec!["aaaaa\n\nbbbbb".to_string(), "ccccc".to_string()]);
    }

    #[test]
    fn oversized_entry_is_cut() {
        let entries = vec!["x".repeat(10), "y".repeat(2)];
        let messages = paginate(&entries, 4);
        assert_eq!(messages, vec!["xxxx", "xxxx", "xx", "yy"]);
        assert!(messages.iter().all(|m| m.chars().count() <= 4));
    }

    #[test]
    fn counts_characters_not_bytes() {
        let entries = vec!["é".repeat(3), "ü".repeat(3)];
        let messages = paginate(&entries, 8);
        assert_eq!(messages.len(), 1);
    }
}
