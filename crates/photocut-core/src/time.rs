//! Time offsets for excerpt requests.
//!
//! This module provides [`Timestamp`], an `HH:MM:SS` offset into a video, and
//! [`ExcerptRange`], a validated `start..end` pair of offsets.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

/// Errors produced while parsing offsets or building a range.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    /// The offset is not in `HH:MM:SS` form.
    #[error("invalid timestamp '{0}', expected HH:MM:SS")]
    InvalidTimestamp(String),

    /// The end offset is not after the start offset.
    #[error("end time {end} must be greater than start time {start}")]
    NotIncreasing {
        /// Requested start offset.
        start: Timestamp,
        /// Requested end offset.
        end: Timestamp,
    },
}

/// An offset into a video, written `HH:MM:SS`.
///
/// Minutes and seconds must be below 60. Hours are two digits, so the largest
/// offset is `99:59:59`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    seconds: u32,
}

impl Timestamp {
    /// Creates a timestamp from hours, minutes and seconds.
    ///
    /// Returns `None` when a component is out of range.
    pub fn from_hms(hours: u32, minutes: u32, seconds: u32) -> Option<Self> {
        if hours > 99 || minutes > 59 || seconds > 59 {
            return None;
        }
        Some(Self {
            seconds: hours * 3600 + minutes * 60 + seconds,
        })
    }

    /// Returns the offset in whole seconds.
    pub fn total_seconds(&self) -> u32 {
        self.seconds
    }

    /// Returns the `(hours, minutes, seconds)` components.
    pub fn hms(&self) -> (u32, u32, u32) {
        (
            self.seconds / 3600,
            (self.seconds % 3600) / 60,
            self.seconds % 60,
        )
    }
}

impl FromStr for Timestamp {
    type Err = RangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || RangeError::InvalidTimestamp(s.to_string());

        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }

        let mut values = [0u32; 3];
        for (slot, part) in values.iter_mut().zip(&parts) {
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            *slot = part.parse().map_err(|_| invalid())?;
        }

        Self::from_hms(values[0], values[1], values[2]).ok_or_else(invalid)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s) = self.hms();
        write!(f, "{:02}:{:02}:{:02}", h, m, s)
    }
}

/// A validated excerpt window where `end > start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcerptRange {
    start: Timestamp,
    end: Timestamp,
}

impl ExcerptRange {
    /// Creates a range, rejecting empty and reversed windows.
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, RangeError> {
        if end <= start {
            return Err(RangeError::NotIncreasing { start, end });
        }
        Ok(Self { start, end })
    }

    /// Parses both offsets and builds the range.
    pub fn parse(start: &str, end: &str) -> Result<Self, RangeError> {
        Self::new(start.parse()?, end.parse()?)
    }

    /// Start offset.
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// End offset.
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// Length of the excerpt in whole seconds (always positive).
    pub fn duration_secs(&self) -> u32 {
        self.end.total_seconds() - self.start.total_seconds()
    }
}

impl fmt::Display for ExcerptRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Formats a creation time the way the photo provider reports it
/// (`2024-10-27T15:59:05Z`).
pub fn format_creation_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}
