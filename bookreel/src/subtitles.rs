//! SRT subtitle parsing and formatting.
//!
//! A block is a sequence number, a `HH:MM:SS,mmm --> HH:MM:SS,mmm` timing
//! line, and one or more text lines; blocks are separated by blank lines.
//! Blocks with fewer than three lines carry no caption and are skipped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

static TIMING_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d+:\d{2}:\d{2}[,.]\d{1,3})\s*-->\s*(\d+:\d{2}:\d{2}[,.]\d{1,3})")
        .unwrap_or_else(|e| unreachable!("invalid timing regex: {e}"))
});

static BLOCK_SEPARATOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n(?:[ \t]*\n)+").unwrap_or_else(|e| unreachable!("invalid separator regex: {e}"))
});

/// Errors raised while parsing SRT content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SrtParseError {
    /// The second line of a block is not a timing line.
    #[error("Block {block}: expected a timing line, found '{line}'")]
    InvalidTiming {
        /// 1-based block position in the file.
        block: usize,
        /// The offending line.
        line: String,
    },

    /// A timestamp is malformed.
    #[error("Invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// A caption ends before it starts.
    #[error("Block {block}: end time precedes start time")]
    NegativeDuration {
        /// 1-based block position in the file.
        block: usize,
    },
}

/// One timed caption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSegment {
    /// Sequence number.
    pub index: usize,
    /// Start offset from the beginning of the audio.
    pub start: Duration,
    /// End offset from the beginning of the audio.
    pub end: Duration,
    /// Caption text; multi-line captions are joined with spaces.
    pub text: String,
}

/// Parses a `HH:MM:SS,mmm` timestamp. A `.` separator is also accepted.
pub fn parse_timestamp(raw: &str) -> Result<Duration, SrtParseError> {
    let invalid = || SrtParseError::InvalidTimestamp(raw.to_string());
    let normalized = raw.trim().replace(',', ".");

    let mut parts = normalized.splitn(3, ':');
    let (Some(h), Some(m), Some(rest)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };
    let (s, ms) = rest.split_once('.').unwrap_or((rest, "0"));

    let hours: u64 = h.parse().map_err(|_| invalid())?;
    let minutes: u64 = m.parse().map_err(|_| invalid())?;
    let seconds: u64 = s.parse().map_err(|_| invalid())?;
    if minutes >= 60 || seconds >= 60 || ms.is_empty() || ms.len() > 3 {
        return Err(invalid());
    }
    // "5" after the separator means 500 ms, as in a decimal fraction.
    let millis: u64 = format!("{ms:0<3}").parse().map_err(|_| invalid())?;

    Ok(Duration::from_millis(
        ((hours * 60 + minutes) * 60 + seconds) * 1000 + millis,
    ))
}

/// Formats a duration as `HH:MM:SS,mmm`.
#[must_use]
pub fn format_timestamp(offset: Duration) -> String {
    let total_ms = offset.as_millis();
    let ms = total_ms % 1000;
    let total_secs = total_ms / 1000;
    format!(
        "{:02}:{:02}:{:02},{:03}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        ms
    )
}

/// Parses SRT content into caption segments, in file order.
pub fn parse_srt(content: &str) -> Result<Vec<CaptionSegment>, SrtParseError> {
    let normalized = content.replace("\r\n", "\n");
    let mut segments = Vec::new();

    for (position, block) in BLOCK_SEPARATOR
        .split(normalized.trim())
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .enumerate()
    {
        let block_number = position + 1;
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 3 {
            continue;
        }

        let timing = TIMING_LINE
            .captures(lines[1])
            .ok_or_else(|| SrtParseError::InvalidTiming {
                block: block_number,
                line: lines[1].to_string(),
            })?;
        let start = parse_timestamp(&timing[1])?;
        let end = parse_timestamp(&timing[2])?;
        if end < start {
            return Err(SrtParseError::NegativeDuration {
                block: block_number,
            });
        }

        let index = lines[0].trim().parse().unwrap_or(segments.len() + 1);
        let text = lines[2..]
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        segments.push(CaptionSegment {
            index,
            start,
            end,
            text,
        });
    }

    Ok(segments)
}

/// Formats segments as SRT, renumbering them from 1.
#[must_use]
pub fn format_srt(segments: &[CaptionSegment]) -> String {
    let mut out = String::new();
    for (n, segment) in segments.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} --> {}\n{}\n\n",
            n + 1,
            format_timestamp(segment.start),
            format_timestamp(segment.end),
            segment.text
        );
    }
    out
}

/// End of the last caption.
#[must_use]
pub fn total_duration(segments: &[CaptionSegment]) -> Duration {
    segments
        .iter()
        .map(|s| s.end)
        .max()
        .unwrap_or(Duration::ZERO)
}
