//! Testing utilities for bookreel pipelines.
//!
//! This module provides:
//! - A sleeper that records cooldowns instead of waiting
//! - A scripted fake for every capability port
//! - Sample analysis replies, transcripts and book text
//! - Assertions over book reports and emitted events

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_completed_chunks, assert_event_order, assert_skipped_chunks};
pub use fixtures::{
    sample_book, sample_book_with_markers, FAIL_MARKER, INAUDIBLE_MARKER, SAMPLE_ANALYSIS_JSON,
    SAMPLE_SRT,
};
pub use mocks::{FakeCall, FakeStudio, RecordingSleeper};
