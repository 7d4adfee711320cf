//! Spans and timing for book and chunk runs.

use std::time::Instant;
use tracing::{info_span, Span};

/// Span covering one book run.
#[must_use]
pub fn book_span(run_id: &str, title: &str) -> Span {
    info_span!("book", run_id = %run_id, title = %title)
}

/// Span covering one chunk's pipeline.
#[must_use]
pub fn chunk_span(index: usize, total: usize) -> Span {
    info_span!("chunk", index, total)
}

/// Wall-clock timer for one stage.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Stops the timer and returns the elapsed time in milliseconds.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}
