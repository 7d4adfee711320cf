//! Test assertions for book reports and events.

use crate::events::CollectingEventSink;
use crate::pipeline::BookReport;

/// Asserts that exactly `expected` chunks made it into the video, in order.
pub fn assert_completed_chunks(report: &BookReport, expected: &[usize]) {
    assert_eq!(
        report.completed, expected,
        "Expected completed chunks {:?}, got {:?} (skipped: {:?})",
        expected,
        report.completed,
        report.skipped_indices()
    );
}

/// Asserts that exactly `expected` chunks were skipped.
pub fn assert_skipped_chunks(report: &BookReport, expected: &[usize]) {
    assert_eq!(
        report.skipped_indices(),
        expected,
        "Expected skipped chunks {:?}, got {:?}",
        expected,
        report.skipped
    );
}

/// Asserts that `expected` event types were emitted in this relative order.
///
/// Other events may appear in between.
pub fn assert_event_order(sink: &CollectingEventSink, expected: &[&str]) {
    let emitted = sink.event_types();
    let mut remaining = expected.iter().peekable();
    for event_type in &emitted {
        if remaining.peek().is_some_and(|next| **next == event_type.as_str()) {
            remaining.next();
        }
    }
    let missing: Vec<_> = remaining.collect();
    assert!(
        missing.is_empty(),
        "Events {:?} not emitted in order. Emitted: {:?}",
        missing,
        emitted
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventSink;

    #[tokio::test]
    async fn test_event_order_allows_gaps() {
        let sink = CollectingEventSink::new();
        for event_type in ["book.started", "stage.started", "stage.completed", "book.completed"] {
            sink.emit(event_type, None).await;
        }

        assert_event_order(&sink, &["book.started", "book.completed"]);
    }

    #[tokio::test]
    #[should_panic(expected = "not emitted in order")]
    async fn test_event_order_rejects_swaps() {
        let sink = CollectingEventSink::new();
        sink.emit("book.completed", None).await;
        sink.emit("book.started", None).await;

        assert_event_order(&sink, &["book.started", "book.completed"]);
    }
}
