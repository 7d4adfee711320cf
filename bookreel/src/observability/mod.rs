//! Observability utilities.

mod spans;
mod subscriber;

pub use spans::{book_span, chunk_span, SpanTimer};
pub use subscriber::init_tracing;
