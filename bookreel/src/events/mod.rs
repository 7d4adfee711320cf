//! Event sinks for pipeline observability.
//!
//! The retry governor and the pipelines report progress through an
//! [`EventSink`] passed in at construction time. Event names are dotted
//! (`retry.cooldown_progress`, `stage.failed`, `book.completed`, ...) and the
//! payload is a JSON object that always carries a `timestamp` field.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use chrono::Utc;

/// Returns the current UTC time formatted for event payloads.
#[must_use]
pub fn iso_timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

/// Builds an event payload from a JSON object, stamping it with the time.
///
/// Non-object values are wrapped under a `value` key.
#[must_use]
pub fn event_data(fields: serde_json::Value) -> serde_json::Value {
    let mut map = match fields {
        serde_json::Value::Object(map) => map,
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    map.insert(
        "timestamp".to_string(),
        serde_json::Value::String(iso_timestamp()),
    );
    serde_json::Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iso_timestamp_format() {
        let ts = iso_timestamp();
        assert!(ts.contains('T'));
        assert!(ts.ends_with("+00:00"));
    }

    #[test]
    fn test_event_data_stamps_objects() {
        let data = event_data(serde_json::json!({"chunk": 3}));
        assert_eq!(data["chunk"], 3);
        assert!(data["timestamp"].is_string());
    }

    #[test]
    fn test_event_data_wraps_scalars() {
        let data = event_data(serde_json::json!(42));
        assert_eq!(data["value"], 42);

        let data = event_data(serde_json::Value::Null);
        assert_eq!(data.as_object().map(serde_json::Map::len), Some(1));
    }
}
