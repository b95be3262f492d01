//! Event type and topic matching.

use berth_types::Protocol;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single lifecycle event.
///
/// `fields` is a flat JSON object of topic-specific attributes (ids,
/// reasons, counters). Selectors and URLs placed here must already be
/// sanitized by the producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    /// Protocol that originated the triggering request.
    pub origin: Protocol,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub fields: serde_json::Value,
}

impl Event {
    pub fn new<S: Into<String>>(topic: S, origin: Protocol) -> Self {
        Self {
            topic: topic.into(),
            origin,
            at: Utc::now(),
            fields: serde_json::Value::Null,
        }
    }

    pub fn with_fields(mut self, fields: serde_json::Value) -> Self {
        self.fields = fields;
        self
    }
}

/// Match a topic against a subscription pattern.
///
/// `*` matches everything; a trailing `*` matches by prefix; anything else
/// is an exact match.
pub fn topic_matches(topic: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix('*') {
        return topic.starts_with(prefix);
    }
    topic == pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching() {
        assert!(topic_matches("browser.crashed", "*"));
        assert!(topic_matches("browser.crashed", "browser.*"));
        assert!(topic_matches("browser.crashed", "browser.crashed"));
        assert!(!topic_matches("browser.crashed", "proxy.*"));
        assert!(!topic_matches("browser.crashed", "browser.launched"));
    }

    #[test]
    fn event_carries_origin_and_timestamp() {
        let ev = Event::new("session.created", Protocol::Http)
            .with_fields(serde_json::json!({"session_id": "session_1"}));
        assert_eq!(ev.origin, Protocol::Http);
        assert_eq!(ev.fields["session_id"], "session_1");
        assert!(ev.at <= Utc::now());
    }
}
