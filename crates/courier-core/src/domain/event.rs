//! Inbound domain event envelope.
//!
//! Produced by the backend and pushed through the event feed. This core only
//! reads it; `correlation_id` is the link back to a locally dispatched instruction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::CorrelationId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    #[serde(alias = "event_id")]
    pub event_id: String,

    /// e.g. `task.completed`, `time_blocks.truncated`
    #[serde(alias = "event_type")]
    pub event_type: String,

    #[serde(default = "default_version")]
    pub version: i32,

    #[serde(default, alias = "aggregate_type", skip_serializing_if = "Option::is_none")]
    pub aggregate_type: Option<String>,

    #[serde(alias = "aggregate_id")]
    pub aggregate_id: String,

    #[serde(default, alias = "aggregate_version", skip_serializing_if = "Option::is_none")]
    pub aggregate_version: Option<i64>,

    #[serde(default, alias = "correlation_id", skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(alias = "occurred_at")]
    pub occurred_at: DateTime<Utc>,

    #[serde(default)]
    pub payload: serde_json::Value,
}

fn default_version() -> i32 {
    1
}

impl DomainEvent {
    pub fn new(
        event_id: impl Into<String>,
        event_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            event_type: event_type.into(),
            version: 1,
            aggregate_type: None,
            aggregate_id: aggregate_id.into(),
            aggregate_version: None,
            correlation_id: None,
            occurred_at: Utc::now(),
            payload,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_aggregate_type(mut self, aggregate_type: impl Into<String>) -> Self {
        self.aggregate_type = Some(aggregate_type.into());
        self
    }

    /// The correlation id, if present and produced by this core's id scheme.
    pub fn local_correlation_id(&self) -> Option<CorrelationId> {
        self.correlation_id.as_deref()?.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ulid::Ulid;

    #[test]
    fn decodes_camel_case_envelope() {
        let json = r#"{
            "eventId": "e-1",
            "eventType": "task.completed",
            "aggregateId": "42",
            "correlationId": "abc",
            "occurredAt": "2026-01-01T12:00:00Z",
            "payload": {"id": 42}
        }"#;
        let event: DomainEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_type, "task.completed");
        assert_eq!(event.version, 1);
        assert_eq!(event.correlation_id.as_deref(), Some("abc"));
        assert_eq!(event.payload["id"], 42);
    }

    #[test]
    fn decodes_snake_case_envelope_without_correlation() {
        let json = r#"{
            "event_id": "e-2",
            "event_type": "task.deleted",
            "version": 2,
            "aggregate_type": "task",
            "aggregate_id": "7",
            "occurred_at": "2026-01-01T12:00:00Z",
            "payload": null
        }"#;
        let event: DomainEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.version, 2);
        assert_eq!(event.aggregate_type.as_deref(), Some("task"));
        assert!(event.correlation_id.is_none());
        assert!(event.local_correlation_id().is_none());
    }

    #[test]
    fn local_correlation_id_requires_our_format() {
        let cor = CorrelationId::from_ulid(Ulid::new());
        let ours = DomainEvent::new("e", "t", "1", serde_json::Value::Null)
            .with_correlation_id(cor.to_string());
        assert_eq!(ours.local_correlation_id(), Some(cor));

        let foreign = DomainEvent::new("e", "t", "1", serde_json::Value::Null)
            .with_correlation_id("3f1c-uuid-from-another-window");
        assert!(foreign.local_correlation_id().is_none());
    }
}
