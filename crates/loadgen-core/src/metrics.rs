//! Metric emission interface and the latency observation shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// Metric name for end-to-end delivery latency.
pub const MESSAGE_PROCESS_TIME_MS: &str = "messageProcessTimeMs";

/// Errors emitting a metric.
#[derive(Error, Debug)]
pub enum MetricError {
    #[error("metric sink error: {0}")]
    Sink(String),
}

/// Destination for metric observations.
///
/// Emission is fire-and-forget from the harness's point of view: a failed
/// emit is logged and counted by the caller, never retried.
pub trait MetricSink: Send + Sync {
    fn emit(
        &self,
        name: &str,
        value: f64,
        dimensions: Map<String, Value>,
    ) -> Result<(), MetricError>;
}

impl<M: MetricSink + ?Sized> MetricSink for Arc<M> {
    fn emit(
        &self,
        name: &str,
        value: f64,
        dimensions: Map<String, Value>,
    ) -> Result<(), MetricError> {
        (**self).emit(name, value, dimensions)
    }
}

impl<M: MetricSink + ?Sized> MetricSink for &M {
    fn emit(
        &self,
        name: &str,
        value: f64,
        dimensions: Map<String, Value>,
    ) -> Result<(), MetricError> {
        (**self).emit(name, value, dimensions)
    }
}

/// One end-to-end latency measurement for one delivered message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencyObservation {
    pub test_run_id: String,
    pub message_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,
    /// Broker-side enqueue time, when the transport exposed one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_enqueued_time: Option<DateTime<Utc>>,
    /// Enqueue time carried in the message envelope.
    pub client_enqueued_time: DateTime<Utc>,
    pub dequeued_time: DateTime<Utc>,
    /// `dequeued_time - client_enqueued_time` in milliseconds. Negative
    /// under clock skew; never clamped.
    pub elapsed_ms: f64,
}

impl LatencyObservation {
    /// Dimension bag attached to the latency metric.
    pub fn dimensions(&self) -> Map<String, Value> {
        let mut dims = Map::new();
        dims.insert(
            "TestRunId".to_string(),
            Value::String(self.test_run_id.clone()),
        );
        if let Some(session) = &self.session_id {
            dims.insert("SessionId".to_string(), Value::String(session.clone()));
        }
        if let Some(partition) = self.partition {
            dims.insert("PartitionId".to_string(), Value::from(partition));
        }
        dims.insert("MessageId".to_string(), Value::from(self.message_id));
        if let Some(t) = self.system_enqueued_time {
            dims.insert(
                "SystemEnqueuedTime".to_string(),
                Value::String(t.to_rfc3339()),
            );
        }
        dims.insert(
            "ClientEnqueuedTime".to_string(),
            Value::String(self.client_enqueued_time.to_rfc3339()),
        );
        dims.insert(
            "DequeuedTime".to_string(),
            Value::String(self.dequeued_time.to_rfc3339()),
        );
        dims
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_observation() -> LatencyObservation {
        LatencyObservation {
            test_run_id: "run-1".to_string(),
            message_id: 3,
            session_id: Some("session-a".to_string()),
            partition: Some(2),
            system_enqueued_time: None,
            client_enqueued_time: Utc::now(),
            dequeued_time: Utc::now(),
            elapsed_ms: 12.5,
        }
    }

    #[test]
    fn test_dimensions_include_correlation_keys() {
        let observation = sample_observation();
        let dims = observation.dimensions();

        assert_eq!(dims["TestRunId"], "run-1");
        assert_eq!(dims["SessionId"], "session-a");
        assert_eq!(dims["PartitionId"], 2);
        assert_eq!(dims["MessageId"], 3);
        assert!(dims.contains_key("ClientEnqueuedTime"));
        assert!(dims.contains_key("DequeuedTime"));
        // No broker timestamp was available
        assert!(!dims.contains_key("SystemEnqueuedTime"));
    }

    #[test]
    fn test_dimensions_skip_absent_session() {
        let mut observation = sample_observation();
        observation.session_id = None;
        observation.partition = None;

        let dims = observation.dimensions();
        assert!(!dims.contains_key("SessionId"));
        assert!(!dims.contains_key("PartitionId"));
    }

    #[test]
    fn test_observation_serializes_without_absent_fields() {
        let mut observation = sample_observation();
        observation.session_id = None;
        observation.system_enqueued_time = None;

        let json = serde_json::to_value(&observation).unwrap();
        assert!(json.get("session_id").is_none());
        assert!(json.get("system_enqueued_time").is_none());
        assert_eq!(json["message_id"], 3);
    }
}
